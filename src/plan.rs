//! Test plan data model.
//!
//! `TestItem` is one row of a test plan (`spec.md` §3). Items are immutable
//! within a session; the Resolver, Dispatcher, and Validator only ever read
//! them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of a test plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestItem {
    pub item_no: i64,
    pub item_name: String,
    pub test_type: String,
    pub switch_mode: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub value_type: Option<ValueType>,
    pub limit_type: Option<LimitType>,
    #[serde(default)]
    pub lower_limit: Option<f64>,
    #[serde(default)]
    pub upper_limit: Option<f64>,
    #[serde(default)]
    pub eq_limit: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub use_result: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub wait_msec: Option<Value>,
}

fn default_true() -> bool {
    true
}

/// An ordered, named test plan. `item_no` strictly increases over the
/// execution order and `item_name` is unique within the plan (invariant 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    pub project: String,
    pub station: String,
    pub name: String,
    pub items: Vec<TestItem>,
}

impl TestPlan {
    /// Items in execution order, enabled only, already sorted by `item_no`.
    pub fn enabled_items_in_order(&self) -> Vec<&TestItem> {
        let mut items: Vec<&TestItem> = self.items.iter().filter(|i| i.enabled).collect();
        items.sort_by_key(|i| i.item_no);
        items
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    None,
    Lower,
    Upper,
    Both,
    Equality,
    Inequality,
    Partial,
}

/// Item outcome. ERROR denotes inability to evaluate; FAIL denotes
/// evaluated-and-out-of-limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
    Skip,
}

/// A measured value, kept as both a numeric and textual channel so a
/// string-typed measurement never has to be forced to a numeric null
/// (`spec.md` §9, open question 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasuredValue {
    Number(f64),
    Text(String),
    Null,
}

impl MeasuredValue {
    /// The numeric form, persisted only when the value parses as a finite
    /// decimal (invariant 5).
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            MeasuredValue::Number(n) if n.is_finite() => Some(*n),
            MeasuredValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// The raw textual form conveyed to the CSV writer and validator.
    pub fn as_text(&self) -> String {
        match self {
            MeasuredValue::Number(n) => format_number(*n),
            MeasuredValue::Text(s) => s.clone(),
            MeasuredValue::Null => String::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MeasuredValue::Null)
    }
}

/// Strip a trailing `.0` the way `use_result` numeric canonicalisation
/// requires (`spec.md` §4.6).
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// `{item_no, item_name, outcome, measured_value, error_message,
/// execution_ms, timestamp}` — created exactly once per item per session
/// (invariant 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub item_no: i64,
    pub item_name: String,
    pub outcome: Outcome,
    pub measured_value: MeasuredValue,
    pub error_message: Option<String>,
    pub execution_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl MeasurementResult {
    pub fn error(item_no: i64, item_name: impl Into<String>, message: impl Into<String>) -> Self {
        MeasurementResult {
            item_no,
            item_name: item_name.into(),
            outcome: Outcome::Error,
            measured_value: MeasuredValue::Null,
            error_message: Some(message.into()),
            execution_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_strips_trailing_zero() {
        assert_eq!(format_number(123.0), "123");
        assert_eq!(format_number(123.5), "123.5");
    }

    #[test]
    fn measured_value_numeric_parses_text() {
        let v = MeasuredValue::Text("5.01".to_string());
        assert_eq!(v.as_numeric(), Some(5.01));
    }

    #[test]
    fn measured_value_numeric_rejects_non_numeric_text() {
        let v = MeasuredValue::Text("No instrument found".to_string());
        assert_eq!(v.as_numeric(), None);
    }

    #[test]
    fn enabled_items_in_order_sorts_and_filters() {
        let plan = TestPlan {
            project: "p".into(),
            station: "s".into(),
            name: "n".into(),
            items: vec![
                TestItem {
                    item_no: 2,
                    item_name: "b".into(),
                    test_type: "Wait".into(),
                    switch_mode: "default".into(),
                    parameters: HashMap::new(),
                    value_type: None,
                    limit_type: None,
                    lower_limit: None,
                    upper_limit: None,
                    eq_limit: None,
                    unit: None,
                    use_result: None,
                    enabled: true,
                    timeout_ms: None,
                    wait_msec: None,
                },
                TestItem {
                    item_no: 1,
                    item_name: "a".into(),
                    test_type: "Wait".into(),
                    switch_mode: "default".into(),
                    parameters: HashMap::new(),
                    value_type: None,
                    limit_type: None,
                    lower_limit: None,
                    upper_limit: None,
                    eq_limit: None,
                    unit: None,
                    use_result: None,
                    enabled: false,
                    timeout_ms: None,
                    wait_msec: None,
                },
            ],
        };
        let ordered = plan.enabled_items_in_order();
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].item_name, "b");
    }
}

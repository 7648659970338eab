//! Parameter Resolver (C6) — merge direct columns, the JSON parameter bag,
//! and `use_result` injection into one effective parameter set.
//!
//! No direct teacher analogue exists for a multi-layer merge; this module
//! is built in the idiom of `plan`/`validator` (pure functions over owned
//! data, `PdError` for failure) per `spec.md` §4.6.

use std::collections::HashMap;

use serde_json::Value;

use crate::catalog::TemplateCatalog;
use crate::error::{PdError, PdResult};
use crate::plan::{format_number, MeasuredValue, MeasurementResult, TestItem};

/// The effective parameter set for one Measurement invocation. Transient,
/// scoped to a single item.
#[derive(Debug, Clone, Default)]
pub struct ResolvedParameters {
    values: HashMap<String, Value>,
}

impl ResolvedParameters {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&canonical_key(key))
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(value_to_string)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Aliases for legacy casing variants (`spec.md` §4.6). Keys not listed
/// here fall back to a generic CamelCase→snake_case conversion.
fn alias_canonical(key: &str) -> Option<&'static str> {
    match key {
        "UseResult" | "use_result" => Some("use_result"),
        "WaitmSec" | "wait_msec" => Some("wait_msec"),
        _ => None,
    }
}

/// Canonical form used on the wire to Measurements: lower snake_case.
pub fn canonical_key(key: &str) -> String {
    if let Some(canon) = alias_canonical(key) {
        return canon.to_string();
    }
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Resolve the effective parameters for one item, given the session's
/// prior results so far (in item order).
pub fn resolve(
    item: &TestItem,
    prior_results: &[MeasurementResult],
    catalog: &TemplateCatalog,
) -> PdResult<ResolvedParameters> {
    let mut values: HashMap<String, Value> = HashMap::new();

    // 1. Direct columns that happen to be parameters.
    if let Some(timeout_ms) = item.timeout_ms {
        values.insert("timeout".to_string(), Value::from(timeout_ms));
    }
    if let Some(wait_msec) = &item.wait_msec {
        values.insert("wait_msec".to_string(), wait_msec.clone());
    }
    if let Some(use_result) = &item.use_result {
        values.insert("use_result".to_string(), Value::String(use_result.clone()));
    }

    // 2. The item's JSON parameters bag (later wins over direct columns).
    for (k, v) in &item.parameters {
        values.insert(canonical_key(k), v.clone());
    }

    // 3. use_result substitution.
    if let Some(reference) = values.get("use_result").map(value_to_string) {
        if !reference.is_empty() {
            let resolved = resolve_use_result(&reference, prior_results)?;
            values.insert("use_result".to_string(), resolved);
        }
    }

    // Required-parameter enforcement via the Template Catalog. Unknown
    // parameters are tolerated; Wait/Script ignore extras entirely.
    if !item.test_type.eq_ignore_ascii_case("wait") {
        if let Some(template) = catalog.lookup(&item.test_type, &item.switch_mode) {
            for required in &template.required {
                let canon = canonical_key(required);
                if !values.contains_key(&canon) {
                    return Err(PdError::ParamMissing(required.clone()));
                }
            }
        }
    }

    Ok(ResolvedParameters { values })
}

fn resolve_use_result(reference: &str, prior_results: &[MeasurementResult]) -> PdResult<Value> {
    let found = prior_results
        .iter()
        .find(|r| r.item_name == reference)
        .or_else(|| {
            reference
                .parse::<i64>()
                .ok()
                .and_then(|ordinal| prior_results.iter().find(|r| r.item_no == ordinal))
        });

    let result = found.ok_or_else(|| PdError::UseResultNotFound(reference.to_string()))?;

    Ok(match &result.measured_value {
        MeasuredValue::Null => Value::String(String::new()),
        MeasuredValue::Number(n) => Value::String(format_number(*n)),
        MeasuredValue::Text(s) => {
            if let Some(stripped) = s.strip_suffix(".0") {
                if stripped.parse::<i64>().is_ok() {
                    return Ok(Value::String(stripped.to_string()));
                }
            }
            Value::String(s.clone())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Outcome;
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;

    fn item(use_result: Option<&str>) -> TestItem {
        TestItem {
            item_no: 2,
            item_name: "B".into(),
            test_type: "Other".into(),
            switch_mode: "test123".into(),
            parameters: {
                let mut m = StdHashMap::new();
                if let Some(ur) = use_result {
                    m.insert("use_result".to_string(), Value::String(ur.to_string()));
                }
                m
            },
            value_type: None,
            limit_type: None,
            lower_limit: None,
            upper_limit: None,
            eq_limit: None,
            unit: None,
            use_result: use_result.map(|s| s.to_string()),
            enabled: true,
            timeout_ms: None,
            wait_msec: None,
        }
    }

    #[test]
    fn canonical_key_handles_camel_case() {
        assert_eq!(canonical_key("SetVolt"), "set_volt");
        assert_eq!(canonical_key("Instrument"), "instrument");
        assert_eq!(canonical_key("WaitmSec"), "wait_msec");
        assert_eq!(canonical_key("UseResult"), "use_result");
    }

    #[test]
    fn use_result_substitutes_numeric_value_by_name() {
        let prior = vec![MeasurementResult {
            item_no: 1,
            item_name: "A".into(),
            outcome: Outcome::Pass,
            measured_value: MeasuredValue::Number(123.0),
            error_message: None,
            execution_ms: 1,
            timestamp: Utc::now(),
        }];
        let catalog = TemplateCatalog::new();
        let resolved = resolve(&item(Some("A")), &prior, &catalog).unwrap();
        assert_eq!(resolved.get_string("use_result"), Some("123".to_string()));
    }

    #[test]
    fn use_result_not_found_errors() {
        let catalog = TemplateCatalog::new();
        let err = resolve(&item(Some("missing")), &[], &catalog).unwrap_err();
        assert!(matches!(err, PdError::UseResultNotFound(_)));
    }
}

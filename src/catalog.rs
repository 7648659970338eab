//! Template Catalog (C10) — static, in-process catalog of
//! `(test_type, switch_mode) → {required, optional, example}`.
//!
//! Grounded on the teacher's `once_cell::sync::Lazy` static-table pattern
//! in `hardware::registry` (used there for capability lookups).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One known `(test_type, switch_mode)` combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub example: HashMap<String, Value>,
}

fn key(test_type: &str, switch_mode: &str) -> (String, String) {
    (test_type.to_ascii_lowercase(), switch_mode.to_ascii_lowercase())
}

fn template(required: &[&str], optional: &[&str]) -> Template {
    Template {
        required: required.iter().map(|s| s.to_string()).collect(),
        optional: optional.iter().map(|s| s.to_string()).collect(),
        example: HashMap::new(),
    }
}

static BUILTIN: Lazy<HashMap<(String, String), Template>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        key("powerset", "default"),
        template(
            &["instrument", "set_volt", "set_curr", "channel"],
            &["ovp", "ocp", "delay"],
        ),
    );
    m.insert(
        key("powerread", "daq973a"),
        template(&["instrument", "channel", "item", "type"], &[]),
    );
    m.insert(
        key("console", "console"),
        template(
            &["instrument", "command"],
            &["timeout", "response_line_count", "settling_time"],
        ),
    );
    m.insert(
        key("comport", "comport"),
        template(
            &["instrument", "command"],
            &["timeout", "response_line_count", "settling_time"],
        ),
    );
    m.insert(
        key("tcpip", "tcpip"),
        template(
            &["instrument", "command"],
            &["timeout", "response_line_count", "settling_time"],
        ),
    );
    m.insert(key("relay", "default"), template(&["relay_name", "action"], &[]));
    m.insert(key("getsn", "default"), template(&["instrument"], &[]));
    m.insert(key("opjudge", "default"), template(&["instrument"], &[]));
    m.insert(key("sfcstep", "default"), template(&["instrument"], &[]));
    m
});

/// The `(test_type, switch_mode)` combinations known at compile time plus
/// any operator-registered extensions.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    extra: HashMap<(String, String), Template>,
}

/// Direct `switch_mode` values that always select the corresponding
/// virtual command measurement regardless of aliasing (`spec.md` §4.5).
pub const DIRECT_SWITCH_MODES: &[&str] = &["console", "comport", "tcpip"];

impl TemplateCatalog {
    pub fn new() -> Self {
        TemplateCatalog::default()
    }

    pub fn register(&mut self, test_type: &str, switch_mode: &str, template: Template) {
        self.extra.insert(key(test_type, switch_mode), template);
    }

    /// Case-insensitive lookup, operator extensions take priority over
    /// built-ins of the same key.
    pub fn lookup(&self, test_type: &str, switch_mode: &str) -> Option<&Template> {
        let k = key(test_type, switch_mode);
        self.extra.get(&k).or_else(|| BUILTIN.get(&k))
    }

    pub fn is_known(&self, test_type: &str, switch_mode: &str) -> bool {
        self.lookup(test_type, switch_mode).is_some()
    }

    /// `ListTemplates()` per `spec.md` §6.
    pub fn list(&self) -> HashMap<String, HashMap<String, Template>> {
        let mut out: HashMap<String, HashMap<String, Template>> = HashMap::new();
        for ((tt, sm), tmpl) in BUILTIN.iter().chain(self.extra.iter()) {
            out.entry(tt.clone()).or_default().insert(sm.clone(), tmpl.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let catalog = TemplateCatalog::new();
        assert!(catalog.is_known("PowerRead", "DAQ973A"));
        assert!(catalog.is_known("powerread", "daq973a"));
    }

    #[test]
    fn unknown_combination_is_not_known() {
        let catalog = TemplateCatalog::new();
        assert!(!catalog.is_known("Bogus", "Mode"));
    }

    #[test]
    fn operator_registration_overrides_builtin() {
        let mut catalog = TemplateCatalog::new();
        catalog.register("Relay", "default", template(&["only_this"], &[]));
        let tmpl = catalog.lookup("relay", "default").unwrap();
        assert_eq!(tmpl.required, vec!["only_this".to_string()]);
    }
}

//! Measurement API — the four "consumed by the core, exposed to
//! collaborators" entry points of `spec.md` §6 that don't require a
//! [`crate::session::Session`]: ad-hoc single-item execution, the static
//! catalog/validation-type listings, and standalone parameter validation.
//!
//! `ListTemplates` itself already lives on [`TemplateCatalog::list`]; this
//! module adds the remaining three so callers don't have to reach past the
//! library into private CLI logic for them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::catalog::TemplateCatalog;
use crate::dispatch;
use crate::error::{PdError, PdResult};
use crate::measurement::MeasurementContext;
use crate::plan::{LimitType, MeasurementResult, TestItem, ValueType};
use crate::pool::ConnectionPool;
use crate::resolver;

/// `ListValidationTypes() -> {value_types, limit_types}` (`spec.md` §6):
/// the full `ValueType`/`LimitType` vocabularies a `TestItem` can declare.
#[derive(Debug, Clone)]
pub struct ValidationTypes {
    pub value_types: Vec<ValueType>,
    pub limit_types: Vec<LimitType>,
}

pub fn list_validation_types() -> ValidationTypes {
    ValidationTypes {
        value_types: vec![ValueType::String, ValueType::Integer, ValueType::Float],
        limit_types: vec![
            LimitType::None,
            LimitType::Lower,
            LimitType::Upper,
            LimitType::Both,
            LimitType::Equality,
            LimitType::Inequality,
            LimitType::Partial,
        ],
    }
}

/// `ValidateParameters(test_type, switch_mode, params) -> {valid, missing,
/// unknown, suggestions}` (`spec.md` §6), checked against the Template
/// Catalog (C10) the same way the Resolver enforces required parameters.
#[derive(Debug, Clone)]
pub struct ParameterValidation {
    pub valid: bool,
    pub missing: Vec<String>,
    pub unknown: Vec<String>,
    /// Best-guess canonical-key corrections for each `unknown` entry,
    /// keyed by the unknown key itself; only populated when a known key is
    /// close enough to plausibly be a typo.
    pub suggestions: HashMap<String, String>,
}

pub fn validate_parameters(
    catalog: &TemplateCatalog,
    test_type: &str,
    switch_mode: &str,
    params: &HashMap<String, Value>,
) -> PdResult<ParameterValidation> {
    let template = catalog
        .lookup(test_type, switch_mode)
        .ok_or_else(|| PdError::UnknownMeasurement {
            test_type: test_type.to_string(),
            switch_mode: switch_mode.to_string(),
        })?;

    let provided: Vec<String> = params.keys().map(|k| resolver::canonical_key(k)).collect();
    let known: Vec<String> = template
        .required
        .iter()
        .chain(template.optional.iter())
        .map(|s| resolver::canonical_key(s))
        .collect();

    let missing: Vec<String> = template
        .required
        .iter()
        .map(|r| resolver::canonical_key(r))
        .filter(|r| !provided.contains(r))
        .collect();
    let unknown: Vec<String> = provided.iter().filter(|p| !known.contains(p)).cloned().collect();

    let suggestions = unknown
        .iter()
        .filter_map(|u| closest_known(u, &known).map(|k| (u.clone(), k)))
        .collect();

    Ok(ParameterValidation {
        valid: missing.is_empty(),
        missing,
        unknown,
        suggestions,
    })
}

/// The nearest known key within edit-distance of a plausible typo, or
/// `None` if nothing is close enough to be worth suggesting.
fn closest_known(unknown: &str, known: &[String]) -> Option<String> {
    let threshold = (unknown.chars().count() / 2).max(2);
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, distance)| *distance <= threshold)
        .min_by_key(|(_, distance)| *distance)
        .map(|(k, _)| k.clone())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let above = row[j];
            row[j] = (row[j] + 1).min(row[j - 1] + 1).min(prev_diag + cost);
            prev_diag = above;
        }
    }
    row[b.len()]
}

/// `ExecuteMeasurement(measurementType, switchMode, params) ->
/// MeasurementResult` (`spec.md` §6): a single ad-hoc measurement run
/// through the same Resolver/Dispatcher/Validator pipeline a session uses,
/// without a `Session` or plan around it. `item_no` is always `0` since no
/// plan ordering applies.
pub async fn execute_measurement(
    test_type: &str,
    switch_mode: &str,
    params: HashMap<String, Value>,
    pool: &Arc<ConnectionPool>,
    catalog: &TemplateCatalog,
    scripts_dir: &Path,
) -> MeasurementResult {
    let item = TestItem {
        item_no: 0,
        item_name: format!("{test_type}/{switch_mode}"),
        test_type: test_type.to_string(),
        switch_mode: switch_mode.to_string(),
        parameters: params,
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
    };

    let resolved = match resolver::resolve(&item, &[], catalog) {
        Ok(params) => params,
        Err(e) => return MeasurementResult::error(item.item_no, item.item_name.clone(), e.to_string()),
    };

    let ctx = MeasurementContext {
        pool: pool.clone(),
        cancel: CancellationToken::new(),
        scripts_dir: scripts_dir.to_path_buf(),
    };

    dispatch::dispatch(&item, &resolved, &ctx, catalog).await
}

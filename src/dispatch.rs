//! Measurement Dispatcher (C5) — select a [`crate::measurement::Measurement`]
//! for a test item and execute it under a bounded, validated contract
//! (`spec.md` §4.5).
//!
//! Grounded on the teacher's `experiment::run_engine::process_message`
//! match-and-dispatch shape; the alias table is built once the way the
//! teacher's capability lookups use `once_cell::sync::Lazy` (see
//! `catalog.rs`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::catalog::{TemplateCatalog, DIRECT_SWITCH_MODES};
use crate::error::PdError;
use crate::measurement::command::CommandMeasurement;
use crate::measurement::dummy::DummyMeasurement;
use crate::measurement::power_read::PowerRead;
use crate::measurement::power_set::PowerSet;
use crate::measurement::relay::RelayMeasurement;
use crate::measurement::script::ScriptMeasurement;
use crate::measurement::template_generic::TemplateGenericMeasurement;
use crate::measurement::wait::WaitMeasurement;
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasurementResult, Outcome, TestItem};
use crate::resolver::ResolvedParameters;
use crate::validator::validate;

/// Implementation-default overall ceiling applied when `item.timeout_ms`
/// is absent (`spec.md` §4.5: "an implementation default (e.g. ... 30s
/// overall)").
const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Case-insensitive normalisation of `test_type`, aliases collapsed at
/// lookup time (`spec.md` §4.5 step 1).
fn normalize_test_type(raw: &str) -> NormalizedType {
    match raw.to_ascii_lowercase().as_str() {
        "powerset" => NormalizedType::PowerSet,
        "powerread" => NormalizedType::PowerRead,
        "command" | "command_test" | "console" | "comport" | "tcpip" => NormalizedType::Command,
        "other" => NormalizedType::Script,
        "wait" => NormalizedType::Wait,
        "relay" => NormalizedType::Relay,
        "sfcstep" | "getsn" | "opjudge" => NormalizedType::TemplateGeneric,
        "dummy" => NormalizedType::Dummy,
        _ => NormalizedType::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NormalizedType {
    PowerSet,
    PowerRead,
    Command,
    Script,
    Wait,
    Relay,
    TemplateGeneric,
    Dummy,
    Unknown,
}

/// Select the `Measurement` implementation for one item, per the
/// algorithm in `spec.md` §4.5. Returns `Err` only for selection failures
/// (unknown type/mode) — once a `Measurement` is selected, its own
/// failures are recovered into the `MeasurementResult` by `dispatch`.
fn select(item: &TestItem, catalog: &TemplateCatalog) -> Result<Arc<dyn Measurement>, PdError> {
    let switch_mode_lower = item.switch_mode.to_ascii_lowercase();

    // Step 2: a "direct" switch_mode always selects the command
    // measurement, regardless of test_type aliasing.
    if DIRECT_SWITCH_MODES.contains(&switch_mode_lower.as_str()) {
        return Ok(Arc::new(CommandMeasurement));
    }

    let normalized = normalize_test_type(&item.test_type);

    // Step 4: every recognised type backed by a Template Catalog entry
    // must have a matching (test_type, switch_mode) pair, not just a
    // recognised test_type. `Other`/`Wait`/`Dummy` carry no catalog
    // template of their own and are exempt.
    let catalog_backed = matches!(
        normalized,
        NormalizedType::PowerSet
            | NormalizedType::PowerRead
            | NormalizedType::Command
            | NormalizedType::Relay
            | NormalizedType::TemplateGeneric
    );
    if catalog_backed && !catalog.is_known(&item.test_type, &item.switch_mode) {
        return Err(PdError::UnknownMeasurement {
            test_type: item.test_type.clone(),
            switch_mode: item.switch_mode.clone(),
        });
    }

    match normalized {
        NormalizedType::PowerSet => Ok(Arc::new(PowerSet)),
        NormalizedType::PowerRead => Ok(Arc::new(PowerRead)),
        NormalizedType::Command => Ok(Arc::new(CommandMeasurement)),
        NormalizedType::Script => Ok(Arc::new(ScriptMeasurement)),
        NormalizedType::Wait => Ok(Arc::new(WaitMeasurement)),
        NormalizedType::Relay => Ok(Arc::new(RelayMeasurement)),
        NormalizedType::TemplateGeneric => Ok(Arc::new(TemplateGenericMeasurement)),
        NormalizedType::Dummy => Ok(Arc::new(DummyMeasurement)),
        NormalizedType::Unknown => {
            // Step 3: a switch_mode naming a script or relay op makes an
            // otherwise-unrecognised test_type behave as `Other`.
            if !switch_mode_lower.is_empty() && switch_mode_lower != "default" {
                return Ok(Arc::new(ScriptMeasurement));
            }
            // Step 4: neither Other nor Wait, and not a known template —
            // selection fails outright.
            if !catalog.is_known(&item.test_type, &item.switch_mode) {
                return Err(PdError::UnknownMeasurement {
                    test_type: item.test_type.clone(),
                    switch_mode: item.switch_mode.clone(),
                });
            }
            Ok(Arc::new(TemplateGenericMeasurement))
        }
    }
}

/// Execute the selected `Measurement` for `item`, bounded by
/// `item.timeout_ms` (or the implementation default), then apply the
/// Validator (C1) uniformly. Any failure along the way — selection,
/// execution, or timeout — is folded into an `ERROR` `MeasurementResult`;
/// this function never returns `Err` (`spec.md` §9: "exceptions-as-control
/// flow... becomes explicit result-typed returns", converted to the
/// Dispatcher's outer edge).
pub async fn dispatch(
    item: &TestItem,
    params: &ResolvedParameters,
    ctx: &MeasurementContext,
    catalog: &TemplateCatalog,
) -> MeasurementResult {
    let started = Instant::now();

    let measurement = match select(item, catalog) {
        Ok(m) => m,
        Err(e) => return error_result(item, started, e.to_string()),
    };

    let timeout = item
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_OVERALL_TIMEOUT);

    let outcome = tokio::time::timeout(timeout, measurement.execute(item, params, ctx)).await;

    let measured = match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => return error_result(item, started, e.to_string()),
        Err(_) => {
            return error_result(item, started, format!("timeout after {}ms", timeout.as_millis()))
        }
    };

    let validation = validate(
        &measured,
        item.value_type,
        item.limit_type,
        item.lower_limit,
        item.upper_limit,
        item.eq_limit.as_deref(),
    );

    MeasurementResult {
        item_no: item.item_no,
        item_name: item.item_name.clone(),
        outcome: validation.outcome,
        measured_value: measured,
        error_message: validation.error_message,
        execution_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    }
}

fn error_result(item: &TestItem, started: Instant, message: String) -> MeasurementResult {
    MeasurementResult {
        item_no: item.item_no,
        item_name: item.item_name.clone(),
        outcome: Outcome::Error,
        measured_value: crate::plan::MeasuredValue::Null,
        error_message: Some(message),
        execution_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    }
}

//! End-to-end scenarios over the public `SessionEngine` API, grounded on
//! `spec.md` §8's concrete scenarios (S1-S6). Each test drives a real
//! `TestPlan` through `start_session`/`get_session` rather than poking at
//! internals, the way the teacher's own `tests/` integration suite drives
//! its session/experiment engine end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pdtool_core::catalog::TemplateCatalog;
use pdtool_core::config::Settings;
use pdtool_core::plan::{LimitType, Outcome, TestItem, TestPlan, ValueType};
use pdtool_core::pool::ConnectionPool;
use pdtool_core::registry::InstrumentRegistry;
use pdtool_core::session::{SessionEngine, SessionState};
use serde_json::Value;
use tempfile::tempdir;

fn blank_item(item_no: i64, name: &str, test_type: &str, switch_mode: &str) -> TestItem {
    TestItem {
        item_no,
        item_name: name.to_string(),
        test_type: test_type.to_string(),
        switch_mode: switch_mode.to_string(),
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
    }
}

fn engine(report_base: std::path::PathBuf, scripts_dir: std::path::PathBuf) -> SessionEngine {
    let registry = Arc::new(InstrumentRegistry::with_builtins());
    let pool = Arc::new(ConnectionPool::new(registry));
    let catalog = Arc::new(TemplateCatalog::new());
    let settings = Settings {
        report_base_dir: report_base,
        scripts_dir,
        ..Settings::default()
    };
    SessionEngine::new(pool, catalog, Arc::new(settings))
}

async fn run_to_completion(engine: &SessionEngine, id: &str) -> SessionState {
    for _ in 0..200 {
        let state = engine.get_session(id).await.unwrap().state;
        if matches!(
            state,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        ) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    engine.get_session(id).await.unwrap().state
}

/// S1 (numeric read against limits): a `Dummy` item modelling a real
/// `PowerRead` result of `5.01` against `[4.8, 5.2]` PASSes and writes one
/// CSV row with the measured value and both limits.
#[tokio::test]
async fn s1_numeric_read_within_limits_passes_and_reports() {
    let report_dir = tempdir().unwrap();
    let scripts_dir = tempdir().unwrap();
    let engine = engine(report_dir.path().to_path_buf(), scripts_dir.path().to_path_buf());

    let mut item = blank_item(1, "V1", "Dummy", "default");
    item.parameters.insert("value".to_string(), Value::from(5.01));
    item.value_type = Some(ValueType::Float);
    item.limit_type = Some(LimitType::Both);
    item.lower_limit = Some(4.8);
    item.upper_limit = Some(5.2);

    let plan = TestPlan {
        project: "ProjX".into(),
        station: "StationA".into(),
        name: "S1".into(),
        items: vec![item],
    };
    let id = engine.start_session(plan, Some("SN1".into())).await.unwrap();
    assert_eq!(run_to_completion(&engine, &id).await, SessionState::Completed);

    let snapshot = engine.get_session(&id).await.unwrap();
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].outcome, Outcome::Pass);
    assert_eq!(snapshot.aggregate_outcome, Some(Outcome::Pass));

    let csv = std::fs::read_to_string(find_csv(report_dir.path())).unwrap();
    let mut lines = csv.lines();
    lines.next();
    let row = lines.next().unwrap();
    assert!(row.starts_with("1,V1,PASS,5.01,4.8,5.2,,"));
}

/// S2: a script item's result is injected via `use_result` into a second
/// script item, which receives it as a positional CLI argument.
#[tokio::test]
async fn s2_use_result_injection_across_script_items() {
    let report_dir = tempdir().unwrap();
    let scripts_dir = tempdir().unwrap();
    std::fs::write(
        scripts_dir.path().join("test123"),
        "import sys\nif len(sys.argv) > 1:\n    print(456)\nelse:\n    print(123)\n",
    )
    .unwrap();
    let engine = engine(report_dir.path().to_path_buf(), scripts_dir.path().to_path_buf());

    let mut item_a = blank_item(1, "A", "Other", "test123");
    item_a.value_type = Some(ValueType::Integer);
    item_a.limit_type = Some(LimitType::None);

    let mut item_b = blank_item(2, "B", "Other", "test123");
    item_b.value_type = Some(ValueType::Integer);
    item_b.limit_type = Some(LimitType::Equality);
    item_b.eq_limit = Some("456".to_string());
    item_b.use_result = Some("A".to_string());

    let plan = TestPlan {
        project: "P".into(),
        station: "S".into(),
        name: "S2".into(),
        items: vec![item_a, item_b],
    };
    let id = engine.start_session(plan, None).await.unwrap();
    assert_eq!(run_to_completion(&engine, &id).await, SessionState::Completed);

    let snapshot = engine.get_session(&id).await.unwrap();
    assert_eq!(snapshot.results.len(), 2);
    assert_eq!(snapshot.results[0].outcome, Outcome::Pass);
    assert_eq!(snapshot.results[1].outcome, Outcome::Pass);
}

/// S3: aborting mid-session marks the in-flight item `ERROR "aborted"`; the
/// not-yet-started item is never dispatched and so never gains a result
/// row; the session ends `ABORTED`.
#[tokio::test]
async fn s3_abort_mid_session() {
    let report_dir = tempdir().unwrap();
    let scripts_dir = tempdir().unwrap();
    let engine = engine(report_dir.path().to_path_buf(), scripts_dir.path().to_path_buf());

    let mut item1 = blank_item(1, "First", "Dummy", "default");
    item1.parameters.insert("value".to_string(), Value::from(1));

    let mut item2 = blank_item(2, "Wait", "Wait", "default");
    item2.wait_msec = Some(Value::from(60_000));
    item2.parameters.insert("wait_msec".to_string(), Value::from(60_000));

    let item3 = blank_item(3, "Never", "Dummy", "default");

    let plan = TestPlan {
        project: "P".into(),
        station: "S".into(),
        name: "S3".into(),
        items: vec![item1, item2, item3],
    };
    let id = engine.start_session(plan, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.abort_session(&id).await.unwrap();

    assert_eq!(run_to_completion(&engine, &id).await, SessionState::Aborted);

    // item 3 is never reached: header + two rows, not three.
    let snapshot = engine.get_session(&id).await.unwrap();
    assert_eq!(snapshot.results.len(), 2);
    assert_eq!(snapshot.results[0].outcome, Outcome::Pass);
    assert_eq!(snapshot.results[1].outcome, Outcome::Error);
    assert_eq!(snapshot.results[1].error_message.as_deref(), Some("aborted"));

    let csv = std::fs::read_to_string(find_csv(report_dir.path())).unwrap();
    assert_eq!(csv.lines().count(), 3);
}

/// S4: a required parameter missing from the item fails the Resolver
/// before any driver call; the session still reaches COMPLETED.
#[tokio::test]
async fn s4_missing_required_parameter_errors_without_dispatch() {
    let report_dir = tempdir().unwrap();
    let scripts_dir = tempdir().unwrap();
    let engine = engine(report_dir.path().to_path_buf(), scripts_dir.path().to_path_buf());

    let mut item = blank_item(1, "V1", "PowerRead", "DAQ973A");
    item.parameters
        .insert("Instrument".to_string(), Value::String("daq973a_1".into()));

    let plan = TestPlan {
        project: "P".into(),
        station: "S".into(),
        name: "S4".into(),
        items: vec![item],
    };
    let id = engine.start_session(plan, None).await.unwrap();
    assert_eq!(run_to_completion(&engine, &id).await, SessionState::Completed);

    let snapshot = engine.get_session(&id).await.unwrap();
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].outcome, Outcome::Error);
    assert!(snapshot.results[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("channel"));
}

/// S5: a console command that outlives its `Timeout` is killed and the
/// item is recorded ERROR, not left hanging; the session still completes.
#[tokio::test]
async fn s5_console_command_timeout() {
    let report_dir = tempdir().unwrap();
    let scripts_dir = tempdir().unwrap();
    let engine = engine(report_dir.path().to_path_buf(), scripts_dir.path().to_path_buf());

    let mut item = blank_item(1, "Slow", "Console", "console");
    item.parameters
        .insert("Instrument".to_string(), Value::String("console_1".into()));
    item.parameters
        .insert("Command".to_string(), Value::String("sleep 10".into()));
    item.timeout_ms = Some(500);
    item.value_type = Some(ValueType::String);
    item.limit_type = Some(LimitType::Partial);
    item.eq_limit = Some("done".to_string());

    let plan = TestPlan {
        project: "P".into(),
        station: "S".into(),
        name: "S5".into(),
        items: vec![item],
    };
    let start = std::time::Instant::now();
    let id = engine.start_session(plan, None).await.unwrap();
    assert_eq!(run_to_completion(&engine, &id).await, SessionState::Completed);
    assert!(start.elapsed() < Duration::from_secs(5));

    let snapshot = engine.get_session(&id).await.unwrap();
    assert_eq!(snapshot.results[0].outcome, Outcome::Error);
    assert!(snapshot.results[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("timeout"));
}

/// S6: a string-typed console measurement persists its text verbatim and
/// is never forced through numeric casting.
#[tokio::test]
async fn s6_string_measurement_not_stored_numerically() {
    let report_dir = tempdir().unwrap();
    let scripts_dir = tempdir().unwrap();
    let engine = engine(report_dir.path().to_path_buf(), scripts_dir.path().to_path_buf());

    let mut item = blank_item(1, "Greeting", "Console", "console");
    item.parameters
        .insert("Instrument".to_string(), Value::String("console_1".into()));
    item.parameters
        .insert("Command".to_string(), Value::String("echo hello".into()));
    item.value_type = Some(ValueType::String);
    item.limit_type = Some(LimitType::Partial);
    item.eq_limit = Some("hello".to_string());

    let plan = TestPlan {
        project: "P".into(),
        station: "S".into(),
        name: "S6".into(),
        items: vec![item],
    };
    let id = engine.start_session(plan, None).await.unwrap();
    assert_eq!(run_to_completion(&engine, &id).await, SessionState::Completed);

    let snapshot = engine.get_session(&id).await.unwrap();
    assert_eq!(snapshot.results[0].outcome, Outcome::Pass);
    assert_eq!(snapshot.results[0].measured_value.as_text(), "hello");
    assert_eq!(snapshot.results[0].measured_value.as_numeric(), None);

    let csv = std::fs::read_to_string(find_csv(report_dir.path())).unwrap();
    let mut lines = csv.lines();
    lines.next();
    assert!(lines.next().unwrap().contains(",hello,"));
}

fn find_csv(base: &std::path::Path) -> std::path::PathBuf {
    for entry in walkdir(base) {
        if entry.extension().is_some_and(|e| e == "csv") {
            return entry;
        }
    }
    panic!("no CSV report found under {base:?}");
}

fn walkdir(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walkdir(&path));
        } else {
            out.push(path);
        }
    }
    out
}

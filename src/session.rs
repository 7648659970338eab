//! Session Engine (C7) — state machine that runs an ordered sequence of
//! items, honouring abort/timeout, recording results, streaming progress
//! (`spec.md` §4.7).
//!
//! Grounded on the teacher's `RunEngine`/`ExperimentState` in
//! `experiment/run_engine.rs`: a `tracing`-instrumented state machine that
//! consumes a sequence sequentially and checkpoints periodically. Here the
//! "checkpoint" is a durable result append (invariant 4) and the
//! "sequence" is a `TestPlan`'s enabled items.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::TemplateCatalog;
use crate::config::Settings;
use crate::dispatch::dispatch;
use crate::error::{PdError, PdResult};
use crate::measurement::MeasurementContext;
use crate::plan::{MeasurementResult, Outcome, TestPlan};
use crate::pool::ConnectionPool;
use crate::progress::{Phase, ProgressEvent, ProgressReceiver, ProgressSender};
use crate::report::{self, ReportRow};
use crate::resolver;
use crate::store::{InMemoryStore, ResultStore};

/// Grace period the engine gives a running item to return after abort is
/// requested before force-marking it (`spec.md` §4.7).
const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Engine-level hard ceiling per item, above which the engine force-cancels
/// regardless of `item.timeout_ms` (`spec.md` §5).
const HARD_TIMEOUT_CEILING: Duration = Duration::from_secs(300);

/// Session lifecycle state (`spec.md` §3). Monotonic once it leaves
/// `Running`: no transitions occur out of `Completed`/`Aborted`/`Failed`
/// (invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Pending,
    Running,
    Finalizing,
    Completed,
    Aborted,
    Failed,
}

/// A point-in-time view of a session, as returned by `GetSession`.
pub struct SessionSnapshot {
    pub id: String,
    pub state: SessionState,
    pub results: Vec<MeasurementResult>,
    pub aggregate_outcome: Option<Outcome>,
}

/// One execution of a plan against one DUT.
pub struct Session {
    pub id: String,
    plan: TestPlan,
    dut_serial: String,
    state: RwLock<SessionState>,
    store: Arc<dyn ResultStore>,
    progress: ProgressSender,
    cancel: CancellationToken,
    started_at: RwLock<Option<DateTime<Utc>>>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
}

impl Session {
    fn new(plan: TestPlan, dut_serial: Option<String>) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        let (progress, _rx) = ProgressSender::new();
        Arc::new(Session {
            dut_serial: dut_serial.unwrap_or_else(|| id.clone()),
            id,
            plan,
            state: RwLock::new(SessionState::Pending),
            store: Arc::new(InMemoryStore::new()),
            progress,
            cancel: CancellationToken::new(),
            started_at: RwLock::new(None),
            finished_at: RwLock::new(None),
        })
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn results(&self) -> Vec<MeasurementResult> {
        self.store.all().await
    }

    /// PASS iff all non-SKIP results are PASS (`spec.md` §4.7). `None`
    /// before any results exist.
    pub async fn aggregate_outcome(&self) -> Option<Outcome> {
        let results = self.store.all().await;
        if results.is_empty() {
            return None;
        }
        let relevant: Vec<_> = results.iter().filter(|r| r.outcome != Outcome::Skip).collect();
        if relevant.is_empty() {
            return Some(Outcome::Skip);
        }
        if relevant.iter().all(|r| r.outcome == Outcome::Pass) {
            Some(Outcome::Pass)
        } else if relevant.iter().any(|r| r.outcome == Outcome::Error) {
            Some(Outcome::Error)
        } else {
            Some(Outcome::Fail)
        }
    }

    pub fn subscribe_progress(&self) -> ProgressReceiver {
        self.progress.subscribe()
    }

    /// Request cancellation. The in-flight item is cancelled and recorded
    /// as `ERROR "aborted"`; items not yet started when the abort lands are
    /// never dispatched and so never gain a result row (`spec.md` §8 S3,
    /// invariant 8.1).
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    async fn set_state(&self, new_state: SessionState) {
        *self.state.write().await = new_state;
        tracing::info!(session_id = %self.id, state = ?new_state, "session state transition");
    }
}

/// Owns all in-flight and completed sessions; the entry point for the
/// `Session API` in `spec.md` §6.
pub struct SessionEngine {
    pool: Arc<ConnectionPool>,
    catalog: Arc<TemplateCatalog>,
    settings: Arc<Settings>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionEngine {
    pub fn new(pool: Arc<ConnectionPool>, catalog: Arc<TemplateCatalog>, settings: Arc<Settings>) -> Self {
        SessionEngine {
            pool,
            catalog,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// `StartSession(plan_ref, dut_serial?) -> session_id`. Validates the
    /// plan has at least one enabled item, transitions PENDING → RUNNING,
    /// and spawns the item loop.
    pub async fn start_session(&self, plan: TestPlan, dut_serial: Option<String>) -> PdResult<String> {
        if plan.enabled_items_in_order().is_empty() {
            return Err(PdError::Configuration(
                "plan has no enabled items".to_string(),
            ));
        }

        let session = Session::new(plan, dut_serial);
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session.clone());

        session.set_state(SessionState::Running).await;
        *session.started_at.write().await = Some(Utc::now());

        let pool = self.pool.clone();
        let catalog = self.catalog.clone();
        let settings = self.settings.clone();
        tokio::spawn(run_session(session, pool, catalog, settings));

        Ok(id)
    }

    /// `AbortSession(session_id)`.
    pub async fn abort_session(&self, session_id: &str) -> PdResult<()> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| PdError::Configuration(format!("unknown session '{session_id}'")))?;
        session.abort();
        Ok(())
    }

    /// `GetSession(session_id) -> {state, results, aggregate_outcome}`.
    pub async fn get_session(&self, session_id: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id)?;
        Some(SessionSnapshot {
            id: session.id.clone(),
            state: session.state().await,
            results: session.results().await,
            aggregate_outcome: session.aggregate_outcome().await,
        })
    }

    /// `SubscribeProgress(session_id) -> event stream`.
    pub async fn subscribe_progress(&self, session_id: &str) -> Option<ProgressReceiver> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|s| s.subscribe_progress())
    }
}

async fn run_session(
    session: Arc<Session>,
    pool: Arc<ConnectionPool>,
    catalog: Arc<TemplateCatalog>,
    settings: Arc<Settings>,
) {
    let items = session.plan.enabled_items_in_order();
    let mut aborted = false;

    for item in items {
        // An item never reached before abort gets no result row at all
        // (`spec.md` §8 S3: "item 3 not present"; invariant 8.1 permits
        // absence "unless S was ABORTED before reaching it").
        if session.cancel.is_cancelled() {
            aborted = true;
            break;
        }

        session.progress.emit(ProgressEvent {
            session_id: session.id.clone(),
            item_no: item.item_no,
            item_name: item.item_name.clone(),
            phase: Phase::Started,
        });

        let prior_results = session.store.all().await;
        let result = match resolver::resolve(item, &prior_results, &catalog) {
            Ok(params) => run_one_item(&session, item, params, &pool, &catalog, &settings).await,
            Err(e) => MeasurementResult::error(item.item_no, item.item_name.clone(), e.to_string()),
        };

        let result = if session.cancel.is_cancelled() && result.outcome == Outcome::Error {
            aborted = true;
            MeasurementResult {
                error_message: Some("aborted".to_string()),
                ..result
            }
        } else {
            result
        };

        session.progress.emit(ProgressEvent {
            session_id: session.id.clone(),
            item_no: result.item_no,
            item_name: result.item_name.clone(),
            phase: Phase::Finished {
                outcome: result.outcome,
                measured_value: result.measured_value.clone(),
                error_message: result.error_message.clone(),
            },
        });

        // Invariant 4: durably recorded before the next item begins.
        if let Err(e) = session.store.append(result).await {
            tracing::error!(session_id = %session.id, error = %e, "result persistence failed");
            session.set_state(SessionState::Failed).await;
            return;
        }
    }

    finalize(&session, &settings, aborted).await;
}

/// Run one item's dispatch bounded by cancellation/grace and, above that,
/// the engine-level hard ceiling (`spec.md` §5): whichever of
/// `item.timeout_ms`, the cancel grace period, or `HARD_TIMEOUT_CEILING`
/// elapses first determines the outcome, but none of them can hang the
/// session past 300s on a single item.
async fn run_one_item(
    session: &Arc<Session>,
    item: &crate::plan::TestItem,
    params: resolver::ResolvedParameters,
    pool: &Arc<ConnectionPool>,
    catalog: &Arc<TemplateCatalog>,
    settings: &Arc<Settings>,
) -> MeasurementResult {
    let item_cancel = session.cancel.clone();
    let ctx = MeasurementContext {
        pool: pool.clone(),
        cancel: item_cancel,
        scripts_dir: settings.scripts_dir.clone(),
    };

    let dispatch_future = dispatch(item, &params, &ctx, catalog);
    tokio::pin!(dispatch_future);

    let bounded = async {
        tokio::select! {
            result = &mut dispatch_future => result,
            _ = session.cancel.cancelled() => {
                match tokio::time::timeout(CANCEL_GRACE_PERIOD, &mut dispatch_future).await {
                    Ok(result) => result,
                    Err(_) => MeasurementResult::error(
                        item.item_no,
                        item.item_name.clone(),
                        "cancel grace exceeded",
                    ),
                }
            }
        }
    };

    match with_hard_ceiling(bounded).await {
        Ok(result) => result,
        Err(_) => MeasurementResult::error(item.item_no, item.item_name.clone(), "hard timeout"),
    }
}

async fn finalize(session: &Arc<Session>, settings: &Arc<Settings>, aborted: bool) {
    session.set_state(SessionState::Finalizing).await;

    if settings.report_auto_save {
        let results = session.store.all().await;
        let by_no: HashMap<i64, &crate::plan::TestItem> = session
            .plan
            .items
            .iter()
            .map(|i| (i.item_no, i))
            .collect();
        let rows: Vec<ReportRow<'_>> = results
            .iter()
            .map(|r| ReportRow {
                result: r,
                lower_limit: by_no.get(&r.item_no).and_then(|i| i.lower_limit),
                upper_limit: by_no.get(&r.item_no).and_then(|i| i.upper_limit),
            })
            .collect();

        // Best-effort: a write failure is logged and surfaced out-of-band,
        // never changes the session's outcome state (`spec.md` §4.7, §7).
        if let Err(e) = report::write_report(
            &settings.report_base_dir,
            &session.plan.project,
            &session.plan.station,
            &session.dut_serial,
            Utc::now(),
            &rows,
        ) {
            tracing::warn!(session_id = %session.id, error = %e, "report write failed");
        }

        if settings.report_max_age_days > 0 {
            if let Err(e) =
                report::cleanup_old_reports(&settings.report_base_dir, settings.report_max_age_days)
            {
                tracing::warn!(session_id = %session.id, error = %e, "report cleanup failed");
            }
        }
    }

    *session.finished_at.write().await = Some(Utc::now());
    session
        .set_state(if aborted {
            SessionState::Aborted
        } else {
            SessionState::Completed
        })
        .await;
}

/// Caps a measurement's overall execution above the Dispatcher's own
/// per-item timeout — the engine-level backstop `run_one_item` applies to
/// every item regardless of `item.timeout_ms` (`spec.md` §5: "engine-level
/// per-item hard ceiling").
pub async fn with_hard_ceiling<F, T>(fut: F) -> PdResult<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(HARD_TIMEOUT_CEILING, fut)
        .await
        .map_err(|_| PdError::Timeout("hard timeout".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{LimitType, TestItem, ValueType};
    use crate::registry::InstrumentRegistry;
    use std::collections::HashMap as StdHashMap;
    use tempfile::tempdir;

    fn dummy_item(item_no: i64, name: &str, value: f64) -> TestItem {
        let mut parameters = StdHashMap::new();
        parameters.insert("value".to_string(), serde_json::Value::from(value));
        TestItem {
            item_no,
            item_name: name.to_string(),
            test_type: "Dummy".into(),
            switch_mode: "default".into(),
            parameters,
            value_type: Some(ValueType::Float),
            limit_type: Some(LimitType::None),
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

    fn engine(report_base: PathBuf) -> SessionEngine {
        let registry = Arc::new(InstrumentRegistry::with_builtins());
        let pool = Arc::new(ConnectionPool::new(registry));
        let catalog = Arc::new(TemplateCatalog::new());
        let mut settings = Settings::default();
        settings.report_base_dir = report_base;
        SessionEngine::new(pool, catalog, Arc::new(settings))
    }

    #[tokio::test]
    async fn happy_path_completes_with_pass() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path().to_path_buf());
        let plan = TestPlan {
            project: "P".into(),
            station: "S".into(),
            name: "N".into(),
            items: vec![dummy_item(1, "V1", 5.0)],
        };
        let id = engine.start_session(plan, Some("SN1".into())).await.unwrap();

        for _ in 0..50 {
            if engine.get_session(&id).await.unwrap().state == SessionState::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let snapshot = engine.get_session(&id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Completed);
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(snapshot.aggregate_outcome, Some(Outcome::Pass));
    }

    #[tokio::test]
    async fn starting_plan_with_no_enabled_items_fails() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path().to_path_buf());
        let mut item = dummy_item(1, "V1", 1.0);
        item.enabled = false;
        let plan = TestPlan {
            project: "P".into(),
            station: "S".into(),
            name: "N".into(),
            items: vec![item],
        };
        assert!(engine.start_session(plan, None).await.is_err());
    }

    #[tokio::test]
    async fn abort_leaves_unstarted_items_unrecorded() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path().to_path_buf());
        let mut wait_item = dummy_item(1, "W", 0.0);
        wait_item.test_type = "Wait".into();
        wait_item.wait_msec = Some(serde_json::Value::from(2000));
        wait_item
            .parameters
            .insert("wait_msec".to_string(), serde_json::Value::from(2000));
        let plan = TestPlan {
            project: "P".into(),
            station: "S".into(),
            name: "N".into(),
            items: vec![wait_item, dummy_item(2, "V2", 1.0)],
        };
        let id = engine.start_session(plan, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.abort_session(&id).await.unwrap();

        for _ in 0..100 {
            let state = engine.get_session(&id).await.unwrap().state;
            if state == SessionState::Aborted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // The second item is never reached, so it gains no result row at
        // all (`spec.md` §8 S3, invariant 8.1) — only the cancelled item's
        // `ERROR "aborted"` is recorded.
        let snapshot = engine.get_session(&id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Aborted);
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(snapshot.results[0].outcome, Outcome::Error);
        assert_eq!(snapshot.results[0].error_message.as_deref(), Some("aborted"));
    }
}

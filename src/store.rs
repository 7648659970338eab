//! Result Store contract (C8) — append-only per-session result log,
//! queryable by item ordinal/name (`spec.md` §4.8).
//!
//! Grounded on `spec.md` §4.8 directly (no teacher analogue exists for a
//! session-scoped append log); shaped as a small trait plus one in-memory
//! reference implementation the way the teacher separates `StorageWriter`
//! from concrete writers, so the Engine only ever depends on the trait —
//! persistence is a Non-goal (`spec.md` §1) left to an external adapter.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::PdResult;
use crate::plan::MeasurementResult;

/// Append-only, at-most-once-per-`(session_id, item_no)` result log.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Durably record a result. Must complete (invariant 4) before the
    /// Engine proceeds to the next item.
    async fn append(&self, result: MeasurementResult) -> PdResult<()>;

    async fn get_by_ordinal(&self, item_no: i64) -> Option<MeasurementResult>;

    async fn get_by_name(&self, item_name: &str) -> Option<MeasurementResult>;

    /// All recorded results, in append order.
    async fn all(&self) -> Vec<MeasurementResult>;
}

/// Reference `ResultStore` for tests and standalone use. A real deployment
/// backs this trait with a database adapter (`spec.md` §1, §6).
#[derive(Default)]
pub struct InMemoryStore {
    results: RwLock<Vec<MeasurementResult>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn append(&self, result: MeasurementResult) -> PdResult<()> {
        let mut results = self.results.write().await;
        // At-most-once per item_no: a retried append for the same item
        // overwrites rather than duplicates the row.
        if let Some(existing) = results.iter_mut().find(|r| r.item_no == result.item_no) {
            *existing = result;
        } else {
            results.push(result);
        }
        Ok(())
    }

    async fn get_by_ordinal(&self, item_no: i64) -> Option<MeasurementResult> {
        self.results
            .read()
            .await
            .iter()
            .find(|r| r.item_no == item_no)
            .cloned()
    }

    async fn get_by_name(&self, item_name: &str) -> Option<MeasurementResult> {
        self.results
            .read()
            .await
            .iter()
            .find(|r| r.item_name == item_name)
            .cloned()
    }

    async fn all(&self) -> Vec<MeasurementResult> {
        self.results.read().await.clone()
    }
}

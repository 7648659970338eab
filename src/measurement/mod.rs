//! Measurement — the polymorphic unit of work dispatched per test item
//! (`spec.md` §3, §4.5).
//!
//! Grounded on the teacher's `experiment::plan::Plan` trait (a small async
//! trait producing a typed result from borrowed context) for the shape of
//! "polymorphic unit, stateless between invocations, depends only on its
//! inputs and the driver it acquires".

pub mod command;
pub mod dummy;
pub mod power_read;
pub mod power_set;
pub mod relay;
pub mod script;
pub mod template_generic;
pub mod wait;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PdResult;
use crate::plan::{MeasuredValue, TestItem};
use crate::pool::ConnectionPool;
use crate::resolver::ResolvedParameters;

/// Shared context every Measurement executes under.
pub struct MeasurementContext {
    pub pool: Arc<ConnectionPool>,
    pub cancel: CancellationToken,
    pub scripts_dir: PathBuf,
}

/// A stateless unit that turns resolved parameters into a raw measured
/// value. The Dispatcher applies the Validator uniformly after `execute`
/// returns, so every Measurement only has to produce a value — it never
/// reimplements limit-rule logic itself.
#[async_trait]
pub trait Measurement: Send + Sync {
    async fn execute(
        &self,
        item: &TestItem,
        params: &ResolvedParameters,
        ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue>;
}

//! `Wait` — sleep for `wait_msec`, honouring cancellation.
//!
//! `wait_msec` is coerced whether it arrives as a JSON number or a JSON
//! string (`spec.md` §9, open question 3).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PdError, PdResult};
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

pub struct WaitMeasurement;

#[async_trait]
impl Measurement for WaitMeasurement {
    async fn execute(
        &self,
        _item: &TestItem,
        params: &ResolvedParameters,
        ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue> {
        let wait_msec = params
            .get_u64("wait_msec")
            .ok_or_else(|| PdError::ParamMissing("wait_msec".to_string()))?;

        if wait_msec == 0 {
            return Err(PdError::Configuration(
                "wait_msec requires > 0".to_string(),
            ));
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_msec)) => Ok(MeasuredValue::Text(format!("waited {wait_msec}ms"))),
            _ = ctx.cancel.cancelled() => Err(PdError::Cancelled),
        }
    }
}

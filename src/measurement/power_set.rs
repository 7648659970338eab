//! `PowerSet` — set a power supply output and read back.

use async_trait::async_trait;

use crate::driver::{DriverOp, DriverValue};
use crate::error::{PdError, PdResult};
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

pub struct PowerSet;

#[async_trait]
impl Measurement for PowerSet {
    async fn execute(
        &self,
        _item: &TestItem,
        params: &ResolvedParameters,
        ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue> {
        let instrument = params
            .get_string("instrument")
            .ok_or_else(|| PdError::ParamMissing("instrument".to_string()))?;
        let channel = params
            .get_string("channel")
            .ok_or_else(|| PdError::ParamMissing("channel".to_string()))?;
        let set_volt = params
            .get_f64("set_volt")
            .ok_or_else(|| PdError::ParamMissing("set_volt".to_string()))?;
        let set_curr = params
            .get_f64("set_curr")
            .ok_or_else(|| PdError::ParamMissing("set_curr".to_string()))?;
        let ovp = params.get_f64("ovp");
        let ocp = params.get_f64("ocp");

        let lease = ctx.pool.acquire(&instrument).await?;
        let op = DriverOp::SetOutput {
            channel,
            set_volt,
            set_curr,
            ovp,
            ocp,
        };
        let result = lease.driver().execute_command(op).await?;
        Ok(match result {
            DriverValue::Number(n) => MeasuredValue::Number(n),
            DriverValue::Text(s) => MeasuredValue::Text(s),
            DriverValue::Unit => MeasuredValue::Number(set_volt),
        })
    }
}

//! `PowerRead` — read one scalar from a DMM/data-acquisition instrument.

use async_trait::async_trait;

use crate::driver::{DriverOp, DriverValue};
use crate::error::{PdError, PdResult};
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

pub struct PowerRead;

#[async_trait]
impl Measurement for PowerRead {
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
        let item = params
            .get_string("item")
            .ok_or_else(|| PdError::ParamMissing("item".to_string()))?;
        let kind = params
            .get_string("type")
            .ok_or_else(|| PdError::ParamMissing("type".to_string()))?;

        let lease = ctx.pool.acquire(&instrument).await?;
        let op = DriverOp::ReadScalar { channel, item, kind };
        let result = lease.driver().execute_command(op).await?;
        Ok(match result {
            DriverValue::Number(n) => MeasuredValue::Number(n),
            DriverValue::Text(s) => MeasuredValue::Text(s),
            DriverValue::Unit => MeasuredValue::Null,
        })
    }
}

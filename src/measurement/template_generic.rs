//! `SfcStep` / `GetSN` / `OpJudge` — parametric per template; dispatched to
//! their configured driver as a single command and validated via C1 like
//! any other measurement (`spec.md` §4.5).

use async_trait::async_trait;

use crate::driver::{DriverOp, DriverValue};
use crate::error::{PdError, PdResult};
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

pub struct TemplateGenericMeasurement;

#[async_trait]
impl Measurement for TemplateGenericMeasurement {
    async fn execute(
        &self,
        item: &TestItem,
        params: &ResolvedParameters,
        ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue> {
        let instrument = params
            .get_string("instrument")
            .ok_or_else(|| PdError::ParamMissing("instrument".to_string()))?;
        let lease = ctx.pool.acquire(&instrument).await?;
        let command = format!("{}:{}", item.test_type.to_ascii_uppercase(), item.switch_mode);
        let result = lease
            .driver()
            .execute_command(DriverOp::SendCommand {
                command,
                response_line_count: None,
            })
            .await?;
        Ok(match result {
            DriverValue::Text(s) => MeasuredValue::Text(s),
            DriverValue::Number(n) => MeasuredValue::Number(n),
            DriverValue::Unit => MeasuredValue::Null,
        })
    }
}

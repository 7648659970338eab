//! `Relay` — drive a named relay on/off.

use async_trait::async_trait;

use crate::driver::{DriverOp, DriverValue};
use crate::error::{PdError, PdResult};
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

pub struct RelayMeasurement;

#[async_trait]
impl Measurement for RelayMeasurement {
    async fn execute(
        &self,
        _item: &TestItem,
        params: &ResolvedParameters,
        ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue> {
        let name = params
            .get_string("relay_name")
            .ok_or_else(|| PdError::ParamMissing("relay_name".to_string()))?;
        let action = params
            .get_string("action")
            .ok_or_else(|| PdError::ParamMissing("action".to_string()))?;
        let on = match action.to_ascii_uppercase().as_str() {
            "ON" => true,
            "OFF" => false,
            other => {
                return Err(PdError::Configuration(format!(
                    "invalid relay action '{other}', expected ON or OFF"
                )))
            }
        };

        let instrument = params
            .get_string("instrument")
            .unwrap_or_else(|| name.clone());
        let lease = ctx.pool.acquire(&instrument).await?;
        let result = lease
            .driver()
            .execute_command(DriverOp::SetRelay { name, on })
            .await?;
        Ok(match result {
            DriverValue::Text(s) => MeasuredValue::Text(s),
            DriverValue::Number(n) => MeasuredValue::Number(n),
            DriverValue::Unit => MeasuredValue::Text(if on { "ON" } else { "OFF" }.to_string()),
        })
    }
}

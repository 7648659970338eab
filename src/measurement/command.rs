//! `Console`/`ComPort`/`TcpIp` command measurement — send a command and
//! return the raw response text (`spec.md` §4.5).

use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{DriverOp, DriverValue};
use crate::error::{PdError, PdResult};
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

const DEFAULT_TIMEOUT_MS: u64 = 5000;

pub struct CommandMeasurement;

#[async_trait]
impl Measurement for CommandMeasurement {
    async fn execute(
        &self,
        item: &TestItem,
        params: &ResolvedParameters,
        ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue> {
        let instrument = params
            .get_string("instrument")
            .ok_or_else(|| PdError::ParamMissing("instrument".to_string()))?;
        let command = params
            .get_string("command")
            .ok_or_else(|| PdError::ParamMissing("command".to_string()))?;
        let response_line_count = params.get_u64("response_line_count").map(|n| n as u32);

        let timeout_ms = params
            .get_u64("timeout")
            .or(item.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let lease = ctx.pool.acquire(&instrument).await?;
        let op = DriverOp::SendCommand {
            command,
            response_line_count,
        };

        let call = lease.driver().execute_command(op);
        let cancelled = ctx.cancel.cancelled();
        tokio::select! {
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), call) => {
                let value = result.map_err(|_| PdError::Timeout(format!("timeout after {timeout_ms}ms")))??;
                Ok(match value {
                    DriverValue::Text(s) => MeasuredValue::Text(s),
                    DriverValue::Number(n) => MeasuredValue::Number(n),
                    DriverValue::Unit => MeasuredValue::Null,
                })
            }
            _ = cancelled => Err(PdError::Cancelled),
        }
    }
}

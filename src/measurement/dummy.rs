//! `Dummy` — a canned measurement used only for testing the Dispatcher and
//! Session Engine without real instrument I/O (`spec.md` §3).

use async_trait::async_trait;

use crate::error::PdResult;
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

/// Returns the `value` parameter verbatim, or `MeasuredValue::Null` if
/// absent. Never touches the Connection Pool.
pub struct DummyMeasurement;

#[async_trait]
impl Measurement for DummyMeasurement {
    async fn execute(
        &self,
        _item: &TestItem,
        params: &ResolvedParameters,
        _ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue> {
        Ok(match params.get_f64("value") {
            Some(n) => MeasuredValue::Number(n),
            None => match params.get_string("value") {
                Some(s) => MeasuredValue::Text(s),
                None => MeasuredValue::Null,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectionPool;
    use crate::registry::InstrumentRegistry;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn returns_configured_numeric_value() {
        let catalog = crate::catalog::TemplateCatalog::new();
        let mut item = crate::plan::TestItem {
            item_no: 1,
            item_name: "D".into(),
            test_type: "Dummy".into(),
            switch_mode: "default".into(),
            parameters: std::collections::HashMap::new(),
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
        };
        item.parameters
            .insert("value".to_string(), serde_json::Value::from(42));
        let params = crate::resolver::resolve(&item, &[], &catalog).unwrap();
        let ctx = MeasurementContext {
            pool: Arc::new(ConnectionPool::new(Arc::new(InstrumentRegistry::with_builtins()))),
            cancel: CancellationToken::new(),
            scripts_dir: std::env::temp_dir(),
        };
        let value = DummyMeasurement.execute(&item, &params, &ctx).await.unwrap();
        assert_eq!(value, MeasuredValue::Number(42.0));
    }
}

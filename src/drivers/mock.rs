//! A canned driver for tests and for the `Dummy` measurement.
//!
//! Grounded on the teacher's `MockStage`/`MockPowerMeter` test doubles in
//! `hardware::capabilities` — interior-mutable state behind a `Mutex`,
//! returning a pre-configured value.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::driver::{Driver, DriverOp, DriverValue};
use crate::error::PdResult;

/// Returns a fixed response to every operation, or replays a queue of
/// canned responses (FIFO), falling back to the fixed response once the
/// queue is drained.
pub struct MockDriver {
    default_response: DriverValue,
    queued: Mutex<Vec<DriverValue>>,
}

impl MockDriver {
    pub fn new(default_response: DriverValue) -> Self {
        MockDriver {
            default_response,
            queued: Mutex::new(Vec::new()),
        }
    }

    pub fn with_queue(queue: Vec<DriverValue>) -> Self {
        MockDriver {
            default_response: DriverValue::Unit,
            queued: Mutex::new(queue.into_iter().rev().collect()),
        }
    }

    fn clone_value(v: &DriverValue) -> DriverValue {
        match v {
            DriverValue::Number(n) => DriverValue::Number(*n),
            DriverValue::Text(s) => DriverValue::Text(s.clone()),
            DriverValue::Unit => DriverValue::Unit,
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn initialize(&self) -> PdResult<()> {
        Ok(())
    }

    async fn reset(&self) -> PdResult<()> {
        Ok(())
    }

    async fn execute_command(&self, _op: DriverOp) -> PdResult<DriverValue> {
        let mut queued = self.queued.lock().await;
        if let Some(v) = queued.pop() {
            Ok(v)
        } else {
            Ok(Self::clone_value(&self.default_response))
        }
    }

    async fn close(&self) -> PdResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queue_then_falls_back_to_default() {
        let driver = MockDriver::with_queue(vec![DriverValue::Number(1.0), DriverValue::Number(2.0)]);
        let op = DriverOp::ReadScalar {
            channel: "1".into(),
            item: "volt".into(),
            kind: "DC".into(),
        };
        match driver.execute_command(op.clone()).await.unwrap() {
            DriverValue::Number(n) => assert_eq!(n, 1.0),
            _ => panic!("expected number"),
        }
        match driver.execute_command(op.clone()).await.unwrap() {
            DriverValue::Number(n) => assert_eq!(n, 2.0),
            _ => panic!("expected number"),
        }
        match driver.execute_command(op).await.unwrap() {
            DriverValue::Unit => {}
            _ => panic!("expected fallback unit"),
        }
    }
}

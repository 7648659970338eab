//! Progress events streamed out of a running session (`SubscribeProgress`,
//! `spec.md` §6).
//!
//! The channel is non-blocking with a bounded buffer, drop-oldest on
//! overflow (`spec.md` §5, "back-pressure"): a slow consumer must never
//! stall the Session Engine. `tokio::sync::broadcast` gives that directly
//! — a lagging receiver observes `RecvError::Lagged` and simply misses the
//! dropped events instead of blocking the sender.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::plan::{MeasuredValue, Outcome};

/// Default channel capacity. Large enough that a normally-polling UI never
/// lags during a session with a realistic item count.
pub const DEFAULT_CAPACITY: usize = 256;

/// One progress update for a single item within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    pub item_no: i64,
    pub item_name: String,
    pub phase: Phase,
}

/// Lifecycle phase a `ProgressEvent` reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Item dispatch has begun.
    Started,
    /// Item has finished with the given outcome.
    Finished {
        outcome: Outcome,
        measured_value: MeasuredValue,
        error_message: Option<String>,
    },
}

/// Sender half owned by the Session Engine.
#[derive(Clone)]
pub struct ProgressSender(broadcast::Sender<ProgressEvent>);

/// Receiver half handed out by `SubscribeProgress`.
pub type ProgressReceiver = broadcast::Receiver<ProgressEvent>;

impl ProgressSender {
    pub fn new() -> (Self, ProgressReceiver) {
        let (tx, rx) = broadcast::channel(DEFAULT_CAPACITY);
        (ProgressSender(tx), rx)
    }

    /// Never blocks; never propagates failure to the engine. No receivers
    /// subscribed is the common case (nobody is watching yet) and must not
    /// be treated as an error.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.0.send(event);
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.0.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let (tx, _rx) = ProgressSender::new();
        tx.emit(ProgressEvent {
            session_id: "s1".into(),
            item_no: 1,
            item_name: "A".into(),
            phase: Phase::Started,
        });
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let (tx, mut rx) = ProgressSender::new();
        tx.emit(ProgressEvent {
            session_id: "s1".into(),
            item_no: 1,
            item_name: "A".into(),
            phase: Phase::Started,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.item_no, 1);
    }
}

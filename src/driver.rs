//! Instrument Driver (C2) — polymorphic capability over one physical
//! instrument's protocol.
//!
//! Grounded on the teacher's fine-grained capability traits in
//! `hardware::capabilities` (`Movable`, `Readable`, ...): rather than one
//! monolithic `Instrument` trait, a driver exposes a single `execute`
//! entrypoint over a closed set of typed operations (`DriverOp`). This
//! keeps the "polymorphic capability" contract from `spec.md` §4.2 (
//! `initialize`/`reset`/`execute_command`/`close` plus typed helpers) while
//! staying a single object-safe trait, which is what the Connection Pool
//! needs to hold `Arc<dyn Driver>` regardless of instrument type.

use async_trait::async_trait;

use crate::error::PdResult;

/// A typed operation a Measurement asks a driver to perform. Each
/// Measurement variant in `spec.md` §4.5 maps onto one `DriverOp` variant.
#[derive(Debug, Clone)]
pub enum DriverOp {
    /// Set an output channel (`PowerSet`).
    SetOutput {
        channel: String,
        set_volt: f64,
        set_curr: f64,
        ovp: Option<f64>,
        ocp: Option<f64>,
    },
    /// Read a scalar channel (`PowerRead`).
    ReadScalar {
        channel: String,
        item: String,
        kind: String,
    },
    /// Send a raw command and return the response text (`Console`/`ComPort`/`TcpIp`).
    SendCommand {
        command: String,
        response_line_count: Option<u32>,
    },
    /// Drive a named relay (`Relay`).
    SetRelay { name: String, on: bool },
}

/// The result of a `DriverOp`. Kept as a closed sum so the Measurement
/// layer never has to downcast.
#[derive(Debug, Clone)]
pub enum DriverValue {
    Number(f64),
    Text(String),
    Unit,
}

/// Capability set every driver provides, regardless of instrument type.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Prepare the instrument for use. Called once after a connection is
    /// established by the Connection Pool.
    async fn initialize(&self) -> PdResult<()>;

    /// Return the instrument to a known-safe state.
    async fn reset(&self) -> PdResult<()>;

    /// Perform one typed operation and return its result.
    async fn execute_command(&self, op: DriverOp) -> PdResult<DriverValue>;

    /// Release any held resources. Idempotent.
    async fn close(&self) -> PdResult<()>;
}

/// Sentinel text drivers return for an empty response from real hardware,
/// so the Validator can surface a forced `ERROR` (`spec.md` §4.1, §4.2).
pub const NO_INSTRUMENT_FOUND: &str = "No instrument found";

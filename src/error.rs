//! Crate-wide error type.
//!
//! `PdError` covers failures that can occur before a [`crate::plan::MeasurementResult`]
//! exists: registry/config loading, pool connection, and report writes. Once a
//! measurement is underway, failures are folded into the result's `ERROR` outcome
//! instead of propagating as `PdError` — see `spec.md` §7 ("Measurement-level
//! errors are recovered locally").

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type PdResult<T> = std::result::Result<T, PdError>;

#[derive(Error, Debug)]
pub enum PdError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("instrument '{0}' is not configured")]
    InstrumentNotConfigured(String),

    #[error("unknown driver type '{0}'")]
    UnknownDriverType(String),

    #[error("duplicate instrument id '{0}'")]
    DuplicateInstrument(String),

    #[error("connection to instrument '{0}' failed: {1}")]
    ConnectionFailed(String, String),

    #[error("driver I/O error: {0}")]
    DriverIo(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("missing required parameter: {0}")]
    ParamMissing(String),

    #[error("use_result reference not found: {0}")]
    UseResultNotFound(String),

    #[error("unknown measurement type/mode: {test_type}/{switch_mode}")]
    UnknownMeasurement {
        test_type: String,
        switch_mode: String,
    },

    #[error("script not found: {0}")]
    ScriptNotFound(String),

    #[error("script exited non-zero: {0}")]
    ScriptNonZeroExit(i32),

    #[error("report write failed: {0}")]
    ReportWrite(String),

    #[error("engine persistence failed: {0}")]
    EnginePersist(String),

    #[error("operation cancelled")]
    Cancelled,
}

//! # pdtool-core
//!
//! The test-execution core of a multi-tenant factory test-automation
//! service (`spec.md` §1): the session state machine, measurement
//! dispatch and validation, the instrument connection pool and driver
//! abstraction, parameter/dependency resolution, and the CSV report
//! writer.
//!
//! ## Crate structure
//!
//! Each module below corresponds to one numbered component in `spec.md`
//! §2, plus the ambient modules `error`/`config`/`plan`/`progress`
//! described in `SPEC_FULL.md` §2.
//!
//! - **`api`** — the Measurement API surface (`ExecuteMeasurement`,
//!   `ListValidationTypes`, `ValidateParameters`) that doesn't need a
//!   `Session`; `ListTemplates` lives on `catalog::TemplateCatalog::list`.
//! - **`error`** — crate-wide `PdError`.
//! - **`config`** — `Settings`, loaded from TOML + environment.
//! - **`plan`** — `TestItem`/`TestPlan` and the value/limit/outcome
//!   enums that make up the data model (`spec.md` §3).
//! - **`validator`** (C1) — cast-and-limit-check pure functions.
//! - **`driver`**/**`drivers`** (C2) — the `Driver` capability trait and
//!   its concrete implementations.
//! - **`pool`** (C3) — the per-instrument connection pool and lease type.
//! - **`registry`** (C4) — static instrument configuration.
//! - **`dispatch`** (C5) — measurement selection and bounded execution.
//! - **`resolver`** (C6) — parameter merge and `use_result` injection.
//! - **`session`** (C7) — the session state machine.
//! - **`store`** (C8) — the append-only result log contract.
//! - **`report`** (C9) — CSV report generation.
//! - **`catalog`** (C10) — the static template catalog.
//! - **`measurement`** — the `Measurement` trait and built-in variants.
//! - **`progress`** — `SubscribeProgress` event type and channel.

pub mod api;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod measurement;
pub mod plan;
pub mod pool;
pub mod progress;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod session;
pub mod store;
pub mod validator;

/// Initialise a `tracing_subscriber` honoring `RUST_LOG`, with `config`'s
/// `log_level` as the default when the environment variable is unset.
/// Binaries and tests call this; library code only ever emits `tracing`
/// events, matching the teacher's `tracing_v4` split between "library
/// emits, binary initialises".
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

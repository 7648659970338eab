//! Ambient configuration — `Settings` loaded from a TOML file merged with
//! environment variables (`spec.md` §6).
//!
//! Grounded on the teacher's `figment`-based `Settings` (TOML + env merge,
//! validation via free functions) in `config.rs`. The teacher's
//! network/storage-backend fields have no counterpart here; this `Settings`
//! instead carries the core's own environment surface: `SCRIPTS_DIR`,
//! `REPORT_BASE_DIR`, `REPORT_AUTO_SAVE`, `REPORT_MAX_AGE_DAYS`, and
//! `INSTRUMENT_CONFIG_PATH`.

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};

use crate::error::{PdError, PdResult};

/// Top-level settings for the test-execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Verbosity passed to `tracing_subscriber::EnvFilter` when no
    /// `RUST_LOG` override is present.
    pub log_level: String,

    /// Directory `Other`/script measurements resolve paths against
    /// (`spec.md` §9, open question 2: process working-root only).
    pub scripts_dir: PathBuf,

    /// Base directory for auto-generated CSV reports (`spec.md` §4.9).
    pub report_base_dir: PathBuf,

    /// If false, the Report Writer (C9) is skipped entirely.
    pub report_auto_save: bool,

    /// Reports older than this are eligible for cleanup; `0` disables it.
    pub report_max_age_days: u32,

    /// Path to the instrument configuration file (`spec.md` §6).
    pub instrument_config_path: Option<PathBuf>,

    /// Idle-eviction timeout for pooled connections (C3), default 5 minutes.
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: "info".to_string(),
            scripts_dir: PathBuf::from("scripts"),
            report_base_dir: PathBuf::from("reports"),
            report_auto_save: true,
            report_max_age_days: 0,
            instrument_config_path: None,
            pool_idle_timeout: Duration::from_secs(300),
        }
    }
}

impl Provider for Settings {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("pdtool-core defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(Settings::default()).data()
    }
}

impl Settings {
    /// Load settings from an optional TOML file merged with
    /// `PDTOOL_`-prefixed environment variables, falling back to defaults
    /// for anything neither source sets. Mirrors the teacher's
    /// `Figment::new().merge(Toml::file(..)).merge(Env::prefixed(..))`
    /// construction.
    pub fn load(path: Option<&std::path::Path>) -> PdResult<Self> {
        let mut figment = Figment::from(Settings::default());
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment.merge(Env::prefixed("PDTOOL_")).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate loaded settings the way the teacher's `Settings::new`
    /// validates via free functions in `validation` — here inlined since
    /// the core's validity checks are few and specific to this struct.
    pub fn validate(&self) -> PdResult<()> {
        if self.log_level.trim().is_empty() {
            return Err(PdError::Configuration("log_level must not be empty".into()));
        }
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(PdError::Configuration(format!(
                "log_level '{}' is not one of {LEVELS:?}",
                self.log_level
            )));
        }
        if self.scripts_dir.as_os_str().is_empty() {
            return Err(PdError::Configuration("scripts_dir must not be empty".into()));
        }
        if self.report_base_dir.as_os_str().is_empty() {
            return Err(PdError::Configuration(
                "report_base_dir must not be empty".into(),
            ));
        }
        Ok(())
    }
}

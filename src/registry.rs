//! Instrument Registry (C4) — maps instrument identifier → static config →
//! driver factory.
//!
//! Grounded on the teacher's `hardware::registry::HardwareConfig::from_file`
//! / `create_registry_from_config` pattern: a flat, `serde`-loaded config
//! file turned into an in-memory map, with built-ins always present.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PdError, PdResult};

/// Connection sum type (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Connection {
    Visa { address: String },
    Gpib { board: u32, address: u32 },
    Tcpip { host: String, port: u16 },
    Serial {
        port: String,
        baud: u32,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Local { scheme: String },
    Ssh {
        host: String,
        user: String,
        key: String,
    },
}

/// Static instrument descriptor. Loaded once at startup; never mutated
/// during a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub connection: Connection,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: Value,
}

fn default_true() -> bool {
    true
}

/// The on-disk instrument configuration file: an object keyed by
/// instrument id (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
struct InstrumentFile {
    instruments: HashMap<String, InstrumentConfig>,
}

/// Owns the instrument config map. `GetConfig` is the only read path the
/// rest of the core uses.
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    configs: HashMap<String, InstrumentConfig>,
}

impl InstrumentRegistry {
    /// Registry with only the always-present virtual instruments
    /// (`console_1`, `comport_1`, `tcpip_1`).
    pub fn with_builtins() -> Self {
        let mut configs = HashMap::new();
        for (id, scheme) in [
            ("console_1", "console"),
            ("comport_1", "comport"),
            ("tcpip_1", "tcpip"),
        ] {
            configs.insert(
                id.to_string(),
                InstrumentConfig {
                    id: id.to_string(),
                    type_name: scheme.to_string(),
                    name: None,
                    connection: Connection::Local {
                        scheme: scheme.to_string(),
                    },
                    enabled: true,
                    description: None,
                    settings: Value::Null,
                },
            );
        }
        InstrumentRegistry { configs }
    }

    /// Load from a JSON instrument configuration file, merging in the
    /// always-present built-ins. Registration of a type this crate does
    /// not understand is not a startup failure by itself — connection
    /// construction validates the `Connection` enum at parse time, so an
    /// unrecognised `type` field fails to deserialize and surfaces here.
    pub fn from_file(path: &Path) -> PdResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: InstrumentFile = serde_json::from_str(&raw)
            .map_err(|e| PdError::Configuration(format!("invalid instrument file: {e}")))?;
        let mut registry = InstrumentRegistry::with_builtins();
        for (id, mut config) in file.instruments {
            config.id = id.clone();
            if registry.configs.contains_key(&id) {
                return Err(PdError::DuplicateInstrument(id));
            }
            registry.configs.insert(id, config);
        }
        Ok(registry)
    }

    pub fn get_config(&self, id: &str) -> PdResult<&InstrumentConfig> {
        self.configs
            .get(id)
            .filter(|c| c.enabled)
            .ok_or_else(|| PdError::InstrumentNotConfigured(id.to_string()))
    }

    pub fn register(&mut self, config: InstrumentConfig) -> PdResult<()> {
        if self.configs.contains_key(&config.id) {
            return Err(PdError::DuplicateInstrument(config.id));
        }
        self.configs.insert(config.id.clone(), config);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_always_registered() {
        let reg = InstrumentRegistry::with_builtins();
        assert!(reg.get_config("console_1").is_ok());
        assert!(reg.get_config("comport_1").is_ok());
        assert!(reg.get_config("tcpip_1").is_ok());
    }

    #[test]
    fn unknown_instrument_is_not_configured() {
        let reg = InstrumentRegistry::with_builtins();
        let err = reg.get_config("nonexistent").unwrap_err();
        assert!(matches!(err, PdError::InstrumentNotConfigured(_)));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut reg = InstrumentRegistry::with_builtins();
        let cfg = InstrumentConfig {
            id: "console_1".into(),
            type_name: "console".into(),
            name: None,
            connection: Connection::Local {
                scheme: "console".into(),
            },
            enabled: true,
            description: None,
            settings: Value::Null,
        };
        assert!(reg.register(cfg).is_err());
    }
}

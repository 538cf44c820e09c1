//! Bridge Configuration
//!
//! `starbridge.toml`:
//!
//! ```toml
//! error-mode = "EXCEPTION"
//! trace-depth = 100
//! broadcast = "strict"
//! default-capacity = 2000
//!
//! [scratch.gfposc]
//! default-capacity = 20000
//! overflow = "truncate"
//! ```
//!
//! `STARBRIDGE_ERROR_MODE` overrides `error-mode` when set.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use star_ffi::MAX_TRACE_DEPTH;
use thiserror::Error;
use tracing::debug;

use crate::broadcast::BroadcastRule;
use crate::dynamic::{OverflowPolicy, ScratchSpec, DEFAULT_ROWS};
use crate::error_state::{ErrorState, TranslationMode, UnknownMode};

/// Environment variable overriding the initial translation mode
pub const ERROR_MODE_ENV: &str = "STARBRIDGE_ERROR_MODE";

/// Errors loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid STARBRIDGE_ERROR_MODE: {0}")]
    Mode(#[from] UnknownMode),
}

fn default_trace_depth() -> usize {
    MAX_TRACE_DEPTH
}

fn default_capacity() -> usize {
    DEFAULT_ROWS
}

/// Process-wide bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Initial translation mode
    #[serde(default, rename = "error-mode")]
    pub error_mode: TranslationMode,

    /// Frames the traceback stores by name
    #[serde(default = "default_trace_depth", rename = "trace-depth")]
    pub trace_depth: usize,

    #[serde(default)]
    pub broadcast: BroadcastRule,

    /// Scratch rows for call sites without their own entry
    #[serde(default = "default_capacity", rename = "default-capacity")]
    pub default_capacity: usize,

    /// Per call site scratch sizing
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scratch: BTreeMap<String, ScratchSpec>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            error_mode: TranslationMode::default(),
            trace_depth: MAX_TRACE_DEPTH,
            broadcast: BroadcastRule::default(),
            default_capacity: DEFAULT_ROWS,
            scratch: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.as_ref().display(), "loaded bridge config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Apply `STARBRIDGE_ERROR_MODE` if it is set
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let value = std::env::var(ERROR_MODE_ENV).ok();
        self.with_mode_override(value.as_deref())
    }

    /// Apply a mode override given by name
    pub fn with_mode_override(mut self, value: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.error_mode = value.parse()?;
            debug!(mode = %self.error_mode, "error mode overridden from environment");
        }
        Ok(self)
    }

    /// Scratch sizing for a call site
    pub fn scratch_spec(&self, site: &str) -> ScratchSpec {
        self.scratch.get(site).copied().unwrap_or(ScratchSpec {
            default_capacity: self.default_capacity,
            overflow: OverflowPolicy::Fail,
        })
    }

    /// A clean error state configured by these settings
    pub fn error_state(&self) -> ErrorState {
        ErrorState::with_capacity(self.error_mode, self.trace_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.error_mode, TranslationMode::ClassifiedRaise);
        assert_eq!(config.trace_depth, 100);
    }

    #[test]
    fn test_parse_config() {
        let content = r#"
error-mode = "RETURN"
trace-depth = 20
broadcast = "singleton"

[scratch.gfposc]
default-capacity = 20000
overflow = "truncate"
"#;
        let config = BridgeConfig::from_toml_str(content).unwrap();
        assert_eq!(config.error_mode, TranslationMode::Silent);
        assert_eq!(config.broadcast, BroadcastRule::Singleton);
        assert_eq!(
            config.scratch_spec("gfposc"),
            ScratchSpec::new(20000).truncating()
        );
        assert_eq!(config.scratch_spec("other"), ScratchSpec::new(DEFAULT_ROWS));

        let state = config.error_state();
        assert_eq!(state.mode(), TranslationMode::Silent);
        assert_eq!(state.native().capacity(), 20);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = BridgeConfig {
            error_mode: TranslationMode::Ignore,
            ..BridgeConfig::default()
        };
        config.scratch.insert("wnfetd".to_string(), ScratchSpec::new(64));
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("error-mode = \"IGNORE\""));
        assert_eq!(BridgeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_mode() {
        assert!(BridgeConfig::from_toml_str("error-mode = \"ABORT\"").is_err());
    }

    #[test]
    fn test_mode_override() {
        let config = BridgeConfig::default().with_mode_override(Some("runtime")).unwrap();
        assert_eq!(config.error_mode, TranslationMode::GenericRaise);

        let config = BridgeConfig::default().with_mode_override(Some("  ")).unwrap();
        assert_eq!(config.error_mode, TranslationMode::ClassifiedRaise);

        let err = BridgeConfig::default().with_mode_override(Some("LOUD")).unwrap_err();
        assert!(matches!(err, ConfigError::Mode(_)));
    }
}

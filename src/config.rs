//! Bridge configuration
//!
//! `BridgeConfig` is read from TOML, either an explicit file or the nearest
//! `.dynabind.toml` found walking up from the current directory. Missing
//! sections fall back to defaults. The `[marshal]` section controls integer
//! overflow handling and the wrapper cache size; `[logging]` feeds
//! [`crate::logging::init_with_config`].

use crate::error::{BridgeError, Result};
use crate::logging::{self, LogConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name searched for by [`BridgeConfig::discover`]
pub const CONFIG_FILE: &str = ".dynabind.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub marshal: MarshalConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarshalConfig {
    /// What happens when a dynamic integer does not fit the native width
    #[serde(default)]
    pub integer_overflow: IntegerOverflow,

    /// Initial capacity of the wrapper identity cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegerOverflow {
    /// Out-of-range values are argument errors
    #[default]
    Error,
    /// Out-of-range values are truncated to the native width
    Wrap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_false")]
    pub spans: bool,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            integer_overflow: IntegerOverflow::Error,
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            spans: false,
        }
    }
}

fn default_false() -> bool { false }
fn default_cache_capacity() -> usize { 256 }
fn default_level() -> String { "info".to_string() }

impl LoggingConfig {
    /// Convert into the subscriber configuration used by `logging::init_with_config`
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: logging::parse_level(&self.level).unwrap_or(logging::Level::INFO),
            log_path: self.file.clone(),
            json_format: self.json,
            show_spans: self.spans,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BridgeError::Config(format!("failed to parse config: {}", e)))?;

        if logging::parse_level(&config.logging.level).is_none() {
            return Err(BridgeError::Config(format!(
                "unknown log level `{}'",
                config.logging.level
            )));
        }
        Ok(config)
    }

    /// Find and load configuration file from current directory or parents
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            if let Some(config) = Self::discover_in(&dir) {
                return config;
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Load `.dynabind.toml` from exactly this directory, if present and valid
    pub fn discover_in(dir: &Path) -> Option<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return None;
        }
        match Self::load(&config_path) {
            Ok(config) => Some(config),
            Err(e) => {
                logging::warn!(path = %config_path.display(), error = %e, "ignoring config file");
                None
            }
        }
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| BridgeError::Config(format!("failed to write {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.marshal.integer_overflow, IntegerOverflow::Error);
        assert_eq!(config.marshal.cache_capacity, 256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[marshal]
integer_overflow = "wrap"

[logging]
level = "debug"
json = true
"#;

        let config = BridgeConfig::parse(toml).unwrap();
        assert_eq!(config.marshal.integer_overflow, IntegerOverflow::Wrap);
        assert_eq!(config.marshal.cache_capacity, 256);
        assert!(config.logging.json);

        let log = config.logging.to_log_config();
        assert_eq!(log.level, logging::Level::DEBUG);
        assert!(log.json_format);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(BridgeConfig::parse("[marshal]\ninteger_overflow = \"saturate\"\n").is_err());
        assert!(BridgeConfig::parse("[logging]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn test_save_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.marshal.cache_capacity = 16;
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let found = BridgeConfig::discover_in(dir.path()).unwrap();
        assert_eq!(found, config);
        assert!(BridgeConfig::discover_in(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_generate_default_round_trips() {
        let text = BridgeConfig::generate_default();
        assert_eq!(BridgeConfig::parse(&text).unwrap(), BridgeConfig::default());
    }
}

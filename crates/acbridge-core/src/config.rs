/*!
 * Configuration management for acbridge.
 *
 * This module loads the layered configuration (built-in defaults, a YAML,
 * TOML or JSON file, then environment variables) and validates the sections
 * shared by every acbridge component.
 */
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::duration_str;

/// Environment variable prefix used by the command line tools
pub const ENV_PREFIX: &str = "ACBRIDGE";

/// Core configuration for acbridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Controller (poller) configuration
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Bus transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error or a full `EnvFilter` directive)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,

    /// Whether to include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller id
    #[serde(default = "default_controller_id")]
    pub id: String,

    /// Interval between two polling ticks
    #[serde(default = "default_update_interval", with = "duration_str")]
    pub update_interval: Duration,

    /// Upper bound for a single bus transaction
    #[serde(default = "default_register_timeout", with = "duration_str")]
    pub register_timeout: Duration,

    /// Merge adjacent register reads into range reads
    #[serde(default = "default_true")]
    pub coalesce: bool,

    /// Largest address gap bridged when merging reads
    #[serde(default)]
    pub max_gap: u16,

    /// Largest span (words or bits) of a merged read
    #[serde(default = "default_max_batch")]
    pub max_batch: u16,
}

/// Bus transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// In-process register image, used for simulation and tests
    Memory {
        /// Initial holding/input register words keyed by `"<device>/<address>"`
        #[serde(default)]
        registers: BTreeMap<String, u16>,
        /// Initial coil/discrete input bits keyed by `"<device>/<address>"`
        #[serde(default)]
        coils: BTreeMap<String, bool>,
    },
    /// Modbus TCP gateway
    Tcp {
        /// Socket address of the gateway, e.g. `192.168.1.50:502`
        address: String,
        /// Device address to Modbus slave id
        #[serde(default)]
        slaves: BTreeMap<String, u8>,
    },
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            id: default_controller_id(),
            update_interval: default_update_interval(),
            register_timeout: default_register_timeout(),
            coalesce: true,
            max_gap: 0,
            max_batch: default_max_batch(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Memory {
            registers: BTreeMap::new(),
            coils: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_controller_id() -> String {
    "samsung_ac_modbus".to_string()
}

fn default_update_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_register_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_max_batch() -> u16 {
    64
}

impl Config {
    /// Validate the shared sections
    pub fn validate(&self) -> Result<()> {
        self.controller.validate()?;
        if let TransportConfig::Tcp { address, .. } = &self.transport {
            if address.trim().is_empty() {
                return Err(Error::config("transport.address must not be empty"));
            }
        }
        Ok(())
    }
}

impl ControllerConfig {
    /// Validate controller timing and batching limits
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config("controller.id must not be empty"));
        }
        if self.update_interval.is_zero() {
            return Err(Error::config("controller.update_interval must be positive"));
        }
        if self.register_timeout.is_zero() {
            return Err(Error::config("controller.register_timeout must be positive"));
        }
        if self.max_batch == 0 {
            return Err(Error::config("controller.max_batch must be at least 1"));
        }
        Ok(())
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build and validate the core configuration
    pub fn build(self) -> Result<Config> {
        let config: Config = self.build_as()?;
        config.validate()?;
        Ok(config)
    }

    /// Build any document type layered over its `Default` value
    ///
    /// Used by the engine to load the full component document, which embeds
    /// [`Config`] next to the entity lists. Validation is left to the caller.
    pub fn build_as<T>(self) -> Result<T>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let defaults = T::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&defaults)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if !path.exists() {
                return Err(Error::config(format!(
                    "Configuration file {} does not exist",
                    config_file
                )));
            }
            debug!("Loading configuration from {}", config_file);
            config_builder = config_builder.add_source(File::with_name(&config_file));
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: T = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.controller.update_interval, Duration::from_secs(30));
        assert_eq!(config.controller.register_timeout, Duration::from_secs(1));
        assert!(config.controller.coalesce);
        assert_eq!(config.controller.max_batch, 64);
        assert!(matches!(config.transport, TransportConfig::Memory { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_builder_with_yaml_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("bridge.yaml");
        fs::write(
            &file_path,
            r#"
logging:
  level: debug
controller:
  update_interval: 10s
  register_timeout: 250ms
  coalesce: false
transport:
  kind: tcp
  address: "192.168.1.50:502"
  slaves:
    "20.00.00": 1
"#,
        )?;

        let config = ConfigBuilder::new().with_config_file(&file_path).build()?;

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.controller.update_interval, Duration::from_secs(10));
        assert_eq!(config.controller.register_timeout, Duration::from_millis(250));
        assert!(!config.controller.coalesce);
        match config.transport {
            TransportConfig::Tcp { address, slaves } => {
                assert_eq!(address, "192.168.1.50:502");
                assert_eq!(slaves.get("20.00.00"), Some(&1));
            }
            other => panic!("unexpected transport {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_config_builder_missing_file() {
        let result = ConfigBuilder::new()
            .with_config_file("/nonexistent/acbridge.yaml")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_builder_rejects_bad_interval() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("bad.yaml");
        fs::write(&file_path, "controller:\n  update_interval: soon\n")?;

        let result = ConfigBuilder::new().with_config_file(&file_path).build();
        assert!(result.unwrap_err().is_config());
        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("ACBRIDGE_TEST__LOGGING__LEVEL", "trace");

        let config = ConfigBuilder::new()
            .with_environment_prefix("ACBRIDGE_TEST")
            .build()?;

        assert_eq!(config.logging.level, "trace");

        env::remove_var("ACBRIDGE_TEST__LOGGING__LEVEL");
        Ok(())
    }

    #[test]
    fn test_controller_validation() {
        let mut controller = ControllerConfig::default();
        controller.max_batch = 0;
        assert!(controller.validate().is_err());

        let mut controller = ControllerConfig::default();
        controller.update_interval = Duration::ZERO;
        assert!(controller.validate().is_err());
    }

    #[test]
    fn test_shared_config() {
        let shared = SharedConfig::new(Config::default());
        let cloned = shared.clone();
        assert_eq!(cloned.get().controller.id, "samsung_ac_modbus");
    }
}

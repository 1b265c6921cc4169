//! Configuration parsing and management.
//!
//! This module handles parsing of service configuration files (TOML) that
//! define daemon settings, registry identity, and directory integration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    /// Daemon configuration.
    #[serde(default)]
    pub daemon: DaemonSection,

    /// Registry configuration.
    #[serde(default)]
    pub registry: RegistrySection,

    /// User-directory integration.
    #[serde(default)]
    pub directory: DirectorySection,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML is invalid
    /// - The sweep interval is zero (the sweep is mandatory and must have
    ///   a period)
    /// - The base path is not absolute
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "registry.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if !self.registry.base_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "registry.base_path must be absolute, got '{}'",
                self.registry.base_path
            )));
        }
        Ok(())
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    /// Path to the PID file.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Port for the Prometheus metrics HTTP endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySection {
    /// Service identity mixed into generated session identifiers.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Base address under which sessions are published;
    /// each session lives at `<base_path>/<hex id>`.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Period of the liveness sweep, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            base_path: default_base_path(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// User-directory integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySection {
    /// Group whose members hold the administrative tier when the host OS
    /// account database backs the directory.
    #[serde(default = "default_admin_group")]
    pub admin_group: String,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            admin_group: default_admin_group(),
        }
    }
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/run/sessiond/sessiond.pid")
}

const fn default_metrics_port() -> u16 {
    9620
}

fn default_service_name() -> String {
    "sessiond".to_string()
}

fn default_base_path() -> String {
    "/sessiond/sessions".to_string()
}

const fn default_sweep_interval_secs() -> u64 {
    10
}

fn default_admin_group() -> String {
    "admin".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read configuration: {0}")]
    Io(#[source] std::io::Error),

    /// Failed to parse the configuration.
    #[error("failed to parse configuration: {0}")]
    Parse(#[source] toml::de::Error),

    /// Failed to serialize the configuration.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] toml::ser::Error),

    /// The configuration is structurally valid but semantically wrong.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.registry.service_name, "sessiond");
        assert_eq!(config.registry.base_path, "/sessiond/sessions");
        assert_eq!(config.registry.sweep_interval_secs, 10);
        assert_eq!(config.daemon.metrics_port, 9620);
        assert_eq!(config.directory.admin_group, "admin");
    }

    #[test]
    fn test_parse_partial_config_fills_defaults() {
        let config = ServiceConfig::from_toml(
            "[registry]\n\
             service_name = \"bmc-sessions\"\n",
        )
        .unwrap();
        assert_eq!(config.registry.service_name, "bmc-sessions");
        assert_eq!(config.registry.sweep_interval_secs, 10);
    }

    #[test]
    fn test_parse_rejects_zero_sweep_interval() {
        let err = ServiceConfig::from_toml(
            "[registry]\n\
             sweep_interval_secs = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_parse_rejects_relative_base_path() {
        let err = ServiceConfig::from_toml(
            "[registry]\n\
             base_path = \"sessions\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[daemon]\n\
             metrics_port = 9900\n\
             \n\
             [directory]\n\
             admin_group = \"wheel\"\n"
        )
        .unwrap();

        let config = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.daemon.metrics_port, 9900);
        assert_eq!(config.directory.admin_group, "wheel");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ServiceConfig::default();
        let text = config.to_toml().unwrap();
        let reparsed = ServiceConfig::from_toml(&text).unwrap();
        assert_eq!(reparsed.registry.base_path, config.registry.base_path);
        assert_eq!(reparsed.daemon.pid_file, config.daemon.pid_file);
    }
}

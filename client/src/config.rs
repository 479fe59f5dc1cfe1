//! Client configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config.

use serde::Deserialize;
use std::path::Path;

/// Configuration for the pigpio client.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Daemon address ("host:port", default: "127.0.0.1:8888").
    #[serde(default = "default_address")]
    pub address: String,

    /// Enable TCP_NODELAY on the command socket (default: true).
    /// The notification socket always disables coalescing.
    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,

    /// Upper bound on a secondary payload read after a response
    /// (default: 64KiB). Larger payloads are drained and rejected.
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,

    /// How negative results surface from the typed operations.
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Logging configuration, used by the CLI.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Whether typed operations turn negative results into errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Negative results become `ClientError::Daemon`.
    #[default]
    Raise,
    /// Negative results are returned as-is.
    ReturnCode,
}

/// Structured logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive when RUST_LOG is unset (default: "info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (default: pretty).
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps (default: true).
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include the event target (default: false).
    #[serde(default)]
    pub target: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            tcp_nodelay: default_tcp_nodelay(),
            max_payload_len: default_max_payload_len(),
            error_policy: ErrorPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
            target: false,
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_tcp_nodelay() -> bool {
    true
}

fn default_max_payload_len() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.address.is_empty() {
            return Err("address must not be empty".to_string());
        }
        if self.max_payload_len == 0 {
            return Err("max_payload_len must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.address, "127.0.0.1:8888");
        assert!(config.tcp_nodelay);
        assert_eq!(config.max_payload_len, 65536);
        assert_eq!(config.error_policy, ErrorPolicy::Raise);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config: ClientConfig = toml::from_str(
            r#"
            address = "192.168.1.3:8888"
            tcp_nodelay = false
            max_payload_len = 1024
            error_policy = "return_code"

            [logging]
            level = "debug"
            format = "json"
            timestamps = false
            "#,
        )
        .unwrap();
        assert_eq!(config.address, "192.168.1.3:8888");
        assert!(!config.tcp_nodelay);
        assert_eq!(config.max_payload_len, 1024);
        assert_eq!(config.error_policy, ErrorPolicy::ReturnCode);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.logging.timestamps);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(toml::from_str::<ClientConfig>("port = 8888").is_err());
    }

    #[test]
    fn test_zero_payload_limit_invalid() {
        let config = ClientConfig {
            max_payload_len: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

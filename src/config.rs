//! # Configuration Management
//!
//! Centralized configuration for the RPC gate.
//!
//! This module provides structured configuration for policy lookup, request
//! limits, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Security Considerations
//! - The default payload limit (16 MB) bounds the bytes read for one request
//! - `max_decoded_values` bounds what back references can expand those bytes to
//! - Legacy policy fallback is off by default; enabling it admits every
//!   `IsSerializable` type for clients whose policy file is missing

use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Max allowed request payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Max entries in a request's string table
pub const MAX_STRING_TABLE_SIZE: usize = 65_536;

/// Max values one request may decode to, back-reference copies included
pub const MAX_DECODED_VALUES: usize = 1_000_000;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RpcConfig {
    /// Serialization policy lookup
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Request limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| RpcError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| RpcError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RPCGATE_POLICY_DIR") {
            config.policy.base_dir = PathBuf::from(dir);
        }

        if let Ok(context) = std::env::var("RPCGATE_CONTEXT_PATH") {
            config.policy.context_path = context;
        }

        if let Ok(fallback) = std::env::var("RPCGATE_LEGACY_FALLBACK") {
            config.policy.legacy_fallback = fallback.eq_ignore_ascii_case("true") || fallback == "1";
        }

        if let Ok(size) = std::env::var("RPCGATE_MAX_PAYLOAD_SIZE") {
            let val = size.parse::<usize>().map_err(|_| {
                RpcError::ConfigError(format!("Invalid RPCGATE_MAX_PAYLOAD_SIZE: '{size}'"))
            })?;
            config.limits.max_payload_size = val;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RpcError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.policy.validate());
        errors.extend(self.limits.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RpcError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Where policy files live and how module URLs map onto them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Directory holding `<strong name>.gwt.rpc` files
    pub base_dir: PathBuf,

    /// Path prefix every module base URL must start with (e.g. "/app")
    pub context_path: String,

    /// Use the legacy policy when a policy file cannot be loaded
    pub legacy_fallback: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            context_path: String::new(),
            legacy_fallback: false,
        }
    }
}

impl PolicyConfig {
    /// Validate policy configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.base_dir.as_os_str().is_empty() {
            errors.push("Policy base directory cannot be empty".to_string());
        } else if !self.base_dir.is_dir() {
            errors.push(format!(
                "Policy base directory does not exist: {}",
                self.base_dir.display()
            ));
        }

        if !self.context_path.is_empty() && !self.context_path.starts_with('/') {
            errors.push(format!(
                "Context path must start with '/': '{}'",
                self.context_path
            ));
        }

        if self.legacy_fallback {
            errors.push(
                "WARNING: Legacy policy fallback is enabled - not recommended for production"
                    .to_string(),
            );
        }

        errors
    }
}

/// Per-request resource limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum allowed request payload size in bytes
    pub max_payload_size: usize,

    /// Maximum entries in a request's string table
    pub max_string_table_size: usize,

    /// Maximum values one request may decode to
    #[serde(default = "default_max_decoded_values")]
    pub max_decoded_values: usize,
}

fn default_max_decoded_values() -> usize {
    MAX_DECODED_VALUES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_string_table_size: MAX_STRING_TABLE_SIZE,
            max_decoded_values: MAX_DECODED_VALUES,
        }
    }
}

impl LimitsConfig {
    /// Validate limits configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_payload_size
            ));
        }

        if self.max_string_table_size == 0 {
            errors.push("Max string table size must be greater than 0".to_string());
        }

        if self.max_decoded_values == 0 {
            errors.push("Max decoded values must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("rpcgate"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

//! Structured logging setup.
//!
//! Installs a global `tracing-subscriber` fmt subscriber from a
//! [`LoggingConfig`]. `RUST_LOG` directives override the configured level.

use crate::config::LoggingConfig;
use crate::error::{Result, RpcError};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// # Errors
/// `ConfigError` when file logging lacks a path or a subscriber is already
/// installed, `Io` when the log file cannot be opened.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            RpcError::ConfigError(
                "log_file_path must be specified when log_to_file is true".to_string(),
            )
        })?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if config.json_format {
            builder.json().with_writer(Mutex::new(file)).try_init()
        } else {
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    } else if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| {
        RpcError::ConfigError(format!("Failed to install tracing subscriber: {e}"))
    })?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}

//! Logging configuration and initialization
//!
//! Structured logging with `tracing`, console output in either human-readable
//! or JSON form.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level filter (default: "info")
    pub default_level: String,
    /// Use JSON format for logs (default: false)
    pub json_format: bool,
    /// Print the module path of each event (default: false)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            json_format: false,
            with_target: false,
        }
    }
}

/// Initialize the global subscriber.
///
/// # Environment Variables
///
/// - `STEREO_TRACKER_LOG`: log level filter (e.g. "debug", "info,stereo_tracker=trace")
/// - `STEREO_TRACKER_LOG_FORMAT`: set to "json" for JSON output
///
/// `RUST_LOG` is used when `STEREO_TRACKER_LOG` is unset. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env("STEREO_TRACKER_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let use_json = std::env::var("STEREO_TRACKER_LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(config.json_format);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if use_json {
        subscriber
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()?;
    } else {
        subscriber
            .with(fmt::layer().with_target(config.with_target))
            .try_init()?;
    }

    Ok(())
}

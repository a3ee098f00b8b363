//! Centralized logging configuration for hosts embedding Reelcast
//!
//! Provides consistent logging setup with support for:
//! - Text, JSON, and pretty-printed output
//! - Environment variable configuration
//! - Per-module log level filtering
//!
//! # Examples
//!
//! ```no_run
//! use libreelcast::logging::{LoggingConfig, LogFormat};
//!
//! // Initialize with JSON format
//! let config = LoggingConfig::new(LogFormat::Json, "info".to_string(), false);
//! config.init();
//!
//! // Or use default settings (respects env vars)
//! libreelcast::logging::init_default();
//! ```

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Configuration for logging initialization
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// Create a new logging configuration
    ///
    /// # Arguments
    ///
    /// * `format` - Log output format (text, json, or pretty)
    /// * `level` - Minimum log level (error, warn, info, debug, trace)
    /// * `verbose` - If true, defaults to debug level
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Initialize logging with the configured settings
    ///
    /// This should be called once at the start of the host program. A second
    /// call is ignored: the subscriber that was installed first keeps running.
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;

        let default_level = if self.verbose { "debug" } else { self.level.as_str() };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        match self.format {
            LogFormat::Json => {
                // One JSON object per line, for log shippers watching the scheduler
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .flatten_event(true)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .try_init()
                    .ok();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .try_init()
                    .ok();
            }
            LogFormat::Text => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true)
                    .try_init()
                    .ok();
            }
        }
    }
}

/// Initialize logging with default settings
///
/// Respects `REELCAST_LOG_FORMAT` and `REELCAST_LOG_LEVEL` environment variables.
/// Falls back to text format with info level if not set. `RUST_LOG` still wins
/// over the level when present.
pub fn init_default() {
    LoggingConfig::from_env().init();
}

impl LoggingConfig {
    /// Build a configuration from `REELCAST_LOG_FORMAT` / `REELCAST_LOG_LEVEL`
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("REELCAST_LOG_FORMAT").ok(),
            std::env::var("REELCAST_LOG_LEVEL").ok(),
        )
    }

    /// An unrecognized format falls back to text rather than failing startup
    fn from_vars(format: Option<String>, level: Option<String>) -> Self {
        let format = format
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        Self::new(format, level, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_vars_give_text_at_info() {
        let config = LoggingConfig::from_vars(None, None);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
        assert!(!config.verbose);
    }

    #[test]
    fn test_vars_select_format_and_level() {
        let config = LoggingConfig::from_vars(Some("JSON".to_string()), Some("debug".to_string()));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_bad_format_falls_back_to_text() {
        let config = LoggingConfig::from_vars(Some("xml".to_string()), Some(" ".to_string()));
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_init_twice_is_ignored() {
        LoggingConfig::new(LogFormat::Text, "warn".to_string(), false).init();
        LoggingConfig::new(LogFormat::Json, "debug".to_string(), true).init();
    }
}

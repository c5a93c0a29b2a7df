use serde::Deserialize;

use crate::default_true;

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Install a log subscriber at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Emit an audit event for every generation request
    #[serde(default = "default_true")]
    pub log_requests: bool,
    /// Echo backend response payloads at debug level
    #[serde(default)]
    pub log_responses: bool,
    /// Emit an audit event for every failed generation
    #[serde(default = "default_true")]
    pub log_errors: bool,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directives (`RUST_LOG` syntax); `RUST_LOG` takes precedence
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_requests: true,
            log_responses: false,
            log_errors: true,
            format: LogFormat::default(),
            filter: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

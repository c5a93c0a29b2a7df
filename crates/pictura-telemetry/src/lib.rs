//! Log subscriber setup for Pictura
//!
//! Events are emitted through the `tracing` ecosystem and written to stderr
//! as text lines or JSON objects.

use anyhow::Context;
use pictura_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global log subscriber
///
/// Filter directives come from `RUST_LOG` when set, then from the configured
/// filter, then from `default_filter`. Does nothing when logging is disabled.
///
/// # Errors
///
/// Returns an error if the filter directives are invalid or a subscriber is
/// already installed
pub fn init(config: &LoggingConfig, default_filter: &str) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_filter(config, default_filter)?;

    let (text, json) = match config.format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(())
}

fn build_filter(config: &LoggingConfig, default_filter: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = config.filter.as_deref().unwrap_or(default_filter);

    EnvFilter::try_new(directives).with_context(|| format!("invalid log filter '{directives}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_beats_the_default() {
        let config = LoggingConfig {
            filter: Some("debug".to_owned()),
            ..LoggingConfig::default()
        };

        temp_env::with_var_unset("RUST_LOG", || {
            assert_eq!(build_filter(&config, "info").unwrap().to_string(), "debug");
            assert_eq!(build_filter(&LoggingConfig::default(), "info").unwrap().to_string(), "info");
        });
    }

    #[test]
    fn rust_log_beats_the_configured_filter() {
        let config = LoggingConfig {
            filter: Some("debug".to_owned()),
            ..LoggingConfig::default()
        };

        temp_env::with_var("RUST_LOG", Some("warn"), || {
            assert_eq!(build_filter(&config, "info").unwrap().to_string(), "warn");
        });
    }

    #[test]
    fn disabled_logging_installs_nothing() {
        let config = LoggingConfig {
            enabled: false,
            filter: Some("pictura=[".to_owned()),
            ..LoggingConfig::default()
        };

        assert!(init(&config, "info").is_ok());
    }
}

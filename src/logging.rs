//! Tracing subscriber set-up

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::{RecorderError, Result};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` when set, then `cli_level_override`, then
/// the settings file, then `info`.
///
/// # Errors
///
/// Returns error if the filter does not parse or a subscriber is already set
pub fn init(logging: &LoggingConfig, cli_level_override: Option<&str>) -> Result<()> {
    let env_level = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = resolve_directive(env_level.as_deref(), cli_level_override, logging);
    let filter = EnvFilter::try_new(&directive).map_err(|e| {
        RecorderError::ConfigError(format!("invalid log level `{directive}`: {e}"))
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| RecorderError::ConfigError(format!("initialize logging subscriber: {e}")))
}

fn resolve_directive(
    env_level: Option<&str>,
    cli_level_override: Option<&str>,
    logging: &LoggingConfig,
) -> String {
    [env_level, cli_level_override, logging.level.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: Some(level.to_string()),
            format: LogFormat::Compact,
        }
    }

    #[test]
    fn test_defaults_to_info() {
        let directive = resolve_directive(None, None, &LoggingConfig::default());
        assert_eq!(directive, "info");
    }

    #[test]
    fn test_precedence() {
        let logging = configured("warn");

        assert_eq!(resolve_directive(None, None, &logging), "warn");
        assert_eq!(resolve_directive(None, Some("DEBUG"), &logging), "debug");
        assert_eq!(
            resolve_directive(Some("pmok=trace"), Some("debug"), &logging),
            "pmok=trace"
        );
    }

    #[test]
    fn test_blank_values_fall_through() {
        let directive = resolve_directive(Some("  "), None, &configured("error"));
        assert_eq!(directive, "error");
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let result = init(&configured("pmok=loud"), Some("pmok=loud"));
        // RUST_LOG may be set by the harness; only assert when it is not.
        if std::env::var(EnvFilter::DEFAULT_ENV).is_err() {
            assert!(matches!(result, Err(RecorderError::ConfigError(_))));
        }
    }
}

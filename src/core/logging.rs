//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events; binaries and tests opt into
//! output by calling [`init_tracing`].

use crate::core::config::LoggingConfig;
use crate::core::errors::{Result, SchedulerError};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins over the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            SchedulerError::configuration_field(
                format!("invalid log level '{}': {}", config.level, e),
                "logging.level",
            )
        }),
    }
}

/// Install the global tracing subscriber.
///
/// Fails (without panicking) when a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| SchedulerError::internal(format!("tracing already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_env_filter_from_config() {
        let config = LoggingConfig {
            level: "dy_scheduler=debug".to_string(),
            json: false,
        };
        assert!(env_filter(&config).is_ok());
    }
}

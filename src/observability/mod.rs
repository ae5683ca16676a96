//! Log setup
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level when set.

use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LogFormat};
use crate::error::ExporterError;

/// Build the level filter, validating `level` even when `RUST_LOG` is set
pub fn build_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    let configured = EnvFilter::try_new(level).map_err(|e| ConfigError::InvalidValue {
        key: "log_level",
        value: level.to_string(),
        reason: e.to_string(),
    })?;
    Ok(EnvFilter::try_from_default_env().unwrap_or(configured))
}

pub fn init_tracing(level: &str, format: LogFormat) -> Result<(), ExporterError> {
    let filter = build_filter(level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| ExporterError::Tracing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_levels() {
        for level in ["trace", "debug", "info", "warn", "error", "netflow_exporter=debug"] {
            assert!(build_filter(level).is_ok(), "{} should parse", level);
        }
    }

    #[test]
    fn test_bad_level() {
        let err = build_filter("netflow_exporter=loud").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "log_level", .. }));
    }
}

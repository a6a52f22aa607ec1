//! Core types and utilities for LoRa coverage mapping

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, LoggingConfig};
pub use error::{Error, Result};
pub use types::{
    AesKey, CompactTime, CoveragePoint, DataRate, DevAddr, GeoObservation, LogEvent, MacAddress,
    RxPacket, SessionKeys,
};

/// Guard that flushes the file writer when dropped
pub use tracing_appender::non_blocking::WorkerGuard;

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over the configured level. When a log file is
/// configured, the returned guard must be held until exit so buffered lines
/// are flushed.
///
/// # Errors
///
/// Returns an error if the level filter is invalid or a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::path::Path;
    use tracing_subscriber::{
        EnvFilter, fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Configuration {
            message: format!("invalid log level '{}': {e}", config.level),
        })?;

    let (writer, guard) = match &config.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().ok_or_else(|| Error::Configuration {
                message: format!("log file '{}' has no file name", path.display()),
            })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(writer))
            .try_init()
    };

    installed.map_err(|e| Error::Other(format!("failed to initialize logging: {e}")))?;
    Ok(guard)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_rejects_bad_level() {
        // Only meaningful when RUST_LOG does not override the level
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }

        let config = LoggingConfig {
            level: "lora=notalevel".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_init_logging_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
            file: Some(dir.path().join("coverage.log")),
        };

        // A second global subscriber in the same test binary is refused
        match init_logging(&config) {
            Ok(guard) => {
                tracing::info!(gateway = "0080000000000B88", "logging initialized");
                drop(guard);
                assert!(dir.path().join("coverage.log").exists());
            }
            Err(err) => assert!(matches!(err, Error::Other(_))),
        }
    }
}

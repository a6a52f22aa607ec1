//! Gateway log ingestion and coverage export for LoRa coverage mapping
//!
//! This crate drives the pipeline end to end: it feeds gateway bridge logs
//! through the uplink classifier into the coverage store, and exports the
//! stored coverage of a gateway as a GeoJSON-P script for map overlays.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod error;
pub mod export;
pub mod processor;
pub mod summary;

// Re-export commonly used types
pub use error::{IngestError, Result};
pub use export::{ExportReport, export_geojson};
pub use processor::LogFileProcessor;
pub use summary::IngestSummary;

use lora_coverage_core::{Config, DataRate, MacAddress};
use lora_coverage_database::Database;
use lora_coverage_protocol::UplinkClassifier;
use std::path::Path;

/// Placeholder printed instead of session keys
pub const REDACTED: &str = "**redacted**";

/// Ingest one log file into the configured store
///
/// The session keys and the store are both checked before the first line
/// is read; either failing aborts the run.
///
/// # Errors
///
/// Returns [`IngestError`] if:
/// - Session keys are not configured
/// - The store cannot be opened or initialized
/// - The file cannot be read
pub async fn ingest_file(config: &Config, path: &Path) -> Result<IngestSummary> {
    let classifier = UplinkClassifier::new(config)?;
    let database = Database::open(config).await?;

    let summary = LogFileProcessor::with_classifier(classifier, database.pool().clone())
        .process_file(path)
        .await;

    database.close().await;
    summary
}

/// Export the coverage of one gateway and data rate
///
/// `callback` and `output` fall back to the `[export]` configuration.
///
/// # Errors
///
/// Returns [`IngestError`] if the store cannot be opened, the query fails or
/// the output cannot be written. No output file is written on failure.
pub async fn export(
    config: &Config,
    gateway: &MacAddress,
    data_rate: &DataRate,
    callback: Option<&str>,
    output: Option<&Path>,
) -> Result<ExportReport> {
    let callback = callback.unwrap_or(&config.export.callback);
    let output = output.unwrap_or(&config.export.output);

    let database = Database::open(config).await?;
    let report = export_geojson(database.pool(), gateway, data_rate, callback, output).await;

    database.close().await;
    report
}

/// Render the configuration as TOML with session keys masked
///
/// # Errors
///
/// Returns a configuration error if the configuration cannot be serialized.
pub fn render_config(config: &Config) -> Result<String> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| IngestError::configuration(format!("Failed to serialize configuration: {e}")))?;
    let mut table: toml::Table = rendered
        .parse()
        .map_err(|e| IngestError::configuration(format!("Failed to reparse configuration: {e}")))?;

    if let Some(toml::Value::Table(lora)) = table.get_mut("lora") {
        for (_, key) in lora.iter_mut() {
            *key = toml::Value::String(REDACTED.to_string());
        }
    }

    toml::to_string_pretty(&table)
        .map_err(|e| IngestError::configuration(format!("Failed to serialize configuration: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use lora_coverage_core::config::LoraConfig;

    #[test]
    fn test_render_config_masks_keys() {
        let config = Config {
            lora: Some(LoraConfig {
                nwk_s_key: Some("2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap()),
                app_s_key: None,
            }),
            ..Config::default()
        };

        let rendered = render_config(&config).unwrap();

        assert!(rendered.contains(REDACTED));
        assert!(!rendered.contains("2B7E151628AED2A6ABF7158809CF4F3C"));
        assert!(rendered.contains("eqfeed_callback"));
        assert!(rendered.contains("PUSH_DATA: RXPK"));
    }

    #[test]
    fn test_render_config_without_keys() {
        let rendered = render_config(&Config::default()).unwrap();
        assert!(!rendered.contains("[lora]"));
        assert!(rendered.contains("sqlite://coverage.db"));
    }

    #[tokio::test]
    async fn test_ingest_file_requires_keys() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("gateway.log");
        tokio::fs::write(&log, "").await.unwrap();

        let mut config = Config::default();
        config.database.url = format!("sqlite://{}", dir.path().join("coverage.db").display());

        let result = ingest_file(&config, &log).await;
        assert!(matches!(result, Err(IngestError::Configuration { ref message }) if message.contains("lora.nwk_s_key")));
    }

    #[tokio::test]
    async fn test_ingest_file_unreachable_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.url = format!(
            "sqlite://{}",
            dir.path().join("missing").join("coverage.db").display()
        );
        config.database.connect_timeout = 1;
        config.lora = Some(LoraConfig {
            nwk_s_key: Some("2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap()),
            app_s_key: Some("000102030405060708090A0B0C0D0E0F".parse().unwrap()),
        });

        let result = ingest_file(&config, &dir.path().join("gateway.log")).await;
        assert!(matches!(result, Err(IngestError::Store(_))));
    }
}

//! Line-by-line ingestion of gateway bridge logs
//!
//! Every line goes through the [`UplinkClassifier`] and, when it yields an
//! observation, into the coverage store. A bad line never stops the run; the
//! outcome is counted in the [`IngestSummary`] and processing moves on.

use crate::{IngestSummary, Result};
use lora_coverage_core::GeoObservation;
use lora_coverage_database::{CoverageQueries, SqlitePool};
use lora_coverage_protocol::{
    Classification, FrameDecryptor, LoRaWanDecryptor, RejectKind, UplinkClassifier,
};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, instrument, warn};

/// Feeds log files through the classifier into the store
#[derive(Debug)]
pub struct LogFileProcessor<D = LoRaWanDecryptor> {
    /// Per-line classifier
    classifier: UplinkClassifier<D>,

    /// Coverage store pool
    pool: SqlitePool,
}

impl<D: FrameDecryptor> LogFileProcessor<D> {
    /// Create a processor around an existing classifier
    pub const fn with_classifier(classifier: UplinkClassifier<D>, pool: SqlitePool) -> Self {
        Self { classifier, pool }
    }

    /// Ingest a log file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read. Per-line
    /// failures are only counted.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn process_file(&self, path: &Path) -> Result<IngestSummary> {
        info!("Starting log ingestion");

        let file = tokio::fs::File::open(path).await?;
        let summary = self.process_reader(BufReader::new(file)).await?;

        summary.log();
        Ok(summary)
    }

    /// Ingest newline separated log events from any reader
    ///
    /// Bytes that are not UTF-8 are replaced, so such a line ends up as a
    /// parse reject rather than a read error.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn process_reader<R>(&self, reader: R) -> Result<IngestSummary>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut summary = IngestSummary::default();
        let mut segments = reader.split(b'\n');

        while let Some(segment) = segments.next_segment().await? {
            summary.lines += 1;
            let line = String::from_utf8_lossy(&segment);
            self.process_line(summary.lines, line.trim_end_matches('\r'), &mut summary)
                .await;
        }

        Ok(summary)
    }

    /// Classify and store a single line
    pub async fn process_line(&self, line_number: u64, line: &str, summary: &mut IngestSummary) {
        match self.classifier.classify(line) {
            Classification::Ignored => summary.ignored += 1,
            Classification::Accepted(observation) => {
                self.store(line_number, &observation, false, summary).await;
            }
            Classification::Salvaged {
                observation,
                reason,
            } => {
                warn!(
                    line = line_number,
                    gateway = %observation.gateway,
                    device = %observation.device,
                    error = %reason,
                    "Storing uplink without geodata"
                );
                self.store(line_number, &observation, true, summary).await;
            }
            Classification::Rejected(reason) => {
                let kind = reason.kind();
                match kind {
                    RejectKind::LineParse | RejectKind::InvalidRecord => {
                        error!(line = line_number, %kind, error = %reason, "Skipping unparseable line");
                    }
                    RejectKind::InvalidPayloadLength => {
                        debug!(line = line_number, %kind, error = %reason, "Skipping uplink without geodata");
                    }
                    // The classifier already logged frame level rejects
                    _ => {}
                }
                summary.record_reject(kind);
            }
        }
    }

    async fn store(
        &self,
        line_number: u64,
        observation: &GeoObservation,
        salvaged: bool,
        summary: &mut IngestSummary,
    ) {
        match CoverageQueries::insert(&self.pool, observation).await {
            Ok(()) => {
                summary.persisted += 1;
                if salvaged {
                    summary.salvaged += 1;
                }
                debug!(
                    line = line_number,
                    gateway = %observation.gateway,
                    device = %observation.device,
                    "Stored observation"
                );
            }
            Err(e) if e.is_duplicate() => {
                summary.duplicates += 1;
                warn!(
                    line = line_number,
                    gateway = %observation.gateway,
                    device = %observation.device,
                    time = %observation.time,
                    "Observation already stored, file already ingested?"
                );
            }
            Err(e) => {
                summary.storage_failures += 1;
                error!(line = line_number, error = %e, "Failed to store observation");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc, clippy::float_cmp)]
mod tests {
    use super::*;
    use lora_coverage_core::{Config, DevAddr, SessionKeys, config::IngestConfig};
    use lora_coverage_database::Database;
    use lora_coverage_protocol::UplinkBuilder;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn keys() -> SessionKeys {
        SessionKeys {
            nwk_s_key: "2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap(),
            app_s_key: "000102030405060708090A0B0C0D0E0F".parse().unwrap(),
        }
    }

    fn uplink(payload: &[u8], crc: i8) -> String {
        let data = UplinkBuilder::new(keys(), DevAddr::new([0x26, 0x01, 0x1B, 0xDA]))
            .fcnt(7)
            .build_wire(payload)
            .unwrap();

        json!({
            "fields": {
                "gateway mac": "abcdef0011223344",
                "time": "2018-03-02T10:21:17.589871Z",
                "frequency": 868.1,
                "IF channel": 0,
                "RF chain": 1,
                "crc": crc,
                "modulation": "LORA",
                "data rate": "SF7BW125",
                "coding rate": "4/5",
                "rssi": -80,
                "snr": 7.5,
                "size": 20,
                "data": data
            },
            "level": "info",
            "timestamp": "2018-03-02T10:21:17Z",
            "message": "PUSH_DATA: RXPK"
        })
        .to_string()
    }

    async fn processor(salvage: bool) -> (TempDir, LogFileProcessor) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.url = format!("sqlite://{}", dir.path().join("coverage.db").display());

        let database = Database::open(&config).await.unwrap();
        let ingest = IngestConfig {
            salvage_invalid_payload_length: salvage,
            ..IngestConfig::default()
        };
        let classifier = UplinkClassifier::with_decryptor(LoRaWanDecryptor, keys(), &ingest);

        (
            dir,
            LogFileProcessor::with_classifier(classifier, database.pool().clone()),
        )
    }

    #[tokio::test]
    async fn test_process_line_outcomes() {
        let (_dir, processor) = processor(true).await;
        let mut summary = IngestSummary::default();

        processor
            .process_line(1, &uplink(&[0, 0, 0x64, 0, 0, 0xC8], 1), &mut summary)
            .await;
        processor
            .process_line(2, &uplink(&[0, 0, 0x64, 0, 0, 0xC8], 1), &mut summary)
            .await;
        processor
            .process_line(3, &uplink(&[1, 2, 3, 4, 5], 1), &mut summary)
            .await;
        processor
            .process_line(4, &uplink(&[0, 0, 0x64, 0, 0, 0xC8, 5], -1), &mut summary)
            .await;
        processor
            .process_line(5, r#"{"message": "PULL_DATA"}"#, &mut summary)
            .await;
        processor.process_line(6, "not json", &mut summary).await;

        assert_eq!(summary.persisted, 2);
        assert_eq!(summary.salvaged, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.rejected_of(RejectKind::InvalidCrc), 1);
        assert_eq!(summary.rejected_of(RejectKind::LineParse), 1);
        assert_eq!(summary.storage_failures, 0);
    }

    #[tokio::test]
    async fn test_salvage_disabled_rejects_short_payload() {
        let (_dir, processor) = processor(false).await;
        let mut summary = IngestSummary::default();

        processor
            .process_line(1, &uplink(&[1, 2, 3, 4, 5], 1), &mut summary)
            .await;

        assert_eq!(summary.persisted, 0);
        assert_eq!(summary.rejected_of(RejectKind::InvalidPayloadLength), 1);
    }

    #[tokio::test]
    async fn test_process_reader_counts_every_line() {
        let (_dir, processor) = processor(true).await;
        let mut input = format!(
            "{}\r\n\n{}\n",
            uplink(&[0, 0, 0x64, 0, 0, 0xC8], 1),
            r#"{"message": "PUSH_DATA: STAT"}"#
        )
        .into_bytes();
        input.extend_from_slice(&[0xFF, 0xFE, b'{']);

        let summary = processor.process_reader(input.as_slice()).await.unwrap();

        assert_eq!(summary.lines, 4);
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.rejected_of(RejectKind::LineParse), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_is_counted() {
        let (_dir, processor) = processor(true).await;
        processor.pool.close().await;
        let mut summary = IngestSummary::default();

        processor
            .process_line(1, &uplink(&[0, 0, 0x64, 0, 0, 0xC8], 1), &mut summary)
            .await;

        assert_eq!(summary.persisted, 0);
        assert_eq!(summary.storage_failures, 1);
    }

    #[tokio::test]
    async fn test_process_missing_file() {
        let (dir, processor) = processor(true).await;
        let result = processor
            .process_file(&dir.path().join("missing.log"))
            .await;

        assert!(matches!(result, Err(crate::IngestError::Io(_))));
    }
}

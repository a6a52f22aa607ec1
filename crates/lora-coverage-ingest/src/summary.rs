//! Per-run ingestion counters

use lora_coverage_protocol::RejectKind;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tracing::info;

/// What happened to every line of one ingested file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Lines read, including blank ones
    pub lines: u64,

    /// Well-formed events that are not uplinks
    pub ignored: u64,

    /// Rows written, salvaged ones included
    pub persisted: u64,

    /// Rows written without geodata
    pub salvaged: u64,

    /// Rows already present in the store
    pub duplicates: u64,

    /// Inserts that failed for any other reason
    pub storage_failures: u64,

    /// Dropped lines by reason
    pub rejected: BTreeMap<RejectKind, u64>,
}

impl IngestSummary {
    /// Count one dropped line
    pub fn record_reject(&mut self, kind: RejectKind) {
        *self.rejected.entry(kind).or_default() += 1;
    }

    /// Dropped lines of one kind
    #[must_use]
    pub fn rejected_of(&self, kind: RejectKind) -> u64 {
        self.rejected.get(&kind).copied().unwrap_or_default()
    }

    /// All dropped lines
    #[must_use]
    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }

    /// Emit the counters as one structured event
    pub fn log(&self) {
        info!(
            lines = self.lines,
            ignored = self.ignored,
            persisted = self.persisted,
            salvaged = self.salvaged,
            duplicates = self.duplicates,
            storage_failures = self.storage_failures,
            rejected = self.rejected_total(),
            "Ingestion finished"
        );
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "lines             {}", self.lines)?;
        writeln!(f, "ignored           {}", self.ignored)?;
        writeln!(f, "persisted         {}", self.persisted)?;
        writeln!(f, "  salvaged        {}", self.salvaged)?;
        writeln!(f, "duplicates        {}", self.duplicates)?;
        writeln!(f, "storage failures  {}", self.storage_failures)?;
        write!(f, "rejected          {}", self.rejected_total())?;
        for (kind, count) in &self.rejected {
            write!(f, "\n  {kind:<24}{count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reject_counters() {
        let mut summary = IngestSummary::default();
        summary.record_reject(RejectKind::InvalidCrc);
        summary.record_reject(RejectKind::InvalidCrc);
        summary.record_reject(RejectKind::MicValidation);

        assert_eq!(summary.rejected_of(RejectKind::InvalidCrc), 2);
        assert_eq!(summary.rejected_of(RejectKind::LineParse), 0);
        assert_eq!(summary.rejected_total(), 3);
    }

    #[test]
    fn test_summary_json_uses_kind_names() {
        let mut summary = IngestSummary {
            lines: 4,
            persisted: 1,
            ..IngestSummary::default()
        };
        summary.record_reject(RejectKind::UnexpectedFramePayload);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["lines"], 4);
        assert_eq!(json["rejected"]["unexpected_frame_payload"], 1);
    }

    #[test]
    fn test_summary_display_lists_kinds() {
        let mut summary = IngestSummary::default();
        summary.record_reject(RejectKind::LineParse);

        let text = summary.to_string();
        assert!(text.contains("rejected          1"));
        assert!(text.contains("line_parse"));
    }
}

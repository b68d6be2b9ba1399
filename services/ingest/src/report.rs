//! Run report: what was ingested, and every gap a human should audit.

use crate::error::{IngestError, IngestResult};
use crate::model::Category;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub category: Category,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub plants_matched: Vec<String>,
    /// Matched plants absent from the registry, emitted with fallback values.
    pub registry_misses: Vec<String>,
    pub coercion_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSource {
    pub source: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuppressedPair {
    pub source: String,
    pub plant: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub sources: Vec<SourceSummary>,
    pub skipped_sources: Vec<SkippedSource>,
    /// Mapped plants absent from the registry (priced at 0, type Unknown).
    pub registry_misses: Vec<String>,
    /// Merit plants with no alias entry.
    pub merit_without_alias: Vec<String>,
    /// Mapped plants that matched no column in any processed source.
    pub unmatched_plants: Vec<String>,
    pub suppressed: Vec<SuppressedPair>,
    pub source_rows: usize,
    pub fact_rows: usize,
}

impl IngestReport {
    pub fn skip(&mut self, source: &str, error: &IngestError) {
        warn!(source, kind = error.kind(), %error, "source skipped");
        self.skipped_sources.push(SkippedSource {
            source: source.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    pub fn coercion_failures(&self) -> usize {
        self.sources.iter().map(|s| s.coercion_failures).sum()
    }

    /// True when anything was skipped or left uncovered.
    pub fn has_gaps(&self) -> bool {
        !self.skipped_sources.is_empty()
            || !self.registry_misses.is_empty()
            || !self.merit_without_alias.is_empty()
            || !self.unmatched_plants.is_empty()
    }

    pub fn log_summary(&self) {
        for source in &self.sources {
            info!(
                source = %source.source,
                category = %source.category,
                rows_kept = source.rows_kept,
                rows_dropped = source.rows_dropped,
                plants = source.plants_matched.len(),
                registry_misses = source.registry_misses.len(),
                coercion_failures = source.coercion_failures,
                "source ingested"
            );
        }
        for skipped in &self.skipped_sources {
            warn!(source = %skipped.source, kind = %skipped.kind, "skipped: {}", skipped.message);
        }
        for plant in &self.registry_misses {
            warn!(plant = %plant, "not in registry; price 0, type Unknown");
        }
        for plant in &self.merit_without_alias {
            warn!(plant = %plant, "merit plant has no alias entry");
        }
        for plant in &self.unmatched_plants {
            warn!(plant = %plant, "no column matched in any source");
        }
        for pair in &self.suppressed {
            info!(source = %pair.source, plant = %pair.plant, reason = %pair.reason, "suppressed");
        }
        info!(
            sources = self.sources.len(),
            skipped = self.skipped_sources.len(),
            source_rows = self.source_rows,
            fact_rows = self.fact_rows,
            coercion_failures = self.coercion_failures(),
            "ingestion summary"
        );
    }

    pub fn write_json(&self, path: &Path) -> IngestResult<()> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| IngestError::io(path, std::io::Error::other(e)))?;
        std::fs::write(path, body).map_err(|e| IngestError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_skip_is_recorded_with_kind() {
        let mut report = IngestReport::default();
        report.skip("ipp.csv", &IngestError::SourceUnavailable(PathBuf::from("data/ipp.csv")));
        assert_eq!(report.skipped_sources.len(), 1);
        assert_eq!(report.skipped_sources[0].kind, "SourceUnavailable");
        assert!(report.has_gaps());
    }

    #[test]
    fn test_clean_report_has_no_gaps() {
        let report = IngestReport {
            fact_rows: 96,
            ..Default::default()
        };
        assert!(!report.has_gaps());
    }

    #[test]
    fn test_json_shape() {
        let mut report = IngestReport::default();
        report.sources.push(SourceSummary {
            source: "trader.csv".into(),
            category: Category::Central,
            rows_read: 98,
            rows_kept: 96,
            rows_dropped: 2,
            plants_matched: vec!["MEJA".into(), "TANDA".into()],
            registry_misses: vec!["TANDA".into()],
            coercion_failures: 1,
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sources"][0]["category"], "Central");
        assert_eq!(json["sources"][0]["rows_kept"], 96);
        assert_eq!(json["sources"][0]["registry_misses"][0], "TANDA");
        assert_eq!(report.coercion_failures(), 1);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        IngestReport::default().write_json(&path).unwrap();
        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["fact_rows"], 0);
    }
}

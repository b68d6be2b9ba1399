//! Error kinds for the ingestion pipeline.
//!
//! Per-source and per-plant errors are recoverable: the pipeline logs them,
//! records them in the run report and moves on. Failing to load the registry
//! or alias mapping, or to write the store, aborts a run.

use std::path::PathBuf;
use thiserror::Error;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source file not found: {}", .0.display())]
    SourceUnavailable(PathBuf),

    #[error("header recipe does not fit {source_name}: {detail}")]
    HeaderParseFailure { source_name: String, detail: String },

    #[error("no time block / time description column in {0}")]
    TimeKeyNotFound(String),

    #[error("plant '{0}' not present in registry")]
    RegistryLookupMiss(String),

    #[error("not a number: '{0}'")]
    NumericCoercionFailure(String),

    #[error("registry: {0}")]
    Registry(String),

    #[error("alias mapping: {0}")]
    AliasMapping(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl IngestError {
    /// Stable label used in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::SourceUnavailable(_) => "SourceUnavailable",
            IngestError::HeaderParseFailure { .. } => "HeaderParseFailure",
            IngestError::TimeKeyNotFound(_) => "TimeKeyNotFound",
            IngestError::RegistryLookupMiss(_) => "RegistryLookupMiss",
            IngestError::NumericCoercionFailure(_) => "NumericCoercionFailure",
            IngestError::Registry(_) => "Registry",
            IngestError::AliasMapping(_) => "AliasMapping",
            IngestError::Io { .. } => "Io",
            IngestError::Csv(_) => "Csv",
            IngestError::Store(_) => "Store",
        }
    }

    /// Whether the whole run has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Registry(_) | IngestError::AliasMapping(_) | IngestError::Store(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            IngestError::SourceUnavailable(PathBuf::from("x.csv")).kind(),
            "SourceUnavailable"
        );
        assert_eq!(
            IngestError::TimeKeyNotFound("x.csv".into()).kind(),
            "TimeKeyNotFound"
        );
    }

    #[test]
    fn test_only_identity_sources_are_fatal() {
        assert!(IngestError::Registry("bad".into()).is_fatal());
        assert!(IngestError::AliasMapping("bad".into()).is_fatal());
        assert!(!IngestError::SourceUnavailable(PathBuf::from("x.csv")).is_fatal());
        assert!(!IngestError::RegistryLookupMiss("MEJA".into()).is_fatal());
        assert!(!IngestError::HeaderParseFailure {
            source_name: "x.csv".into(),
            detail: "short".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_mentions_path() {
        let err = IngestError::SourceUnavailable(PathBuf::from("data/ipp.csv"));
        assert!(err.to_string().contains("data/ipp.csv"));
    }
}

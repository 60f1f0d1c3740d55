//! Error types for the analysis pipeline.
//!
//! Only fatal conditions live here. Degenerate populations (zero variance)
//! are absorbed by the scorer as undefined z-scores, and empty result sets
//! flow through as empty tables.

use thiserror::Error;

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The transaction store could not be opened or queried.
    #[error("Transaction store unavailable ({location}): {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: sqlx::Error,
    },

    /// The `transactions` table lacks expected columns.
    #[error("Schema mismatch: missing columns in `transactions`: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Report I/O error: {0}")]
    Report(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Summary serialization error: {0}")]
    Summary(#[from] serde_json::Error),
}

/// Result type alias for pipeline operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

impl AnalysisError {
    pub fn source_unavailable(location: impl Into<String>, source: sqlx::Error) -> Self {
        Self::SourceUnavailable {
            location: location.into(),
            source,
        }
    }

    /// Whether this error aborted the run before any aggregation happened.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::SchemaMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_lists_columns() {
        let err = AnalysisError::SchemaMismatch {
            missing: vec!["amount".to_string(), "fraud".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Schema mismatch: missing columns in `transactions`: amount, fraud"
        );
        assert!(err.is_input_error());
    }

    #[test]
    fn test_io_error_is_not_input_error() {
        let err = AnalysisError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!err.is_input_error());
        assert!(err.to_string().contains("denied"));
    }
}

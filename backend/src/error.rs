//! Error types for the FINEST analytics service.
//!
//! Each layer owns one error type:
//!
//! - [`IngestionError`] - CSV reading, column presence, cell coercion
//! - [`ComputationError`] - undefined ratios (normalised to NaN, never propagated)
//! - [`ExportError`] - report assembly and rendering
//! - [`EventLogError`] - append-only event log writes
//! - [`ServerError`] - HTTP layer
//!
//! Conversion into [`ServerError`] is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while turning an uploaded CSV into a transaction table.
///
/// Any of these aborts the whole upload: no partial table is ever produced.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Failed to read the input.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes are not valid in the detected (or named) encoding.
    #[error("Cannot decode input: {0}")]
    Encoding(String),

    /// The file has a header but no data rows, or no content at all.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No header line found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// One or more required columns are absent (after renaming).
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A numeric column holds something that is not a number.
    #[error("Line {line}, column '{column}' (value '{value}'): not a number")]
    InvalidNumber {
        line: usize,
        column: String,
        value: String,
    },

    /// `request_time` could not be parsed as a date-time.
    #[error("Line {line}, column 'request_time' (value '{value}'): unparseable date-time")]
    InvalidTimestamp { line: usize, value: String },

    /// The CSV structure itself is broken (ragged record, bad quoting).
    #[error("Line {line}: malformed CSV record: {message}")]
    Malformed { line: usize, message: String },
}

// =============================================================================
// Computation Errors
// =============================================================================

/// Undefined arithmetic inside a rollup.
///
/// These are reported to the log service and replaced by the NaN sentinel;
/// they never escape the pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComputationError {
    /// A ratio whose denominator summed to zero for one key.
    #[error("Division by zero computing {metric} for '{key}'")]
    DivisionByZero { metric: &'static str, key: String },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while assembling or writing a report.
///
/// Fatal to the export action only; the loaded session is unaffected.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Two charts share a title, so page order would be ambiguous.
    #[error("Duplicate chart title: {0}")]
    DuplicateChart(String),

    /// Filesystem failure (missing permissions, full disk).
    #[error("Report IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document serialisation failure.
    #[error("Report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Event Log Errors
// =============================================================================

/// Errors appending to the transaction/event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// IO error.
    #[error("Event log IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Event log JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Upload could not be ingested.
    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// Report export failed.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No dataset has been uploaded in this session yet.
    #[error("No dataset loaded; upload a CSV first")]
    NoSession,

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Result type for report export.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for event log writes.
pub type EventLogResult<T> = Result<T, EventLogError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let ingest = IngestionError::EmptyFile;
        let server: ServerError = ingest.into();
        assert!(server.to_string().contains("empty"));

        let export = ExportError::DuplicateChart("Channel Analysis".into());
        let server: ServerError = export.into();
        assert!(server.to_string().contains("Channel Analysis"));
    }

    #[test]
    fn test_missing_columns_lists_all() {
        let err = IngestionError::MissingColumns(vec!["Amount".into(), "P&L".into()]);
        assert_eq!(err.to_string(), "Missing required columns: Amount, P&L");
    }

    #[test]
    fn test_invalid_number_format() {
        let err = IngestionError::InvalidNumber {
            line: 7,
            column: "Amount".into(),
            value: "abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Line 7"));
        assert!(msg.contains("column 'Amount'"));
        assert!(msg.contains("value 'abc'"));
    }

    #[test]
    fn test_encoding_error_message() {
        let err = IngestionError::Encoding("invalid utf-8 byte sequence".into());
        assert_eq!(err.to_string(), "Cannot decode input: invalid utf-8 byte sequence");
    }

    #[test]
    fn test_division_by_zero_names_metric_and_key() {
        let err = ComputationError::DivisionByZero {
            metric: "fee_ratio",
            key: "Card".into(),
        };
        assert_eq!(err.to_string(), "Division by zero computing fee_ratio for 'Card'");
    }
}

//! Error types for the Partlens reshaping pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`LoadError`] - reading one input file into a table
//! - [`PipelineError`] - top-level orchestration errors for one batch
//! - [`ServerError`] - HTTP layer errors
//!
//! Data-shape problems (missing columns, empty codes) are never errors:
//! the transforms degrade and report through
//! [`Diagnostics`](crate::models::Diagnostics) instead. Only the inability
//! to load an input file aborts a batch.

use thiserror::Error;

use crate::models::TableKind;

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while loading an input file into a text table.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Malformed delimited text.
    #[error("Invalid CSV format (line {line}): {message}")]
    Parse { line: u64, message: String },

    /// Workbook could not be opened or read.
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    /// Workbook contains no worksheet.
    #[error("Workbook has no worksheet")]
    NoSheet,

    /// Empty file.
    #[error("File is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found")]
    NoHeaders,
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        LoadError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// Returned by [`crate::transform::pipeline::run_pipeline`]. Either the
/// batch was incomplete or one of its files could not be loaded; in both
/// cases no partial snapshot is produced.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more required tables were not supplied.
    #[error("Missing input table(s): {}", join_kinds(.0))]
    MissingInput(Vec<TableKind>),

    /// An input file could not be loaded.
    #[error("Failed to load {table} table: {source}")]
    Load {
        table: TableKind,
        #[source]
        source: LoadError,
    },
}

fn join_kinds(kinds: &[TableKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown session.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but nothing was uploaded yet.
    #[error("Session {0} has no data yet")]
    NoSnapshot(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_lists_tables() {
        let err = PipelineError::MissingInput(vec![TableKind::Products, TableKind::Applications]);
        let msg = err.to_string();
        assert!(msg.contains("products"));
        assert!(msg.contains("applications"));
        assert!(!msg.contains("references"));
    }

    #[test]
    fn test_load_error_names_table() {
        let err = PipelineError::Load {
            table: TableKind::References,
            source: LoadError::EmptyFile,
        };
        let msg = err.to_string();
        assert!(msg.contains("references"));
        assert!(msg.contains("empty"));
    }

    #[test]
    fn test_error_conversion_chain() {
        let pipeline_err = PipelineError::MissingInput(vec![TableKind::References]);
        let server_err: ServerError = pipeline_err.into();
        assert!(server_err.to_string().contains("references"));
    }
}

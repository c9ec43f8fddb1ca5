//! Error types for lochist-store.

use std::path::PathBuf;

use lochist_types::ValidationError;

/// Result type for lochist-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lochist-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database could not be opened, read or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The existing database has a structure this version cannot use.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A calendar date that does not exist.
    #[error("Invalid date: {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    /// A batch was rolled back; none of its records were stored.
    #[error("Batch insert failed, 0 of {attempted} records inserted: {source}")]
    BatchInsert {
        attempted: usize,
        source: rusqlite::Error,
    },

    /// A candidate failed validation before the batch was written.
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] ValidationError),

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

//! Error types for OspreyDB.

use thiserror::Error;

/// Result type alias using OspreyError.
pub type Result<T> = std::result::Result<T, OspreyError>;

/// Errors that can occur in OspreyDB operations.
#[derive(Debug, Error)]
pub enum OspreyError {
    // I/O and file errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    FileNotFound(String),

    // Page and buffer errors
    #[error("page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: u64, reason: String },

    #[error("buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Index errors
    #[error("index node full")]
    NodeFull,

    #[error("key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    // Scan errors
    #[error("scan iterator failure: {0}")]
    ScanIterator(String),

    #[error("invalid scan delete: {0}")]
    ScanDelete(String),

    #[error("scan teardown failure: {0}")]
    ScanTeardown(String),

    // Join and resolution errors
    #[error("resolution failure: {0}")]
    Resolution(String),

    #[error("format failure: {0}")]
    Format(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    // Schema errors
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("arity mismatch: expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("value too wide for column {column}: {size} bytes (max {max})")]
    ValueTooWide {
        column: String,
        size: usize,
        max: usize,
    },

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

//! Error types for blockheap
//!
//! Provides a unified error type for all table operations.

use thiserror::Error;

/// Result type alias using HeapError
pub type Result<T> = std::result::Result<T, HeapError>;

/// Unified error type for blockheap operations
#[derive(Debug, Error)]
pub enum HeapError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Table Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Record too large: {size} bytes (limit {limit})")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("Row width mismatch: table stores {expected} bytes, codec produces {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("No current row: the cursor has not yielded a row to mutate")]
    NoCurrentRow,

    // -------------------------------------------------------------------------
    // File Format Errors
    // -------------------------------------------------------------------------
    #[error("Table file corruption detected: {0}")]
    Corruption(String),

    #[error("Table file is full: growing to {0} bytes exceeds the i32 offset range")]
    TableFull(u64),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HeapError {
    /// Whether this error means the table file can no longer be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(self, HeapError::Corruption(_))
    }
}

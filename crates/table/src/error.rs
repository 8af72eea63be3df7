use std::io;
use thiserror::Error;

/// Errors that can occur while reading or writing a table file.
#[derive(Debug, Error)]
pub enum TableError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file failed structural validation (bad magic, truncated
    /// sections, CRC mismatch, or an index pointing at garbage).
    #[error("corrupt table: {0}")]
    Corrupt(String),

    /// A record was rejected before being written (oversized field,
    /// limits set after records were added, and similar misuse).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Records must be added in table order: refs ascending by name,
    /// logs ascending by name and descending by update index.
    #[error("record {got:?} added out of order after {prev:?}")]
    OutOfOrder { prev: String, got: String },

    /// A record's update index fell outside the writer's declared limits.
    #[error("update index {index} outside writer limits [{min}, {max}]")]
    OutsideLimits { index: u64, min: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, TableError>;

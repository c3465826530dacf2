//! Storage layer error types.

use thiserror::Error;

use crate::storage::block::BlockId;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("offset out of bounds: {op} at offset {offset} needs {width} bytes (capacity: {capacity})")]
    OutOfBounds {
        op: &'static str,
        offset: usize,
        width: usize,
        capacity: usize,
    },

    #[error("{op}: payload contains a zero byte at position {position}")]
    EmbeddedNul { op: &'static str, position: usize },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Log record is too large: requires {required} bytes but a block holds at most {available}")]
    RecordTooLarge { required: usize, available: usize },

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    #[error("Buffer size must be the block size ({expected}), got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),

    #[error("Malformed page: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

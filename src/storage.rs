//! Storage layer implementation for blockwal.
//!
//! This module provides the foundation for persistent data storage using a
//! block-based architecture. Key components:
//!
//! - **BlockId**: Names one fixed-size block of a file, the unit of I/O
//! - **Page**: In-memory image of one block with typed field accessors
//! - **FileManager**: Reads and writes whole blocks to disk (or memory)
//!
//! The write-ahead log in [`crate::wal`] is built directly on these pieces.

pub mod block;
pub mod error;
pub mod file;
pub mod page;

pub use block::BlockId;
pub use error::{StorageError, StorageResult};
pub use file::{DiskFileManager, FileManager, MemoryFileManager};
pub use page::{Page, PageId};

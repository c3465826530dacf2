//! Write-Ahead Logging (WAL) module.
//!
//! The log is an append-only file of fixed-size blocks. Inside each block,
//! records are packed from the end of the page toward the front:
//!
//! ```text
//! 0        4                 boundary                       block_size
//! +--------+-----------------+----------+---------+---------+
//! |boundary|   free space    | record n |   ...   | record 1|
//! +--------+-----------------+----------+---------+---------+
//! ```
//!
//! Each record is stored as a 4-byte big-endian length followed by its bytes.
//! Reading from the boundary toward the end of the page therefore visits the
//! newest record first.

pub mod iterator;
pub mod manager;

pub use iterator::LogIterator;
pub use manager::{LogManager, Lsn};

//! Log manager implementation.
//!
//! The log manager owns the tail block of the log file. It packs appended
//! records into that block, rotates to a fresh block when the current one is
//! full, and tracks which LSNs have reached disk.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use parking_lot::Mutex;

use super::iterator::LogIterator;
use crate::storage::{BlockId, FileManager, Page, StorageError, StorageResult};

/// Offset of the boundary field in every log block.
pub(crate) const BOUNDARY_OFFSET: usize = 0;

/// Width of the boundary field; records never start before this offset.
pub(crate) const BOUNDARY_SIZE: usize = Page::INT_SIZE;

/// Log Sequence Number.
/// Assigned to every appended record, starting at 1. LSN 0 means "nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(pub u64);

impl Lsn {
    pub fn new() -> Self {
        Lsn(0)
    }

    pub fn next(&self) -> Self {
        Lsn(self.0 + 1)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LSN({})", self.0)
    }
}

/// Read and validate the boundary field of a log block.
pub(crate) fn read_boundary(page: &Page) -> StorageResult<usize> {
    let boundary = page.get_int(BOUNDARY_OFFSET)? as usize;
    if boundary < BOUNDARY_SIZE || boundary > page.capacity() {
        return Err(StorageError::Corrupted(format!(
            "log boundary {boundary} outside [{BOUNDARY_SIZE}, {}]",
            page.capacity()
        )));
    }
    Ok(boundary)
}

/// Persist an empty log block as `block` and return its page.
///
/// The page is only handed back once the write succeeded, so a failed
/// rotation never touches the page of the current block.
fn format_block(file_manager: &dyn FileManager, block: &BlockId) -> StorageResult<Page> {
    let page = Page::new(file_manager.block_size());
    page.set_int(BOUNDARY_OFFSET, page.capacity() as u32)?;
    file_manager.write(block, &page)?;
    Ok(page)
}

/// Append-only log built from fixed-size blocks.
///
/// Cloning is cheap; all clones share the same tail block and counters.
#[derive(Clone)]
pub struct LogManager {
    inner: Arc<LogManagerInner>,
}

struct LogManagerInner {
    file_manager: Arc<dyn FileManager>,
    log_file: String,
    state: Mutex<LogState>,
}

struct LogState {
    current_block: BlockId,
    log_page: Page,
    /// Blocks allocated to the log file so far.
    log_size: u32,
    latest_lsn: Lsn,
    /// Every record up to this LSN is on disk.
    last_saved_lsn: Lsn,
}

impl LogManager {
    /// Open the log stored in `log_file`, creating its first block if the
    /// file is empty.
    ///
    /// The last block of an existing log becomes the current block as-is.
    /// LSNs continue from the number of records already in the log. Counting
    /// them reads every block, so opening takes time linear in the log size.
    pub fn open(
        file_manager: Arc<dyn FileManager>,
        log_file: impl Into<String>,
    ) -> StorageResult<Self> {
        let log_file = log_file.into();
        let block_size = file_manager.block_size();
        if block_size < BOUNDARY_SIZE + Page::blob_size(0) || block_size > u32::MAX as usize {
            return Err(StorageError::InvalidBlockSize(block_size));
        }

        let blocks = file_manager.length_in_blocks(&log_file)?;
        let (current_block, log_page, log_size) = if blocks == 0 {
            let block = BlockId::new(log_file.as_str(), 0);
            let log_page = format_block(file_manager.as_ref(), &block)?;
            debug!("Created log {} with block size {}", log_file, block_size);
            (block, log_page, 1)
        } else {
            let block = BlockId::new(log_file.as_str(), blocks - 1);
            let log_page = Page::new(block_size);
            file_manager.read(&block, &log_page)?;
            read_boundary(&log_page)?;
            (block, log_page, blocks)
        };

        let mut existing = 0u64;
        for record in LogIterator::new(Arc::clone(&file_manager), current_block.clone())? {
            record?;
            existing += 1;
        }
        debug!(
            "Opened log {} at {} with {} existing records",
            log_file, current_block, existing
        );

        Ok(LogManager {
            inner: Arc::new(LogManagerInner {
                file_manager,
                log_file,
                state: Mutex::new(LogState {
                    current_block,
                    log_page,
                    log_size,
                    latest_lsn: Lsn(existing),
                    last_saved_lsn: Lsn(existing),
                }),
            }),
        })
    }

    /// Append a record and return its LSN.
    ///
    /// The record is only guaranteed to be on disk after a later flush.
    pub fn append(&self, record: &[u8]) -> StorageResult<Lsn> {
        let bytes_needed = Page::blob_size(record.len());
        let available = self.block_size() - BOUNDARY_SIZE;
        if bytes_needed > available {
            return Err(StorageError::RecordTooLarge {
                required: bytes_needed,
                available,
            });
        }

        let mut state = self.inner.state.lock();
        let mut boundary = read_boundary(&state.log_page)?;
        if boundary < BOUNDARY_SIZE + bytes_needed {
            self.inner.flush_locked(&mut state)?;
            self.inner.append_new_block(&mut state)?;
            boundary = read_boundary(&state.log_page)?;
        }

        let record_pos = boundary - bytes_needed;
        state.log_page.set_blob(record_pos, record)?;
        state
            .log_page
            .set_int(BOUNDARY_OFFSET, record_pos as u32)?;
        state.latest_lsn = state.latest_lsn.next();
        Ok(state.latest_lsn)
    }

    /// Write the current block to disk.
    pub fn flush(&self) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        self.inner.flush_locked(&mut state)
    }

    /// Make sure the record with `lsn` is on disk, flushing only if it is not
    /// already.
    pub fn flush_lsn(&self, lsn: Lsn) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        if lsn > state.last_saved_lsn {
            self.inner.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Flush on a background thread without blocking the caller.
    ///
    /// The background thread takes the manager lock before it looks at the
    /// current block, so it never writes a page under the wrong block id.
    /// A failed flush is logged, not returned.
    pub fn flush_async(&self) -> StorageResult<JoinHandle<()>> {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("wal-flush".to_string())
            .spawn(move || {
                let mut state = inner.state.lock();
                if let Err(e) = inner.flush_locked(&mut state) {
                    error!("Async flush of {} failed: {}", state.current_block, e);
                }
            })?;
        Ok(handle)
    }

    /// Force everything appended so far to disk and return the LSN that is
    /// now durable.
    pub fn checkpoint(&self) -> StorageResult<Lsn> {
        let mut state = self.inner.state.lock();
        self.inner.flush_locked(&mut state)?;
        info!(
            "Checkpoint created at {} in {}",
            state.last_saved_lsn, state.current_block
        );
        Ok(state.last_saved_lsn)
    }

    /// Iterate over every record, newest first.
    ///
    /// Pending records are flushed first so the iterator sees all of them.
    pub fn iterator(&self) -> StorageResult<LogIterator> {
        let current_block = {
            let mut state = self.inner.state.lock();
            self.inner.flush_locked(&mut state)?;
            state.current_block.clone()
        };
        LogIterator::new(Arc::clone(&self.inner.file_manager), current_block)
    }

    pub fn latest_lsn(&self) -> Lsn {
        self.inner.state.lock().latest_lsn
    }

    pub fn last_saved_lsn(&self) -> Lsn {
        self.inner.state.lock().last_saved_lsn
    }

    pub fn current_block(&self) -> BlockId {
        self.inner.state.lock().current_block.clone()
    }

    pub fn log_size(&self) -> u32 {
        self.inner.state.lock().log_size
    }

    pub fn log_file(&self) -> &str {
        &self.inner.log_file
    }

    pub fn block_size(&self) -> usize {
        self.inner.file_manager.block_size()
    }
}

impl LogManagerInner {
    fn flush_locked(&self, state: &mut LogState) -> StorageResult<()> {
        self.file_manager
            .write(&state.current_block, &state.log_page)?;
        state.last_saved_lsn = state.latest_lsn;
        Ok(())
    }

    fn append_new_block(&self, state: &mut LogState) -> StorageResult<()> {
        let block = BlockId::new(self.log_file.as_str(), state.log_size);
        let log_page = format_block(self.file_manager.as_ref(), &block)?;
        debug!("Log rotated from {} to {}", state.current_block, block);
        state.log_page = log_page;
        state.current_block = block;
        state.log_size += 1;
        Ok(())
    }
}

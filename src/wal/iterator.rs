//! Newest-first iteration over log records.

use std::iter::FusedIterator;
use std::sync::Arc;

use super::manager::read_boundary;
use crate::storage::{BlockId, FileManager, Page, StorageResult};

/// Walks the log backward, one block at a time.
///
/// Starts at the given block and moves toward block 0. Within a block,
/// records are read from the boundary toward the end of the page, which is
/// newest to oldest. Blocks are loaded lazily through the file manager.
/// After an error the iterator is exhausted.
pub struct LogIterator {
    file_manager: Arc<dyn FileManager>,
    block: BlockId,
    page: Page,
    position: usize,
    done: bool,
}

impl LogIterator {
    pub(crate) fn new(file_manager: Arc<dyn FileManager>, block: BlockId) -> StorageResult<Self> {
        let page = Page::new(file_manager.block_size());
        file_manager.read(&block, &page)?;
        let position = read_boundary(&page)?;
        Ok(Self {
            file_manager,
            block,
            page,
            position,
            done: false,
        })
    }

    /// Whether another record remains. May load earlier blocks to find out.
    pub fn has_next(&mut self) -> StorageResult<bool> {
        if self.done {
            return Ok(false);
        }
        self.advance()
    }

    /// Block the next record will be read from.
    pub fn block(&self) -> &BlockId {
        &self.block
    }

    /// Skip exhausted blocks. Returns false once block 0 is used up.
    fn advance(&mut self) -> StorageResult<bool> {
        while self.position >= self.page.capacity() {
            let Some(previous) = self.block.previous() else {
                return Ok(false);
            };
            self.file_manager.read(&previous, &self.page)?;
            self.position = read_boundary(&self.page)?;
            self.block = previous;
        }
        Ok(true)
    }

    fn read_record(&mut self) -> StorageResult<Vec<u8>> {
        let record = self.page.get_blob(self.position)?;
        self.position += Page::blob_size(record.len());
        Ok(record)
    }
}

impl Iterator for LogIterator {
    type Item = StorageResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.advance() {
            Ok(false) => {
                self.done = true;
                return None;
            }
            Ok(true) => self.read_record(),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

impl FusedIterator for LogIterator {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryFileManager, StorageError};
    use crate::wal::manager::{BOUNDARY_OFFSET, LogManager};

    const LOG_FILE: &str = "iter.log";

    #[test]
    fn test_has_next_on_empty_log() {
        let fm = Arc::new(MemoryFileManager::new(64));
        let manager = LogManager::open(fm, LOG_FILE).unwrap();
        let mut iter = manager.iterator().unwrap();

        assert!(!iter.has_next().unwrap());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_has_next_tracks_remaining_records() {
        let fm = Arc::new(MemoryFileManager::new(64));
        let manager = LogManager::open(fm, LOG_FILE).unwrap();
        manager.append(b"first").unwrap();
        manager.append(b"second").unwrap();

        let mut iter = manager.iterator().unwrap();
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().unwrap(), b"second");
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().unwrap(), b"first");
        assert!(!iter.has_next().unwrap());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_skips_empty_tail_block() {
        let fm = Arc::new(MemoryFileManager::new(64));
        let manager = LogManager::open(fm.clone(), LOG_FILE).unwrap();
        manager.append(b"only").unwrap();
        manager.flush().unwrap();

        // A formatted but unused block, as left by a crash right after rotation.
        let empty = Page::new(64);
        empty.set_int(BOUNDARY_OFFSET, 64).unwrap();
        fm.write(&BlockId::new(LOG_FILE, 1), &empty).unwrap();

        let mut iter = LogIterator::new(fm, BlockId::new(LOG_FILE, 1)).unwrap();
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.block(), &BlockId::new(LOG_FILE, 0));
        assert_eq!(iter.next().unwrap().unwrap(), b"only");
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_corrupted_record_stops_iteration() {
        let fm = Arc::new(MemoryFileManager::new(64));
        let page = Page::new(64);
        page.set_int(BOUNDARY_OFFSET, 56).unwrap();
        // Length claims more bytes than the page has left.
        page.set_int(56, 100).unwrap();
        fm.write(&BlockId::new(LOG_FILE, 0), &page).unwrap();

        let mut iter = LogIterator::new(fm, BlockId::new(LOG_FILE, 0)).unwrap();
        assert!(matches!(iter.next(), Some(Err(StorageError::Corrupted(_)))));
        assert!(iter.next().is_none());
    }
}

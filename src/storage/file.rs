//! Block-level file I/O.
//!
//! [`FileManager`] is the narrow interface the log manager needs from the
//! disk: read a block into a page, write a page to a block, and report how
//! many blocks a file holds. Writing a block and reading it back must return
//! byte-identical content.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::storage::block::BlockId;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::Page;

pub trait FileManager: Send + Sync {
    /// Load `block` into `page`.
    fn read(&self, block: &BlockId, page: &Page) -> StorageResult<()>;

    /// Persist `page` as the content of `block`, extending the file if needed.
    fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()>;

    /// Number of whole blocks currently stored in `file_name`.
    fn length_in_blocks(&self, file_name: &str) -> StorageResult<u32>;

    fn block_size(&self) -> usize;
}

fn check_page_size(expected: usize, page: &Page) -> StorageResult<()> {
    if page.capacity() != expected {
        return Err(StorageError::SizeMismatch {
            expected,
            actual: page.capacity(),
        });
    }
    Ok(())
}

/// Stores each file as a sequence of fixed-size blocks under one directory.
pub struct DiskFileManager {
    dir: PathBuf,
    block_size: usize,
    open_files: Mutex<HashMap<String, File>>,
}

impl DiskFileManager {
    pub fn new(dir: &Path, block_size: usize) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            block_size,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn with_file<T>(
        &self,
        file_name: &str,
        f: impl FnOnce(&mut File) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut open_files = self.open_files.lock();
        if !open_files.contains_key(file_name) {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.dir.join(file_name))?;
            open_files.insert(file_name.to_string(), file);
        }
        match open_files.get_mut(file_name) {
            Some(file) => f(file),
            None => Err(StorageError::Io(std::io::Error::other(format!(
                "file {file_name} is not open"
            )))),
        }
    }

    fn block_offset(&self, block: &BlockId) -> u64 {
        block.number() as u64 * self.block_size as u64
    }
}

impl FileManager for DiskFileManager {
    fn read(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        check_page_size(self.block_size, page)?;
        let offset = self.block_offset(block);
        let block_size = self.block_size as u64;

        self.with_file(block.file_name(), |file| {
            let file_size = file.metadata()?.len();
            if offset + block_size > file_size {
                return Err(StorageError::BlockNotFound(block.clone()));
            }

            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut page.contents_mut())?;
            Ok(())
        })
    }

    fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        check_page_size(self.block_size, page)?;
        let offset = self.block_offset(block);

        self.with_file(block.file_name(), |file| {
            let file_size = file.metadata()?.len();

            // Extend file if necessary
            let end = offset + self.block_size as u64;
            if end > file_size {
                file.set_len(end)?;
            }

            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&page.contents())?;
            file.sync_all()?;
            Ok(())
        })
    }

    fn length_in_blocks(&self, file_name: &str) -> StorageResult<u32> {
        let block_size = self.block_size as u64;
        self.with_file(file_name, |file| {
            let file_size = file.metadata()?.len();
            Ok((file_size / block_size) as u32)
        })
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Keeps blocks in memory. Same contract as [`DiskFileManager`], nothing
/// survives the process.
pub struct MemoryFileManager {
    block_size: usize,
    blocks: DashMap<BlockId, Vec<u8>>,
}

impl MemoryFileManager {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: DashMap::new(),
        }
    }
}

impl FileManager for MemoryFileManager {
    fn read(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        check_page_size(self.block_size, page)?;
        let stored = self
            .blocks
            .get(block)
            .ok_or_else(|| StorageError::BlockNotFound(block.clone()))?;
        page.contents_mut().copy_from_slice(stored.value());
        Ok(())
    }

    fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        check_page_size(self.block_size, page)?;
        // Blocks always form a prefix, so a present predecessor means no gap.
        let needs_backfill = block
            .previous()
            .is_some_and(|previous| !self.blocks.contains_key(&previous));
        if needs_backfill {
            // Writing past the end leaves zeroed blocks behind, like a file extend.
            for number in 0..block.number() {
                self.blocks
                    .entry(BlockId::new(block.file_name(), number))
                    .or_insert_with(|| vec![0u8; self.block_size]);
            }
        }

        let bytes = page.contents().to_vec();
        self.blocks.insert(block.clone(), bytes);
        Ok(())
    }

    fn length_in_blocks(&self, file_name: &str) -> StorageResult<u32> {
        Ok(self
            .blocks
            .iter()
            .filter(|entry| entry.key().file_name() == file_name)
            .map(|entry| entry.key().number() + 1)
            .max()
            .unwrap_or(0))
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const BLOCK_SIZE: usize = 256;

    fn page_filled_with(byte: u8) -> Page {
        Page::from_bytes(vec![byte; BLOCK_SIZE])
    }

    fn check_round_trip(fm: &dyn FileManager) -> Result<()> {
        let block = BlockId::new("test.db", 0);
        let page = Page::new(BLOCK_SIZE);
        page.set_int(0, 42)?;
        page.set_string(100, "persisted")?;
        fm.write(&block, &page)?;

        let loaded = Page::new(BLOCK_SIZE);
        fm.read(&block, &loaded)?;
        assert_eq!(&*loaded.contents(), &*page.contents());
        assert_eq!(loaded.get_string(100)?, "persisted");
        Ok(())
    }

    fn check_growth(fm: &dyn FileManager) -> Result<()> {
        assert_eq!(fm.length_in_blocks("test.db")?, 0);

        // Write to block 5 (skipping 0-4)
        fm.write(&BlockId::new("test.db", 5), &page_filled_with(5))?;
        assert_eq!(fm.length_in_blocks("test.db")?, 6);
        assert_eq!(fm.length_in_blocks("other.db")?, 0);

        let gap = page_filled_with(9);
        fm.read(&BlockId::new("test.db", 2), &gap)?;
        assert!(gap.contents().iter().all(|&b| b == 0));
        Ok(())
    }

    fn check_missing_block(fm: &dyn FileManager) -> Result<()> {
        let page = Page::new(BLOCK_SIZE);
        let result = fm.read(&BlockId::new("test.db", 10), &page);
        assert!(matches!(result, Err(StorageError::BlockNotFound(_))));
        Ok(())
    }

    fn check_size_mismatch(fm: &dyn FileManager) -> Result<()> {
        let small = Page::new(100);
        let block = BlockId::new("test.db", 0);
        assert!(matches!(
            fm.write(&block, &small),
            Err(StorageError::SizeMismatch { expected: BLOCK_SIZE, actual: 100 })
        ));
        assert!(fm.read(&block, &small).is_err());
        Ok(())
    }

    #[test]
    fn test_disk_round_trip() -> Result<()> {
        let dir = tempdir()?;
        check_round_trip(&DiskFileManager::new(dir.path(), BLOCK_SIZE)?)
    }

    #[test]
    fn test_disk_growth() -> Result<()> {
        let dir = tempdir()?;
        check_growth(&DiskFileManager::new(dir.path(), BLOCK_SIZE)?)
    }

    #[test]
    fn test_disk_missing_block() -> Result<()> {
        let dir = tempdir()?;
        check_missing_block(&DiskFileManager::new(dir.path(), BLOCK_SIZE)?)
    }

    #[test]
    fn test_disk_size_mismatch() -> Result<()> {
        let dir = tempdir()?;
        check_size_mismatch(&DiskFileManager::new(dir.path(), BLOCK_SIZE)?)
    }

    #[test]
    fn test_memory_round_trip() -> Result<()> {
        check_round_trip(&MemoryFileManager::new(BLOCK_SIZE))
    }

    #[test]
    fn test_memory_growth() -> Result<()> {
        check_growth(&MemoryFileManager::new(BLOCK_SIZE))
    }

    #[test]
    fn test_memory_missing_block() -> Result<()> {
        check_missing_block(&MemoryFileManager::new(BLOCK_SIZE))
    }

    #[test]
    fn test_memory_size_mismatch() -> Result<()> {
        check_size_mismatch(&MemoryFileManager::new(BLOCK_SIZE))
    }

    #[test]
    fn test_memory_rewrite_keeps_blocks() -> Result<()> {
        let fm = MemoryFileManager::new(BLOCK_SIZE);
        fm.write(&BlockId::new("test.db", 3), &page_filled_with(3))?;
        fm.write(&BlockId::new("test.db", 1), &page_filled_with(1))?;
        fm.write(&BlockId::new("test.db", 3), &page_filled_with(4))?;
        assert_eq!(fm.length_in_blocks("test.db")?, 4);

        let page = Page::new(BLOCK_SIZE);
        fm.read(&BlockId::new("test.db", 1), &page)?;
        assert!(page.contents().iter().all(|&b| b == 1));
        fm.read(&BlockId::new("test.db", 2), &page)?;
        assert!(page.contents().iter().all(|&b| b == 0));
        fm.read(&BlockId::new("test.db", 3), &page)?;
        assert!(page.contents().iter().all(|&b| b == 4));
        Ok(())
    }

    #[test]
    fn test_disk_persistence() -> Result<()> {
        let dir = tempdir()?;
        let block = BlockId::new("test.db", 1);

        // Write data
        {
            let fm = DiskFileManager::new(dir.path(), BLOCK_SIZE)?;
            fm.write(&block, &page_filled_with(99))?;
        }

        // Read data after reopening
        {
            let fm = DiskFileManager::new(dir.path(), BLOCK_SIZE)?;
            assert_eq!(fm.length_in_blocks("test.db")?, 2);
            let page = Page::new(BLOCK_SIZE);
            fm.read(&block, &page)?;
            assert!(page.contents().iter().all(|&b| b == 99));
        }

        Ok(())
    }

    #[test]
    fn test_disk_overwrite_block() -> Result<()> {
        let dir = tempdir()?;
        let fm = DiskFileManager::new(dir.path(), BLOCK_SIZE)?;
        let block = BlockId::new("test.db", 0);

        fm.write(&block, &page_filled_with(1))?;
        fm.write(&block, &page_filled_with(2))?;

        let page = Page::new(BLOCK_SIZE);
        fm.read(&block, &page)?;
        assert!(page.contents().iter().all(|&b| b == 2));
        assert_eq!(fm.length_in_blocks("test.db")?, 1);
        Ok(())
    }
}

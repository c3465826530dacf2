//! Configuration for opening a log.

use std::path::PathBuf;
use std::sync::Arc;

use crate::storage::{DiskFileManager, StorageResult};
use crate::wal::LogManager;

/// Default size of a log block in bytes (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Log configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory where block files are stored.
    pub data_dir: PathBuf,
    /// Name of the log file inside `data_dir`.
    pub log_file: String,
    /// Size of every block in bytes. Must match the size the log was created with.
    pub block_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            data_dir: PathBuf::from("blockwal_data"),
            log_file: "blockwal.log".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl LogConfig {
    /// Open the on-disk log described by this configuration, creating the
    /// directory and the first block if needed.
    pub fn open_log(&self) -> StorageResult<LogManager> {
        let file_manager = DiskFileManager::new(&self.data_dir, self.block_size)?;
        LogManager::open(Arc::new(file_manager), self.log_file.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_open_log_from_config() -> Result<()> {
        let dir = tempdir()?;
        let config = LogConfig {
            data_dir: dir.path().join("nested").join("wal"),
            block_size: 512,
            ..Default::default()
        };

        {
            let log = config.open_log()?;
            assert_eq!(log.block_size(), 512);
            assert_eq!(log.log_file(), "blockwal.log");
            log.append(b"configured")?;
            log.flush()?;
        }

        assert!(config.data_dir.join("blockwal.log").exists());
        let log = config.open_log()?;
        assert_eq!(log.latest_lsn().0, 1);
        Ok(())
    }
}

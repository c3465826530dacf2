//! In-memory image of a single disk block.
//!
//! A [`Page`] is a fixed-capacity byte buffer with typed accessors. All
//! fixed-width fields are big-endian:
//!
//! - integer: 4 bytes, `u32`
//! - boolean: 1 byte, `1` = true, `0` = false
//! - timestamp: 8 bytes, `u64` seconds since the Unix epoch
//! - bytes / string: raw bytes followed by a single `0x00` terminator
//! - blob: 4-byte length followed by the raw bytes (zero-byte safe)
//!
//! Every accessor validates the full field width against the capacity
//! before touching the buffer, so no read or write ever leaves
//! `[0, capacity)`. Getters share the page lock; setters hold it exclusively.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::storage::error::{StorageError, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PageId(pub u64);

pub struct Page {
    data: RwLock<Box<[u8]>>,
    capacity: usize,
    page_id: PageId,
}

impl Page {
    pub const INT_SIZE: usize = 4;
    pub const BOOL_SIZE: usize = 1;
    pub const DATE_SIZE: usize = 8;

    /// Create a zero-filled page of `block_size` bytes.
    pub fn new(block_size: usize) -> Self {
        Self::from_bytes(vec![0u8; block_size])
    }

    /// Wrap an existing buffer, e.g. one loaded from disk.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let capacity = data.len();
        Self {
            data: RwLock::new(data.into_boxed_slice()),
            capacity,
            page_id: PageId::default(),
        }
    }

    pub fn with_id(mut self, page_id: PageId) -> Self {
        self.page_id = page_id;
        self
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get_int(&self, offset: usize) -> StorageResult<u32> {
        let data = self.data.read();
        self.check_bounds("getting int", offset, Self::INT_SIZE)?;
        Ok(BigEndian::read_u32(&data[offset..]))
    }

    pub fn set_int(&self, offset: usize, val: u32) -> StorageResult<()> {
        let mut data = self.data.write();
        self.check_bounds("setting int", offset, Self::INT_SIZE)?;
        BigEndian::write_u32(&mut data[offset..], val);
        Ok(())
    }

    pub fn get_bool(&self, offset: usize) -> StorageResult<bool> {
        let data = self.data.read();
        self.check_bounds("getting bool", offset, Self::BOOL_SIZE)?;
        Ok(data[offset] == 1)
    }

    pub fn set_bool(&self, offset: usize, val: bool) -> StorageResult<()> {
        let mut data = self.data.write();
        self.check_bounds("setting bool", offset, Self::BOOL_SIZE)?;
        data[offset] = u8::from(val);
        Ok(())
    }

    pub fn get_date(&self, offset: usize) -> StorageResult<SystemTime> {
        let data = self.data.read();
        self.check_bounds("getting date", offset, Self::DATE_SIZE)?;
        let secs = BigEndian::read_u64(&data[offset..]);
        UNIX_EPOCH
            .checked_add(Duration::from_secs(secs))
            .ok_or_else(|| StorageError::InvalidTimestamp(format!("{secs} seconds since epoch")))
    }

    pub fn set_date(&self, offset: usize, val: SystemTime) -> StorageResult<()> {
        let secs = val
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StorageError::InvalidTimestamp(format!("before Unix epoch: {e}")))?
            .as_secs();

        let mut data = self.data.write();
        self.check_bounds("setting date", offset, Self::DATE_SIZE)?;
        BigEndian::write_u64(&mut data[offset..], secs);
        Ok(())
    }

    /// Read the zero-terminated byte string starting at `offset`.
    ///
    /// Stops at the first zero byte or at the end of the page, whichever
    /// comes first. The terminator is not included.
    pub fn get_bytes(&self, offset: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        self.check_bounds("getting bytes", offset, 0)?;
        let end = data[offset..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.capacity, |len| offset + len);
        Ok(data[offset..end].to_vec())
    }

    /// Write `val` followed by a zero terminator at `offset`.
    ///
    /// An empty payload is a no-op and never fails. Payloads containing a
    /// zero byte are rejected, since they could not be read back intact.
    pub fn set_bytes(&self, offset: usize, val: &[u8]) -> StorageResult<()> {
        if val.is_empty() {
            return Ok(());
        }
        if let Some(position) = val.iter().position(|&b| b == 0) {
            return Err(StorageError::EmbeddedNul {
                op: "setting bytes",
                position,
            });
        }

        let mut data = self.data.write();
        self.check_bounds("setting bytes", offset, val.len() + 1)?;
        data[offset..offset + val.len()].copy_from_slice(val);
        data[offset + val.len()] = 0;
        Ok(())
    }

    pub fn get_string(&self, offset: usize) -> StorageResult<String> {
        let bytes = self.get_bytes(offset)?;
        String::from_utf8(bytes)
            .map_err(|e| StorageError::Corrupted(format!("string at offset {offset}: {e}")))
    }

    pub fn set_string(&self, offset: usize, val: &str) -> StorageResult<()> {
        self.set_bytes(offset, val.as_bytes())
    }

    /// Read a length-prefixed blob written by [`Page::set_blob`].
    pub fn get_blob(&self, offset: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        self.check_bounds("getting blob", offset, Self::INT_SIZE)?;
        let len = BigEndian::read_u32(&data[offset..]) as usize;
        let start = offset + Self::INT_SIZE;
        match start.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(data[start..end].to_vec()),
            _ => Err(StorageError::Corrupted(format!(
                "blob at offset {offset} claims {len} bytes but the page holds {}",
                self.capacity
            ))),
        }
    }

    /// Write `val` as a 4-byte length followed by the raw bytes.
    ///
    /// Occupies exactly `Page::blob_size(val.len())` bytes.
    pub fn set_blob(&self, offset: usize, val: &[u8]) -> StorageResult<()> {
        let len = u32::try_from(val.len()).map_err(|_| StorageError::OutOfBounds {
            op: "setting blob",
            offset,
            width: Self::blob_size(val.len()),
            capacity: self.capacity,
        })?;

        let mut data = self.data.write();
        self.check_bounds("setting blob", offset, Self::blob_size(val.len()))?;
        BigEndian::write_u32(&mut data[offset..], len);
        let start = offset + Self::INT_SIZE;
        data[start..start + val.len()].copy_from_slice(val);
        Ok(())
    }

    /// Number of bytes a blob of `len` payload bytes occupies on the page.
    pub const fn blob_size(len: usize) -> usize {
        Self::INT_SIZE + len
    }

    /// Borrow the backing buffer for verbatim persistence.
    pub fn contents(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.data.read(), |data| &data[..])
    }

    /// Mutably borrow the backing buffer, e.g. to load a block into it.
    /// The length stays fixed.
    pub fn contents_mut(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.data.write(), |data| &mut data[..])
    }

    fn check_bounds(&self, op: &'static str, offset: usize, width: usize) -> StorageResult<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(StorageError::OutOfBounds {
                op,
                offset,
                width,
                capacity: self.capacity,
            }),
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id)
            .field("capacity", &self.capacity)
            .finish()
    }
}

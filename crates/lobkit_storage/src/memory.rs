//! In-memory implementation of [`LobFile`].

use crate::backend::LobFile;
use crate::error::{StorageError, StorageResult};

/// A vector-backed random-access file.
///
/// Behaves exactly like [`super::FileLob`] without touching the file system.
/// Useful as the inner file of an [`super::EncryptedLobFile`] in tests, and
/// for inspecting what actually lands "on disk".
///
/// # Example
///
/// ```rust
/// use lobkit_storage::{LobFile, MemoryLob};
///
/// let mut file = MemoryLob::new();
/// file.write_at(0, b"test data").unwrap();
/// assert_eq!(file.len().unwrap(), 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryLob {
    data: Vec<u8>,
    closed: bool,
}

impl MemoryLob {
    /// Creates a new empty in-memory file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory file with pre-existing contents.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data,
            closed: false,
        }
    }

    /// Returns the raw contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl LobFile for MemoryLob {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> StorageResult<usize> {
        self.check_open()?;
        let len = self.data.len() as u64;
        if pos > len {
            return Err(StorageError::PositionPastEnd { pos, len });
        }

        let start = pos as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> StorageResult<()> {
        self.check_open()?;
        let len = self.data.len() as u64;
        if pos > len {
            return Err(StorageError::PositionPastEnd { pos, len });
        }

        let start = pos as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        self.check_open()?;
        Ok(self.data.len() as u64)
    }

    fn set_len(&mut self, new_len: u64) -> StorageResult<()> {
        self.check_open()?;
        let len = self.data.len() as u64;
        if new_len > len {
            return Err(StorageError::PositionPastEnd { pos: new_len, len });
        }
        self.data.truncate(new_len as usize);
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        // Nothing is buffered
        self.check_open()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.closed = true;
        Ok(())
    }
}

//! Random-access file trait definition.

use crate::error::StorageResult;

/// A random-access byte container used once a large object overflows memory.
///
/// Files are **opaque byte stores** addressed by absolute position. They do
/// not know about character encodings, framing or update counts; the byte
/// store owns all of that.
///
/// # Invariants
///
/// - `write_at(pos, ..)` requires `pos <= len()`; writing at `len()` appends
/// - `read_at` never returns bytes past `len()`
/// - `set_len` may only shrink the file
///
/// # Implementors
///
/// - [`super::FileLob`] - Plain file on temporary storage
/// - [`super::MemoryLob`] - Vector-backed, for tests and staging
/// - [`super::EncryptedLobFile`] - Block-cipher wrapper around another file
pub trait LobFile: Send {
    /// Reads up to `buf.len()` bytes starting at `pos`.
    ///
    /// Returns the number of bytes read, which is 0 only at end of file or
    /// for an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `pos` is beyond the current length or an I/O
    /// error occurs.
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> StorageResult<usize>;

    /// Writes all of `data` starting at `pos`, growing the file if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `pos` is beyond the current length or an I/O
    /// error occurs.
    fn write_at(&mut self, pos: u64, data: &[u8]) -> StorageResult<()>;

    /// Returns the current logical length in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if the file holds no bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Shrinks the file to `new_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_len` is greater than the current length or
    /// the truncation fails.
    fn set_len(&mut self, new_len: u64) -> StorageResult<()>;

    /// Pushes buffered data to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Closes the file. Further operations fail with `Closed`.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if pending data cannot be written out.
    fn close(&mut self) -> StorageResult<()>;
}

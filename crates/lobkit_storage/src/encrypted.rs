//! Encrypted overflow file wrapper.
//!
//! This module provides [`EncryptedLobFile`], which wraps any other
//! [`LobFile`] and keeps its contents encrypted with a [`BlockCipher`].
//!
//! ## Layout
//!
//! - The inner file only ever holds whole encrypted blocks
//! - Cleartext bytes that do not yet fill a block live in an in-memory tail
//! - Logical length is `inner.len() + tail_size`, with `tail_size < block_size`
//!
//! ## Block Alignment
//!
//! Reads decrypt the smallest block-aligned range covering the request.
//! Writes into existing blocks decrypt, patch and re-encrypt the covering
//! blocks; a partial block is never encrypted. Bytes past the last whole
//! block accumulate in the tail, which is flushed as a new block as soon as
//! it is full.

use crate::backend::LobFile;
use crate::cipher::BlockCipher;
use crate::error::{StorageError, StorageResult};
use std::sync::Arc;

/// An overflow file whose on-disk bytes are encrypted block by block.
///
/// # Example
///
/// ```rust
/// # #[cfg(feature = "encryption")]
/// # {
/// use lobkit_storage::{AesBlockCipher, EncryptedLobFile, EncryptionKey, LobFile, MemoryLob};
/// use std::sync::Arc;
///
/// let key = EncryptionKey::from_bytes(&[7u8; 32]).unwrap();
/// let cipher = Arc::new(AesBlockCipher::new(&key));
/// let mut file = EncryptedLobFile::new(MemoryLob::new(), cipher).unwrap();
///
/// file.write_at(0, b"secret large object").unwrap();
/// let mut buf = [0u8; 6];
/// file.read_at(0, &mut buf).unwrap();
/// assert_eq!(&buf, b"secret");
/// # }
/// ```
pub struct EncryptedLobFile<F: LobFile> {
    inner: F,
    cipher: Arc<dyn BlockCipher>,
    block_size: usize,
    /// Cleartext bytes after the last whole block.
    tail: Vec<u8>,
    tail_size: usize,
    /// Logical position after the last operation.
    current_pos: u64,
}

impl<F: LobFile> EncryptedLobFile<F> {
    /// Wraps an empty (or block-aligned) file.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher reports a zero block size or the inner
    /// file length is not a multiple of the block size.
    pub fn new(inner: F, cipher: Arc<dyn BlockCipher>) -> StorageResult<Self> {
        let block_size = cipher.block_size();
        if block_size == 0 {
            return Err(StorageError::encryption("cipher block size is zero"));
        }
        let real_len = inner.len()?;
        if real_len % block_size as u64 != 0 {
            return Err(StorageError::invariant(format!(
                "encrypted file length {real_len} is not a multiple of block size {block_size}"
            )));
        }

        Ok(Self {
            inner,
            cipher,
            block_size,
            tail: vec![0u8; block_size],
            tail_size: 0,
            current_pos: 0,
        })
    }

    /// Returns the inner (encrypted) file.
    #[must_use]
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Returns the cipher block size.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the number of cleartext bytes held in memory.
    #[must_use]
    pub fn tail_size(&self) -> usize {
        self.tail_size
    }

    /// Returns the logical position after the last read or write.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.current_pos
    }

    fn align_down(&self, pos: u64) -> u64 {
        pos - pos % self.block_size as u64
    }

    fn align_up(&self, pos: u64) -> u64 {
        let bs = self.block_size as u64;
        pos.div_ceil(bs) * bs
    }

    fn check_pos(&self, pos: u64, real_len: u64) -> StorageResult<()> {
        let len = real_len + self.tail_size as u64;
        if pos > len {
            return Err(StorageError::invariant(format!(
                "position {pos} beyond encrypted file length {real_len} + tail {}",
                self.tail_size
            )));
        }
        Ok(())
    }

    /// Reads and decrypts the whole blocks in `[start, end)`.
    fn read_blocks(&mut self, start: u64, end: u64) -> StorageResult<Vec<u8>> {
        let len = (end - start) as usize;
        let mut encrypted = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let n = self
                .inner
                .read_at(start + done as u64, &mut encrypted[done..])?;
            if n == 0 {
                return Err(StorageError::invariant(format!(
                    "encrypted block range [{start}, {end}) ends early at {}",
                    start + done as u64
                )));
            }
            done += n;
        }

        let mut clear = vec![0u8; len];
        self.cipher.decrypt(&encrypted, &mut clear)?;
        Ok(clear)
    }

    /// Encrypts whole cleartext blocks and writes them at `start`.
    fn write_blocks(&mut self, start: u64, clear: &[u8]) -> StorageResult<()> {
        let mut encrypted = vec![0u8; clear.len()];
        self.cipher.encrypt(clear, &mut encrypted)?;
        self.inner.write_at(start, &encrypted)
    }

    /// Patches bytes that fall inside existing encrypted blocks.
    fn patch_blocks(&mut self, pos: u64, data: &[u8]) -> StorageResult<()> {
        let start = self.align_down(pos);
        let end = self.align_up(pos + data.len() as u64);
        let mut clear = self.read_blocks(start, end)?;
        let offset = (pos - start) as usize;
        clear[offset..offset + data.len()].copy_from_slice(data);
        self.write_blocks(start, &clear)
    }

    /// Copies bytes into the tail, flushing it once it holds a whole block.
    ///
    /// Returns the number of bytes consumed from `data`.
    fn write_tail(&mut self, real_len: u64, pos: u64, data: &[u8]) -> StorageResult<usize> {
        let offset = (pos - real_len) as usize;
        let n = data.len().min(self.block_size - offset);
        self.tail[offset..offset + n].copy_from_slice(&data[..n]);
        self.tail_size = self.tail_size.max(offset + n);

        if self.tail_size == self.block_size {
            let block = std::mem::replace(&mut self.tail, vec![0u8; self.block_size]);
            self.write_blocks(real_len, &block)?;
            self.tail_size = 0;
        }
        Ok(n)
    }
}

impl<F: LobFile> LobFile for EncryptedLobFile<F> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let real_len = self.inner.len()?;
        self.check_pos(pos, real_len)?;

        let len = real_len + self.tail_size as u64;
        let n = buf.len().min((len - pos) as usize);
        if n == 0 {
            return Ok(0);
        }
        let end = pos + n as u64;

        let mut done = 0usize;
        if pos < real_len {
            let enc_end = end.min(real_len);
            let start = self.align_down(pos);
            let clear = self.read_blocks(start, self.align_up(enc_end))?;
            let offset = (pos - start) as usize;
            done = (enc_end - pos) as usize;
            buf[..done].copy_from_slice(&clear[offset..offset + done]);
        }

        if done < n {
            // Remainder is still cleartext in the tail
            let tail_offset = (pos + done as u64 - real_len) as usize;
            let rest = n - done;
            buf[done..n].copy_from_slice(&self.tail[tail_offset..tail_offset + rest]);
        }

        self.current_pos = end;
        Ok(n)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> StorageResult<()> {
        let mut real_len = self.inner.len()?;
        self.check_pos(pos, real_len)?;

        let mut cur = pos;
        let mut remaining = data;
        while !remaining.is_empty() {
            if cur < real_len {
                let n = remaining.len().min((real_len - cur) as usize);
                self.patch_blocks(cur, &remaining[..n])?;
                cur += n as u64;
                remaining = &remaining[n..];
            } else {
                let n = self.write_tail(real_len, cur, remaining)?;
                cur += n as u64;
                remaining = &remaining[n..];
                real_len = self.inner.len()?;
            }
        }

        self.current_pos = cur;
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.len()? + self.tail_size as u64)
    }

    fn set_len(&mut self, new_len: u64) -> StorageResult<()> {
        let real_len = self.inner.len()?;
        self.check_pos(new_len, real_len)?;

        if new_len < real_len {
            let boundary = self.align_down(new_len);
            let keep = (new_len - boundary) as usize;
            if keep > 0 {
                let clear = self.read_blocks(boundary, boundary + self.block_size as u64)?;
                self.tail.copy_from_slice(&clear);
            }
            self.tail[keep..].fill(0);
            self.tail_size = keep;
            self.inner.set_len(boundary)?;
        } else {
            let keep = (new_len - real_len) as usize;
            self.tail[keep..].fill(0);
            self.tail_size = keep;
        }

        self.current_pos = self.current_pos.min(new_len);
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.tail.fill(0);
        self.tail_size = 0;
        self.inner.close()
    }
}

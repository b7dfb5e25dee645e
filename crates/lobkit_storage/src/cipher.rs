//! Block cipher service used by encrypted overflow files.
//!
//! ## Contract
//!
//! - Ciphers operate on whole blocks only; input length must be a multiple
//!   of [`BlockCipher::block_size`]
//! - Ciphertext has exactly the length of the cleartext, so a block can be
//!   rewritten in place at the same file offset
//! - Keys are provided by the database, never generated or stored here
//!
//! The AES implementation lives behind the `encryption` feature.

use crate::error::StorageResult;

/// A length-preserving block cipher.
pub trait BlockCipher: Send + Sync {
    /// Returns the cipher block size in bytes.
    fn block_size(&self) -> usize;

    /// Encrypts `clear` into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ or are not a multiple of the
    /// block size.
    fn encrypt(&self, clear: &[u8], out: &mut [u8]) -> StorageResult<()>;

    /// Decrypts `cipher` into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ or are not a multiple of the
    /// block size.
    fn decrypt(&self, cipher: &[u8], out: &mut [u8]) -> StorageResult<()>;
}

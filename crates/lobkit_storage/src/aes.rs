//! AES-256 block cipher and its key.

use crate::cipher::BlockCipher;
use crate::error::{StorageError, StorageResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes_gcm::aes::Aes256;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Block size of AES in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Encryption key for the AES block cipher.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256 applied independently to each 16-byte block.
pub struct AesBlockCipher {
    cipher: Aes256,
}

impl AesBlockCipher {
    /// Creates a cipher for the given key.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    fn check_lengths(input: &[u8], out: &[u8]) -> StorageResult<()> {
        if input.len() != out.len() || input.len() % AES_BLOCK_SIZE != 0 {
            return Err(StorageError::invariant(format!(
                "cipher input of {} bytes into {} bytes is not block aligned",
                input.len(),
                out.len()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AesBlockCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesBlockCipher")
            .field("block_size", &AES_BLOCK_SIZE)
            .finish()
    }
}

impl BlockCipher for AesBlockCipher {
    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn encrypt(&self, clear: &[u8], out: &mut [u8]) -> StorageResult<()> {
        Self::check_lengths(clear, out)?;
        for (src, dst) in clear
            .chunks_exact(AES_BLOCK_SIZE)
            .zip(out.chunks_exact_mut(AES_BLOCK_SIZE))
        {
            self.cipher.encrypt_block_b2b(
                GenericArray::from_slice(src),
                GenericArray::from_mut_slice(dst),
            );
        }
        Ok(())
    }

    fn decrypt(&self, cipher: &[u8], out: &mut [u8]) -> StorageResult<()> {
        Self::check_lengths(cipher, out)?;
        for (src, dst) in cipher
            .chunks_exact(AES_BLOCK_SIZE)
            .zip(out.chunks_exact_mut(AES_BLOCK_SIZE))
        {
            self.cipher.decrypt_block_b2b(
                GenericArray::from_slice(src),
                GenericArray::from_mut_slice(dst),
            );
        }
        Ok(())
    }
}

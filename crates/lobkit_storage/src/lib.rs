//! # lobkit Storage
//!
//! Overflow file storage for lobkit large objects.
//!
//! Once a large object no longer fits its in-memory buffer, its bytes move
//! to a random-access file on temporary storage. This crate provides those
//! files. Like any storage backend they are **opaque byte stores**: they do
//! not know about character encodings, framing or update counts.
//!
//! ## Design Principles
//!
//! - Files are addressed by absolute position (`read_at`, `write_at`)
//! - Files only shrink through `set_len`; writes may append at the end
//! - Encryption is a wrapper over any other file, never a separate format
//! - Temporary files delete themselves when dropped
//!
//! ## Available Files
//!
//! - [`FileLob`] - Plain file on local storage
//! - [`MemoryLob`] - Vector-backed file for tests and staging
//! - [`EncryptedLobFile`] - Block-aligned encryption over another file
//!
//! ## Features
//!
//! - `encryption` (default): the AES-256 [`BlockCipher`] and its key
//!
//! ## Example
//!
//! ```rust
//! use lobkit_storage::{LobFile, MemoryLob};
//!
//! let mut file = MemoryLob::new();
//! file.write_at(0, b"hello world").unwrap();
//! let mut buf = [0u8; 5];
//! file.read_at(6, &mut buf).unwrap();
//! assert_eq!(&buf, b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "encryption")]
mod aes;
mod backend;
mod cipher;
mod encrypted;
mod error;
mod file;
mod memory;
mod temp;

#[cfg(feature = "encryption")]
pub use aes::{AesBlockCipher, EncryptionKey, AES_BLOCK_SIZE, KEY_SIZE};
pub use backend::LobFile;
pub use cipher::BlockCipher;
pub use encrypted::EncryptedLobFile;
pub use error::{StorageError, StorageResult};
pub use file::FileLob;
pub use memory::MemoryLob;
pub use temp::{TempDirProvider, TempFileProvider};

//! # lobkit Core
//!
//! Large object storage and streaming for lobkit.
//!
//! This crate provides:
//! - [`ByteStore`]: a byte container that starts in memory and moves to an
//!   overflow file once it outgrows its buffer
//! - Stream views over a byte store that notice concurrent modification
//! - A positioned wrapper over store-provided streams that can be shared by
//!   several cursors
//! - A modified UTF-8 codec and a buffered character decoder
//! - Character content handles, read-only and writable, and the [`Clob`]
//!   handle that switches between them
//!
//! Every object belongs to a [`Session`], which owns the overflow files and
//! removes any left behind when it closes. Callers are expected to serialize
//! operations per session with [`Session::lock`]; the internal locks only
//! make shared aliases sound.
//!
//! ## Example
//!
//! ```rust
//! use lobkit_core::{Clob, LobConfig, Session};
//!
//! let session = Session::new(LobConfig::default());
//! let clob = Clob::from_text(&session, "hello world").unwrap();
//! clob.set_string(7, "there").unwrap();
//! assert_eq!(clob.get_sub_string(1, 11).unwrap(), "hello there");
//! assert_eq!(clob.position("there", 1).unwrap(), Some(7));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clob;
mod config;
mod error;
mod session;
pub mod store;
pub mod stream;
pub mod utf8;

pub use clob::{Clob, ClobWriter, InternalClob, StoreStreamClob, TemporaryClob, UpdatableClobReader};
pub use config::{LobConfig, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use error::{CoreError, CoreResult};
pub use lobkit_storage::BlockCipher;
#[cfg(feature = "encryption")]
pub use lobkit_storage::{AesBlockCipher, EncryptionKey};
pub use session::{OverflowFile, Session};
pub use store::{ByteStore, LobInputStream, LobOutputStream, SharedByteStore};
pub use stream::{MemoryStoreStream, PositionedStoreStream, PositionedStream, StoreStream};
pub use utf8::{CharReader, Framing, Utf8Reader};

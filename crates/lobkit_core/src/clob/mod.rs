//! Character large object content.
//!
//! Content comes in two forms. A [`StoreStreamClob`] reads a persisted value
//! straight from the page store and cannot change. A [`TemporaryClob`] keeps
//! its characters in a [`ByteStore`](crate::ByteStore) and supports writes.
//! [`InternalClob`] unites the two; the [`Clob`] handle on top of it turns
//! read-only content into a writable copy on the first modification.

mod handle;
mod position_cache;
mod store_stream;
mod temporary;

pub use handle::{Clob, UpdatableClobReader};
pub use position_cache::PositionCache;
pub use store_stream::StoreStreamClob;
pub use temporary::{ClobWriter, TemporaryClob, TemporaryClobReader};

use crate::error::{CoreError, CoreResult};
use crate::utf8::CharReader;
use std::io::Read;

/// Content behind a [`Clob`] handle.
#[derive(Debug)]
pub enum InternalClob {
    /// Mutable content in a byte store.
    Writable(TemporaryClob),
    /// Immutable content read from a store stream.
    ReadOnly(StoreStreamClob),
}

impl InternalClob {
    /// Returns the length in characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is released or malformed.
    pub fn get_char_length(&self) -> CoreResult<u64> {
        match self {
            Self::Writable(clob) => clob.get_char_length(),
            Self::ReadOnly(clob) => clob.get_char_length(),
        }
    }

    /// Returns the length of the encoded data in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is released or unreadable.
    pub fn get_byte_length(&self) -> CoreResult<u64> {
        match self {
            Self::Writable(clob) => clob.get_byte_length(),
            Self::ReadOnly(clob) => clob.get_byte_length(),
        }
    }

    /// Returns a reader starting at 1-based `char_pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `char_pos` is 0 or beyond the character
    /// length plus one.
    pub fn get_reader(&self, char_pos: u64) -> CoreResult<Box<dyn CharReader + Send>> {
        Ok(match self {
            Self::Writable(clob) => Box::new(clob.get_reader(char_pos)?),
            Self::ReadOnly(clob) => Box::new(clob.get_reader(char_pos)?),
        })
    }

    /// Returns the encoded characters without any framing.
    ///
    /// # Errors
    ///
    /// Returns `Released` if the content has been released.
    pub fn get_raw_byte_stream(&self) -> CoreResult<Box<dyn Read + Send>> {
        Ok(match self {
            Self::Writable(clob) => Box::new(clob.get_raw_byte_stream()?),
            Self::ReadOnly(clob) => Box::new(clob.get_raw_byte_stream()?),
        })
    }

    /// Returns a writer starting at 1-based `char_pos`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOnReadOnly` for read-only content.
    pub fn get_writer(&self, char_pos: u64) -> CoreResult<ClobWriter> {
        match self {
            Self::Writable(clob) => clob.get_writer(char_pos),
            Self::ReadOnly(_) => Err(CoreError::read_only("get_writer")),
        }
    }

    /// Writes `text` at 1-based `char_pos`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOnReadOnly` for read-only content.
    pub fn insert_string(&self, text: &str, char_pos: u64) -> CoreResult<u64> {
        match self {
            Self::Writable(clob) => clob.insert_string(text, char_pos),
            Self::ReadOnly(_) => Err(CoreError::read_only("insert_string")),
        }
    }

    /// Shrinks the content to `new_char_length` characters.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOnReadOnly` for read-only content.
    pub fn truncate(&self, new_char_length: u64) -> CoreResult<()> {
        match self {
            Self::Writable(clob) => clob.truncate(new_char_length),
            Self::ReadOnly(_) => Err(CoreError::read_only("truncate")),
        }
    }

    /// Returns true for content that supports writes.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Writable(_))
    }

    /// Returns the update count of writable content; read-only content
    /// never changes and reports 0.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        match self {
            Self::Writable(clob) => clob.update_count(),
            Self::ReadOnly(_) => 0,
        }
    }

    /// Returns true once the content has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        match self {
            Self::Writable(clob) => clob.is_released(),
            Self::ReadOnly(clob) => clob.is_released(),
        }
    }

    /// Releases the content. Idempotent.
    pub fn release(&self) {
        match self {
            Self::Writable(clob) => clob.release(),
            Self::ReadOnly(clob) => clob.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobConfig;
    use crate::session::Session;
    use crate::stream::MemoryStoreStream;
    use crate::utf8::encode_with_header;

    fn read_only(session: &Session, text: &str) -> InternalClob {
        let stream = MemoryStoreStream::new(encode_with_header(text));
        InternalClob::ReadOnly(StoreStreamClob::new(session, Box::new(stream)).unwrap())
    }

    #[test]
    fn read_only_rejects_mutation() {
        let session = Session::new(LobConfig::new());
        let clob = read_only(&session, "fixed");

        assert!(!clob.is_writable());
        assert_eq!(clob.update_count(), 0);
        for err in [
            clob.insert_string("x", 1).unwrap_err(),
            clob.truncate(1).unwrap_err(),
            clob.get_writer(1).unwrap_err(),
        ] {
            assert!(matches!(err, CoreError::UnsupportedOnReadOnly { .. }));
            assert!(err.is_fatal());
        }
        assert_eq!(clob.get_reader(1).unwrap().read_to_string().unwrap(), "fixed");
    }

    #[test]
    fn both_forms_agree_on_lengths() {
        let session = Session::new(LobConfig::new());
        let text = "na\u{ef}ve \u{1F600}";
        let writable = InternalClob::Writable(TemporaryClob::from_text(&session, text).unwrap());
        let fixed = read_only(&session, text);

        assert_eq!(writable.get_char_length().unwrap(), fixed.get_char_length().unwrap());
        assert_eq!(writable.get_byte_length().unwrap(), fixed.get_byte_length().unwrap());

        let mut a = Vec::new();
        let mut b = Vec::new();
        writable.get_raw_byte_stream().unwrap().read_to_end(&mut a).unwrap();
        fixed.get_raw_byte_stream().unwrap().read_to_end(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn release_is_idempotent() {
        let session = Session::new(LobConfig::new());
        let clob = read_only(&session, "gone");
        clob.release();
        clob.release();
        assert!(clob.is_released());
        assert!(matches!(clob.get_char_length(), Err(CoreError::Released)));
    }
}

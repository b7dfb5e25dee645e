//! Read-only character content served from a store stream.

use crate::error::{CoreError, CoreResult};
use crate::session::Session;
use crate::stream::{PositionedStream, SharedStoreStream, StoreStream, StoreStreamCursor};
use crate::utf8::{skip_until_eof, CharReader, Framing, Utf8Reader, END_OF_STREAM_MARKER, HEADER_LEN};
use parking_lot::Mutex;
use std::io::{BufReader, Read, Take};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A persisted character value read straight from the page store.
///
/// The value is immutable for the lifetime of the handle, so lengths are
/// computed once by scanning the stream and then cached. Readers share the
/// handle's stream and reposition it before every fill.
pub struct StoreStreamClob {
    stream: SharedStoreStream,
    reader_buffer_chars: usize,
    char_length: Mutex<Option<u64>>,
    byte_length: Mutex<Option<u64>>,
    released: AtomicBool,
}

impl StoreStreamClob {
    /// Wraps a store stream holding a framed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be initialized.
    pub fn new(session: &Session, stream: Box<dyn StoreStream>) -> CoreResult<Self> {
        Ok(Self {
            stream: SharedStoreStream::open(stream)?,
            reader_buffer_chars: session.config().reader_buffer_chars,
            char_length: Mutex::new(None),
            byte_length: Mutex::new(None),
            released: AtomicBool::new(false),
        })
    }

    fn check_live(&self) -> CoreResult<()> {
        if self.is_released() {
            return Err(CoreError::Released);
        }
        Ok(())
    }

    /// Reads the length prefix; `None` for a value ended by the marker.
    fn declared_length(&self) -> CoreResult<Option<u64>> {
        let header = self.stream.with(|s| -> CoreResult<u16> {
            s.reposition(0)?;
            let mut header = [0u8; HEADER_LEN];
            let mut got = 0;
            while got < HEADER_LEN {
                let n = s.read(&mut header[got..])?;
                if n == 0 {
                    return Err(CoreError::premature_end(HEADER_LEN as u64, got as u64));
                }
                got += n;
            }
            Ok(u16::from_be_bytes(header))
        })?;
        Ok((header != 0).then_some(u64::from(header)))
    }

    /// Returns the encoded data, bounded by the length prefix if there is
    /// one.
    fn data(&self) -> CoreResult<Take<StoreStreamCursor>> {
        let limit = self.declared_length()?.unwrap_or(u64::MAX);
        Ok(StoreStreamCursor::new(self.stream.clone(), HEADER_LEN as u64).take(limit))
    }

    /// Returns the length in characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is released or the value is
    /// malformed.
    pub fn get_char_length(&self) -> CoreResult<u64> {
        self.check_live()?;
        if let Some(len) = *self.char_length.lock() {
            return Ok(len);
        }

        let chars = skip_until_eof(&mut BufReader::new(self.data()?))?.chars;
        *self.char_length.lock() = Some(chars);
        Ok(chars)
    }

    /// Returns the length of the encoded data in bytes.
    ///
    /// The length prefix is not counted, nor is the end-of-stream marker of
    /// a value written without a length.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is released or the stream is shorter
    /// than its prefix.
    pub fn get_byte_length(&self) -> CoreResult<u64> {
        self.check_live()?;
        if let Some(len) = *self.byte_length.lock() {
            return Ok(len);
        }

        let declared = self.declared_length()?;
        let total = self.stream.with(|s| -> CoreResult<u64> {
            s.reposition(HEADER_LEN as u64)?;
            loop {
                if s.skip(u64::MAX)? == 0 && s.read_byte()?.is_none() {
                    break;
                }
            }
            Ok(s.position())
        })?;

        let data = total - HEADER_LEN as u64;
        let len = match declared {
            Some(declared) => data.min(declared),
            None => data.saturating_sub(END_OF_STREAM_MARKER.len() as u64),
        };
        *self.byte_length.lock() = Some(len);
        Ok(len)
    }

    /// Returns a reader starting at 1-based `char_pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `char_pos` is 0 or beyond the character
    /// length plus one.
    pub fn get_reader(&self, char_pos: u64) -> CoreResult<Utf8Reader<SharedStoreStream>> {
        self.check_live()?;
        if char_pos < 1 {
            return Err(CoreError::invalid_position(char_pos, "positions start at 1"));
        }

        let mut source = self.stream.clone();
        source.reposition(0)?;
        let mut reader = Utf8Reader::new(source, Framing::Prefixed, self.reader_buffer_chars)?;
        let wanted = char_pos - 1;
        if reader.skip(wanted)? < wanted {
            return Err(CoreError::invalid_position(
                char_pos,
                "position beyond character length + 1",
            ));
        }
        Ok(reader)
    }

    /// Returns the encoded data after the length prefix, ending where the
    /// prefix says the value ends.
    ///
    /// # Errors
    ///
    /// Returns `Released` after [`release`](Self::release).
    pub fn get_raw_byte_stream(&self) -> CoreResult<Take<StoreStreamCursor>> {
        self.check_live()?;
        self.data()
    }

    /// Returns true once the handle has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Closes the store stream. Idempotent.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.stream.close();
            debug!("store stream clob released");
        }
    }
}

impl std::fmt::Debug for StoreStreamClob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreStreamClob")
            .field("char_length", &*self.char_length.lock())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobConfig;
    use crate::stream::MemoryStoreStream;
    use crate::utf8::{encode_str, encode_with_header};

    fn clob(bytes: Vec<u8>) -> StoreStreamClob {
        let session = Session::new(LobConfig::new().reader_buffer_chars(4));
        StoreStreamClob::new(&session, Box::new(MemoryStoreStream::new(bytes))).unwrap()
    }

    fn marker_terminated(text: &str) -> Vec<u8> {
        let mut bytes = vec![0, 0];
        bytes.extend_from_slice(&encode_str(text));
        bytes.extend_from_slice(&END_OF_STREAM_MARKER);
        bytes
    }

    #[test]
    fn lengths_with_declared_prefix() {
        let clob = clob(encode_with_header("h\u{e9}llo"));
        assert_eq!(clob.get_char_length().unwrap(), 5);
        assert_eq!(clob.get_byte_length().unwrap(), 6);
    }

    #[test]
    fn lengths_strip_marker() {
        let clob = clob(marker_terminated("abc"));
        // 8 raw bytes: prefix, data, marker
        assert_eq!(clob.get_char_length().unwrap(), 3);
        assert_eq!(clob.get_byte_length().unwrap(), 3);
    }

    #[test]
    fn declared_prefix_bounds_every_view() {
        let mut bytes = encode_with_header("abc");
        bytes.extend_from_slice(b"trailing");
        let clob = clob(bytes);

        assert_eq!(clob.get_char_length().unwrap(), 3);
        assert_eq!(clob.get_byte_length().unwrap(), 3);
        assert_eq!(clob.get_reader(1).unwrap().read_to_string().unwrap(), "abc");
        let mut raw = Vec::new();
        clob.get_raw_byte_stream().unwrap().read_to_end(&mut raw).unwrap();
        assert_eq!(raw, b"abc");
    }

    #[test]
    fn reader_at_position() {
        let clob = clob(encode_with_header("0123456789"));
        let mut reader = clob.get_reader(4).unwrap();
        assert_eq!(reader.read_to_string().unwrap(), "3456789");

        let mut end = clob.get_reader(11).unwrap();
        assert_eq!(end.read_char().unwrap(), None);
        assert!(matches!(
            clob.get_reader(12),
            Err(CoreError::InvalidPosition { position: 12, .. })
        ));
        assert!(clob.get_reader(0).is_err());
    }

    #[test]
    fn readers_and_length_queries_interleave() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let clob = clob(marker_terminated(text));
        let mut first = clob.get_reader(1).unwrap();
        let mut second = clob.get_reader(20).unwrap();

        let mut buf = ['\0'; 3];
        first.read(&mut buf).unwrap();
        assert_eq!(clob.get_char_length().unwrap(), 26);
        assert_eq!(second.read_to_string().unwrap(), "tuvwxyz");
        assert_eq!(first.read_to_string().unwrap(), &text[3..]);
    }

    #[test]
    fn raw_stream_skips_prefix() {
        let clob = clob(encode_with_header("xyz"));
        let mut raw = Vec::new();
        clob.get_raw_byte_stream().unwrap().read_to_end(&mut raw).unwrap();
        assert_eq!(raw, b"xyz");
    }

    #[test]
    fn release_closes_stream() {
        let clob = clob(encode_with_header("xyz"));
        let mut reader = clob.get_reader(1).unwrap();

        clob.release();
        clob.release();
        assert!(clob.is_released());
        assert!(matches!(clob.get_char_length(), Err(CoreError::Released)));
        assert!(matches!(clob.get_reader(1), Err(CoreError::Released)));
        assert!(reader.read_char().is_err());
    }
}

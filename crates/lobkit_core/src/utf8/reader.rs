//! Buffered character decoder over a positioned byte source.

use super::decode::{decode_char, ByteSource, Decoded};
use super::HEADER_LEN;
use crate::error::{CoreError, CoreResult};
use crate::stream::PositionedStream;

/// Upper bound for the raw byte buffer.
const MAX_BYTE_BUFFER: usize = 8 * 1024;

/// How the decoded value is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Bare modified UTF-8; the value ends at end of data or at an
    /// end-of-stream marker.
    Raw,
    /// A 2-byte big-endian byte length precedes the data. A length of 0
    /// means the value ends with an end-of-stream marker.
    Prefixed,
}

/// A source of characters.
///
/// Implemented by every character reader handed out for a large object.
pub trait CharReader {
    /// Reads characters into `out`, returning how many were read.
    ///
    /// Returns 0 only at the end of the value or for an empty `out`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedEncoding` on invalid input,
    /// `PrematureEndOfData` if data ends before its declared length and
    /// `StreamClosed` after [`close`](Self::close).
    fn read(&mut self, out: &mut [char]) -> CoreResult<usize>;

    /// Skips up to `n` characters, returning how many were skipped.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read).
    fn skip(&mut self, n: u64) -> CoreResult<u64> {
        let mut buf = ['\0'; 256];
        let mut skipped = 0;
        while skipped < n {
            let want = buf.len().min(usize::try_from(n - skipped).unwrap_or(usize::MAX));
            let read = self.read(&mut buf[..want])?;
            if read == 0 {
                break;
            }
            skipped += read as u64;
        }
        Ok(skipped)
    }

    /// Reads one character, or `None` at the end of the value.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read).
    fn read_char(&mut self) -> CoreResult<Option<char>> {
        let mut one = ['\0'];
        match self.read(&mut one)? {
            0 => Ok(None),
            _ => Ok(Some(one[0])),
        }
    }

    /// Reads the rest of the value into a string.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read).
    fn read_to_string(&mut self) -> CoreResult<String> {
        let mut out = String::new();
        let mut buf = ['\0'; 256];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend(&buf[..n]);
        }
    }

    /// Closes the reader. Idempotent.
    fn close(&mut self);
}

impl<R: CharReader + ?Sized> CharReader for Box<R> {
    fn read(&mut self, out: &mut [char]) -> CoreResult<usize> {
        (**self).read(out)
    }

    fn skip(&mut self, n: u64) -> CoreResult<u64> {
        (**self).skip(n)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Raw bytes fetched from the source, refilled on demand.
///
/// Before each refill the source is moved back to where this buffer left
/// it, since other cursors may have used the source in between.
struct ByteWindow<S> {
    source: S,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
    /// Source position following the last fetched byte.
    raw_pos: u64,
    /// Data bytes fetched so far.
    fetched: u64,
    /// Data bytes handed to the decoder so far.
    consumed: u64,
    /// Declared data length, if any.
    limit: Option<u64>,
}

impl<S: PositionedStream> ByteWindow<S> {
    fn refill(&mut self) -> CoreResult<bool> {
        let mut want = self.buf.len();
        if let Some(limit) = self.limit {
            let left = limit.saturating_sub(self.fetched);
            want = want.min(usize::try_from(left).unwrap_or(usize::MAX));
        }
        if want == 0 {
            return Ok(false);
        }

        self.source.reposition(self.raw_pos)?;
        let n = self.source.read(&mut self.buf[..want])?;
        self.raw_pos += n as u64;
        self.fetched += n as u64;
        self.pos = 0;
        self.end = n;
        Ok(n > 0)
    }
}

impl<S: PositionedStream> ByteSource for ByteWindow<S> {
    fn next_byte(&mut self) -> CoreResult<Option<u8>> {
        if self.pos == self.end && !self.refill()? {
            return Ok(None);
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        self.consumed += 1;
        Ok(Some(b))
    }
}

/// Decodes modified UTF-8 from a [`PositionedStream`] into characters.
///
/// The decoder keeps its own byte offset and repositions the source before
/// every refill, so the source may be shared with other cursors between
/// calls. Decoding stops at the declared byte length, at the end-of-stream
/// marker of a length-unknown value, at end of data, or after
/// `max_field_size` characters when a limit is set.
///
/// # Example
///
/// ```rust
/// use lobkit_core::stream::{MemoryStoreStream, PositionedStoreStream};
/// use lobkit_core::utf8::{encode_with_header, CharReader, Framing, Utf8Reader};
///
/// let stream = MemoryStoreStream::new(encode_with_header("h\u{e9}llo"));
/// let source = PositionedStoreStream::new(Box::new(stream)).unwrap();
/// let mut reader = Utf8Reader::new(source, Framing::Prefixed, 64).unwrap();
/// assert_eq!(reader.read_to_string().unwrap(), "h\u{e9}llo");
/// ```
pub struct Utf8Reader<S: PositionedStream> {
    bytes: ByteWindow<S>,
    /// Declared byte length; 0 = unknown.
    utf_len: u64,
    /// Characters handed to the caller.
    reader_char_count: u64,
    /// Characters decoded into the buffer.
    decoded: u64,
    /// Character limit; 0 = unlimited.
    max_field_size: u64,
    chars: Vec<char>,
    char_pos: usize,
    capacity: usize,
    finished: bool,
    closed: bool,
}

impl<S: PositionedStream> Utf8Reader<S> {
    /// Creates a decoder reading from the source's current position.
    ///
    /// With [`Framing::Prefixed`] the length prefix is read immediately.
    /// `buffer_chars` is the number of characters decoded per fill.
    ///
    /// # Errors
    ///
    /// Returns `PrematureEndOfData` if the prefix is cut short.
    pub fn new(mut source: S, framing: Framing, buffer_chars: usize) -> CoreResult<Self> {
        let mut raw_pos = source.position();
        let mut utf_len = 0;

        if framing == Framing::Prefixed {
            let mut header = [0u8; HEADER_LEN];
            let mut got = 0;
            while got < HEADER_LEN {
                let n = source.read(&mut header[got..])?;
                if n == 0 {
                    return Err(CoreError::premature_end(HEADER_LEN as u64, got as u64));
                }
                got += n;
            }
            raw_pos += HEADER_LEN as u64;
            utf_len = u64::from(u16::from_be_bytes(header));
        }

        let capacity = buffer_chars.max(1);
        let byte_capacity = capacity.saturating_mul(3).clamp(4, MAX_BYTE_BUFFER);

        Ok(Self {
            bytes: ByteWindow {
                source,
                buf: vec![0; byte_capacity],
                pos: 0,
                end: 0,
                raw_pos,
                fetched: 0,
                consumed: 0,
                limit: (utf_len > 0).then_some(utf_len),
            },
            utf_len,
            reader_char_count: 0,
            decoded: 0,
            max_field_size: 0,
            chars: Vec::with_capacity(capacity),
            char_pos: 0,
            capacity,
            finished: false,
            closed: false,
        })
    }

    /// Stops decoding after `limit` characters (0 = unlimited).
    #[must_use]
    pub fn with_max_field_size(mut self, limit: u64) -> Self {
        self.max_field_size = limit;
        self
    }

    /// Returns the declared byte length (0 = unknown).
    #[must_use]
    pub fn utf_len(&self) -> u64 {
        self.utf_len
    }

    /// Returns the number of data bytes decoded so far.
    #[must_use]
    pub fn utf_count(&self) -> u64 {
        self.bytes.consumed
    }

    /// Returns the number of characters handed to the caller.
    #[must_use]
    pub fn chars_read(&self) -> u64 {
        self.reader_char_count
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::StreamClosed);
        }
        Ok(())
    }

    fn fill(&mut self) -> CoreResult<()> {
        self.chars.clear();
        self.char_pos = 0;

        while self.chars.len() < self.capacity && !self.finished {
            if self.max_field_size > 0 && self.decoded >= self.max_field_size {
                self.finished = true;
                break;
            }
            if self.utf_len > 0 && self.bytes.consumed >= self.utf_len {
                self.finished = true;
                break;
            }

            let offset = self.bytes.consumed;
            match decode_char(&mut self.bytes, offset)? {
                Decoded::Char { ch, .. } => {
                    if self.utf_len > 0 && self.bytes.consumed > self.utf_len {
                        return Err(CoreError::malformed(
                            offset,
                            format!("character extends past declared length {}", self.utf_len),
                        ));
                    }
                    self.chars.push(ch);
                    self.decoded += 1;
                }
                Decoded::Marker if self.utf_len == 0 => self.finished = true,
                Decoded::Marker => {
                    return Err(CoreError::malformed(
                        offset,
                        "end-of-stream marker in value of declared length",
                    ))
                }
                Decoded::Eof if self.utf_len > 0 => {
                    return Err(CoreError::premature_end(self.utf_len, self.bytes.consumed))
                }
                Decoded::Eof => self.finished = true,
            }
        }
        Ok(())
    }

    /// Returns true once the reader has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the byte source.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.bytes.source
    }
}

impl<S: PositionedStream> CharReader for Utf8Reader<S> {
    fn read(&mut self, out: &mut [char]) -> CoreResult<usize> {
        self.check_open()?;
        if out.is_empty() {
            return Ok(0);
        }

        while self.char_pos == self.chars.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }

        let n = out.len().min(self.chars.len() - self.char_pos);
        out[..n].copy_from_slice(&self.chars[self.char_pos..self.char_pos + n]);
        self.char_pos += n;
        self.reader_char_count += n as u64;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> CoreResult<u64> {
        self.check_open()?;
        let mut skipped = 0;
        while skipped < n {
            if self.char_pos == self.chars.len() {
                if self.finished {
                    break;
                }
                self.fill()?;
                continue;
            }
            let left = usize::try_from(n - skipped).unwrap_or(usize::MAX);
            let step = left.min(self.chars.len() - self.char_pos);
            self.char_pos += step;
            skipped += step as u64;
        }
        self.reader_char_count += skipped;
        Ok(skipped)
    }

    fn close(&mut self) {
        self.closed = true;
        self.chars = Vec::new();
        self.char_pos = 0;
    }
}

impl<S: PositionedStream> std::fmt::Debug for Utf8Reader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utf8Reader")
            .field("utf_len", &self.utf_len)
            .field("utf_count", &self.bytes.consumed)
            .field("chars_read", &self.reader_char_count)
            .field("max_field_size", &self.max_field_size)
            .field("finished", &self.finished)
            .finish()
    }
}

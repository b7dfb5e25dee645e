//! Hybrid in-memory / overflow-file byte store.

use crate::error::{check_bounds, CoreError, CoreResult};
use crate::session::{OverflowFile, Session};
use crate::utf8::END_OF_STREAM_MARKER;
use lobkit_storage::LobFile;
use std::io::{ErrorKind, Read};
use tracing::debug;

/// Where the bytes of a store currently live.
enum Repr {
    Memory(Vec<u8>),
    File(OverflowFile),
}

/// The mutable raw-byte backing of one large object.
///
/// Bytes stay in memory until a write would make the store longer than its
/// buffer size; the store is then promoted to an overflow file obtained from
/// the owning [`Session`]. Truncating below the buffer size demotes it back.
///
/// # Invariants
///
/// - Exactly one representation is active
/// - `buffer_size` is fixed at construction
/// - `update_count` strictly increases on every mutation and is never reset
///
/// # Example
///
/// ```rust
/// use lobkit_core::{ByteStore, LobConfig, Session};
///
/// let session = Session::new(LobConfig::default());
/// let mut store = ByteStore::new(&session);
/// store.write(b"hello", 0).unwrap();
/// assert_eq!(store.length().unwrap(), 5);
/// assert_eq!(store.update_count(), 1);
/// ```
pub struct ByteStore {
    repr: Repr,
    buffer_size: usize,
    update_count: u64,
    session: Session,
    released: bool,
}

impl ByteStore {
    /// Creates an empty store with the session's default buffer size.
    #[must_use]
    pub fn new(session: &Session) -> Self {
        let buffer_size = session.config().buffer_size_for(None);
        Self::with_buffer_size(session, buffer_size)
    }

    fn with_buffer_size(session: &Session, buffer_size: usize) -> Self {
        Self {
            repr: Repr::Memory(Vec::new()),
            buffer_size,
            update_count: 0,
            session: session.clone(),
            released: false,
        }
    }

    /// Creates a store holding `data`, sizing the buffer from its length.
    ///
    /// # Errors
    ///
    /// Returns an error if an overflow file is needed and cannot be created.
    pub fn with_bytes(session: &Session, data: &[u8]) -> CoreResult<Self> {
        let buffer_size = session.config().buffer_size_for(Some(data.len()));
        let mut store = Self::with_buffer_size(session, buffer_size);
        if !data.is_empty() {
            store.write(data, 0)?;
        }
        Ok(store)
    }

    /// Creates a store holding the modified UTF-8 encoding of `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if an overflow file is needed and cannot be created.
    pub fn with_str(session: &Session, text: &str) -> CoreResult<Self> {
        Self::with_bytes(session, &crate::utf8::encode_str(text))
    }

    /// Returns the in-memory threshold chosen at construction.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the mutation counter.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Returns true if the bytes currently live in an overflow file.
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        matches!(self.repr, Repr::File(_))
    }

    /// Returns true once [`free`](Self::free) has been called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the session owning this store.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn check_live(&self) -> CoreResult<()> {
        if self.released {
            return Err(CoreError::Released);
        }
        Ok(())
    }

    /// Returns the current length in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is released or the file length cannot
    /// be read.
    pub fn length(&self) -> CoreResult<u64> {
        self.check_live()?;
        match &self.repr {
            Repr::Memory(buf) => Ok(buf.len() as u64),
            Repr::File(file) => Ok(file.len()?),
        }
    }

    /// Moves the in-memory bytes into a new overflow file.
    ///
    /// On failure the store is left in memory and the half-written file is
    /// deleted.
    fn promote(&mut self) -> CoreResult<()> {
        let Repr::Memory(buf) = &self.repr else {
            return Ok(());
        };

        let mut file = self.session.create_overflow_file()?;
        file.write_at(0, buf)?;
        debug!(
            file = file.id(),
            len = buf.len(),
            buffer_size = self.buffer_size,
            "byte store promoted to overflow file"
        );
        self.repr = Repr::File(file);
        Ok(())
    }

    /// Replaces the current representation with a new file holding `bytes`.
    fn spill(&mut self, bytes: &[u8]) -> CoreResult<()> {
        let mut file = self.session.create_overflow_file()?;
        file.write_at(0, bytes)?;
        debug!(file = file.id(), len = bytes.len(), "byte store spilled to overflow file");
        self.repr = Repr::File(file);
        Ok(())
    }

    /// Writes `data` at `pos`, growing the store if needed.
    ///
    /// `pos` may equal the current length (append). Returns the position
    /// after the last byte written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is beyond the current length, or
    /// an error if promotion or the file write fails.
    pub fn write(&mut self, data: &[u8], pos: u64) -> CoreResult<u64> {
        let len = self.length()?;
        if pos > len {
            return Err(CoreError::invalid_position(pos, "position too large"));
        }
        let end = pos + data.len() as u64;

        if let Repr::Memory(buf) = &mut self.repr {
            if end <= self.buffer_size as u64 {
                let (start, end) = (pos as usize, end as usize);
                if end > buf.len() {
                    buf.resize(end, 0);
                }
                buf[start..end].copy_from_slice(data);
                self.update_count += 1;
                return Ok(end as u64);
            }
            self.promote()?;
        }

        if let Repr::File(file) = &mut self.repr {
            file.write_at(pos, data)?;
        }
        self.update_count += 1;
        Ok(end)
    }

    /// Writes `length` bytes of `buf` starting at `offset` to position `pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOffsetOrLength` if the range is outside `buf`,
    /// otherwise as [`write`](Self::write).
    pub fn write_from(
        &mut self,
        buf: &[u8],
        offset: usize,
        length: usize,
        pos: u64,
    ) -> CoreResult<u64> {
        check_bounds(offset, length, buf.len())?;
        self.write(&buf[offset..offset + length], pos)
    }

    /// Writes a single byte at `pos`.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub fn write_byte(&mut self, byte: u8, pos: u64) -> CoreResult<u64> {
        self.write(&[byte], pos)
    }

    /// Reads the byte at `pos`, or `None` at end of data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is beyond the current length.
    pub fn read_byte(&mut self, pos: u64) -> CoreResult<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte, pos)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Reads up to `buf.len()` bytes starting at `pos`.
    ///
    /// Returns 0 only at end of data or for an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is beyond the current length.
    pub fn read(&mut self, buf: &mut [u8], pos: u64) -> CoreResult<usize> {
        let len = self.length()?;
        if pos > len {
            return Err(CoreError::invalid_position(pos, "position too large"));
        }

        match &mut self.repr {
            Repr::Memory(data) => {
                let start = pos as usize;
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            Repr::File(file) => Ok(file.read_at(pos, buf)?),
        }
    }

    /// Reads up to `length` bytes into `buf[offset..]` starting at `pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOffsetOrLength` if the range is outside `buf`,
    /// otherwise as [`read`](Self::read).
    pub fn read_into(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        length: usize,
        pos: u64,
    ) -> CoreResult<usize> {
        check_bounds(offset, length, buf.len())?;
        self.read(&mut buf[offset..offset + length], pos)
    }

    /// Returns up to `len` bytes starting at `pos`.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read).
    pub fn get_bytes(&mut self, pos: u64, len: usize) -> CoreResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let n = self.read(&mut out[done..], pos + done as u64)?;
            if n == 0 {
                break;
            }
            done += n;
        }
        out.truncate(done);
        Ok(out)
    }

    /// Shrinks the store to `size` bytes.
    ///
    /// A file-backed store shrinking below its buffer size moves back into
    /// memory and deletes its overflow file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `size` is greater than the current
    /// length.
    pub fn truncate(&mut self, size: u64) -> CoreResult<()> {
        let len = self.length()?;
        if size > len {
            return Err(CoreError::invalid_position(size, "truncate beyond length"));
        }

        match &mut self.repr {
            Repr::Memory(buf) => buf.truncate(size as usize),
            Repr::File(file) if size < self.buffer_size as u64 => {
                let mut data = vec![0u8; size as usize];
                read_fully(file, 0, &mut data)?;
                debug!(file = file.id(), len = size, "byte store demoted to memory");
                // Dropping the old file deletes it
                self.repr = Repr::Memory(data);
            }
            Repr::File(file) => file.set_len(size)?,
        }

        self.update_count += 1;
        Ok(())
    }

    /// Replaces the bytes in `[start, end)` with `data`.
    ///
    /// `data` may be shorter or longer than the range it replaces.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if the range is reversed or extends past
    /// the current length.
    pub fn replace_bytes(&mut self, data: &[u8], start: u64, end: u64) -> CoreResult<()> {
        let len = self.length()?;
        if start > end || end > len {
            return Err(CoreError::invalid_position(
                end,
                format!("replace range [{start}, {end}) invalid for length {len}"),
            ));
        }
        let new_len = len - (end - start) + data.len() as u64;

        match &mut self.repr {
            Repr::Memory(buf) if new_len <= self.buffer_size as u64 => {
                buf.splice(start as usize..end as usize, data.iter().copied());
            }
            Repr::Memory(buf) => {
                let mut joined = Vec::with_capacity(new_len as usize);
                joined.extend_from_slice(&buf[..start as usize]);
                joined.extend_from_slice(data);
                joined.extend_from_slice(&buf[end as usize..]);
                self.spill(&joined)?;
            }
            Repr::File(old) => {
                let mut new = self.session.create_overflow_file()?;
                let chunk = self.buffer_size;
                copy_file_range(old, &mut new, 0, start, 0, chunk)?;
                new.write_at(start, data)?;
                copy_file_range(old, &mut new, end, len, start + data.len() as u64, chunk)?;
                debug!(old = old.id(), new = new.id(), len = new_len, "overflow file rewritten");
                self.repr = Repr::File(new);
            }
        }

        self.update_count += 1;
        Ok(())
    }

    /// Copies bytes from `source` into the store starting at position 0.
    ///
    /// With `Some(length)` exactly that many bytes are copied; `None` copies
    /// until the source is exhausted. A trailing end-of-stream marker is
    /// stripped afterwards. Returns the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns `PrematureEndOfData` if the source ends before `length`
    /// bytes.
    pub fn copy_data(&mut self, source: &mut dyn Read, length: Option<u64>) -> CoreResult<u64> {
        self.check_live()?;
        let mut chunk = vec![0u8; self.buffer_size];
        let mut copied = 0u64;

        loop {
            let want = match length {
                Some(total) if copied >= total => break,
                Some(total) => chunk.len().min((total - copied) as usize),
                None => chunk.len(),
            };
            let n = read_some(source, &mut chunk[..want])?;
            if n == 0 {
                if let Some(total) = length {
                    return Err(CoreError::premature_end(total, copied));
                }
                break;
            }
            self.write(&chunk[..n], copied)?;
            copied += n as u64;
        }

        self.strip_end_marker()?;
        Ok(copied)
    }

    /// Copies modified UTF-8 from `source`, counting characters.
    ///
    /// With `Some(char_length)` exactly that many characters are copied and
    /// no byte past the last one is consumed. `None` copies until the source
    /// is exhausted. A trailing end-of-stream marker is stripped afterwards.
    /// Returns the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns `MalformedEncoding` on an invalid lead byte and
    /// `PrematureEndOfData` if the source ends before `char_length`
    /// characters.
    pub fn copy_utf8_data(
        &mut self,
        source: &mut dyn Read,
        char_length: Option<u64>,
    ) -> CoreResult<u64> {
        self.check_live()?;
        let mut chunk = vec![0u8; self.buffer_size];
        let mut counter = CharCounter::default();
        let mut copied = 0u64;

        loop {
            let want = match char_length {
                Some(total) if counter.chars >= total && counter.pending == 0 => break,
                Some(_) if counter.ended => break,
                // Every outstanding character needs at least one more byte
                Some(total) => {
                    let needed = total.saturating_sub(counter.chars) + counter.pending as u64;
                    chunk.len().min(needed as usize)
                }
                None => chunk.len(),
            };
            let n = read_some(source, &mut chunk[..want])?;
            if n == 0 {
                break;
            }
            counter.feed(&chunk[..n], copied)?;
            self.write(&chunk[..n], copied)?;
            copied += n as u64;
        }

        if let Some(total) = char_length {
            if counter.chars < total || counter.pending > 0 {
                return Err(CoreError::premature_end(total, counter.chars));
            }
        }

        self.strip_end_marker()?;
        Ok(copied)
    }

    fn strip_end_marker(&mut self) -> CoreResult<()> {
        let len = self.length()?;
        if len < END_OF_STREAM_MARKER.len() as u64 {
            return Ok(());
        }
        let marker_pos = len - END_OF_STREAM_MARKER.len() as u64;
        let tail = self.get_bytes(marker_pos, END_OF_STREAM_MARKER.len())?;
        if tail == END_OF_STREAM_MARKER {
            self.truncate(marker_pos)?;
        }
        Ok(())
    }

    /// Releases memory and deletes the overflow file, if any.
    ///
    /// Idempotent; every other operation fails with `Released` afterwards.
    pub fn free(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.repr = Repr::Memory(Vec::new());
    }
}

impl std::fmt::Debug for ByteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStore")
            .field("file_backed", &self.is_file_backed())
            .field("buffer_size", &self.buffer_size)
            .field("update_count", &self.update_count)
            .field("released", &self.released)
            .finish()
    }
}

/// Counts modified UTF-8 characters by lead byte across chunk boundaries.
///
/// A surrogate pair (two 3-byte sequences) counts as one character.
#[derive(Default)]
struct CharCounter {
    chars: u64,
    /// Continuation bytes still owed by the current sequence.
    pending: u8,
    /// The current sequence started with 0xED (possible surrogate).
    surrogate_lead: bool,
    /// Whether the next continuation byte is the first of its sequence.
    first_continuation: bool,
    /// Bytes of a possible end-of-stream marker seen so far.
    marker_run: u8,
    /// A complete end-of-stream marker was fed.
    ended: bool,
}

impl CharCounter {
    fn feed(&mut self, bytes: &[u8], base: u64) -> CoreResult<()> {
        for (i, &b) in bytes.iter().enumerate() {
            if self.pending > 0 {
                if self.first_continuation && self.surrogate_lead && (b & 0xF0) == 0xA0 {
                    // High surrogate; the low half completes the character
                    self.chars -= 1;
                }
                self.first_continuation = false;
                self.pending -= 1;
                if self.marker_run > 0 {
                    self.marker_run = if b == 0 { self.marker_run + 1 } else { 0 };
                }
                if self.pending == 0 && self.marker_run as usize == END_OF_STREAM_MARKER.len() {
                    // The marker ends the value and is not a character
                    self.chars -= 1;
                    self.ended = true;
                }
                continue;
            }

            self.pending = match b {
                0x00..=0x7F => 0,
                0xC0..=0xDF => 1,
                0xE0..=0xEF => 2,
                _ => {
                    return Err(CoreError::malformed(
                        base + i as u64,
                        format!("invalid lead byte {b:#04x}"),
                    ))
                }
            };
            self.chars += 1;
            self.surrogate_lead = b == 0xED;
            self.first_continuation = true;
            self.marker_run = u8::from(b == END_OF_STREAM_MARKER[0]);
        }
        Ok(())
    }
}

/// Reads into `buf`, retrying on interruption.
pub(crate) fn read_some(source: &mut dyn Read, buf: &mut [u8]) -> CoreResult<usize> {
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_fully(file: &mut OverflowFile, pos: u64, buf: &mut [u8]) -> CoreResult<()> {
    let mut done = 0;
    while done < buf.len() {
        let n = file.read_at(pos + done as u64, &mut buf[done..])?;
        if n == 0 {
            return Err(CoreError::premature_end(buf.len() as u64, done as u64));
        }
        done += n;
    }
    Ok(())
}

/// Copies `[from, to)` of `src` to `dst` starting at `dst_pos`.
fn copy_file_range(
    src: &mut OverflowFile,
    dst: &mut OverflowFile,
    from: u64,
    to: u64,
    dst_pos: u64,
    chunk: usize,
) -> CoreResult<()> {
    let mut buf = vec![0u8; chunk];
    let mut pos = from;
    while pos < to {
        let n = chunk.min((to - pos) as usize);
        read_fully(src, pos, &mut buf[..n])?;
        dst.write_at(dst_pos + (pos - from), &buf[..n])?;
        pos += n as u64;
    }
    Ok(())
}

//! Character large object handle.

use super::{ClobWriter, InternalClob, StoreStreamClob, TemporaryClob};
use crate::error::{check_bounds, CoreError, CoreResult};
use crate::session::Session;
use crate::stream::StoreStream;
use crate::utf8::CharReader;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

struct ClobState {
    content: InternalClob,
    /// Bumped each time `content` is replaced.
    generation: u64,
    valid: bool,
    session: Session,
}

impl ClobState {
    /// Replaces read-only content with a writable copy of its first
    /// `char_length` characters (all of them with `None`).
    fn make_writable(&mut self, char_length: Option<u64>) -> CoreResult<()> {
        if self.content.is_writable() {
            return Ok(());
        }
        let copy = TemporaryClob::clone_content(&self.session, &self.content, char_length)?;
        let old = std::mem::replace(&mut self.content, InternalClob::Writable(copy));
        old.release();
        self.generation += 1;
        debug!(generation = self.generation, "read-only clob replaced by writable copy");
        Ok(())
    }

    fn check_insert_position(&self, pos: u64) -> CoreResult<()> {
        if pos < 1 {
            return Err(CoreError::invalid_position(pos, "positions start at 1"));
        }
        if pos > self.content.get_char_length()? + 1 {
            return Err(CoreError::invalid_position(
                pos,
                "position beyond character length + 1",
            ));
        }
        Ok(())
    }
}

/// A character large object as seen by a client.
///
/// Wraps [`InternalClob`] content. Read-only content is copied into a
/// writable [`TemporaryClob`] the first time it is modified; readers obtained
/// from [`character_stream`](Self::character_stream) notice the switch and
/// carry on from their position in the copy.
///
/// Clones refer to the same object. Operations fail with `Released` after
/// [`free`](Self::free) and with `SessionClosed` once the owning session has
/// been closed.
#[derive(Clone)]
pub struct Clob {
    state: Arc<Mutex<ClobState>>,
}

impl Clob {
    /// Creates an empty, writable object.
    #[must_use]
    pub fn new(session: &Session) -> Self {
        Self::from_content(session, InternalClob::Writable(TemporaryClob::new(session)))
    }

    /// Creates a writable object holding `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if an overflow file is needed and cannot be created.
    pub fn from_text(session: &Session, text: &str) -> CoreResult<Self> {
        let content = TemporaryClob::from_text(session, text)?;
        Ok(Self::from_content(session, InternalClob::Writable(content)))
    }

    /// Creates an object over a persisted value.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be initialized.
    pub fn from_store_stream(session: &Session, stream: Box<dyn StoreStream>) -> CoreResult<Self> {
        let content = StoreStreamClob::new(session, stream)?;
        Ok(Self::from_content(session, InternalClob::ReadOnly(content)))
    }

    /// Wraps existing content.
    #[must_use]
    pub fn from_content(session: &Session, content: InternalClob) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClobState {
                content,
                generation: 0,
                valid: true,
                session: session.clone(),
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ClobState) -> CoreResult<R>) -> CoreResult<R> {
        let mut state = self.state.lock();
        if !state.valid {
            return Err(CoreError::Released);
        }
        if state.session.is_closed() {
            return Err(CoreError::SessionClosed);
        }
        f(&mut state)
    }

    /// Returns the length in characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is freed or the content is malformed.
    pub fn length(&self) -> CoreResult<u64> {
        self.with_state(|s| s.content.get_char_length())
    }

    /// Returns up to `length` characters starting at 1-based `pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is 0 or beyond the length plus one.
    pub fn get_sub_string(&self, pos: u64, length: usize) -> CoreResult<String> {
        let mut reader = self.with_state(|s| s.content.get_reader(pos))?;
        let mut out = String::new();
        let mut buf = ['\0'; 1024];
        let mut remaining = length;
        while remaining > 0 {
            let want = remaining.min(buf.len());
            let n = reader.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            out.extend(&buf[..n]);
            remaining -= n;
        }
        reader.close();
        Ok(out)
    }

    /// Returns the 1-based position of the first occurrence of `pattern` at
    /// or after `start`.
    ///
    /// An empty pattern matches at `start`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `start` is 0.
    pub fn position(&self, pattern: &str, start: u64) -> CoreResult<Option<u64>> {
        if start < 1 {
            return Err(CoreError::invalid_position(start, "positions start at 1"));
        }
        if pattern.is_empty() {
            return Ok(Some(start));
        }

        let reader = self.with_state(|s| {
            if start > s.content.get_char_length()? {
                return Ok(None);
            }
            s.content.get_reader(start).map(Some)
        })?;
        let Some(mut reader) = reader else {
            return Ok(None);
        };

        let pattern: Vec<char> = pattern.chars().collect();
        let mut window = VecDeque::with_capacity(pattern.len());
        let mut window_start = start;
        let mut buf = ['\0'; 1024];
        let found = 'search: loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break None;
            }
            for &ch in &buf[..n] {
                window.push_back(ch);
                if window.len() > pattern.len() {
                    window.pop_front();
                    window_start += 1;
                }
                if window.len() == pattern.len() && window.iter().eq(pattern.iter()) {
                    break 'search Some(window_start);
                }
            }
        };
        reader.close();
        Ok(found)
    }

    /// Writes `text` at 1-based `pos`, overwriting what is there, and
    /// returns the number of characters written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is 0 or beyond the length plus one.
    pub fn set_string(&self, pos: u64, text: &str) -> CoreResult<u64> {
        self.with_state(|s| {
            s.check_insert_position(pos)?;
            if text.is_empty() {
                return Ok(0);
            }
            s.make_writable(None)?;
            s.content.insert_string(text, pos)
        })
    }

    /// Writes `len` characters of `text` starting at character `offset`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOffsetOrLength` if the range does not fit `text`, and
    /// otherwise as [`set_string`](Self::set_string).
    pub fn set_string_part(
        &self,
        pos: u64,
        text: &str,
        offset: usize,
        len: usize,
    ) -> CoreResult<u64> {
        let chars: Vec<char> = text.chars().collect();
        check_bounds(offset, len, chars.len())?;
        let part: String = chars[offset..offset + len].iter().collect();
        self.set_string(pos, &part)
    }

    /// Shrinks the object to `len` characters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if the object is shorter than `len`.
    pub fn truncate(&self, len: u64) -> CoreResult<()> {
        self.with_state(|s| {
            if s.content.is_writable() {
                return s.content.truncate(len);
            }
            if len > s.content.get_char_length()? {
                return Err(CoreError::invalid_position(
                    len,
                    "truncate length exceeds character length",
                ));
            }
            s.make_writable(Some(len)).map_err(|e| match e {
                CoreError::PrematureEndOfData { .. } => {
                    CoreError::invalid_position(len, "truncate length exceeds character length")
                }
                e => e,
            })
        })
    }

    /// Returns a reader over the whole object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is freed.
    pub fn character_stream(&self) -> CoreResult<UpdatableClobReader> {
        UpdatableClobReader::new(self.clone(), 1, None)
    }

    /// Returns a reader over `len` characters starting at 1-based `pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is 0 or the range runs past the
    /// end.
    pub fn character_stream_range(&self, pos: u64, len: u64) -> CoreResult<UpdatableClobReader> {
        if pos < 1 {
            return Err(CoreError::invalid_position(pos, "positions start at 1"));
        }
        let end = pos.saturating_add(len);
        if end - 1 > self.length()? {
            return Err(CoreError::invalid_position(
                pos,
                format!("range of {len} characters runs past the end"),
            ));
        }
        UpdatableClobReader::new(self.clone(), pos, Some(end))
    }

    /// Returns a writer starting at 1-based `pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is 0 or beyond the length plus one.
    pub fn writer(&self, pos: u64) -> CoreResult<ClobWriter> {
        self.with_state(|s| {
            s.check_insert_position(pos)?;
            s.make_writable(None)?;
            s.content.get_writer(pos)
        })
    }

    /// Releases the content. Idempotent.
    pub fn free(&self) {
        let mut state = self.state.lock();
        if state.valid {
            state.valid = false;
            state.content.release();
            debug!(generation = state.generation, "clob freed");
        }
    }

    /// Returns true once [`free`](Self::free) has been called.
    #[must_use]
    pub fn is_freed(&self) -> bool {
        !self.state.lock().valid
    }

    /// Returns true if the content is currently writable.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.state.lock().content.is_writable()
    }

    /// Returns how many times the content has been replaced.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

impl std::fmt::Debug for Clob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Clob")
            .field("content", &state.content)
            .field("generation", &state.generation)
            .field("valid", &state.valid)
            .finish()
    }
}

/// A reader over a [`Clob`] that survives the content being replaced.
///
/// Before each read the reader compares the handle's generation with the
/// one it was created under and, if they differ, reopens the content at its
/// current character position. Changes within writable content are followed
/// by the underlying [`TemporaryClobReader`](super::TemporaryClobReader).
pub struct UpdatableClobReader {
    clob: Clob,
    reader: Option<Box<dyn CharReader + Send>>,
    generation: u64,
    /// 1-based position of the next character.
    pos: u64,
    /// Exclusive end position for a bounded reader.
    end: Option<u64>,
    closed: bool,
}

impl UpdatableClobReader {
    fn new(clob: Clob, pos: u64, end: Option<u64>) -> CoreResult<Self> {
        let (reader, generation) =
            clob.with_state(|s| Ok((s.content.get_reader(pos)?, s.generation)))?;
        Ok(Self {
            clob,
            reader: Some(reader),
            generation,
            pos,
            end,
            closed: false,
        })
    }

    fn sync(&mut self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::StreamClosed);
        }
        let (generation, pos) = (self.generation, self.pos);
        let fresh = self.clob.with_state(|s| {
            if s.generation == generation {
                return Ok(None);
            }
            let reader = match s.content.get_reader(pos) {
                Ok(reader) => Some(reader),
                // Content was truncated below our position
                Err(CoreError::InvalidPosition { .. }) => None,
                Err(e) => return Err(e),
            };
            Ok(Some((reader, s.generation)))
        })?;

        if let Some((reader, generation)) = fresh {
            debug!(pos, generation, "clob reader reopened on replaced content");
            if let Some(old) = self.reader.as_mut() {
                old.close();
            }
            self.reader = reader;
            self.generation = generation;
        }
        Ok(())
    }

    fn remaining(&self, wanted: u64) -> u64 {
        match self.end {
            Some(end) => wanted.min(end.saturating_sub(self.pos)),
            None => wanted,
        }
    }

    /// Returns the 1-based position of the next character.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl CharReader for UpdatableClobReader {
    fn read(&mut self, out: &mut [char]) -> CoreResult<usize> {
        self.sync()?;
        let limit = usize::try_from(self.remaining(out.len() as u64)).unwrap_or(out.len());
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        if limit == 0 {
            return Ok(0);
        }
        let n = reader.read(&mut out[..limit])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> CoreResult<u64> {
        self.sync()?;
        let wanted = self.remaining(n);
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let skipped = reader.skip(wanted)?;
        self.pos += skipped;
        Ok(skipped)
    }

    fn close(&mut self) {
        self.closed = true;
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
    }
}

impl std::fmt::Debug for UpdatableClobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatableClobReader")
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("generation", &self.generation)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobConfig;
    use crate::stream::MemoryStoreStream;
    use crate::utf8::encode_with_header;

    fn session() -> Session {
        Session::new(LobConfig::new().reader_buffer_chars(4))
    }

    fn persisted(session: &Session, text: &str) -> Clob {
        let stream = MemoryStoreStream::new(encode_with_header(text));
        Clob::from_store_stream(session, Box::new(stream)).unwrap()
    }

    #[test]
    fn set_string_copies_read_only_content() {
        let session = session();
        let clob = persisted(&session, "abcdef");
        assert!(!clob.is_writable());
        assert_eq!(clob.generation(), 0);

        assert_eq!(clob.set_string(5, "XYZ").unwrap(), 3);
        assert!(clob.is_writable());
        assert_eq!(clob.generation(), 1);
        assert_eq!(clob.get_sub_string(1, 100).unwrap(), "abcdXYZ");

        clob.set_string(1, "-").unwrap();
        assert_eq!(clob.generation(), 1);
        assert_eq!(clob.get_sub_string(1, 3).unwrap(), "-bc");
    }

    #[test]
    fn set_string_checks_position() {
        let session = session();
        let clob = persisted(&session, "abc");
        assert!(matches!(
            clob.set_string(5, "x"),
            Err(CoreError::InvalidPosition { position: 5, .. })
        ));
        assert!(clob.set_string(0, "x").is_err());
        assert!(!clob.is_writable());

        assert_eq!(clob.set_string(4, "").unwrap(), 0);
        assert!(!clob.is_writable());
        assert_eq!(clob.set_string(4, "d").unwrap(), 1);
        assert_eq!(clob.length().unwrap(), 4);
    }

    #[test]
    fn set_string_part_bounds() {
        let session = session();
        let clob = Clob::from_text(&session, "0123").unwrap();
        assert_eq!(clob.set_string_part(2, "h\u{e9}llo", 1, 3).unwrap(), 3);
        assert_eq!(clob.get_sub_string(1, 10).unwrap(), "0\u{e9}ll");
        assert!(matches!(
            clob.set_string_part(1, "abc", 2, 2),
            Err(CoreError::InvalidOffsetOrLength { .. })
        ));
    }

    #[test]
    fn truncate_read_only_makes_bounded_copy() {
        let session = session();
        let clob = persisted(&session, "abcdef");

        assert!(matches!(
            clob.truncate(7),
            Err(CoreError::InvalidPosition { position: 7, .. })
        ));
        assert!(!clob.is_writable());

        clob.truncate(3).unwrap();
        assert!(clob.is_writable());
        assert_eq!(clob.length().unwrap(), 3);
        assert_eq!(clob.get_sub_string(1, 10).unwrap(), "abc");

        clob.truncate(1).unwrap();
        assert_eq!(clob.get_sub_string(1, 10).unwrap(), "a");
        assert!(clob.truncate(2).is_err());
    }

    #[test]
    fn oversized_lengths_are_rejected_not_computed() {
        let session = session();
        let clob = Clob::from_text(&session, "abc").unwrap();
        assert!(matches!(
            clob.truncate(u64::MAX),
            Err(CoreError::InvalidPosition { .. })
        ));
        assert_eq!(clob.length().unwrap(), 3);

        let fixed = persisted(&session, "abc");
        assert!(fixed.truncate(u64::MAX).is_err());
        assert!(!fixed.is_writable());
    }

    #[test]
    fn sub_string_positions() {
        let session = session();
        let clob = persisted(&session, "hello");
        assert_eq!(clob.get_sub_string(2, 3).unwrap(), "ell");
        assert_eq!(clob.get_sub_string(4, 10).unwrap(), "lo");
        assert_eq!(clob.get_sub_string(6, 1).unwrap(), "");
        assert_eq!(clob.get_sub_string(1, usize::MAX).unwrap(), "hello");
        assert_eq!(clob.get_sub_string(3, usize::MAX).unwrap(), "llo");
        assert!(clob.get_sub_string(7, 1).is_err());
        assert!(clob.get_sub_string(0, 1).is_err());
    }

    #[test]
    fn position_search() {
        let session = session();
        let clob = persisted(&session, "aaab hello world hello");

        assert_eq!(clob.position("hello", 1).unwrap(), Some(6));
        assert_eq!(clob.position("hello", 7).unwrap(), Some(18));
        assert_eq!(clob.position("aab", 1).unwrap(), Some(2));
        assert_eq!(clob.position("xyz", 1).unwrap(), None);
        assert_eq!(clob.position("", 3).unwrap(), Some(3));
        assert_eq!(clob.position("o", 100).unwrap(), None);
        assert!(clob.position("a", 0).is_err());
    }

    #[test]
    fn reader_follows_replaced_content() {
        let session = session();
        let clob = persisted(&session, "abcdef");
        let mut reader = clob.character_stream().unwrap();

        let mut buf = ['\0'; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, ['a', 'b', 'c']);

        clob.set_string(5, "XY").unwrap();
        assert_eq!(reader.read_to_string().unwrap(), "dXY");
        assert_eq!(reader.position(), 7);
    }

    #[test]
    fn reader_past_truncation_is_exhausted() {
        let session = session();
        let clob = persisted(&session, "abcdef");
        let mut reader = clob.character_stream().unwrap();
        reader.skip(5).unwrap();

        clob.truncate(2).unwrap();
        assert_eq!(reader.read_char().unwrap(), None);
    }

    #[test]
    fn bounded_reader() {
        let session = session();
        let clob = persisted(&session, "0123456789");
        let mut reader = clob.character_stream_range(3, 4).unwrap();
        assert_eq!(reader.read_to_string().unwrap(), "2345");

        assert!(clob.character_stream_range(8, 3).is_ok());
        assert!(matches!(
            clob.character_stream_range(8, 4),
            Err(CoreError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn writer_on_read_only_content() {
        let session = session();
        let clob = persisted(&session, "abc");
        let mut writer = clob.writer(4).unwrap();
        writer.write("def").unwrap();
        assert_eq!(clob.generation(), 1);
        assert_eq!(clob.get_sub_string(1, 10).unwrap(), "abcdef");
    }

    #[test]
    fn free_is_idempotent() {
        let session = session();
        let clob = Clob::from_text(&session, "abc").unwrap();
        let mut reader = clob.character_stream().unwrap();

        clob.free();
        clob.free();
        assert!(clob.is_freed());
        assert!(matches!(clob.length(), Err(CoreError::Released)));
        assert!(matches!(clob.set_string(1, "x"), Err(CoreError::Released)));
        assert!(matches!(reader.read_char(), Err(CoreError::Released)));
    }

    #[test]
    fn closed_session_rejects_operations() {
        let session = session();
        let clob = Clob::from_text(&session, "abc").unwrap();
        session.close();
        assert!(matches!(clob.length(), Err(CoreError::SessionClosed)));
        clob.free();
    }
}

//! Writable character content backed by a byte store.

use super::position_cache::PositionCache;
use super::InternalClob;
use crate::error::{CoreError, CoreResult};
use crate::session::Session;
use crate::store::{shared, ByteStore, LobInputStream, SharedByteStore};
use crate::utf8::{encode_str, skip_chars, skip_until_eof, CharReader, Framing, Utf8Reader};
use parking_lot::Mutex;
use std::fmt;
use std::io::BufReader;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Caches {
    position: PositionCache,
    /// (update count, character length)
    char_length: Option<(u64, u64)>,
}

/// Mutable character content stored as modified UTF-8 in a [`ByteStore`].
///
/// Clones share the same store and caches; they are the same content.
/// Translating a character position to a byte offset scans the bytes, so the
/// last translation is cached and later positions scan from there.
#[derive(Clone)]
pub struct TemporaryClob {
    store: SharedByteStore,
    caches: Arc<Mutex<Caches>>,
    reader_buffer_chars: usize,
}

impl TemporaryClob {
    /// Creates empty content.
    #[must_use]
    pub fn new(session: &Session) -> Self {
        Self::with_store(session, ByteStore::new(session))
    }

    /// Creates content holding `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if an overflow file is needed and cannot be created.
    pub fn from_text(session: &Session, text: &str) -> CoreResult<Self> {
        Ok(Self::with_store(session, ByteStore::with_str(session, text)?))
    }

    fn with_store(session: &Session, store: ByteStore) -> Self {
        Self {
            store: shared(store),
            caches: Arc::new(Mutex::new(Caches::default())),
            reader_buffer_chars: session.config().reader_buffer_chars,
        }
    }

    /// Creates writable content holding a copy of `source`.
    ///
    /// With `Some(n)` only the first `n` characters are copied.
    ///
    /// # Errors
    ///
    /// Returns `PrematureEndOfData` if `source` has fewer than `n`
    /// characters.
    pub fn clone_content(
        session: &Session,
        source: &InternalClob,
        char_length: Option<u64>,
    ) -> CoreResult<Self> {
        let clob = Self::new(session);
        let mut raw = source.get_raw_byte_stream()?;
        let copied = clob.store.lock().copy_utf8_data(&mut raw, char_length)?;
        debug!(bytes = copied, bounded = char_length.is_some(), "clob content cloned");
        Ok(clob)
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &SharedByteStore {
        &self.store
    }

    /// Returns the store's update count.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.store.lock().update_count()
    }

    /// Returns true once the content has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.store.lock().is_released()
    }

    fn check_live(&self) -> CoreResult<()> {
        if self.is_released() {
            return Err(CoreError::Released);
        }
        Ok(())
    }

    /// Skips `chars` characters from `byte_pos`; `None` if the data ends
    /// first.
    fn scan_from(&self, byte_pos: u64, chars: u64) -> CoreResult<Option<u64>> {
        let mut input = BufReader::new(LobInputStream::new(Arc::clone(&self.store), byte_pos));
        match skip_chars(&mut input, chars) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(CoreError::PrematureEndOfData { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns the byte offset of 1-based `char_pos`, or `None` if it lies
    /// beyond the character length plus one.
    fn try_byte_position(&self, char_pos: u64) -> CoreResult<Option<u64>> {
        self.check_live()?;
        let cache = self.caches.lock().position;
        if char_pos == cache.char_pos() {
            return Ok(Some(cache.byte_pos()));
        }

        let (from_char, from_byte) = if char_pos > cache.char_pos() {
            (cache.char_pos(), cache.byte_pos())
        } else {
            (1, 0)
        };
        let Some(skipped) = self.scan_from(from_byte, char_pos - from_char)? else {
            return Ok(None);
        };

        let byte_pos = from_byte + skipped;
        self.caches.lock().position.update(char_pos, byte_pos);
        Ok(Some(byte_pos))
    }

    /// Returns the byte offset of 1-based `char_pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `char_pos` is 0 or beyond the character
    /// length plus one.
    pub fn byte_position(&self, char_pos: u64) -> CoreResult<u64> {
        if char_pos < 1 {
            return Err(CoreError::invalid_position(char_pos, "positions start at 1"));
        }
        self.try_byte_position(char_pos)?.ok_or_else(|| {
            CoreError::invalid_position(char_pos, "position beyond character length + 1")
        })
    }

    /// Returns the length in characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is released or malformed.
    pub fn get_char_length(&self) -> CoreResult<u64> {
        let count = {
            let store = self.store.lock();
            store.length()?;
            store.update_count()
        };
        if let Some((cached_at, len)) = self.caches.lock().char_length {
            if cached_at == count {
                return Ok(len);
            }
        }

        let mut input = BufReader::new(LobInputStream::new(Arc::clone(&self.store), 0));
        let chars = skip_until_eof(&mut input)?.chars;
        self.caches.lock().char_length = Some((count, chars));
        Ok(chars)
    }

    /// Returns the length in bytes.
    ///
    /// # Errors
    ///
    /// Returns `Released` after [`release`](Self::release).
    pub fn get_byte_length(&self) -> CoreResult<u64> {
        self.store.lock().length()
    }

    /// Returns a reader starting at 1-based `char_pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `char_pos` is 0 or beyond the character
    /// length plus one.
    pub fn get_reader(&self, char_pos: u64) -> CoreResult<TemporaryClobReader> {
        TemporaryClobReader::new(self.clone(), char_pos)
    }

    /// Returns a writer starting at 1-based `char_pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `char_pos` is 0 or beyond the character
    /// length plus one.
    pub fn get_writer(&self, char_pos: u64) -> CoreResult<ClobWriter> {
        self.byte_position(char_pos)?;
        Ok(ClobWriter {
            clob: self.clone(),
            pos: char_pos,
            closed: false,
        })
    }

    /// Returns the raw modified UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns `Released` after [`release`](Self::release).
    pub fn get_raw_byte_stream(&self) -> CoreResult<LobInputStream> {
        self.check_live()?;
        Ok(LobInputStream::new(Arc::clone(&self.store), 0))
    }

    /// Writes `text` at 1-based `char_pos`, returning the number of
    /// characters written.
    ///
    /// At the position just past the end this appends. Elsewhere the
    /// characters currently occupying `[char_pos, char_pos + len)` are
    /// replaced, and the content grows if `text` runs past the end.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `char_pos` is 0 or beyond the character
    /// length plus one.
    pub fn insert_string(&self, text: &str, char_pos: u64) -> CoreResult<u64> {
        if char_pos < 1 {
            return Err(CoreError::invalid_position(char_pos, "positions start at 1"));
        }
        let char_len = self.get_char_length()?;
        if char_pos > char_len + 1 {
            return Err(CoreError::invalid_position(
                char_pos,
                "position beyond character length + 1",
            ));
        }
        let inserted = text.chars().count() as u64;
        if inserted == 0 {
            return Ok(0);
        }
        let encoded = encode_str(text);

        if char_pos == char_len + 1 {
            let count = {
                let mut store = self.store.lock();
                let end = store.length()?;
                store.write(&encoded, end)?;
                store.update_count()
            };
            self.caches.lock().char_length = Some((count, char_len + inserted));
        } else {
            let start = self.byte_position(char_pos)?;
            let end = self.try_byte_position(char_pos + inserted)?;
            let count = {
                let mut store = self.store.lock();
                let end = match end {
                    Some(end) => end,
                    None => store.length()?,
                };
                store.replace_bytes(&encoded, start, end)?;
                store.update_count()
            };

            let new_len = char_len.max(char_pos - 1 + inserted);
            let mut caches = self.caches.lock();
            // Mappings up to char_pos survive, later ones do not
            caches.position.update(char_pos, start);
            caches.char_length = Some((count, new_len));
        }

        Ok(inserted)
    }

    /// Shrinks the content to `new_char_length` characters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if the content is shorter than
    /// `new_char_length`.
    pub fn truncate(&self, new_char_length: u64) -> CoreResult<()> {
        let Some(end_pos) = new_char_length.checked_add(1) else {
            return Err(CoreError::invalid_position(
                new_char_length,
                "truncate length exceeds character length",
            ));
        };
        let Some(byte_len) = self.try_byte_position(end_pos)? else {
            return Err(CoreError::invalid_position(
                new_char_length,
                "truncate length exceeds character length",
            ));
        };

        let count = {
            let mut store = self.store.lock();
            store.truncate(byte_len)?;
            store.update_count()
        };

        let mut caches = self.caches.lock();
        if caches.position.char_pos() > new_char_length {
            caches.position.reset();
        }
        caches.char_length = Some((count, new_char_length));
        Ok(())
    }

    /// Frees the store. Idempotent.
    pub fn release(&self) {
        self.store.lock().free();
        let mut caches = self.caches.lock();
        caches.position.reset();
        caches.char_length = None;
    }
}

impl fmt::Debug for TemporaryClob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryClob")
            .field("store", &*self.store.lock())
            .field("position_cache", &self.caches.lock().position)
            .finish()
    }
}

/// Character reader over a [`TemporaryClob`].
///
/// The reader follows the content: after the store changes it repositions
/// itself at its current character position before the next read. A reader
/// left beyond the end by a truncation reads as exhausted.
pub struct TemporaryClobReader {
    clob: TemporaryClob,
    reader: Option<Utf8Reader<LobInputStream>>,
    update_count: u64,
    /// 1-based position of the next character.
    char_pos: u64,
    closed: bool,
}

impl TemporaryClobReader {
    fn new(clob: TemporaryClob, char_pos: u64) -> CoreResult<Self> {
        if char_pos < 1 {
            return Err(CoreError::invalid_position(char_pos, "positions start at 1"));
        }
        let mut reader = Self {
            clob,
            reader: None,
            update_count: 0,
            char_pos,
            closed: false,
        };
        reader.reinitialize()?;
        if reader.reader.is_none() {
            return Err(CoreError::invalid_position(
                char_pos,
                "position beyond character length + 1",
            ));
        }
        Ok(reader)
    }

    fn reinitialize(&mut self) -> CoreResult<()> {
        self.update_count = self.clob.update_count();
        self.reader = match self.clob.try_byte_position(self.char_pos)? {
            Some(byte_pos) => Some(Utf8Reader::new(
                LobInputStream::new(Arc::clone(&self.clob.store), byte_pos),
                Framing::Raw,
                self.clob.reader_buffer_chars,
            )?),
            None => None,
        };
        Ok(())
    }

    fn refresh(&mut self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::StreamClosed);
        }
        if self.is_obsolete() {
            debug!(char_pos = self.char_pos, "clob reader resynchronized after update");
            self.reinitialize()?;
        }
        Ok(())
    }

    /// Returns true if the content changed since the reader last synced.
    #[must_use]
    pub fn is_obsolete(&self) -> bool {
        self.clob.update_count() != self.update_count
    }

    /// Returns the 1-based position of the next character.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.char_pos
    }
}

impl CharReader for TemporaryClobReader {
    fn read(&mut self, out: &mut [char]) -> CoreResult<usize> {
        self.refresh()?;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let n = reader.read(out)?;
        self.char_pos += n as u64;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> CoreResult<u64> {
        self.refresh()?;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let skipped = reader.skip(n)?;
        self.char_pos += skipped;
        Ok(skipped)
    }

    fn close(&mut self) {
        self.closed = true;
        if let Some(reader) = self.reader.as_mut() {
            reader.close();
        }
        self.reader = None;
    }
}

impl fmt::Debug for TemporaryClobReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryClobReader")
            .field("char_pos", &self.char_pos)
            .field("update_count", &self.update_count)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Writes characters into a [`TemporaryClob`] at an advancing position.
#[derive(Debug)]
pub struct ClobWriter {
    clob: TemporaryClob,
    pos: u64,
    closed: bool,
}

impl ClobWriter {
    /// Writes `text` at the current position, returning the number of
    /// characters written.
    ///
    /// # Errors
    ///
    /// Returns `StreamClosed` after [`close`](Self::close), otherwise as
    /// [`TemporaryClob::insert_string`].
    pub fn write(&mut self, text: &str) -> CoreResult<u64> {
        if self.closed {
            return Err(CoreError::StreamClosed);
        }
        let written = self.clob.insert_string(text, self.pos)?;
        self.pos += written;
        Ok(written)
    }

    /// Writes `chars` at the current position.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub fn write_chars(&mut self, chars: &[char]) -> CoreResult<u64> {
        let text: String = chars.iter().collect();
        self.write(&text)
    }

    /// Returns the 1-based position of the next character written.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Closes the writer. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl fmt::Write for ClobWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        ClobWriter::write(self, s).map(|_| ()).map_err(|_| fmt::Error)
    }
}

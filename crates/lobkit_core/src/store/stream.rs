//! `Read`/`Write` views over a shared byte store.

use super::SharedByteStore;
use crate::error::{CoreError, CoreResult};
use crate::stream::PositionedStream;
use std::io::{self, Read, Write};

/// Reads a byte store from a byte position.
///
/// The stream remembers the store's update count when it is created. After
/// the store changes [`is_obsolete`](Self::is_obsolete) reports true until
/// [`reinitialize`](Self::reinitialize) is called. Reads always see the
/// current content.
#[derive(Debug)]
pub struct LobInputStream {
    store: SharedByteStore,
    pos: u64,
    update_count: u64,
    closed: bool,
}

impl LobInputStream {
    /// Creates a stream over `store` starting at byte `pos`.
    #[must_use]
    pub fn new(store: SharedByteStore, pos: u64) -> Self {
        let update_count = store.lock().update_count();
        Self {
            store,
            pos,
            update_count,
            closed: false,
        }
    }

    /// Returns true if the store changed since creation or the last
    /// [`reinitialize`](Self::reinitialize).
    #[must_use]
    pub fn is_obsolete(&self) -> bool {
        self.store.lock().update_count() != self.update_count
    }

    /// Accepts the store's current state.
    pub fn reinitialize(&mut self) {
        self.update_count = self.store.lock().update_count();
    }

    /// Closes the stream. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn read_at_pos(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        if self.closed {
            return Err(CoreError::StreamClosed);
        }
        let mut store = self.store.lock();
        // A truncation may have left the position past the end
        if self.pos >= store.length()? {
            return Ok(0);
        }
        let n = store.read(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Read for LobInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_at_pos(buf)?)
    }
}

impl PositionedStream for LobInputStream {
    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        self.read_at_pos(buf)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn reposition(&mut self, pos: u64) -> CoreResult<()> {
        let len = self.store.lock().length()?;
        if pos > len {
            self.pos = 0;
            return Err(CoreError::premature_end(pos, len));
        }
        self.pos = pos;
        Ok(())
    }
}

/// Writes into a byte store from a byte position.
#[derive(Debug)]
pub struct LobOutputStream {
    store: SharedByteStore,
    pos: u64,
    closed: bool,
}

impl LobOutputStream {
    /// Creates a stream writing to `store` at byte `pos`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `pos` is beyond the store's length.
    pub fn new(store: SharedByteStore, pos: u64) -> CoreResult<Self> {
        let len = store.lock().length()?;
        if pos > len {
            return Err(CoreError::invalid_position(pos, "position too large"));
        }
        Ok(Self {
            store,
            pos,
            closed: false,
        })
    }

    /// Returns the byte position of the next write.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Closes the stream. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Write for LobOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(CoreError::StreamClosed.into());
        }
        self.pos = self.store.lock().write(buf, self.pos)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

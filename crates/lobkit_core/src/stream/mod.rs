//! Store-provided byte streams and position tracking over them.
//!
//! Persisted values are read through a [`StoreStream`]: a forward-only,
//! resettable byte source with no notion of position. A
//! [`PositionedStoreStream`] tracks how far the source has been consumed and
//! can reposition it with reset and skip, so several logical cursors can
//! share one source as long as each calls
//! [`reposition`](PositionedStream::reposition) before use.

mod memory;
mod positioned;

pub use memory::MemoryStoreStream;
pub use positioned::{PositionedStoreStream, SharedStoreStream, StoreStreamCursor};

use crate::error::CoreResult;
use std::io::{self, Read};

/// A resettable, forward-readable byte source supplied by the page store.
pub trait StoreStream: Read + Send {
    /// Prepares the stream for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying value cannot be opened.
    fn initialize(&mut self) -> io::Result<()>;

    /// Rewinds to the first byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be rewound.
    fn reset_to_start(&mut self) -> io::Result<()>;

    /// Releases the stream. Idempotent.
    fn close(&mut self);

    /// Skips up to `n` bytes, returning the number skipped.
    ///
    /// May return 0 without being at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    fn skip(&mut self, n: u64) -> io::Result<u64> {
        let mut scratch = [0u8; 512];
        let want = scratch.len().min(usize::try_from(n).unwrap_or(usize::MAX));
        let read = self.read(&mut scratch[..want])?;
        Ok(read as u64)
    }
}

/// A byte source that knows its logical position and can be moved.
pub trait PositionedStream {
    /// Reads up to `buf.len()` bytes at the current position.
    ///
    /// Returns 0 only at end of data.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is closed or reading fails.
    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize>;

    /// Returns the current logical byte position.
    fn position(&self) -> u64;

    /// Moves to `pos`.
    ///
    /// # Errors
    ///
    /// Returns `PrematureEndOfData` if the source ends before `pos`.
    fn reposition(&mut self, pos: u64) -> CoreResult<()>;
}

impl<T: PositionedStream + ?Sized> PositionedStream for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        (**self).read(buf)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn reposition(&mut self, pos: u64) -> CoreResult<()> {
        (**self).reposition(pos)
    }
}

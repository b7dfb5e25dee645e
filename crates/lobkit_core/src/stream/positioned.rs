//! Position tracking over a store stream.

use super::{PositionedStream, StoreStream};
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::io::{self, ErrorKind, Read};
use std::sync::Arc;
use tracing::debug;

/// A [`StoreStream`] with a tracked logical position.
///
/// The position counts every byte consumed since the last reset. Moving
/// backwards resets the source and skips forward again, so backward moves
/// cost a pass from the start of the value.
pub struct PositionedStoreStream {
    stream: Box<dyn StoreStream>,
    pos: u64,
    closed: bool,
}

impl PositionedStoreStream {
    /// Initializes `stream` and wraps it at position 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be initialized.
    pub fn new(mut stream: Box<dyn StoreStream>) -> CoreResult<Self> {
        stream.initialize()?;
        Ok(Self {
            stream,
            pos: 0,
            closed: false,
        })
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::StreamClosed);
        }
        Ok(())
    }

    /// Reads a single byte, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or reading fails.
    pub fn read_byte(&mut self) -> CoreResult<Option<u8>> {
        let mut byte = [0u8; 1];
        match PositionedStream::read(self, &mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Skips up to `n` bytes, returning how many were skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or skipping fails.
    pub fn skip(&mut self, n: u64) -> CoreResult<u64> {
        self.check_open()?;
        let skipped = self.stream.skip(n)?;
        self.pos += skipped;
        Ok(skipped)
    }

    /// Rewinds the source to its first byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or cannot be rewound.
    pub fn reset_stream(&mut self) -> CoreResult<()> {
        self.check_open()?;
        self.stream.reset_to_start()?;
        self.pos = 0;
        Ok(())
    }

    /// Skips exactly `n` bytes.
    ///
    /// A skip that makes no progress is followed by a single-byte read to
    /// tell a stalled source from the end of data.
    fn skip_fully(&mut self, n: u64) -> CoreResult<()> {
        let target = self.pos + n;
        while self.pos < target {
            if self.skip(target - self.pos)? > 0 {
                continue;
            }
            if self.read_byte()?.is_none() {
                return Err(CoreError::premature_end(target, self.pos));
            }
        }
        Ok(())
    }

    /// Closes the source. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stream.close();
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PositionedStream for PositionedStoreStream {
    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        self.check_open()?;
        loop {
            match Read::read(&mut *self.stream, buf) {
                Ok(n) => {
                    self.pos += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn reposition(&mut self, requested: u64) -> CoreResult<()> {
        if self.pos == requested {
            return Ok(());
        }
        if self.pos > requested {
            self.reset_stream()?;
        }

        if let Err(e) = self.skip_fully(requested - self.pos) {
            debug!(requested, reached = self.pos, error = %e, "reposition failed, resetting stream");
            // Leave the stream at a known position for the next caller
            if self.reset_stream().is_err() {
                self.pos = 0;
            }
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for PositionedStoreStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PositionedStoreStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionedStoreStream")
            .field("pos", &self.pos)
            .field("closed", &self.closed)
            .finish()
    }
}

/// A [`PositionedStoreStream`] shared by several cursors.
///
/// Every cursor must call [`reposition`](PositionedStream::reposition)
/// before reading; nothing detects a cursor that forgets.
#[derive(Debug, Clone)]
pub struct SharedStoreStream {
    inner: Arc<Mutex<PositionedStoreStream>>,
}

impl SharedStoreStream {
    /// Wraps a positioned stream for sharing.
    #[must_use]
    pub fn new(stream: PositionedStoreStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stream)),
        }
    }

    /// Initializes and wraps a store stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be initialized.
    pub fn open(stream: Box<dyn StoreStream>) -> CoreResult<Self> {
        Ok(Self::new(PositionedStoreStream::new(stream)?))
    }

    /// Runs `f` with exclusive access to the stream.
    pub fn with<R>(&self, f: impl FnOnce(&mut PositionedStoreStream) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Closes the shared stream for every cursor. Idempotent.
    pub fn close(&self) {
        self.inner.lock().close();
    }

    /// Returns true once the stream has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_closed()
    }
}

/// A `Read` view of a shared store stream with its own position.
///
/// Each read repositions the shared stream first, so cursors and other
/// users of the stream can be interleaved freely.
#[derive(Debug, Clone)]
pub struct StoreStreamCursor {
    stream: SharedStoreStream,
    pos: u64,
}

impl StoreStreamCursor {
    /// Creates a cursor at byte `pos` of `stream`.
    #[must_use]
    pub fn new(stream: SharedStoreStream, pos: u64) -> Self {
        Self { stream, pos }
    }

    /// Returns the position of the next byte read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for StoreStreamCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.pos;
        let n = self.stream.with(|s| -> CoreResult<usize> {
            s.reposition(pos)?;
            PositionedStream::read(s, buf)
        })?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl PositionedStream for SharedStoreStream {
    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        self.inner.lock().read(buf)
    }

    fn position(&self) -> u64 {
        self.inner.lock().position()
    }

    fn reposition(&mut self, pos: u64) -> CoreResult<()> {
        self.inner.lock().reposition(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStoreStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source whose skip never makes progress and which counts resets.
    struct StallingStream {
        inner: MemoryStoreStream,
        resets: Arc<AtomicUsize>,
    }

    impl Read for StallingStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl StoreStream for StallingStream {
        fn initialize(&mut self) -> io::Result<()> {
            self.inner.initialize()
        }

        fn reset_to_start(&mut self) -> io::Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.inner.reset_to_start()
        }

        fn close(&mut self) {
            self.inner.close();
        }

        fn skip(&mut self, _n: u64) -> io::Result<u64> {
            Ok(0)
        }
    }

    fn stalling(data: &[u8]) -> (PositionedStoreStream, Arc<AtomicUsize>) {
        let resets = Arc::new(AtomicUsize::new(0));
        let stream = StallingStream {
            inner: MemoryStoreStream::new(data.to_vec()),
            resets: Arc::clone(&resets),
        };
        (PositionedStoreStream::new(Box::new(stream)).unwrap(), resets)
    }

    fn memory(data: &[u8]) -> PositionedStoreStream {
        PositionedStoreStream::new(Box::new(MemoryStoreStream::new(data.to_vec()))).unwrap()
    }

    #[test]
    fn position_tracks_reads_and_skips() {
        let mut stream = memory(b"0123456789");
        let mut buf = [0u8; 3];

        assert_eq!(stream.read(&mut buf).unwrap(), 3);
        assert_eq!(stream.position(), 3);
        assert_eq!(stream.skip(4).unwrap(), 4);
        assert_eq!(stream.position(), 7);
        assert_eq!(stream.read_byte().unwrap(), Some(b'7'));
        assert_eq!(stream.position(), 8);
    }

    #[test]
    fn reposition_forward_and_backward() {
        let (mut stream, resets) = stalling(b"0123456789");

        stream.reposition(6).unwrap();
        assert_eq!(stream.read_byte().unwrap(), Some(b'6'));
        assert_eq!(resets.load(Ordering::SeqCst), 0);

        stream.reposition(2).unwrap();
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(stream.read_byte().unwrap(), Some(b'2'));

        stream.reposition(3).unwrap();
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reposition_past_end_resets_to_zero() {
        let (mut stream, resets) = stalling(b"abc");
        stream.reposition(1).unwrap();

        let err = stream.reposition(10).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PrematureEndOfData {
                expected: 10,
                actual: 3
            }
        ));
        assert_eq!(stream.position(), 0);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(stream.read_byte().unwrap(), Some(b'a'));
    }

    #[test]
    fn closed_stream_rejects_reads() {
        let mut stream = memory(b"abc");
        stream.close();
        stream.close();
        assert!(matches!(stream.read_byte(), Err(CoreError::StreamClosed)));
        assert!(matches!(stream.reposition(1), Err(CoreError::StreamClosed)));
    }

    #[test]
    fn store_stream_cursors_interleave() {
        let shared = SharedStoreStream::new(memory(b"0123456789"));
        let mut a = StoreStreamCursor::new(shared.clone(), 2);
        let mut b = StoreStreamCursor::new(shared, 7);

        let mut buf = [0u8; 2];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"23");
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"78");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"45");
        assert_eq!(a.position(), 6);

        let mut rest = Vec::new();
        b.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"9");
    }

    #[test]
    fn shared_cursors_reposition_before_use() {
        let shared = SharedStoreStream::new(memory(b"abcdefgh"));
        let mut first = shared.clone();
        let mut second = shared.clone();

        first.reposition(5).unwrap();
        let mut buf = [0u8; 2];
        first.read(&mut buf).unwrap();
        assert_eq!(&buf, b"fg");

        second.reposition(1).unwrap();
        second.read(&mut buf).unwrap();
        assert_eq!(&buf, b"bc");

        first.reposition(7).unwrap();
        first.read(&mut buf[..1]).unwrap();
        assert_eq!(buf[0], b'h');

        shared.close();
        assert!(second.is_closed());
    }
}

//! Store stream over bytes already in memory.

use super::StoreStream;
use bytes::Bytes;
use std::io::{self, Read};

/// A [`StoreStream`] over a [`Bytes`] value.
///
/// Cloning the value is cheap; each clone reads independently.
#[derive(Debug, Clone)]
pub struct MemoryStoreStream {
    data: Bytes,
    pos: usize,
    closed: bool,
}

impl MemoryStoreStream {
    /// Creates a stream over `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            closed: false,
        }
    }

    /// Returns the full underlying value.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "store stream closed"));
        }
        Ok(())
    }
}

impl Read for MemoryStoreStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        let remaining = &self.data[self.pos..];
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl StoreStream for MemoryStoreStream {
    fn initialize(&mut self) -> io::Result<()> {
        self.check_open()
    }

    fn reset_to_start(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn skip(&mut self, n: u64) -> io::Result<u64> {
        self.check_open()?;
        let remaining = (self.data.len() - self.pos) as u64;
        let n = n.min(remaining);
        self.pos += n as usize;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_skip_reset() {
        let mut stream = MemoryStoreStream::new(&b"abcdef"[..]);
        stream.initialize().unwrap();

        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ab");
        assert_eq!(stream.skip(3).unwrap(), 3);
        assert_eq!(stream.skip(10).unwrap(), 1);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);

        stream.reset_to_start().unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ab");
    }

    #[test]
    fn closed_stream_fails() {
        let mut stream = MemoryStoreStream::new(vec![1, 2, 3]);
        stream.close();
        stream.close();
        assert!(stream.read(&mut [0u8; 1]).is_err());
        assert!(stream.reset_to_start().is_err());
    }
}

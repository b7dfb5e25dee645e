//! Character counting over raw modified UTF-8 streams.

use super::decode::{decode_char, Decoded, ReadSource};
use crate::error::{CoreError, CoreResult};
use std::io::Read;

/// Characters and bytes covered by a skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipCount {
    /// Number of characters skipped.
    pub chars: u64,
    /// Number of bytes those characters occupy.
    pub bytes: u64,
}

/// Skips exactly `n` characters, returning the number of bytes consumed.
///
/// The reader is left positioned at the first byte after the last skipped
/// character. Wrap unbuffered readers in a `BufReader` first if the
/// caller only needs the returned byte count.
///
/// # Errors
///
/// Returns `PrematureEndOfData` if the data (or an end-of-stream marker)
/// ends before `n` characters and `MalformedEncoding` on invalid input.
pub fn skip_chars(reader: &mut dyn Read, n: u64) -> CoreResult<u64> {
    let mut src = ReadSource::new(reader);
    let mut count = SkipCount::default();

    while count.chars < n {
        match decode_char(&mut src, count.bytes)? {
            Decoded::Char { len, .. } => {
                count.chars += 1;
                count.bytes += u64::from(len);
            }
            Decoded::Eof | Decoded::Marker => {
                return Err(CoreError::premature_end(n, count.chars));
            }
        }
    }
    Ok(count.bytes)
}

/// Skips to the end of the data, counting characters and bytes.
///
/// Stops at end of stream or at an end-of-stream marker, which is not
/// counted.
///
/// # Errors
///
/// Returns `MalformedEncoding` on invalid input.
pub fn skip_until_eof(reader: &mut dyn Read) -> CoreResult<SkipCount> {
    let mut src = ReadSource::new(reader);
    let mut count = SkipCount::default();

    loop {
        match decode_char(&mut src, count.bytes)? {
            Decoded::Char { len, .. } => {
                count.chars += 1;
                count.bytes += u64::from(len);
            }
            Decoded::Eof | Decoded::Marker => return Ok(count),
        }
    }
}

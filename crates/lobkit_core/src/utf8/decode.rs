//! Sequence-level modified UTF-8 decoding.

use crate::error::{CoreError, CoreResult};
use crate::store::read_some;
use std::io::Read;

/// A source of single bytes.
pub(crate) trait ByteSource {
    fn next_byte(&mut self) -> CoreResult<Option<u8>>;
}

/// Byte-at-a-time adapter over a reader.
///
/// Consumes nothing past the bytes it returns.
pub(crate) struct ReadSource<'a> {
    reader: &'a mut dyn Read,
}

impl<'a> ReadSource<'a> {
    pub(crate) fn new(reader: &'a mut dyn Read) -> Self {
        Self { reader }
    }
}

impl ByteSource for ReadSource<'_> {
    fn next_byte(&mut self) -> CoreResult<Option<u8>> {
        let mut byte = [0u8; 1];
        match read_some(self.reader, &mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

/// Result of decoding one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decoded {
    Eof,
    Marker,
    Char { ch: char, len: u8 },
}

enum Unit {
    Eof,
    Marker,
    Code { value: u16, len: u8 },
}

fn continuation<S: ByteSource + ?Sized>(src: &mut S, offset: u64) -> CoreResult<u8> {
    match src.next_byte()? {
        Some(b) if b & 0xC0 == 0x80 => Ok(b & 0x3F),
        Some(b) => Err(CoreError::malformed(
            offset,
            format!("invalid continuation byte {b:#04x}"),
        )),
        None => Err(CoreError::malformed(offset, "incomplete sequence at end of data")),
    }
}

fn decode_unit<S: ByteSource + ?Sized>(src: &mut S, offset: u64) -> CoreResult<Unit> {
    let Some(b0) = src.next_byte()? else {
        return Ok(Unit::Eof);
    };

    match b0 {
        0x00..=0x7F => Ok(Unit::Code {
            value: u16::from(b0),
            len: 1,
        }),
        0xC0..=0xDF => {
            let b1 = continuation(src, offset + 1)?;
            Ok(Unit::Code {
                value: (u16::from(b0 & 0x1F) << 6) | u16::from(b1),
                len: 2,
            })
        }
        0xE0..=0xEF => {
            let (Some(b1), Some(b2)) = (src.next_byte()?, src.next_byte()?) else {
                return Err(CoreError::malformed(offset, "incomplete sequence at end of data"));
            };
            if b0 == 0xE0 && b1 == 0 && b2 == 0 {
                return Ok(Unit::Marker);
            }
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return Err(CoreError::malformed(offset, "invalid continuation byte"));
            }
            Ok(Unit::Code {
                value: (u16::from(b0 & 0x0F) << 12)
                    | (u16::from(b1 & 0x3F) << 6)
                    | u16::from(b2 & 0x3F),
                len: 3,
            })
        }
        _ => Err(CoreError::malformed(
            offset,
            format!("invalid lead byte {b0:#04x}"),
        )),
    }
}

/// Decodes one character starting at byte `offset`.
///
/// A surrogate pair decodes to one character; an unpaired surrogate is
/// malformed.
pub(crate) fn decode_char<S: ByteSource + ?Sized>(src: &mut S, offset: u64) -> CoreResult<Decoded> {
    let (value, len) = match decode_unit(src, offset)? {
        Unit::Eof => return Ok(Decoded::Eof),
        Unit::Marker => return Ok(Decoded::Marker),
        Unit::Code { value, len } => (value, len),
    };

    let units: &[u16] = &[value];
    let (ch, len) = match value {
        0xD800..=0xDBFF => match decode_unit(src, offset + u64::from(len))? {
            Unit::Code {
                value: low,
                len: low_len,
            } if (0xDC00..=0xDFFF).contains(&low) => {
                let pair = [value, low];
                let ch = char::decode_utf16(pair.iter().copied())
                    .next()
                    .and_then(Result::ok);
                (ch, len + low_len)
            }
            _ => (None, len),
        },
        _ => (
            char::decode_utf16(units.iter().copied())
                .next()
                .and_then(Result::ok),
            len,
        ),
    };

    match ch {
        Some(ch) => Ok(Decoded::Char { ch, len }),
        None => Err(CoreError::malformed(offset, "unpaired surrogate")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utf8::encode_str;
    use std::io::Cursor;

    fn decode_all(bytes: &[u8]) -> CoreResult<(String, Decoded)> {
        let mut cursor = Cursor::new(bytes);
        let mut src = ReadSource::new(&mut cursor);
        let mut out = String::new();
        let mut offset = 0u64;
        loop {
            match decode_char(&mut src, offset)? {
                Decoded::Char { ch, len } => {
                    out.push(ch);
                    offset += u64::from(len);
                }
                end => return Ok((out, end)),
            }
        }
    }

    #[test]
    fn decodes_all_forms() {
        let text = "a\0\u{e9}\u{20ac}\u{1F600}z";
        let (decoded, end) = decode_all(&encode_str(text)).unwrap();
        assert_eq!(decoded, text);
        assert_eq!(end, Decoded::Eof);
    }

    #[test]
    fn marker_ends_decoding() {
        let (decoded, end) = decode_all(&[b'h', b'i', 0xE0, 0, 0, b'x']).unwrap();
        assert_eq!(decoded, "hi");
        assert_eq!(end, Decoded::Marker);
    }

    #[test]
    fn bad_sequences() {
        assert!(matches!(
            decode_all(&[b'a', 0xC3, 0x41]),
            Err(CoreError::MalformedEncoding { offset: 2, .. })
        ));
        assert!(decode_all(&[0x80]).is_err());
        assert!(decode_all(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        assert!(decode_all(&[0xE2, 0x82]).is_err());
        // lone high surrogate followed by ASCII
        assert!(decode_all(&[0xED, 0xA0, 0xBD, b'a']).is_err());
        // lone low surrogate
        assert!(decode_all(&[0xED, 0xB8, 0x80]).is_err());
    }
}

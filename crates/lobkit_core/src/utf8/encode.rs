//! Modified UTF-8 encoding.

/// Terminates a value whose length was unknown when it was written.
pub const END_OF_STREAM_MARKER: [u8; 3] = [0xE0, 0x00, 0x00];

/// Size of the big-endian length prefix of a stored value.
pub const HEADER_LEN: usize = 2;

/// Largest byte length the prefix can carry.
const MAX_HEADER_VALUE: usize = u16::MAX as usize;

/// Returns the modified UTF-8 length of `text` in bytes.
#[must_use]
pub fn encoded_len(text: &str) -> usize {
    text.chars().map(char_len).sum()
}

fn char_len(c: char) -> usize {
    match c as u32 {
        0x01..=0x7F => 1,
        0x00 | 0x80..=0x7FF => 2,
        0x800..=0xFFFF => 3,
        _ => 6,
    }
}

/// Encodes `text` as modified UTF-8.
///
/// U+0000 becomes `C0 80` and characters outside the Basic Multilingual
/// Plane become two 3-byte surrogate sequences.
///
/// ```rust
/// use lobkit_core::utf8::encode_str;
///
/// assert_eq!(encode_str("a\0"), vec![b'a', 0xC0, 0x80]);
/// assert_eq!(encode_str("\u{20ac}"), vec![0xE2, 0x82, 0xAC]);
/// ```
#[must_use]
pub fn encode_str(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(text));
    encode_into(text, &mut out);
    out
}

/// Appends the modified UTF-8 encoding of `text` to `out`.
pub fn encode_into(text: &str, out: &mut Vec<u8>) {
    let mut units = [0u16; 2];
    for c in text.chars() {
        for &unit in c.encode_utf16(&mut units).iter() {
            push_unit(unit, out);
        }
    }
}

fn push_unit(unit: u16, out: &mut Vec<u8>) {
    match unit {
        0x01..=0x7F => out.push(unit as u8),
        0x00 | 0x80..=0x7FF => {
            out.push(0xC0 | (unit >> 6) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
        _ => {
            out.push(0xE0 | (unit >> 12) as u8);
            out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
    }
}

/// Encodes `text` in the stored framing.
///
/// The value starts with its byte length as a 2-byte big-endian prefix.
/// When the length does not fit the prefix is 0 and the value ends with
/// [`END_OF_STREAM_MARKER`].
#[must_use]
pub fn encode_with_header(text: &str) -> Vec<u8> {
    let len = encoded_len(text);
    let mut out = Vec::with_capacity(HEADER_LEN + len + END_OF_STREAM_MARKER.len());

    if len <= MAX_HEADER_VALUE {
        out.extend_from_slice(&(len as u16).to_be_bytes());
        encode_into(text, &mut out);
    } else {
        out.extend_from_slice(&[0, 0]);
        encode_into(text, &mut out);
        out.extend_from_slice(&END_OF_STREAM_MARKER);
    }
    out
}

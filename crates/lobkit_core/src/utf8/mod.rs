//! Modified UTF-8: encoding, character counting and decoding.
//!
//! Stored character values use a UTF-8 variant with 1, 2 and 3 byte forms
//! only. U+0000 is written as `C0 80` and a character outside the Basic
//! Multilingual Plane is written as its two UTF-16 surrogates, 3 bytes each.
//! Characters are counted as Unicode scalar values, so such a pair is one
//! character.
//!
//! ## Framing
//!
//! ```text
//! +----------------+---------------------------+-------------+
//! | length: u16 BE | modified UTF-8 data       | [E0 00 00]  |
//! +----------------+---------------------------+-------------+
//! ```
//!
//! A length of 0 means the byte length was unknown when the value was
//! written; the data then ends with the end-of-stream marker.

mod decode;
mod encode;
mod reader;
mod skip;

pub use encode::{
    encode_into, encode_str, encode_with_header, encoded_len, END_OF_STREAM_MARKER, HEADER_LEN,
};
pub use reader::{CharReader, Framing, Utf8Reader};
pub use skip::{skip_chars, skip_until_eof, SkipCount};

//! Integration tests for character content and the clob handle.

use lobkit_core::utf8::{encode_str, encode_with_header, END_OF_STREAM_MARKER};
use lobkit_core::{
    CharReader, Clob, CoreError, InternalClob, LobConfig, MemoryStoreStream, Session,
    StoreStreamClob, TemporaryClob,
};
use std::io::Read;
use tempfile::TempDir;

fn session(dir: &TempDir) -> Session {
    Session::new(
        LobConfig::new()
            .overflow_dir(dir.path())
            .reader_buffer_chars(16),
    )
}

fn marker_terminated(text: &str) -> Vec<u8> {
    let mut bytes = vec![0, 0];
    bytes.extend_from_slice(&encode_str(text));
    bytes.extend_from_slice(&END_OF_STREAM_MARKER);
    bytes
}

#[test]
fn insert_into_empty_content() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let clob = TemporaryClob::new(&session);

    assert_eq!(clob.insert_string("hello", 1).unwrap(), 5);
    assert_eq!(clob.get_char_length().unwrap(), 5);
    assert_eq!(clob.get_byte_length().unwrap(), 5);
}

#[test]
fn three_byte_characters_promote_store() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let clob = TemporaryClob::new(&session);
    let text: String = std::iter::repeat('\u{20AC}').take(3000).collect();

    clob.insert_string(&text, 1).unwrap();
    assert_eq!(clob.get_byte_length().unwrap(), 9000);
    assert_eq!(clob.get_char_length().unwrap(), 3000);
    assert!(clob.store().lock().is_file_backed());
    assert_eq!(session.overflow_file_count(), 1);

    let mut reader = clob.get_reader(1).unwrap();
    assert_eq!(reader.read_to_string().unwrap(), text);

    clob.release();
    assert_eq!(session.overflow_file_count(), 0);
}

#[test]
fn marker_is_not_counted() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let bytes = marker_terminated("abc");
    assert_eq!(bytes.len(), 8);

    let clob = StoreStreamClob::new(&session, Box::new(MemoryStoreStream::new(bytes))).unwrap();
    assert_eq!(clob.get_char_length().unwrap(), 3);
    assert_eq!(clob.get_byte_length().unwrap(), 3);
    assert_eq!(clob.get_reader(1).unwrap().read_to_string().unwrap(), "abc");
}

#[test]
fn append_length_algebra() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let clob = TemporaryClob::from_text(&session, "start").unwrap();

    let mut expected = 5;
    for piece in ["-", "\u{e9}t\u{e9}", "\u{1F600}", "\0end"] {
        let n = clob.insert_string(piece, expected + 1).unwrap();
        expected += n;
        assert_eq!(clob.get_char_length().unwrap(), expected);
    }
    assert_eq!(
        clob.get_reader(1).unwrap().read_to_string().unwrap(),
        "start-\u{e9}t\u{e9}\u{1F600}\0end"
    );

    assert!(matches!(
        clob.insert_string("x", expected + 2),
        Err(CoreError::InvalidPosition { .. })
    ));
}

#[test]
fn reader_resynchronizes_after_write() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let clob = TemporaryClob::from_text(&session, "abcdefghij").unwrap();
    let mut reader = clob.get_reader(1).unwrap();

    let mut buf = ['\0'; 4];
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    let count = clob.update_count();

    clob.insert_string("\u{20AC}\u{20AC}", 5).unwrap();
    assert!(clob.update_count() > count);
    assert!(reader.is_obsolete());
    assert_eq!(reader.read_to_string().unwrap(), "\u{20AC}\u{20AC}ghij");
}

#[test]
fn persisted_value_large_enough_for_marker_framing() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let text: String = "0123456789".repeat(7000);
    let bytes = encode_with_header(&text);
    assert_eq!(&bytes[..2], &[0, 0]);

    let clob = Clob::from_store_stream(&session, Box::new(MemoryStoreStream::new(bytes))).unwrap();
    assert_eq!(clob.length().unwrap(), 70_000);
    assert_eq!(clob.get_sub_string(69_995, 10).unwrap(), "456789");
    assert_eq!(clob.position("90", 69_990).unwrap(), Some(69_990));

    clob.set_string(70_001, "!").unwrap();
    assert_eq!(clob.generation(), 1);
    assert_eq!(clob.length().unwrap(), 70_001);
    assert_eq!(session.overflow_file_count(), 1);
}

#[test]
fn handle_copies_on_first_write_and_readers_follow() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let clob = Clob::from_store_stream(
        &session,
        Box::new(MemoryStoreStream::new(marker_terminated("the quick brown fox"))),
    )
    .unwrap();

    let mut early = clob.character_stream().unwrap();
    assert_eq!(early.skip(4).unwrap(), 4);
    let mut tail = clob.character_stream_range(17, 3).unwrap();

    clob.set_string(5, "QUICK").unwrap();
    assert!(clob.is_writable());
    assert_eq!(clob.generation(), 1);

    assert_eq!(early.read_to_string().unwrap(), "QUICK brown fox");
    assert_eq!(tail.read_to_string().unwrap(), "fox");
}

#[test]
fn raw_bytes_of_both_forms_match() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let text = "mixed \u{e9}\u{20AC}\u{1F600} text";

    let writable = InternalClob::Writable(TemporaryClob::from_text(&session, text).unwrap());
    let fixed = InternalClob::ReadOnly(
        StoreStreamClob::new(
            &session,
            Box::new(MemoryStoreStream::new(marker_terminated(text))),
        )
        .unwrap(),
    );

    let mut a = Vec::new();
    writable.get_raw_byte_stream().unwrap().read_to_end(&mut a).unwrap();
    let copy = TemporaryClob::clone_content(&session, &fixed, None).unwrap();
    let mut b = Vec::new();
    copy.get_raw_byte_stream().unwrap().read_to_end(&mut b).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, encode_str(text));
}

#[test]
fn freed_handle_and_closed_session() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let big: String = "x".repeat(40_000);
    let clob = Clob::from_text(&session, &big).unwrap();
    assert_eq!(session.overflow_file_count(), 1);

    clob.free();
    assert_eq!(session.overflow_file_count(), 0);
    assert!(matches!(clob.length(), Err(CoreError::Released)));

    let other = Clob::from_text(&session, &big).unwrap();
    session.close();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(matches!(other.length(), Err(CoreError::SessionClosed)));
}

#[test]
fn bounded_clone_of_short_marker_terminated_value_fails() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let fixed = InternalClob::ReadOnly(
        StoreStreamClob::new(
            &session,
            Box::new(MemoryStoreStream::new(marker_terminated("ab"))),
        )
        .unwrap(),
    );
    assert_eq!(fixed.get_char_length().unwrap(), 2);

    assert!(matches!(
        TemporaryClob::clone_content(&session, &fixed, Some(3)),
        Err(CoreError::PrematureEndOfData {
            expected: 3,
            actual: 2
        })
    ));
    let exact = TemporaryClob::clone_content(&session, &fixed, Some(2)).unwrap();
    assert_eq!(exact.get_char_length().unwrap(), 2);
    assert_eq!(exact.get_byte_length().unwrap(), 2);
}

#[test]
fn sub_string_to_the_end_of_a_large_value() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let text: String = "abcdefghij".repeat(500);
    let clob = Clob::from_text(&session, &text).unwrap();

    assert_eq!(clob.get_sub_string(1, usize::MAX).unwrap(), text);
    assert_eq!(clob.get_sub_string(4_991, usize::MAX).unwrap(), "abcdefghij");
}

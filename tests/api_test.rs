//! Entry-point tests: buffers, streams, files and configured limits.

use std::io::Write;

use graphbuf::{graph, io, BufferedOutput, GraphbufError, Input, Schema, StreamInput};
use rayon::prelude::*;
use tempfile::NamedTempFile;

#[derive(Debug, Default, Clone, PartialEq, Schema)]
struct Record {
    #[graphbuf(field = 1)]
    key: u64,
    #[graphbuf(field = 2)]
    payload: String,
}

fn record(key: u64) -> Record {
    Record {
        key,
        payload: format!("payload-{key}"),
    }
}

#[test]
fn reusable_buffer_produces_identical_bytes_after_reset() {
    let message = record(11);
    let mut buffer = BufferedOutput::new();

    let first = io::to_vec_with(&mut buffer, &message, &RecordSchema).expect("first");
    buffer.reset().expect("reset");
    let second = io::to_vec_with(&mut buffer, &message, &RecordSchema).expect("second");
    assert_eq!(first, second);
    assert_eq!(first, io::to_vec(&message, &RecordSchema).expect("fresh"));
}

#[test]
fn unreset_buffer_is_rejected() {
    let mut buffer = BufferedOutput::new();
    io::to_vec_with(&mut buffer, &record(1), &RecordSchema).expect("first use");

    let err = io::to_vec_with(&mut buffer, &record(2), &RecordSchema).unwrap_err();
    assert!(matches!(err, GraphbufError::BufferState(_)));

    buffer.reset().expect("reset");
    io::to_vec_with(&mut buffer, &record(2), &RecordSchema).expect("after reset");
}

#[test]
fn stream_roundtrip() {
    let message = record(42);
    let mut buffer = BufferedOutput::new();
    let mut sink = Vec::new();
    let written =
        io::stream_to(&mut sink, &message, &RecordSchema, &mut buffer).expect("stream out");
    assert_eq!(written, sink.len());

    let mut restored = Record::default();
    io::merge_from_reader(sink.as_slice(), &mut restored, &RecordSchema).expect("stream in");
    assert_eq!(restored, message);
}

#[test]
fn delimited_messages_stack_on_one_stream() {
    let first = record(1);
    let second = record(2);

    let mut sink = Vec::new();
    let mut buffer = BufferedOutput::new();
    io::write_delimited_to(&mut sink, &first, &RecordSchema, &mut buffer).expect("first");
    buffer.reset().expect("reset");
    io::write_delimited_to(&mut sink, &second, &RecordSchema, &mut buffer).expect("second");

    let mut reader = sink.as_slice();
    let mut a = Record::default();
    io::merge_delimited_from(&mut reader, &mut a, &RecordSchema).expect("first");
    let mut b = Record::default();
    io::merge_delimited_from(&mut reader, &mut b, &RecordSchema).expect("second");
    assert_eq!(a, first);
    assert_eq!(b, second);
}

#[test]
fn oversized_delimited_length_fails_before_allocation() {
    // a delimited frame declaring 1 GiB, followed by nothing
    let mut data = Vec::new();
    data.extend_from_slice(&[0x80, 0x80, 0x80, 0x80, 0x04]); // varint(1 << 30)

    let mut input = StreamInput::new(data.as_slice()).with_size_limit(1 << 20);
    let mut restored = Record::default();
    let err = input
        .merge_message(&mut restored, &RecordSchema)
        .unwrap_err();
    assert!(matches!(
        err,
        GraphbufError::SizeLimitExceeded {
            declared,
            limit,
        } if declared == 1 << 30 && limit == 1 << 20
    ));
}

#[test]
fn file_roundtrip_through_memory_map() {
    let message = record(77);
    let mut buffer = BufferedOutput::new();
    let mut file = NamedTempFile::new().expect("temp file");
    io::stream_to(&mut file, &message, &RecordSchema, &mut buffer).expect("write file");
    file.flush().expect("flush");

    let mut restored = Record::default();
    io::merge_from_file(file.path(), &mut restored, &RecordSchema).expect("mmap decode");
    assert_eq!(restored, message);
}

#[test]
fn empty_file_decodes_to_defaults() {
    let file = NamedTempFile::new().expect("temp file");
    let mut restored = Record::default();
    io::merge_from_file(file.path(), &mut restored, &RecordSchema).expect("empty decode");
    assert_eq!(restored, Record::default());
}

#[test]
fn graph_entry_points_mirror_tree_entry_points() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let message = Rc::new(RefCell::new(record(5)));

    let mut sink = Vec::new();
    let mut buffer = BufferedOutput::new();
    graph::write_delimited_to(&mut sink, &message, &RecordSchema, &mut buffer).expect("write");

    let restored = Rc::new(RefCell::new(Record::default()));
    graph::merge_delimited_from(sink.as_slice(), &restored, &RecordSchema).expect("read");
    assert_eq!(*restored.borrow(), record(5));
}

#[test]
fn independent_engines_run_in_parallel() {
    let results: Vec<Vec<u8>> = (0..64u64)
        .into_par_iter()
        .map(|key| io::to_vec(&record(key), &RecordSchema).expect("encode"))
        .collect();

    results.into_par_iter().enumerate().for_each(|(i, bytes)| {
        let mut restored = Record::default();
        io::merge_from(&bytes, &mut restored, &RecordSchema).expect("decode");
        assert_eq!(restored, record(i as u64));
    });
}

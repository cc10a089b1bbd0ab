// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Scenarios that stack several layers on top of real and fake transports.

use std::fs;

use segbuf::{Buffer, LineTerminator, Options, SEGMENT_SIZE, SegmentPool};
use segbuf_io::testing::{FakeSink, FakeSource};
use segbuf_io::{BufferedSink, BufferedSource, HashingSink, HashingSource, IoSink, IoSource};
use testing_aids::{TestDir, pattern_bytes};

#[test]
fn hashes_while_writing_to_file() {
    let dir = TestDir::new();
    let path = dir.path("greeting.txt");

    let mut sink = BufferedSink::new(HashingSink::md5(IoSink::create(&path).unwrap()));
    sink.write_utf8("hello world").unwrap();
    let hashing = sink.into_inner().unwrap();

    assert_eq!(hashing.hash().hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");

    let mut source = BufferedSource::new(HashingSource::md5(IoSource::open(&path).unwrap()));
    assert_eq!(source.read_utf8_to_end().unwrap(), "hello world");
    assert_eq!(source.get_ref().hash(), hashing.hash());
}

#[test]
fn file_spanning_several_segments() {
    let dir = TestDir::new();
    let data = pattern_bytes(SEGMENT_SIZE * 5 / 2);
    let path = dir.file_with("big.bin", &data);

    let mut source = BufferedSource::new(HashingSource::sha256(IoSource::open(&path).unwrap()));

    // Typed reads straddle segment boundaries.
    source.skip(SEGMENT_SIZE - 1).unwrap();
    let straddling = source.read_num_be::<u16>().unwrap();
    assert_eq!(straddling, u16::from_be_bytes([data[SEGMENT_SIZE - 1], data[SEGMENT_SIZE]]));

    let rest = source.read_to_vec().unwrap();
    assert_eq!(rest, &data[SEGMENT_SIZE + 1..]);

    assert_eq!(source.get_ref().hash(), Buffer::from(&data[..]).sha256());
}

#[test]
fn copies_file_to_file() {
    let dir = TestDir::new();
    let data = pattern_bytes(SEGMENT_SIZE * 3 + 123);
    let from = dir.file_with("from.bin", &data);
    let to = dir.path("to.bin");

    let mut source = BufferedSource::new(IoSource::open(&from).unwrap());
    let mut sink = IoSink::create(&to).unwrap();

    let copied = source.read_all_to(&mut sink).unwrap();

    assert_eq!(copied, data.len() as u64);
    assert_eq!(fs::read(&to).unwrap(), data);
}

#[test]
fn carriage_return_waits_for_more_input() {
    let fake = FakeSource::builder()
        .contents(b"hello\r")
        .contents(b"\nworld\r")
        .max_read_size(6)
        .build();
    let mut source = BufferedSource::new(fake);

    let first = source.read_line().unwrap().unwrap();
    assert_eq!(first.text(), "hello");
    assert_eq!(first.terminator(), LineTerminator::CrLf);

    let second = source.read_line().unwrap().unwrap();
    assert_eq!(second.text(), "world");
    assert_eq!(second.terminator(), LineTerminator::Cr);

    assert!(source.read_line().unwrap().is_none());
}

#[test]
fn protocol_with_keywords_and_lengths() {
    let fake = FakeSource::builder()
        .contents(b"PUT 5\r\nhello")
        .contents(b"GET 12\r\n")
        .contents(b"QUIT\r\n")
        .max_read_size(3)
        .build();
    let mut source = BufferedSource::new(fake);
    let commands = Options::new(["GET ", "PUT ", "QUIT\r\n"]);

    assert_eq!(source.select(&commands).unwrap(), Some(1));
    let length = source.read_decimal_i64().unwrap();
    source.skip(2).unwrap();
    assert_eq!(source.read_utf8(usize::try_from(length).unwrap()).unwrap(), "hello");

    assert_eq!(source.select(&commands).unwrap(), Some(0));
    assert_eq!(source.read_decimal_i64().unwrap(), 12);
    assert_eq!(source.read_utf8_line().unwrap().as_deref(), Some(""));

    assert_eq!(source.select(&commands).unwrap(), Some(2));
    assert!(source.exhausted().unwrap());
}

#[test]
fn peek_then_consume() {
    let mut source = BufferedSource::new(FakeSource::builder().contents(b"MAGIC payload").max_read_size(2).build());

    {
        let mut peek = source.peek();
        assert_eq!(peek.read_utf8(5).unwrap(), "MAGIC");
        assert_eq!(peek.read_byte().unwrap(), b' ');
    }

    assert_eq!(source.read_utf8_to_end().unwrap(), "MAGIC payload");
}

#[test]
fn segments_return_to_pool() {
    let pool = SegmentPool::new();
    let data = pattern_bytes(SEGMENT_SIZE * 3);

    let mut sink = BufferedSink::builder(FakeSink::new()).pool(pool.clone()).build();
    sink.write_slice(&data).unwrap();
    sink.flush().unwrap();

    // Emitted segments are relinked into the transport, not copied.
    assert_eq!(pool.stats().outstanding(), 3);

    let transport = sink.into_inner().unwrap().take_contents();
    let mut source = BufferedSource::builder(transport).pool(pool.clone()).build();
    assert_eq!(source.read_to_vec().unwrap(), data);

    assert_eq!(pool.stats().outstanding(), 0);
}

#[test]
fn transport_failure_surfaces_as_transport_error() {
    let fake = FakeSource::builder().contents(b"0123456789").max_read_size(4).fail_after(4).build();
    let mut source = BufferedSource::new(fake);

    assert_eq!(source.read_utf8(4).unwrap(), "0123");

    let error = source.read_byte().unwrap_err();
    assert_eq!(error.kind(), segbuf::ErrorKind::Transport);
    assert_eq!(source.get_ref().delivered(), 4);
}

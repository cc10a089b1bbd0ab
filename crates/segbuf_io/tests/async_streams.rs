// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Asynchronous sources and sinks over fake and lifted transports.

use futures::FutureExt;
use segbuf::{Buffer, Error, Result, SEGMENT_SIZE};
use segbuf_io::testing::{FakeSink, FakeSource, Pending};
use segbuf_io::{AsyncBufferedSink, AsyncBufferedSource, Blocking, IoSource, StreamingDecoder};
use testing_aids::{async_test, pattern_bytes};

/// Frames of a big-endian `u16` length followed by that many bytes of UTF-8.
#[derive(Debug, Default)]
struct LengthPrefixed;

impl StreamingDecoder for LengthPrefixed {
    type Output = String;

    fn decode(&mut self, buffer: &mut Buffer, _at_end: bool) -> Result<Option<String>> {
        let (Some(high), Some(low)) = (buffer.get(0), buffer.get(1)) else {
            return Ok(None);
        };
        let length = usize::from(u16::from_be_bytes([high, low]));

        if buffer.len() < 2 + length {
            return Ok(None);
        }

        buffer.skip(2)?;
        buffer.read_utf8(length).map(Some)
    }
}

#[test]
fn framed_messages_round_trip() {
    async_test(async || {
        let mut sink = AsyncBufferedSink::new(FakeSink::new());
        for message in ["first", "", "third message"] {
            let length = u16::try_from(message.len()).unwrap();
            sink.write_num_be(length).await.unwrap();
            sink.write_utf8(message).await.unwrap();
        }
        let mut wire = sink.into_inner().await.unwrap().take_contents();

        let fake = FakeSource::builder().contents(&wire.read_to_vec()).max_read_size(3).build();
        let mut source = AsyncBufferedSource::new(fake);
        let mut decoder = LengthPrefixed;

        assert_eq!(source.decode(&mut decoder).await.unwrap(), "first");
        assert_eq!(source.decode(&mut decoder).await.unwrap(), "");
        assert_eq!(source.decode(&mut decoder).await.unwrap(), "third message");

        let error: Error = source.decode(&mut decoder).await.unwrap_err();
        assert!(error.is_end_of_data());
    });
}

#[test]
fn lifted_reader_serves_async_reads() {
    async_test(async || {
        let data = pattern_bytes(SEGMENT_SIZE * 2 + 9);
        let mut source = AsyncBufferedSource::new(Blocking::new(IoSource::new(&data[..])));

        source.skip(SEGMENT_SIZE).await.unwrap();
        assert_eq!(source.read_byte().await.unwrap(), data[SEGMENT_SIZE]);
        assert_eq!(source.read_to_vec().await.unwrap(), &data[SEGMENT_SIZE + 1..]);
        assert!(source.exhausted().await.unwrap());
    });
}

#[test]
fn stalled_transport_can_be_abandoned() {
    let mut source = AsyncBufferedSource::new(Pending::new());
    assert!(source.read_byte().now_or_never().is_none());
    assert!(source.buffer().is_empty());
    assert!(source.close().now_or_never().unwrap().is_ok());

    let mut sink = AsyncBufferedSink::new(Pending::new());
    assert!(sink.write_utf8("queued").now_or_never().unwrap().is_ok());
    assert!(sink.emit().now_or_never().is_none());
    assert_eq!(sink.buffer(), &b"queued");
}

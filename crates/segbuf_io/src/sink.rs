// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;

use num_traits::ToBytes;
use segbuf::{Buffer, ByteString, Error, Result, SEGMENT_SIZE, SegmentPool};
use tracing::{Level, event};

use crate::{RawSink, RawSource, from_transport};

/// How many bytes a buffered sink accumulates by default before it hands them to its transport.
pub const DEFAULT_EMIT_THRESHOLD: usize = SEGMENT_SIZE;

/// A sink that accumulates typed writes in a [`Buffer`] and hands them to a [`RawSink`] in
/// batches.
///
/// Writes go to the buffer. Once the buffer holds at least the emit threshold, the complete
/// segments are written to the transport. The segment still being filled stays behind so that
/// small writes keep packing into it. [`flush()`][Self::flush] writes everything and flushes
/// the transport.
///
/// Dropping the sink without closing it discards the buffered bytes. Use
/// [`close()`][Self::close] or [`into_inner()`][Self::into_inner] to keep them.
///
/// # Example
///
/// ```
/// use segbuf::Buffer;
/// use segbuf_io::BufferedSink;
///
/// let mut sink = BufferedSink::new(Buffer::new());
/// sink.write_utf8("Content-Length: ").unwrap();
/// sink.write_decimal_i64(42).unwrap();
/// sink.write_slice(b"\r\n").unwrap();
///
/// let written = sink.into_inner().unwrap();
/// assert_eq!(written, b"Content-Length: 42\r\n");
/// ```
#[derive(Debug)]
pub struct BufferedSink<W: RawSink> {
    inner: W,
    buffer: Buffer,
    emit_threshold: usize,
    closed: bool,
}

impl<W: RawSink> BufferedSink<W> {
    /// Starts building a new buffered sink over `inner`.
    #[must_use]
    pub fn builder(inner: W) -> BufferedSinkBuilder<W> {
        BufferedSinkBuilder {
            inner,
            pool: None,
            emit_threshold: DEFAULT_EMIT_THRESHOLD,
        }
    }

    /// Creates a buffered sink over `inner` with the default configuration.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self::builder(inner).build()
    }

    /// The bytes written but not yet handed to the transport.
    #[must_use]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Mutable access to the pending bytes.
    ///
    /// Bytes written directly to the buffer are handed to the transport on the next emit or
    /// flush, like any others.
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// The transport this sink writes to.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Appends `bytes`.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_slice(bytes);
        self.emit_complete_segments()
    }

    /// Appends one byte.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_byte(byte);
        self.emit_complete_segments()
    }

    /// Appends a number in big-endian (network) byte order.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_num_be<T: ToBytes>(&mut self, value: T) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_num_be(value);
        self.emit_complete_segments()
    }

    /// Appends a number in little-endian byte order.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_num_le<T: ToBytes>(&mut self, value: T) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_num_le(value);
        self.emit_complete_segments()
    }

    /// Appends the decimal text form of `value`.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_decimal_i64(&mut self, value: i64) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_decimal_i64(value);
        self.emit_complete_segments()
    }

    /// Appends the lowercase hexadecimal text form of `value`.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_hex_u64(&mut self, value: u64) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_hex_u64(value);
        self.emit_complete_segments()
    }

    /// Appends `text` encoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_utf8(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_utf8(text);
        self.emit_complete_segments()
    }

    /// Appends one character encoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_utf8_code_point(&mut self, code_point: char) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_utf8_code_point(code_point);
        self.emit_complete_segments()
    }

    /// Appends the bytes of `value`.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub fn write_byte_string(&mut self, value: &ByteString) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_byte_string(value);
        self.emit_complete_segments()
    }

    /// Moves `byte_count` bytes from the front of `source` into this sink.
    ///
    /// Whole segments are relinked rather than copied where possible.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    ///
    /// # Panics
    ///
    /// Panics if `source` holds fewer than `byte_count` bytes.
    pub fn write_from(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_from(source, byte_count);
        self.emit_complete_segments()
    }

    /// Moves every remaining byte of `source` into this sink and returns how many there were.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or either transport fails.
    pub fn write_all_from<R: RawSource>(&mut self, source: &mut R) -> Result<u64> {
        self.ensure_open()?;

        let mut total = 0_u64;

        while let Some(count) = source
            .read_at_most_to(&mut self.buffer, SEGMENT_SIZE)
            .map_err(from_transport)?
        {
            total += count as u64;
            self.emit_complete_segments()?;
        }

        Ok(total)
    }

    /// Hands every buffered byte to the transport, without flushing the transport itself.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails.
    pub fn emit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.write_buffered(self.buffer.len())
    }

    /// Hands every buffered byte to the transport and flushes the transport.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails.
    pub fn flush(&mut self) -> Result<()> {
        self.emit()?;
        self.inner.flush().map_err(from_transport)
    }

    /// Writes out the buffered bytes, flushes the transport and closes it.
    ///
    /// The transport is closed even if writing out or flushing fails. The first failure is
    /// reported.
    /// Closing an already closed sink does nothing.
    ///
    /// # Errors
    ///
    /// Fails if writing out the buffered bytes or closing the transport fails. The sink is
    /// closed regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let mut emitted = self.write_buffered(self.buffer.len());
        if emitted.is_ok() {
            emitted = self.inner.flush().map_err(from_transport);
        }

        self.closed = true;
        self.buffer.clear();

        let closed = self.inner.close().map_err(from_transport);

        event!(Level::TRACE, message = "closed sink");

        match (emitted, closed) {
            (Err(first), Err(second)) => {
                event!(
                    Level::WARN,
                    message = "failed to close transport after failing to write out buffered bytes",
                    error = %second
                );
                Err(first)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Flushes the sink and returns the transport, without closing it.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or flushing fails. The transport is dropped in that case.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::closed("the sink has been closed"))
        } else {
            Ok(())
        }
    }

    /// Hands the complete segments to the transport once the threshold is reached.
    fn emit_complete_segments(&mut self) -> Result<()> {
        if self.buffer.len() < self.emit_threshold {
            return Ok(());
        }

        // With a threshold below one segment there may be no complete segment yet.
        let count = match self.buffer.complete_segment_byte_count() {
            0 => self.buffer.len(),
            complete => complete,
        };

        self.write_buffered(count)
    }

    fn write_buffered(&mut self, byte_count: usize) -> Result<()> {
        if byte_count == 0 {
            return Ok(());
        }

        event!(Level::TRACE, message = "emitting", bytes = byte_count);

        self.inner.write(&mut self.buffer, byte_count).map_err(from_transport)
    }
}

/// Builds a [`BufferedSink`].
///
/// Access through [`BufferedSink::builder()`][BufferedSink::builder].
#[derive(Debug)]
pub struct BufferedSinkBuilder<W: RawSink> {
    inner: W,
    pool: Option<SegmentPool>,
    emit_threshold: usize,
}

impl<W: RawSink> BufferedSinkBuilder<W> {
    /// The pool the buffer draws segments from.
    ///
    /// Optional. Defaults to [`SegmentPool::global()`].
    #[must_use]
    pub fn pool(mut self, pool: SegmentPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// How many bytes to accumulate before handing them to the transport.
    ///
    /// Optional. Defaults to [`DEFAULT_EMIT_THRESHOLD`].
    ///
    /// # Panics
    ///
    /// Panics if `emit_threshold` is 0.
    #[must_use]
    pub fn emit_threshold(mut self, emit_threshold: usize) -> Self {
        assert!(emit_threshold > 0, "the emit threshold must be at least one byte");
        self.emit_threshold = emit_threshold;
        self
    }

    /// Builds the sink.
    #[must_use]
    pub fn build(self) -> BufferedSink<W> {
        let pool = self.pool.unwrap_or_else(|| SegmentPool::global().clone());

        BufferedSink {
            inner: self.inner,
            buffer: Buffer::with_pool(pool),
            emit_threshold: self.emit_threshold,
            closed: false,
        }
    }
}

impl<W: RawSink> io::Write for BufferedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Self::flush(self)?)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io::Write;

    use segbuf::ErrorKind;
    use static_assertions::assert_impl_all;
    use testing_aids::{LogCapture, pattern_bytes};

    use super::*;
    use crate::testing::{FakeSink, FakeSource};

    assert_impl_all!(BufferedSink<Buffer>: Send, Sync);

    #[test]
    fn small_writes_stay_buffered() {
        let mut sink = BufferedSink::new(FakeSink::new());

        sink.write_utf8("hello").unwrap();
        sink.write_byte(b' ').unwrap();
        sink.write_num_be(1_u16).unwrap();

        assert_eq!(sink.buffer().len(), 8);
        assert!(sink.get_ref().contents().is_empty());
        assert_eq!(sink.get_ref().write_count(), 0);
    }

    #[test]
    fn complete_segments_are_emitted() {
        let mut sink = BufferedSink::new(FakeSink::new());

        sink.write_slice(&pattern_bytes(SEGMENT_SIZE * 2 + 100)).unwrap();

        assert_eq!(sink.get_ref().contents().len(), SEGMENT_SIZE * 2);
        assert_eq!(sink.buffer().len(), 100);

        sink.flush().unwrap();

        assert_eq!(sink.get_ref().contents().to_vec(), pattern_bytes(SEGMENT_SIZE * 2 + 100));
        assert_eq!(sink.get_ref().flush_count(), 1);
        assert!(sink.buffer().is_empty());
    }

    #[test]
    fn small_threshold_emits_partial_segment() {
        let mut sink = BufferedSink::builder(FakeSink::new()).emit_threshold(4).build();

        sink.write_slice(b"abc").unwrap();
        assert!(sink.get_ref().contents().is_empty());

        sink.write_slice(b"de").unwrap();
        assert_eq!(sink.get_ref().contents().to_vec(), b"abcde");
        assert!(sink.buffer().is_empty());
    }

    #[test]
    fn close_flushes_before_closing() {
        let mut sink = BufferedSink::new(FakeSink::new());
        sink.write_utf8("tail").unwrap();

        sink.close().unwrap();

        assert_eq!(sink.get_ref().contents(), &b"tail");
        assert_eq!(sink.get_ref().flush_count(), 1);
        assert_eq!(sink.get_ref().close_count(), 1);
    }

    #[test]
    fn emit_does_not_flush_transport() {
        let mut sink = BufferedSink::new(FakeSink::new());

        sink.write_hex_u64(0xbeef).unwrap();
        sink.emit().unwrap();

        assert_eq!(sink.get_ref().contents().to_vec(), b"beef");
        assert_eq!(sink.get_ref().flush_count(), 0);
    }

    #[test]
    fn text_forms() {
        let mut sink = BufferedSink::new(Buffer::new());

        sink.write_decimal_i64(i64::MIN).unwrap();
        sink.write_byte(b'|').unwrap();
        sink.write_utf8_code_point('€').unwrap();
        sink.write_num_le(0x0102_u16).unwrap();
        sink.write_byte_string(&ByteString::from("!")).unwrap();

        let written = sink.into_inner().unwrap();
        assert_eq!(written.to_vec(), [&b"-9223372036854775808|\xE2\x82\xAC\x02\x01!"[..]].concat());
    }

    #[test]
    fn write_all_from_drains_source() {
        let data = pattern_bytes(SEGMENT_SIZE * 3);
        let mut source = FakeSource::builder().contents(&data).max_read_size(1000).build();
        let mut sink = BufferedSink::new(FakeSink::new());

        assert_eq!(sink.write_all_from(&mut source).unwrap(), data.len() as u64);
        sink.flush().unwrap();

        assert_eq!(sink.get_ref().contents().to_vec(), data);
    }

    #[test]
    fn write_from_buffer_moves_bytes() {
        let mut source = Buffer::from("0123456789");
        let mut sink = BufferedSink::new(Buffer::new());

        sink.write_from(&mut source, 4).unwrap();

        assert_eq!(source, b"456789");
        assert_eq!(sink.into_inner().unwrap(), b"0123");
    }

    #[test]
    fn close_writes_out_and_closes_once() {
        let mut sink = BufferedSink::new(FakeSink::new());
        sink.write_utf8("last words").unwrap();

        sink.close().unwrap();
        sink.close().unwrap();

        assert_eq!(sink.get_ref().contents().to_vec(), b"last words");
        assert_eq!(sink.get_ref().close_count(), 1);
        assert_eq!(sink.write_byte(0).unwrap_err().kind(), ErrorKind::Closed);
        assert_eq!(sink.flush().unwrap_err().kind(), ErrorKind::Closed);
    }

    #[test]
    fn close_reports_first_error_and_still_closes() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let mut sink = BufferedSink::new(FakeSink::builder().fail_writes().fail_close().build());
        sink.write_utf8("doomed").unwrap();

        let error = sink.close().unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Transport);
        assert!(error.to_string().contains("write"));
        assert_eq!(sink.get_ref().close_count(), 1);
        capture.assert_contains("failed to close transport");
    }

    #[test]
    fn transport_errors_surface_as_transport_kind() {
        let mut sink = BufferedSink::builder(FakeSink::builder().fail_writes().build())
            .emit_threshold(1)
            .build();

        assert_eq!(sink.write_byte(1).unwrap_err().kind(), ErrorKind::Transport);
    }

    #[test]
    fn std_io_write() {
        let mut sink = BufferedSink::new(Buffer::new());

        write!(sink, "{}-{}", 1, "two").unwrap();
        Write::flush(&mut sink).unwrap();

        assert_eq!(sink.get_ref(), &b"1-two");
    }

    #[test]
    fn buffer_comes_from_configured_pool() {
        let pool = SegmentPool::new();
        let mut sink = BufferedSink::builder(FakeSink::new()).pool(pool.clone()).build();

        sink.write_byte(1).unwrap();
        assert_eq!(pool.stats().outstanding(), 1);

        sink.flush().unwrap();
        drop(sink);
        assert_eq!(pool.stats().outstanding(), 0);
    }
}

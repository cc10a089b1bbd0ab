// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use num_traits::ToBytes;
use segbuf::{Buffer, ByteString, Error, Result, SegmentPool};
use tracing::{Level, event};

use crate::{AsyncRawSink, DEFAULT_EMIT_THRESHOLD, from_transport};

/// Asynchronous counterpart of [`BufferedSink`][crate::BufferedSink].
///
/// Writes are buffered in memory and complete immediately unless the buffer has reached the
/// emit threshold, in which case the complete segments are handed to the transport first.
///
/// # Cancellation
///
/// If a future is dropped while the transport is accepting bytes, the bytes the transport has
/// not yet taken stay in the buffer and are emitted by the next operation.
///
/// # Example
///
/// ```
/// # testing_aids::execute_or_terminate_process(|| futures::executor::block_on(async {
/// use segbuf::Buffer;
/// use segbuf_io::{AsyncBufferedSink, Blocking};
///
/// let mut sink = AsyncBufferedSink::new(Blocking::new(Buffer::new()));
/// sink.write_utf8("PING").await.unwrap();
/// sink.flush().await.unwrap();
///
/// assert_eq!(sink.get_ref().get_ref(), &b"PING");
/// # }));
/// ```
#[derive(Debug)]
pub struct AsyncBufferedSink<W: AsyncRawSink> {
    inner: W,
    buffer: Buffer,
    emit_threshold: usize,
    closed: bool,
}

impl<W: AsyncRawSink> AsyncBufferedSink<W> {
    /// Creates a buffered sink over `inner` that draws segments from the global pool.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self::with_pool(inner, SegmentPool::global().clone())
    }

    /// Creates a buffered sink over `inner` that draws segments from `pool`.
    #[must_use]
    pub fn with_pool(inner: W, pool: SegmentPool) -> Self {
        Self {
            inner,
            buffer: Buffer::with_pool(pool),
            emit_threshold: DEFAULT_EMIT_THRESHOLD,
            closed: false,
        }
    }

    /// The bytes written but not yet handed to the transport.
    #[must_use]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
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
    pub async fn write_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_slice(bytes);
        self.emit_complete_segments().await
    }

    /// Appends one byte.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_byte(byte);
        self.emit_complete_segments().await
    }

    /// Appends a number in big-endian (network) byte order.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_num_be<T: ToBytes>(&mut self, value: T) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_num_be(value);
        self.emit_complete_segments().await
    }

    /// Appends a number in little-endian byte order.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_num_le<T: ToBytes>(&mut self, value: T) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_num_le(value);
        self.emit_complete_segments().await
    }

    /// Appends the decimal text form of `value`.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_decimal_i64(&mut self, value: i64) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_decimal_i64(value);
        self.emit_complete_segments().await
    }

    /// Appends the lowercase hexadecimal text form of `value`, without leading zeros.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_hex_u64(&mut self, value: u64) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_hex_u64(value);
        self.emit_complete_segments().await
    }

    /// Appends `text` encoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_utf8(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_utf8(text);
        self.emit_complete_segments().await
    }

    /// Appends one character encoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_utf8_code_point(&mut self, code_point: char) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_utf8_code_point(code_point);
        self.emit_complete_segments().await
    }

    /// Appends the bytes of `value`.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    pub async fn write_byte_string(&mut self, value: &ByteString) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_byte_string(value);
        self.emit_complete_segments().await
    }

    /// Moves `byte_count` bytes from the front of `source` into this sink.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails to accept emitted bytes.
    ///
    /// # Panics
    ///
    /// Panics if `source` holds fewer than `byte_count` bytes.
    pub async fn write_from(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_from(source, byte_count);
        self.emit_complete_segments().await
    }

    /// Hands every buffered byte to the transport, without flushing the transport itself.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails.
    pub async fn emit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.write_buffered(self.buffer.len()).await
    }

    /// Hands every buffered byte to the transport and flushes the transport.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the transport fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.emit().await?;
        self.inner.flush().await.map_err(from_transport)
    }

    /// Writes out the buffered bytes, flushes the transport and closes it, reporting the first
    /// failure. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if writing out the buffered bytes or closing the transport fails. The sink is
    /// closed regardless.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let mut emitted = self.write_buffered(self.buffer.len()).await;
        if emitted.is_ok() {
            emitted = self.inner.flush().await.map_err(from_transport);
        }

        self.closed = true;
        self.buffer.clear();

        let closed = self.inner.close().await.map_err(from_transport);

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
    /// Fails if the sink is closed or flushing fails.
    pub async fn into_inner(mut self) -> Result<W> {
        self.flush().await?;
        Ok(self.inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::closed("the sink has been closed"))
        } else {
            Ok(())
        }
    }

    async fn emit_complete_segments(&mut self) -> Result<()> {
        if self.buffer.len() < self.emit_threshold {
            return Ok(());
        }

        let count = match self.buffer.complete_segment_byte_count() {
            0 => self.buffer.len(),
            complete => complete,
        };

        self.write_buffered(count).await
    }

    async fn write_buffered(&mut self, byte_count: usize) -> Result<()> {
        if byte_count == 0 {
            return Ok(());
        }

        event!(Level::TRACE, message = "emitting", bytes = byte_count);

        self.inner.write(&mut self.buffer, byte_count).await.map_err(from_transport)
    }
}

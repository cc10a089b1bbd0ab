// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use num_traits::FromBytes;
use segbuf::{Buffer, ByteString, Error, Line, Options, Result, SegmentPool, Selection};
use tracing::{Level, event};

use crate::source::{MAX_DECIMAL_LEN, MAX_HEX_LEN, number_too_long};
use crate::{AsyncRawSource, DEFAULT_FILL_SIZE, from_transport};

/// Decodes values from bytes that arrive over time.
///
/// Used with [`AsyncBufferedSource::decode()`], which calls the decoder whenever more bytes
/// have arrived until it produces a value.
pub trait StreamingDecoder {
    /// The type of the decoded values.
    type Output;

    /// Decodes one value from the front of `buffer`, consuming its bytes.
    ///
    /// Returns `None` without consuming anything if `buffer` does not hold a complete value yet.
    /// `at_end` is `true` if no more bytes will ever arrive.
    ///
    /// # Errors
    ///
    /// Fails if the bytes cannot be decoded. Implementations decide what, if anything, is
    /// consumed in that case.
    fn decode(&mut self, buffer: &mut Buffer, at_end: bool) -> Result<Option<Self::Output>>;
}

/// Asynchronous counterpart of [`BufferedSource`][crate::BufferedSource].
///
/// # Cancellation
///
/// Every operation may be cancelled by dropping its future. Bytes that arrived before the drop
/// stay in the buffer and are seen by the next operation. An operation that only fails to make
/// progress because it was cancelled consumes nothing, with the exception of
/// [`skip()`][Self::skip], which discards bytes as they arrive.
///
/// # Example
///
/// ```
/// # testing_aids::execute_or_terminate_process(|| futures::executor::block_on(async {
/// use segbuf::Buffer;
/// use segbuf_io::{AsyncBufferedSource, Blocking};
///
/// let mut source = AsyncBufferedSource::new(Blocking::new(Buffer::from("220 ready\r\n")));
///
/// assert_eq!(source.read_decimal_i64().await.unwrap(), 220);
/// assert_eq!(source.read_utf8_line().await.unwrap().as_deref(), Some(" ready"));
/// assert!(source.exhausted().await.unwrap());
/// # }));
/// ```
#[derive(Debug)]
pub struct AsyncBufferedSource<R: AsyncRawSource> {
    inner: R,
    buffer: Buffer,
    fill_size: usize,
    exhausted: bool,
    closed: bool,
}

impl<R: AsyncRawSource> AsyncBufferedSource<R> {
    /// Creates a buffered source over `inner` that draws segments from the global pool.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self::with_pool(inner, SegmentPool::global().clone())
    }

    /// Creates a buffered source over `inner` that draws segments from `pool`.
    #[must_use]
    pub fn with_pool(inner: R, pool: SegmentPool) -> Self {
        Self {
            inner,
            buffer: Buffer::with_pool(pool),
            fill_size: DEFAULT_FILL_SIZE,
            exhausted: false,
            closed: false,
        }
    }

    /// The bytes that have arrived but not yet been consumed.
    #[must_use]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Mutable access to the read-ahead buffer.
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// The transport this source reads from.
    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consumes the source, returning the transport. Buffered bytes are lost.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Whether no bytes are buffered and the transport has no more.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub async fn exhausted(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.buffer.is_empty() && !self.fill().await?)
    }

    /// Waits until at least `byte_count` bytes are buffered. Returns `false` if the transport
    /// is exhausted first.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub async fn request(&mut self, byte_count: usize) -> Result<bool> {
        self.ensure_open()?;

        while self.buffer.len() < byte_count {
            if !self.fill().await? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Waits until at least `byte_count` bytes are buffered.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the transport is exhausted
    /// first.
    pub async fn require(&mut self, byte_count: usize) -> Result<()> {
        if self.request(byte_count).await? {
            Ok(())
        } else {
            Err(Error::end_of_data(format!(
                "{byte_count} bytes required but the source ended after {}",
                self.buffer.len()
            )))
        }
    }

    /// Waits until `predicate` holds for the buffered bytes.
    ///
    /// The predicate is checked before every fill and once more after the transport is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the transport is
    /// exhausted and the predicate still does not hold.
    pub async fn await_until(&mut self, mut predicate: impl FnMut(&Buffer) -> bool) -> Result<()> {
        self.ensure_open()?;

        loop {
            if predicate(&self.buffer) {
                return Ok(());
            }

            if !self.fill().await? {
                return Err(Error::malformed(format!(
                    "the source ended with {} bytes buffered before the awaited condition held",
                    self.buffer.len()
                )));
            }
        }
    }

    /// Decodes one value with `decoder`, waiting for more bytes as long as it asks for them.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the transport is exhausted
    /// before the decoder produces a value, or with the decoder's own error.
    pub async fn decode<D: StreamingDecoder>(&mut self, decoder: &mut D) -> Result<D::Output> {
        self.ensure_open()?;

        loop {
            if let Some(value) = decoder.decode(&mut self.buffer, self.exhausted)? {
                return Ok(value);
            }

            if self.exhausted {
                return Err(Error::end_of_data(format!(
                    "the source ended with {} bytes buffered before a complete value arrived",
                    self.buffer.len()
                )));
            }

            // At the end of data, the decoder gets a final call with `at_end` set.
            self.fill().await?;
        }
    }

    /// Consumes one byte.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source is exhausted.
    pub async fn read_byte(&mut self) -> Result<u8> {
        self.require(1).await?;
        self.buffer.read_byte()
    }

    /// Consumes a number of type `T` in big-endian (network) byte order.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub async fn read_num_be<T: FromBytes>(&mut self) -> Result<T>
    where
        T::Bytes: Sized + Default,
    {
        self.require(size_of::<T::Bytes>()).await?;
        self.buffer.read_num_be()
    }

    /// Consumes a number of type `T` in little-endian byte order.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub async fn read_num_le<T: FromBytes>(&mut self) -> Result<T>
    where
        T::Bytes: Sized + Default,
    {
        self.require(size_of::<T::Bytes>()).await?;
        self.buffer.read_num_le()
    }

    /// Consumes a signed decimal number in text form, looking at no more than a sign and 20
    /// digits.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the data does not start
    /// with a number, the number is longer than 21 bytes or does not fit in an `i64`.
    pub async fn read_decimal_i64(&mut self) -> Result<i64> {
        self.await_number_end(MAX_DECIMAL_LEN, |index, byte| {
            byte.is_ascii_digit() || (index == 0 && byte == b'-')
        })
        .await?;
        self.buffer.read_decimal_i64()
    }

    /// Consumes an unsigned hexadecimal number of up to 16 digits.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the data does not start
    /// with a hex digit or has more than 16 digits.
    pub async fn read_hex_u64(&mut self) -> Result<u64> {
        self.await_number_end(MAX_HEX_LEN, |_, byte| byte.is_ascii_hexdigit()).await?;
        self.buffer.read_hex_u64()
    }

    /// Consumes `byte_count` bytes into a new vector.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub async fn read_bytes(&mut self, byte_count: usize) -> Result<Vec<u8>> {
        self.require(byte_count).await?;
        self.buffer.read_bytes(byte_count)
    }

    /// Consumes `byte_count` bytes into a new [`ByteString`].
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub async fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
        self.require(byte_count).await?;
        self.buffer.read_byte_string(byte_count)
    }

    /// Consumes everything up to the end of the source.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub async fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        self.fill_to_end().await?;
        Ok(self.buffer.read_to_vec())
    }

    /// Consumes `byte_count` bytes of UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first and with
    /// [`MalformedData`][segbuf::ErrorKind::MalformedData] if the bytes are not valid UTF-8.
    pub async fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
        self.require(byte_count).await?;
        self.buffer.read_utf8(byte_count)
    }

    /// Consumes everything up to the end of the source as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the bytes are not
    /// valid UTF-8.
    pub async fn read_utf8_to_end(&mut self) -> Result<String> {
        self.fill_to_end().await?;
        self.buffer.read_utf8_to_end()
    }

    /// Consumes the next line of UTF-8 text. Returns `None` if the source is exhausted.
    ///
    /// Follows the same rules as [`BufferedSource::read_line()`][crate::BufferedSource::read_line].
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the line is not valid
    /// UTF-8.
    pub async fn read_line(&mut self) -> Result<Option<Line>> {
        self.ensure_open()?;

        let mut scanned = 0;

        while self.buffer.index_of_in(b'\n', scanned, self.buffer.len()).is_none() {
            scanned = self.buffer.len();

            if !self.fill().await? {
                break;
            }
        }

        self.buffer.read_line()
    }

    /// Consumes the next line of UTF-8 text, discarding the terminator.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the line is not valid
    /// UTF-8.
    pub async fn read_utf8_line(&mut self) -> Result<Option<String>> {
        Ok(self.read_line().await?.map(Line::into_text))
    }

    /// Consumes the first of `options` that the source starts with and returns its index.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub async fn select(&mut self, options: &Options) -> Result<Option<usize>> {
        self.ensure_open()?;

        while let Selection::NeedMoreData { .. } = self.buffer.try_select(options) {
            if !self.fill().await? {
                break;
            }
        }

        Ok(self.buffer.select(options))
    }

    /// The offset of the first occurrence of `byte`, waiting until it arrives or the source is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub async fn index_of(&mut self, byte: u8) -> Result<Option<usize>> {
        self.ensure_open()?;

        let mut scanned = 0;

        loop {
            if let Some(found) = self.buffer.index_of_in(byte, scanned, self.buffer.len()) {
                return Ok(Some(found));
            }

            scanned = self.buffer.len();

            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Discards `byte_count` bytes, as they arrive.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub async fn skip(&mut self, byte_count: usize) -> Result<()> {
        self.ensure_open()?;

        let mut remaining = byte_count;

        while remaining > 0 {
            if self.buffer.is_empty() && !self.fill().await? {
                return Err(Error::end_of_data(format!(
                    "the source ended with {remaining} of {byte_count} bytes left to skip"
                )));
            }

            let count = remaining.min(self.buffer.len());
            self.buffer.skip(count)?;
            remaining -= count;
        }

        Ok(())
    }

    /// Closes the source and its transport, discarding buffered bytes. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the transport fails to close. The source is closed regardless.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.buffer.clear();

        event!(Level::TRACE, message = "closing source");

        self.inner.close().await.map_err(from_transport)
    }

    async fn fill(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }

        match self.inner.read_at_most_to(&mut self.buffer, self.fill_size).await {
            Ok(Some(count)) => {
                event!(Level::TRACE, message = "filled", bytes = count, buffered = self.buffer.len());
                Ok(true)
            }
            Ok(None) => {
                event!(Level::TRACE, message = "source exhausted", buffered = self.buffer.len());
                self.exhausted = true;
                Ok(false)
            }
            Err(e) => Err(from_transport(e)),
        }
    }

    async fn fill_to_end(&mut self) -> Result<()> {
        self.ensure_open()?;
        while self.fill().await? {}
        Ok(())
    }

    /// Waits until the text number at the front of the buffer is followed by a byte that
    /// cannot be part of it, or the source ends. Fails once more than `max_len` bytes belong to
    /// the number.
    async fn await_number_end(&mut self, max_len: usize, is_part: impl Fn(usize, u8) -> bool) -> Result<()> {
        self.require(1).await?;

        let mut index = 0;

        while self.request(index + 1).await? {
            let Some(byte) = self.buffer.get(index) else {
                break;
            };

            if !is_part(index, byte) {
                break;
            }

            if index == max_len {
                return Err(number_too_long(max_len));
            }

            index += 1;
        }

        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::closed("the source has been closed"))
        } else {
            Ok(())
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;

use num_traits::FromBytes;
use segbuf::{Buffer, ByteString, Error, Line, Options, Result, SEGMENT_SIZE, SegmentPool, Selection};
use tracing::{Level, event};

use crate::{PeekSource, RawSink, RawSource, from_transport};

/// How many bytes a buffered source asks its transport for by default, per fill.
pub const DEFAULT_FILL_SIZE: usize = SEGMENT_SIZE;

/// 16 hex digits fill a `u64`.
pub(crate) const MAX_HEX_LEN: usize = 16;

/// A sign and 20 digits: any `i64`, with room for a leading zero.
pub(crate) const MAX_DECIMAL_LEN: usize = 21;

pub(crate) fn number_too_long(max_len: usize) -> Error {
    Error::malformed(format!("text number is longer than {max_len} bytes"))
}

/// A source that reads ahead from a [`RawSource`] into a [`Buffer`] and offers typed reads.
///
/// Every read first tries to satisfy the request from the buffer. Only if the buffer holds too
/// few bytes does the source ask the transport for more, one fill at a time, until the request
/// can be satisfied or the transport is exhausted.
///
/// Reads that fail because the transport is exhausted fail with
/// [`EndOfData`][segbuf::ErrorKind::EndOfData] and consume nothing, unless documented
/// otherwise. Everything read ahead stays available in the buffer.
///
/// # Example
///
/// ```
/// use segbuf::Buffer;
/// use segbuf_io::BufferedSource;
///
/// let mut source = BufferedSource::new(Buffer::from("GET /index.html\r\nHost: example\r\n"));
///
/// assert_eq!(source.read_utf8_line().unwrap().as_deref(), Some("GET /index.html"));
/// assert_eq!(source.read_utf8_line().unwrap().as_deref(), Some("Host: example"));
/// assert_eq!(source.read_utf8_line().unwrap(), None);
/// ```
#[derive(Debug)]
pub struct BufferedSource<R: RawSource> {
    inner: R,
    buffer: Buffer,
    fill_size: usize,

    // The transport has reported the end of its data.
    exhausted: bool,
    closed: bool,
}

impl<R: RawSource> BufferedSource<R> {
    /// Starts building a new buffered source over `inner`.
    #[must_use]
    pub fn builder(inner: R) -> BufferedSourceBuilder<R> {
        BufferedSourceBuilder {
            inner,
            pool: None,
            fill_size: DEFAULT_FILL_SIZE,
        }
    }

    /// Creates a buffered source over `inner` with the default configuration.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self::builder(inner).build()
    }

    /// The bytes that have been read ahead from the transport but not yet consumed.
    #[must_use]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Mutable access to the read-ahead buffer.
    ///
    /// Consuming bytes from the buffer consumes them from the source.
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// The transport this source reads from.
    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consumes the source, returning the transport. Bytes that were read ahead are lost.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Whether the source is exhausted: no bytes are buffered and the transport has no more.
    ///
    /// May block to find out, as it needs to read from the transport if the buffer is empty.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn exhausted(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.buffer.is_empty() && !self.fill()?)
    }

    /// Reads from the transport until at least `byte_count` bytes are buffered.
    ///
    /// Returns `false` if the transport is exhausted first.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn request(&mut self, byte_count: usize) -> Result<bool> {
        self.ensure_open()?;

        while self.buffer.len() < byte_count {
            if !self.fill()? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Reads from the transport until at least `byte_count` bytes are buffered.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the transport is exhausted
    /// first. Also fails if the source is closed or the transport fails.
    pub fn require(&mut self, byte_count: usize) -> Result<()> {
        if self.request(byte_count)? {
            Ok(())
        } else {
            Err(Error::end_of_data(format!(
                "{byte_count} bytes required but the source ended after {}",
                self.buffer.len()
            )))
        }
    }

    /// Consumes one byte.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source is exhausted.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.require(1)?;
        self.buffer.read_byte()
    }

    /// Consumes a number of type `T` in big-endian (network) byte order.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends before all the
    /// bytes of `T` are available.
    pub fn read_num_be<T: FromBytes>(&mut self) -> Result<T>
    where
        T::Bytes: Sized + Default,
    {
        self.require(size_of::<T::Bytes>())?;
        self.buffer.read_num_be()
    }

    /// Consumes a number of type `T` in little-endian byte order.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends before all the
    /// bytes of `T` are available.
    pub fn read_num_le<T: FromBytes>(&mut self) -> Result<T>
    where
        T::Bytes: Sized + Default,
    {
        self.require(size_of::<T::Bytes>())?;
        self.buffer.read_num_le()
    }

    /// Consumes a signed decimal number in text form. The byte after the last digit is not
    /// consumed.
    ///
    /// At most 21 bytes (a sign and 20 digits) are looked at, so an endless run of digits is
    /// rejected instead of buffered.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the data does not start
    /// with a number, the number is longer than 21 bytes or does not fit in an `i64`, and with
    /// [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends before the first digit.
    pub fn read_decimal_i64(&mut self) -> Result<i64> {
        self.buffer_number(MAX_DECIMAL_LEN, |index, byte| {
            byte.is_ascii_digit() || (index == 0 && byte == b'-')
        })?;

        self.buffer.read_decimal_i64()
    }

    /// Consumes an unsigned hexadecimal number of up to 16 digits in either letter case. The
    /// byte after the last digit is not consumed.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the data does not start
    /// with a hex digit or has more than 16 digits, and with
    /// [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source is exhausted.
    pub fn read_hex_u64(&mut self) -> Result<u64> {
        self.buffer_number(MAX_HEX_LEN, |_, byte| byte.is_ascii_hexdigit())?;

        self.buffer.read_hex_u64()
    }

    /// Consumes `byte_count` bytes into a new vector.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub fn read_bytes(&mut self, byte_count: usize) -> Result<Vec<u8>> {
        self.require(byte_count)?;
        self.buffer.read_bytes(byte_count)
    }

    /// Consumes `byte_count` bytes into a new [`ByteString`].
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
        self.require(byte_count)?;
        self.buffer.read_byte_string(byte_count)
    }

    /// Copies bytes into `dst`, consuming them. Reads from the transport at most once, and only
    /// if nothing is buffered.
    ///
    /// Returns the number of bytes copied, which is 0 only if `dst` is empty or the source is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;

        if !dst.is_empty() && self.buffer.is_empty() {
            self.fill()?;
        }

        Ok(self.buffer.read_into(dst))
    }

    /// Fills `dst` completely.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub fn read_exact_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.require(dst.len())?;
        self.buffer.read_exact_into(dst)
    }

    /// Consumes everything up to the end of the source into a new vector.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        self.fill_to_end()?;
        Ok(self.buffer.read_to_vec())
    }

    /// Consumes `byte_count` bytes of UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first and with
    /// [`MalformedData`][segbuf::ErrorKind::MalformedData] if the bytes are not valid UTF-8.
    pub fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
        self.require(byte_count)?;
        self.buffer.read_utf8(byte_count)
    }

    /// Consumes `byte_count` bytes as UTF-8 text, replacing invalid sequences with U+FFFD.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub fn read_utf8_lossy(&mut self, byte_count: usize) -> Result<String> {
        self.require(byte_count)?;
        self.buffer.read_utf8_lossy(byte_count)
    }

    /// Consumes everything up to the end of the source as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the bytes are not
    /// valid UTF-8. Nothing is consumed in that case.
    pub fn read_utf8_to_end(&mut self) -> Result<String> {
        self.fill_to_end()?;
        self.buffer.read_utf8_to_end()
    }

    /// Consumes one UTF-8 encoded character.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends before the
    /// character is complete and with [`MalformedData`][segbuf::ErrorKind::MalformedData] if
    /// the bytes are not a valid encoding.
    pub fn read_utf8_code_point(&mut self) -> Result<char> {
        self.require(1)?;

        let lead = self.buffer.get(0).expect("one byte was required above");

        if let Some(width) = segbuf::utf8_sequence_width(lead) {
            // A short read is reported by the buffer below.
            self.request(width)?;
        }

        self.buffer.read_utf8_code_point()
    }

    /// Consumes the next line of UTF-8 text, reading from the transport until a `\n` arrives or
    /// the source is exhausted.
    ///
    /// A `\r` at the very end of the source is stripped. A `\r` that is followed by more data is
    /// only stripped if that data starts with `\n`. Returns `None` if the source is exhausted.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the line is not valid
    /// UTF-8.
    pub fn read_line(&mut self) -> Result<Option<Line>> {
        self.ensure_open()?;

        let mut scanned = 0;

        loop {
            if self.buffer.index_of_in(b'\n', scanned, self.buffer.len()).is_some() {
                break;
            }

            scanned = self.buffer.len();

            if !self.fill()? {
                break;
            }
        }

        // Either a '\n' is buffered or everything up to the end of the data is.
        self.buffer.read_line()
    }

    /// Consumes the next line of UTF-8 text, discarding the terminator.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the line is not valid
    /// UTF-8.
    pub fn read_utf8_line(&mut self) -> Result<Option<String>> {
        Ok(self.read_line()?.map(Line::into_text))
    }

    /// Consumes the next line of UTF-8 text, which must be terminated.
    ///
    /// With a `limit`, the line text may be at most `limit` bytes long and at most `limit + 2`
    /// bytes are read ahead to find the terminator.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if no terminator is found within the
    /// limit or before the source ends. Nothing is consumed in that case.
    pub fn read_utf8_line_strict(&mut self, limit: Option<usize>) -> Result<String> {
        self.ensure_open()?;

        let scan_len = limit.map_or(usize::MAX, |limit| limit.saturating_add(1));
        let decisive_len = limit.map_or(usize::MAX, |limit| limit.saturating_add(2));
        let mut scanned = 0;

        loop {
            if self.buffer.len() >= decisive_len
                || self.buffer.index_of_in(b'\n', scanned.min(scan_len), scan_len).is_some()
            {
                break;
            }

            scanned = self.buffer.len();

            if !self.fill()? {
                break;
            }
        }

        self.buffer.read_utf8_line_strict(limit)
    }

    /// Consumes the first of `options` that the source starts with and returns its index.
    ///
    /// Reads from the transport only as far as needed to decide. If several options match, the
    /// one registered first wins. Returns `None` and consumes nothing if no option matches.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn select(&mut self, options: &Options) -> Result<Option<usize>> {
        self.ensure_open()?;

        loop {
            match self.buffer.try_select(options) {
                Selection::Matched(_) | Selection::NoMatch => break,
                Selection::NeedMoreData { .. } => {
                    if !self.fill()? {
                        break;
                    }
                }
            }
        }

        Ok(self.buffer.select(options))
    }

    /// The offset of the first occurrence of `byte`, reading from the transport until it is
    /// found or the source is exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn index_of(&mut self, byte: u8) -> Result<Option<usize>> {
        self.index_of_element(&[byte], 0)
    }

    /// The offset of the first occurrence of `needle` at or after `from`, reading from the
    /// transport until it is found or the source is exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    ///
    /// # Panics
    ///
    /// Panics if `needle` is empty.
    pub fn index_of_bytes(&mut self, needle: &[u8], from: usize) -> Result<Option<usize>> {
        self.ensure_open()?;

        let mut start = from;

        loop {
            if let Some(found) = self.buffer.index_of_bytes(needle, start) {
                return Ok(Some(found));
            }

            // A later match may overlap the bytes already buffered.
            start = start.max((self.buffer.len() + 1).saturating_sub(needle.len()));

            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// The offset of the first byte at or after `from` that is contained in `set`, reading from
    /// the transport until one is found or the source is exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn index_of_element(&mut self, set: &[u8], from: usize) -> Result<Option<usize>> {
        self.ensure_open()?;

        let mut start = from;

        loop {
            if let Some(found) = self.buffer.index_of_element(set, start) {
                return Ok(Some(found));
            }

            start = start.max(self.buffer.len());

            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Whether the bytes at `offset` equal `bytes`, reading from the transport as needed.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the transport fails.
    pub fn range_equals(&mut self, offset: usize, bytes: &[u8]) -> Result<bool> {
        let Some(end) = offset.checked_add(bytes.len()) else {
            return Ok(false);
        };

        Ok(self.request(end)? && self.buffer.range_equals(offset, bytes))
    }

    /// Discards `byte_count` bytes.
    ///
    /// Bytes are discarded as they arrive, so a failure may leave some of them consumed.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][segbuf::ErrorKind::EndOfData] if the source ends first.
    pub fn skip(&mut self, byte_count: usize) -> Result<()> {
        self.ensure_open()?;

        let mut remaining = byte_count;

        while remaining > 0 {
            if self.buffer.is_empty() && !self.fill()? {
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

    /// Moves every remaining byte of the source to `sink` and returns how many there were.
    ///
    /// Whole segments are handed to the sink as they arrive.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or either transport fails.
    pub fn read_all_to<W: RawSink>(&mut self, sink: &mut W) -> Result<u64> {
        self.ensure_open()?;

        let mut total = 0_u64;

        loop {
            let count = self.buffer.len();

            if count > 0 {
                sink.write(&mut self.buffer, count).map_err(from_transport)?;
                total += count as u64;
            }

            if !self.fill()? {
                return Ok(total);
            }
        }
    }

    /// A source that reads ahead through this one without consuming anything.
    ///
    /// Bytes read from the peek source are buffered here and remain available to later reads.
    /// This source cannot be used until the peek source is dropped.
    ///
    /// ```
    /// use segbuf::Buffer;
    /// use segbuf_io::BufferedSource;
    ///
    /// let mut source = BufferedSource::new(Buffer::from("abcdef"));
    ///
    /// let mut peek = source.peek();
    /// assert_eq!(peek.read_utf8(3).unwrap(), "abc");
    /// drop(peek);
    ///
    /// assert_eq!(source.read_utf8(6).unwrap(), "abcdef");
    /// ```
    pub fn peek(&mut self) -> BufferedSource<PeekSource<'_, R>> {
        let pool = self.buffer.pool().clone();

        BufferedSource::builder(PeekSource::new(self)).pool(pool).build()
    }

    /// Closes the source and its transport, discarding buffered bytes.
    ///
    /// Closing an already closed source does nothing.
    ///
    /// # Errors
    ///
    /// Fails if the transport fails to close. The source is closed regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.buffer.clear();

        event!(Level::TRACE, message = "closing source");

        self.inner.close().map_err(from_transport)
    }

    /// Asks the transport for more bytes, once. Returns `false` if it is exhausted.
    pub(crate) fn fill(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }

        match self.inner.read_at_most_to(&mut self.buffer, self.fill_size) {
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

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::closed("the source has been closed"))
        } else {
            Ok(())
        }
    }

    fn fill_to_end(&mut self) -> Result<()> {
        self.ensure_open()?;
        while self.fill()? {}
        Ok(())
    }

    /// Buffers the bytes of a text number: until a byte that cannot be part of it or the source
    /// ends. Fails once more than `max_len` bytes belong to the number.
    fn buffer_number(&mut self, max_len: usize, is_part: impl Fn(usize, u8) -> bool) -> Result<()> {
        self.require(1)?;

        let mut index = 0;

        while self.request(index + 1)? {
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
}

/// Builds a [`BufferedSource`].
///
/// Access through [`BufferedSource::builder()`][BufferedSource::builder].
#[derive(Debug)]
pub struct BufferedSourceBuilder<R: RawSource> {
    inner: R,
    pool: Option<SegmentPool>,
    fill_size: usize,
}

impl<R: RawSource> BufferedSourceBuilder<R> {
    /// The pool the read-ahead buffer draws segments from.
    ///
    /// Optional. Defaults to [`SegmentPool::global()`].
    #[must_use]
    pub fn pool(mut self, pool: SegmentPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// How many bytes to ask the transport for per fill.
    ///
    /// Optional. Defaults to [`DEFAULT_FILL_SIZE`].
    ///
    /// # Panics
    ///
    /// Panics if `fill_size` is 0.
    #[must_use]
    pub fn fill_size(mut self, fill_size: usize) -> Self {
        assert!(fill_size > 0, "a source must read at least one byte per fill");
        self.fill_size = fill_size;
        self
    }

    /// Builds the source.
    #[must_use]
    pub fn build(self) -> BufferedSource<R> {
        let pool = self.pool.unwrap_or_else(|| SegmentPool::global().clone());

        BufferedSource {
            inner: self.inner,
            buffer: Buffer::with_pool(pool),
            fill_size: self.fill_size,
            exhausted: false,
            closed: false,
        }
    }
}

impl<R: RawSource> io::Read for BufferedSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf)?)
    }
}

impl<R: RawSource> io::BufRead for BufferedSource<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.ensure_open()?;

        if self.buffer.is_empty() {
            self.fill()?;
        }

        Ok(self.buffer.slices().next().unwrap_or_default())
    }

    fn consume(&mut self, amount: usize) {
        self.buffer
            .skip(amount)
            .expect("cannot consume more bytes than fill_buf() returned");
    }
}

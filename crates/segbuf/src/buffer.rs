// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::collections::vec_deque;
use std::fmt;
use std::iter::FusedIterator;
use std::mem;

use crate::constants::SHARE_MINIMUM;
use crate::segment::Segment;
use crate::{ByteString, Error, Result, SEGMENT_SIZE, SegmentPool};

/// A mutable sequence of bytes stored as a queue of pooled segments.
///
/// Bytes are appended at the tail and consumed from the head. The buffer is both the destination
/// that sources fill and the origin that sinks drain, so a `Buffer` can act as an in-memory pipe
/// between the two.
///
/// Memory is obtained from a [`SegmentPool`] in units of [`SEGMENT_SIZE`] bytes and is returned
/// to the pool as soon as the last byte of a segment has been consumed.
///
/// # Sharing
///
/// [`clone()`][Clone::clone], [`peek()`][Self::peek] and [`copy_to()`][Self::copy_to] do not
/// copy bytes. Instead, the new buffer references the same segments. A segment whose memory is
/// referenced by more than one buffer becomes read-only for all of them, and a buffer that needs
/// to append to it takes a private copy first. Either buffer can therefore be mutated freely
/// without the other observing any change.
///
/// # Thread safety
///
/// A buffer can be sent to another thread but is not internally synchronized. Use `&mut` access
/// (or external locking) to serialize writers and readers.
pub struct Buffer {
    segments: VecDeque<Segment>,

    /// Cached sum of the readable bytes of all segments.
    len: usize,

    pool: SegmentPool,
}

impl Buffer {
    /// Creates an empty buffer that draws memory from the process-wide pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool(SegmentPool::global().clone())
    }

    /// Creates an empty buffer that draws memory from the given pool.
    #[must_use]
    pub fn with_pool(pool: SegmentPool) -> Self {
        Self {
            segments: VecDeque::new(),
            len: 0,
            pool,
        }
    }

    /// The pool that this buffer acquires new segments from.
    #[must_use]
    pub fn pool(&self) -> &SegmentPool {
        &self.pool
    }

    /// The number of readable bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.len, self.segments.iter().map(Segment::len).sum::<usize>());

        self.len
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of segments currently holding the buffer's bytes.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Appends a copy of `bytes`.
    pub fn write_slice(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let tail = self.writable_tail(1);
            let written = tail.write_some(bytes);

            bytes = &bytes[written..];
            self.len += written;
        }
    }

    /// Appends a single byte.
    pub fn write_byte(&mut self, byte: u8) {
        self.writable_tail(1).write(&[byte]);
        self.len += 1;
    }

    /// Appends the bytes of `value`.
    pub fn write_byte_string(&mut self, value: &ByteString) {
        self.write_slice(value.as_slice());
    }

    /// Moves `byte_count` bytes from the front of `source` to the end of this buffer.
    ///
    /// Whole segments are relinked from one buffer to the other without copying their content.
    /// Only a partial segment at the end of the range is copied or shared, depending on how
    /// many bytes it holds.
    ///
    /// # Panics
    ///
    /// Panics if `source` holds fewer than `byte_count` bytes.
    pub fn write_from(&mut self, source: &mut Self, byte_count: usize) {
        assert!(
            byte_count <= source.len(),
            "cannot move {byte_count} bytes from a buffer of {} bytes",
            source.len()
        );

        let mut remaining = byte_count;

        while remaining > 0 {
            let head = source.segments.front_mut().expect("source length was checked above");

            if remaining < head.len() {
                // Only part of the head is moved. Prefer appending into our own tail if there
                // is room, otherwise split the head.
                if self.tail_capacity() >= remaining {
                    let tail = self.segments.back_mut().expect("a tail with capacity exists");
                    tail.write(&head.readable()[..remaining]);
                    head.advance(remaining);
                } else if let Some(prefix) = head.split(remaining, &self.pool) {
                    self.segments.push_back(prefix);
                }

                source.len -= remaining;
                self.len += remaining;
                break;
            }

            let segment = source.segments.pop_front().expect("source length was checked above");
            let moved = segment.len();

            source.len -= moved;
            self.len += moved;
            remaining -= moved;

            self.push_compacting(segment);
        }
    }

    /// Moves all bytes from `source` to the end of this buffer.
    pub fn write_all_from(&mut self, source: &mut Self) {
        let len = source.len();
        self.write_from(source, len);
    }

    /// Copies bytes into `dst`, consuming them. Returns how many bytes were copied, which is
    /// less than `dst.len()` only if the buffer runs out of bytes.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.len);
        self.copy_prefix(&mut dst[..count]);
        self.advance(count);
        count
    }

    /// Fills `dst` completely, consuming the bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer than
    /// `dst.len()` bytes. Nothing is consumed in that case.
    pub fn read_exact_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.require(dst.len())?;
        self.read_into(dst);
        Ok(())
    }

    /// Consumes one byte.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer is empty.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.require(1)?;

        let byte = self.first_slice()[0];
        self.advance(1);
        Ok(byte)
    }

    /// Consumes `byte_count` bytes into a new vector.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer bytes.
    /// Nothing is consumed in that case.
    pub fn read_bytes(&mut self, byte_count: usize) -> Result<Vec<u8>> {
        self.require(byte_count)?;

        let mut bytes = vec![0; byte_count];
        self.read_into(&mut bytes);
        Ok(bytes)
    }

    /// Consumes all bytes into a new vector.
    #[must_use]
    pub fn read_to_vec(&mut self) -> Vec<u8> {
        let bytes = self.to_vec();
        self.clear();
        bytes
    }

    /// Consumes `byte_count` bytes into a new [`ByteString`].
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer bytes.
    pub fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
        self.read_bytes(byte_count).map(ByteString::from)
    }

    /// Moves up to `byte_count` bytes into `sink`.
    ///
    /// Returns `None` if this buffer is empty, otherwise the number of bytes moved. This is the
    /// same contract a raw source follows, which lets a buffer stand in for one.
    pub fn read_at_most_to(&mut self, sink: &mut Self, byte_count: usize) -> Option<usize> {
        if byte_count == 0 {
            return Some(0);
        }

        if self.is_empty() {
            return None;
        }

        let count = byte_count.min(self.len);
        sink.write_from(self, count);
        Some(count)
    }

    /// Moves exactly `byte_count` bytes into `sink`.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if this buffer holds fewer bytes.
    /// Nothing is moved in that case.
    pub fn read_at_least_to(&mut self, sink: &mut Self, byte_count: usize) -> Result<()> {
        self.require(byte_count)?;
        sink.write_from(self, byte_count);
        Ok(())
    }

    /// Discards `byte_count` bytes from the front of the buffer.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer bytes.
    /// Nothing is discarded in that case.
    pub fn skip(&mut self, byte_count: usize) -> Result<()> {
        self.require(byte_count)?;
        self.advance(byte_count);
        Ok(())
    }

    /// Discards all bytes, returning every segment to its pool.
    pub fn clear(&mut self) {
        for segment in self.segments.drain(..) {
            segment.release();
        }

        self.len = 0;
    }

    /// The byte at `index`, without consuming anything.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index >= self.len {
            return None;
        }

        let mut offset = index;

        for slice in self.slices() {
            if offset < slice.len() {
                return Some(slice[offset]);
            }

            offset -= slice.len();
        }

        None
    }

    /// Returns a view of the current content that can be consumed independently.
    ///
    /// The view shares memory with this buffer, so taking it is cheap regardless of length.
    /// Consuming or appending to either buffer does not affect the other.
    #[must_use]
    pub fn peek(&self) -> Self {
        self.clone()
    }

    /// Appends `byte_count` bytes starting at `offset` to `out`, without consuming them.
    ///
    /// Large runs of bytes are shared with `out` instead of being copied.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of the buffer.
    pub fn copy_to(&self, out: &mut Self, offset: usize, byte_count: usize) {
        assert!(
            offset.checked_add(byte_count).is_some_and(|end| end <= self.len),
            "range {offset}+{byte_count} is out of bounds for a buffer of {} bytes",
            self.len
        );

        let mut skip = offset;
        let mut remaining = byte_count;

        for segment in &self.segments {
            if remaining == 0 {
                break;
            }

            if skip >= segment.len() {
                skip -= segment.len();
                continue;
            }

            let count = remaining.min(segment.len() - skip);

            if count >= SHARE_MINIMUM {
                out.push_compacting(segment.share_window(skip, count));
                out.len += count;
            } else {
                out.write_slice(&segment.readable()[skip..skip + count]);
            }

            skip = 0;
            remaining -= count;
        }
    }

    /// Copies the content into a new vector without consuming it.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len);
        self.slices().for_each(|slice| bytes.extend_from_slice(slice));
        bytes
    }

    /// An immutable copy of the current content.
    #[must_use]
    pub fn snapshot(&self) -> ByteString {
        ByteString::from(self.to_vec())
    }

    /// Iterates over the readable content of each segment, front to back.
    ///
    /// The slices are never empty and together cover the whole buffer.
    pub fn slices(&self) -> BufferSlices<'_> {
        BufferSlices {
            inner: self.segments.iter(),
        }
    }

    /// The number of bytes that can be handed on without splitting a segment that is still
    /// being filled.
    ///
    /// This is every byte except those in a tail segment that can accept more bytes. Buffered
    /// sinks emit this many bytes so that partially filled segments stay behind to be topped up.
    #[must_use]
    pub fn complete_segment_byte_count(&self) -> usize {
        match self.segments.back() {
            Some(tail) if tail.writable_capacity() > 0 => self.len - tail.len(),
            _ => self.len,
        }
    }

    /// The readable bytes of the head segment, or an empty slice if the buffer is empty.
    pub(crate) fn first_slice(&self) -> &[u8] {
        self.segments.front().map_or(&[], Segment::readable)
    }

    /// Fails with `EndOfData` unless at least `byte_count` bytes are buffered.
    pub(crate) fn require(&self, byte_count: usize) -> Result<()> {
        if self.len >= byte_count {
            Ok(())
        } else {
            Err(Error::end_of_data(format!(
                "{byte_count} bytes required but only {} available",
                self.len
            )))
        }
    }

    /// Consumes `byte_count` bytes, releasing every segment that becomes empty.
    ///
    /// # Panics
    ///
    /// Panics if the buffer holds fewer than `byte_count` bytes.
    #[cfg_attr(test, mutants::skip)] // Mutating this can cause infinite loops.
    pub(crate) fn advance(&mut self, mut byte_count: usize) {
        assert!(byte_count <= self.len, "cannot consume more bytes than the buffer holds");

        self.len -= byte_count;

        while byte_count > 0 {
            let head = self.segments.front_mut().expect("length was checked above");
            let count = byte_count.min(head.len());

            head.advance(count);
            byte_count -= count;

            if head.is_empty() {
                self.release_head();
            }
        }
    }

    /// Copies the first `dst.len()` bytes into `dst` without consuming them.
    pub(crate) fn copy_prefix(&self, mut dst: &mut [u8]) {
        debug_assert!(dst.len() <= self.len);

        for slice in self.slices() {
            if dst.is_empty() {
                break;
            }

            let count = dst.len().min(slice.len());
            dst[..count].copy_from_slice(&slice[..count]);
            dst = &mut dst[count..];
        }
    }

    /// Lets `fill` write directly into the spare capacity at the end of the buffer and commits
    /// however many bytes it reports as written.
    ///
    /// `fill` is offered at least one byte of capacity and at most one segment. A new segment is
    /// acquired if needed and given back if `fill` writes nothing. This is how transports and
    /// codecs produce data into a buffer without an intermediate copy.
    ///
    /// ```
    /// use segbuf::Buffer;
    ///
    /// let mut buffer = Buffer::new();
    ///
    /// let written = buffer
    ///     .write_with(|spare| {
    ///         spare[..2].copy_from_slice(b"hi");
    ///         Ok::<_, std::io::Error>(2)
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(written, 2);
    /// assert_eq!(buffer.read_to_vec(), b"hi");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns whatever error `fill` returns. Nothing is committed in that case.
    ///
    /// # Panics
    ///
    /// Panics if `fill` reports more bytes than it was offered.
    pub fn write_with<E>(
        &mut self,
        fill: impl FnOnce(&mut [u8]) -> std::result::Result<usize, E>,
    ) -> std::result::Result<usize, E> {
        let tail = self.writable_tail(1);
        let result = fill(tail.unfilled_mut());

        let written = result.as_ref().map_or(0, |written| *written);
        tail.commit(written);
        let tail_is_empty = tail.is_empty();

        self.len += written;

        if tail_is_empty {
            self.release_tail();
        }

        result
    }

    /// The tail segment, guaranteed to accept at least `min_capacity` more bytes.
    ///
    /// A tail that is read-only because its memory is shared is replaced with a private copy when
    /// it holds only a few bytes. Otherwise a fresh segment is appended.
    pub(crate) fn writable_tail(&mut self, min_capacity: usize) -> &mut Segment {
        debug_assert!(min_capacity > 0 && min_capacity <= SEGMENT_SIZE);

        if let Some(tail) = self.segments.back_mut()
            && tail.writable_capacity() < min_capacity
            && (tail.is_shared() || !tail.is_owner())
            && tail.len() < SHARE_MINIMUM
            && tail.len() + min_capacity <= SEGMENT_SIZE
        {
            let copy = tail.unshared_copy(&self.pool);
            mem::replace(tail, copy).release();
        }

        if self.tail_capacity() < min_capacity {
            self.segments.push_back(self.pool.acquire());
        }

        self.segments.back_mut().expect("a writable tail segment was just ensured")
    }

    fn tail_capacity(&self) -> usize {
        self.segments.back().map_or(0, Segment::writable_capacity)
    }

    /// Appends a segment that was taken from elsewhere, merging it into the tail if it fits.
    ///
    /// Does not update `len`.
    fn push_compacting(&mut self, segment: Segment) {
        if segment.is_empty() {
            segment.release();
            return;
        }

        match self.segments.back_mut() {
            Some(tail) => {
                if let Some(segment) = segment.compact_into(tail) {
                    self.segments.push_back(segment);
                }
            }
            None => self.segments.push_back(segment),
        }
    }

    fn release_head(&mut self) {
        if let Some(segment) = self.segments.pop_front() {
            segment.release();
        }
    }

    fn release_tail(&mut self) {
        if let Some(segment) = self.segments.pop_back() {
            segment.release();
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Buffer {
    /// Creates a buffer with the same content, sharing all segments.
    fn clone(&self) -> Self {
        Self {
            segments: self.segments.iter().map(Segment::share).collect(),
            len: self.len,
            pool: self.pool.clone(),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("segments", &self.segments)
            .finish_non_exhaustive()
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buffer = Self::new();
        buffer.write_slice(bytes);
        buffer
    }
}

impl From<&str> for Buffer {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes())
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && bytes_equal(self.slices(), other.slices())
    }
}

impl Eq for Buffer {}

impl PartialEq<[u8]> for Buffer {
    fn eq(&self, other: &[u8]) -> bool {
        self.len == other.len() && bytes_equal(self.slices(), [other])
    }
}

impl PartialEq<&[u8]> for Buffer {
    fn eq(&self, other: &&[u8]) -> bool {
        *self == **other
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for Buffer {
    fn eq(&self, other: &&[u8; N]) -> bool {
        *self == other[..]
    }
}

/// Compares two chunked byte sequences of equal total length.
fn bytes_equal<'a, 'b>(
    left: impl IntoIterator<Item = &'a [u8]>,
    right: impl IntoIterator<Item = &'b [u8]>,
) -> bool {
    let mut left = left.into_iter();
    let mut right = right.into_iter();

    let mut a: &[u8] = &[];
    let mut b: &[u8] = &[];

    loop {
        if a.is_empty() {
            match left.next() {
                Some(next) => a = next,
                None => return b.is_empty() && right.all(<[u8]>::is_empty),
            }
        }

        if b.is_empty() {
            match right.next() {
                Some(next) => b = next,
                None => return a.is_empty() && left.all(<[u8]>::is_empty),
            }
        }

        let count = a.len().min(b.len());

        if a[..count] != b[..count] {
            return false;
        }

        a = &a[count..];
        b = &b[count..];
    }
}

/// Iterator over the readable segments of a [`Buffer`], returned by [`Buffer::slices()`].
#[derive(Debug)]
pub struct BufferSlices<'a> {
    inner: vec_deque::Iter<'a, Segment>,
}

impl<'a> Iterator for BufferSlices<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(Segment::readable)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for BufferSlices<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(Segment::readable)
    }
}

impl ExactSizeIterator for BufferSlices<'_> {}

impl FusedIterator for BufferSlices<'_> {}

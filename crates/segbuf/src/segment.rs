// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use crate::SegmentPool;
use crate::constants::SHARE_MINIMUM;

/// A node in a buffer's segment queue.
///
/// The segment references a fixed-capacity block of memory and exposes the window
/// `[pos, limit)` of it as readable data. Bytes in `[limit, capacity)` are spare capacity that
/// the owner may append into.
///
/// The block is reference-counted. Additional references are created by [`share()`] to give
/// another buffer a zero-copy view of the same bytes. While a block is shared it is immutable
/// for everyone - that is what makes sharing safe without any coordination between the
/// buffers involved. An owner that wants to append to shared memory must take a private copy
/// first via [`unshared_copy()`].
///
/// Type invariant: `pos <= limit <= data.len()`.
///
/// [`share()`]: Self::share
/// [`unshared_copy()`]: Self::unshared_copy
pub(crate) struct Segment {
    data: Arc<[u8]>,

    /// Index of the next readable byte.
    pos: usize,

    /// Index of the first byte that has not been written.
    limit: usize,

    /// Whether this node may append into the block and give it back to the pool. Nodes created
    /// via `share()` never own their block.
    owner: bool,

    /// The pool the block came from and returns to.
    pool: SegmentPool,
}

impl Segment {
    pub(crate) fn new(data: Arc<[u8]>, pool: SegmentPool) -> Self {
        Self {
            data,
            pos: 0,
            limit: 0,
            owner: true,
            pool,
        }
    }

    /// Number of readable bytes.
    pub(crate) fn len(&self) -> usize {
        self.limit - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.limit
    }

    pub(crate) fn is_owner(&self) -> bool {
        self.owner
    }

    /// Number of other segment nodes that reference the same block.
    pub(crate) fn share_count(&self) -> usize {
        Arc::strong_count(&self.data) - 1
    }

    pub(crate) fn is_shared(&self) -> bool {
        self.share_count() > 0
    }

    /// The readable bytes, `[pos, limit)`.
    pub(crate) fn readable(&self) -> &[u8] {
        &self.data[self.pos..self.limit]
    }

    /// How many bytes can be appended. Always zero for shared or non-owner segments.
    #[cfg_attr(test, mutants::skip)] // Lying about capacity is a great way to infinite loop.
    pub(crate) fn writable_capacity(&self) -> usize {
        if self.owner && !self.is_shared() {
            self.data.len() - self.limit
        } else {
            0
        }
    }

    /// The spare capacity as a mutable slice. Empty if the segment is not writable.
    ///
    /// Bytes written here become readable only after a matching [`commit()`][Self::commit].
    pub(crate) fn unfilled_mut(&mut self) -> &mut [u8] {
        if !self.owner {
            return &mut [];
        }

        let limit = self.limit;

        match Arc::get_mut(&mut self.data) {
            Some(data) => &mut data[limit..],
            None => &mut [],
        }
    }

    /// Marks `count` bytes at the start of the spare capacity as written.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the writable capacity.
    pub(crate) fn commit(&mut self, count: usize) {
        assert!(count <= self.writable_capacity(), "commit exceeds the writable capacity of the segment");
        self.limit += count;
    }

    /// Appends as many bytes from `bytes` as fit, returning how many were written.
    pub(crate) fn write_some(&mut self, bytes: &[u8]) -> usize {
        let unfilled = self.unfilled_mut();
        let count = unfilled.len().min(bytes.len());

        unfilled[..count].copy_from_slice(&bytes[..count]);
        self.limit += count;

        count
    }

    /// Appends all of `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if the segment is shared, not an owner or lacks the capacity.
    pub(crate) fn write(&mut self, bytes: &[u8]) {
        assert!(
            bytes.len() <= self.writable_capacity(),
            "segment write of {} bytes exceeds writable capacity of {}",
            bytes.len(),
            self.writable_capacity()
        );

        let written = self.write_some(bytes);
        debug_assert_eq!(written, bytes.len());
    }

    /// Marks `count` readable bytes as consumed.
    pub(crate) fn advance(&mut self, count: usize) {
        assert!(count <= self.len(), "cannot advance past the readable bytes of a segment");
        self.pos += count;
    }

    /// Creates a node that views the same bytes without owning them.
    pub(crate) fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            pos: self.pos,
            limit: self.limit,
            owner: false,
            pool: self.pool.clone(),
        }
    }

    /// Creates a non-owner view over `len` readable bytes starting `offset` bytes into this
    /// segment's readable window.
    pub(crate) fn share_window(&self, offset: usize, len: usize) -> Self {
        assert!(offset + len <= self.len(), "shared window must lie within the readable bytes");

        let mut view = self.share();
        view.pos = self.pos + offset;
        view.limit = view.pos + len;
        view
    }

    /// Copies the readable bytes into a fresh owner segment from `pool`.
    ///
    /// This is the copy-on-write step: the copy can be appended to, while this segment (and any
    /// other node sharing its block) keeps observing the original bytes.
    pub(crate) fn unshared_copy(&self, pool: &SegmentPool) -> Self {
        let mut copy = pool.acquire();
        copy.write(self.readable());
        copy
    }

    /// Splits off the first `byte_count` readable bytes into a new segment, leaving the rest
    /// in `self`.
    ///
    /// Large prefixes share this segment's block; small ones are copied into a segment from
    /// `pool` so that a few bytes do not pin a whole block. Returns `None` for a zero-length
    /// split, which leaves `self` untouched.
    ///
    /// # Panics
    ///
    /// Panics if `byte_count` exceeds the readable bytes.
    pub(crate) fn split(&mut self, byte_count: usize, pool: &SegmentPool) -> Option<Self> {
        assert!(byte_count <= self.len(), "cannot split beyond the readable bytes of a segment");

        if byte_count == 0 {
            return None;
        }

        let prefix = if byte_count >= SHARE_MINIMUM {
            self.share_window(0, byte_count)
        } else {
            let mut prefix = pool.acquire();
            prefix.write(&self.readable()[..byte_count]);
            prefix
        };

        self.pos += byte_count;
        Some(prefix)
    }

    /// Moves this segment's bytes into `prev` if they fit in its spare capacity.
    ///
    /// Returns `None` when the bytes were absorbed (and this segment released), otherwise gives
    /// the segment back unchanged.
    pub(crate) fn compact_into(self, prev: &mut Self) -> Option<Self> {
        if self.len() > prev.writable_capacity() {
            return Some(self);
        }

        prev.write(self.readable());
        self.release();
        None
    }

    /// Gives the block back to its pool.
    ///
    /// Only owner segments return their block. For views created by [`share()`][Self::share]
    /// this simply drops the reference.
    pub(crate) fn release(self) {
        let Self { data, owner, pool, .. } = self;

        if owner {
            pool.reclaim(data);
        }
    }

    #[cfg(test)]
    pub(crate) fn block_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("pos", &self.pos)
            .field("limit", &self.limit)
            .field("capacity", &self.data.len())
            .field("owner", &self.owner)
            .field("share_count", &self.share_count())
            .finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::SEGMENT_SIZE;

    #[test]
    fn write_and_advance() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();

        segment.write(b"hello world");
        assert_eq!(segment.len(), 11);
        assert_eq!(segment.writable_capacity(), SEGMENT_SIZE - 11);

        segment.advance(6);
        assert_eq!(segment.readable(), b"world");
        assert_eq!(segment.len(), 5);
    }

    #[test]
    fn write_some_stops_at_capacity() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();

        let written = segment.write_some(&vec![7; SEGMENT_SIZE + 10]);

        assert_eq!(written, SEGMENT_SIZE);
        assert_eq!(segment.writable_capacity(), 0);
    }

    #[test]
    #[should_panic]
    fn write_beyond_capacity_panics() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();

        segment.write(&vec![7; SEGMENT_SIZE + 1]);
    }

    #[test]
    fn shared_segment_is_read_only() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();
        segment.write(b"abc");

        let view = segment.share();

        assert_eq!(segment.share_count(), 1);
        assert_eq!(view.share_count(), 1);
        assert!(!view.is_owner());

        assert_eq!(segment.writable_capacity(), 0);
        assert_eq!(view.writable_capacity(), 0);
        assert!(segment.unfilled_mut().is_empty());

        drop(view);

        // Once the last view is gone, the owner may append again.
        assert_eq!(segment.share_count(), 0);
        assert_eq!(segment.writable_capacity(), SEGMENT_SIZE - 3);
    }

    #[test]
    #[should_panic]
    fn write_to_shared_segment_panics() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();
        segment.write(b"abc");

        let _view = segment.share();
        segment.write(b"d");
    }

    #[test]
    fn unshared_copy_is_independent() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();
        segment.write(b"0123456789");
        segment.advance(4);

        let view = segment.share();
        let mut copy = view.unshared_copy(&pool);

        assert!(copy.is_owner());
        assert_eq!(copy.share_count(), 0);
        assert_eq!(copy.readable(), b"456789");

        copy.write(b"abc");
        assert_eq!(copy.readable(), b"456789abc");
        assert_eq!(view.readable(), b"456789");
        assert_eq!(segment.readable(), b"456789");
    }

    #[test]
    fn split_small_prefix_copies() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();
        segment.write(b"hello world");

        let prefix = segment.split(5, &pool).unwrap();

        assert_eq!(prefix.readable(), b"hello");
        assert!(prefix.is_owner());
        assert_eq!(prefix.share_count(), 0);
        assert_eq!(segment.readable(), b" world");
    }

    #[test]
    fn split_large_prefix_shares() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();
        segment.write(&vec![1; SHARE_MINIMUM * 2]);

        let prefix = segment.split(SHARE_MINIMUM, &pool).unwrap();

        assert_eq!(prefix.len(), SHARE_MINIMUM);
        assert!(!prefix.is_owner());
        assert_eq!(segment.share_count(), 1);
        assert_eq!(segment.len(), SHARE_MINIMUM);
        assert_eq!(prefix.block_ptr(), segment.block_ptr());
    }

    #[test]
    fn split_degenerate_cases() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();
        segment.write(b"abc");

        assert!(segment.split(0, &pool).is_none());
        assert_eq!(segment.readable(), b"abc");

        let all = segment.split(3, &pool).unwrap();
        assert_eq!(all.readable(), b"abc");
        assert!(segment.is_empty());
    }

    #[test]
    fn compact_into_absorbs_small_segment() {
        let pool = SegmentPool::new();

        let mut prev = pool.acquire();
        prev.write(b"abc");

        let mut next = pool.acquire();
        next.write(b"def");

        assert!(next.compact_into(&mut prev).is_none());
        assert_eq!(prev.readable(), b"abcdef");
        assert_eq!(pool.stats().outstanding(), 1);
    }

    #[test]
    fn compact_into_rejects_when_full() {
        let pool = SegmentPool::new();

        let mut prev = pool.acquire();
        prev.write(&vec![0; SEGMENT_SIZE - 2]);

        let mut next = pool.acquire();
        next.write(b"def");

        let next = next.compact_into(&mut prev).unwrap();
        assert_eq!(next.readable(), b"def");
    }

    #[test]
    fn share_window_bounds() {
        let pool = SegmentPool::new();
        let mut segment = pool.acquire();
        segment.write(b"0123456789");
        segment.advance(2);

        let window = segment.share_window(3, 4);
        assert_eq!(window.readable(), b"5678");
    }
}

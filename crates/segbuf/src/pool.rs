// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use nm::{Event, Magnitude};

use crate::constants::{DEFAULT_MAX_FREE_SEGMENTS, ERR_POISONED_LOCK, SEGMENT_SIZE};
use crate::segment::Segment;

/// A bounded free list of segments that buffers draw their memory from.
///
/// Segments that have been fully consumed are returned to the pool they came from and handed out
/// again by later [`Buffer`][crate::Buffer] writes, so that steady-state workloads do not hit the
/// allocator. At most `max_free_segments` idle segments are retained; segments released beyond
/// that are dropped and their memory is returned to the global allocator.
///
/// Clones of a pool act as shared handles to the same free list.
///
/// # Example
///
/// ```
/// use segbuf::{Buffer, SegmentPool};
///
/// let pool = SegmentPool::builder().max_free_segments(8).build();
///
/// let mut buffer = Buffer::with_pool(pool.clone());
/// buffer.write_slice(b"hello");
/// assert_eq!(pool.stats().outstanding(), 1);
///
/// buffer.clear();
/// assert_eq!(pool.stats().outstanding(), 0);
/// assert_eq!(pool.stats().free, 1);
/// ```
#[derive(Clone, Debug)]
pub struct SegmentPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    // Idle blocks, reused in LIFO order because the most recently released block is the most
    // likely to still be in the CPU cache. Every block in here has a reference count of one.
    free: Mutex<Vec<Arc<[u8]>>>,

    max_free_segments: usize,

    acquired: AtomicUsize,
    released: AtomicUsize,
    recycled: AtomicUsize,
    discarded: AtomicUsize,
}

static GLOBAL_POOL: LazyLock<SegmentPool> = LazyLock::new(|| SegmentPool::builder().build());

impl SegmentPool {
    /// Starts building a new pool.
    #[must_use]
    pub fn builder() -> SegmentPoolBuilder {
        SegmentPoolBuilder {
            max_free_segments: DEFAULT_MAX_FREE_SEGMENTS,
        }
    }

    /// Creates a new pool with the default configuration.
    ///
    /// Each call creates an independent pool with its own free list. To share segments across
    /// the whole process, use [`global()`][Self::global] instead.
    #[must_use]
    #[expect(
        clippy::new_without_default,
        reason = "to avoid accidental confusion with the process-wide pool returned by global()"
    )]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// The process-wide pool, created on first use.
    ///
    /// This is the pool used by [`Buffer::new()`][crate::Buffer::new].
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_POOL
    }

    /// The maximum number of idle segments this pool retains.
    #[must_use]
    pub fn max_free_segments(&self) -> usize {
        self.inner.max_free_segments
    }

    /// Returns a snapshot of the pool's accounting counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let free = self.inner.free.lock().expect(ERR_POISONED_LOCK).len();

        PoolStats {
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            recycled: self.inner.recycled.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
            free,
        }
    }

    /// Hands out an empty, exclusively owned segment with full write capacity.
    ///
    /// The contents of a recycled segment are not cleared - callers never read before writing.
    pub(crate) fn acquire(&self) -> Segment {
        let recycled = self.inner.free.lock().expect(ERR_POISONED_LOCK).pop();

        let block = recycled.unwrap_or_else(|| {
            SEGMENT_ALLOCATED.with(|e| e.observe(SEGMENT_SIZE));
            Arc::from(vec![0_u8; SEGMENT_SIZE])
        });

        self.inner.acquired.fetch_add(1, Ordering::Relaxed);

        Segment::new(block, self.clone())
    }

    /// Takes back the block of an owner segment.
    ///
    /// The block is only retained if nothing else references it and there is room in the free
    /// list. Otherwise it is left to be reclaimed once its last reference is dropped.
    pub(crate) fn reclaim(&self, block: Arc<[u8]>) {
        self.inner.released.fetch_add(1, Ordering::Relaxed);

        if Arc::strong_count(&block) != 1 || block.len() != SEGMENT_SIZE {
            self.discard();
            return;
        }

        let mut free = self.inner.free.lock().expect(ERR_POISONED_LOCK);

        if free.len() >= self.inner.max_free_segments {
            drop(free);
            self.discard();
            return;
        }

        free.push(block);
        FREE_LIST_LENGTH.with(|e| e.observe(free.len()));
        drop(free);

        self.inner.recycled.fetch_add(1, Ordering::Relaxed);
    }

    fn discard(&self) {
        self.inner.discarded.fetch_add(1, Ordering::Relaxed);
        SEGMENT_DISCARDED.with(|e| e.observe(SEGMENT_SIZE));
    }

    /// Whether two handles refer to the same pool.
    #[must_use]
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Builds a [`SegmentPool`] with custom configuration.
#[derive(Debug)]
pub struct SegmentPoolBuilder {
    max_free_segments: usize,
}

impl SegmentPoolBuilder {
    /// Sets how many idle segments the pool retains for reuse.
    ///
    /// Defaults to [`DEFAULT_MAX_FREE_SEGMENTS`]. Zero disables recycling entirely.
    #[must_use]
    pub fn max_free_segments(mut self, value: usize) -> Self {
        self.max_free_segments = value;
        self
    }

    /// Builds the pool.
    #[must_use]
    pub fn build(self) -> SegmentPool {
        SegmentPool {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(self.max_free_segments)),
                max_free_segments: self.max_free_segments,
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                recycled: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
            }),
        }
    }
}

/// Accounting counters of a [`SegmentPool`].
///
/// Only segments that own their memory are counted. Shared views of a segment (created when a
/// buffer is cloned or peeked) do not come from the pool and are not counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Segments handed out by the pool, whether newly allocated or reused.
    pub acquired: usize,

    /// Segments given back to the pool after their owner was done with them.
    pub released: usize,

    /// Released segments that were put on the free list for reuse.
    pub recycled: usize,

    /// Released segments that were not retained, either because their memory was still shared
    /// or because the free list was full.
    pub discarded: usize,

    /// Idle segments currently on the free list.
    pub free: usize,
}

impl PoolStats {
    /// Segments handed out that have not been given back yet.
    ///
    /// In a leak-free program this equals the number of owner segments reachable from live
    /// buffers.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.acquired.saturating_sub(self.released)
    }
}

const FREE_LIST_BUCKETS: &[Magnitude] = &[0, 1, 2, 4, 8, 16, 32, 64, 128];

thread_local! {
    static SEGMENT_ALLOCATED: Event = Event::builder()
        .name("segbuf_pool_segment_allocated")
        .build();

    static SEGMENT_DISCARDED: Event = Event::builder()
        .name("segbuf_pool_segment_discarded")
        .build();

    static FREE_LIST_LENGTH: Event = Event::builder()
        .name("segbuf_pool_free_list_length")
        .histogram(FREE_LIST_BUCKETS)
        .build();
}

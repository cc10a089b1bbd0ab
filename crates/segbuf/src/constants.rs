// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Capacity of every segment in bytes.
///
/// All segments have the same capacity, which allows any segment to be reused for any buffer.
pub const SEGMENT_SIZE: usize = 8192;

/// Default upper bound on the number of idle segments a [`SegmentPool`][crate::SegmentPool]
/// retains for reuse.
pub const DEFAULT_MAX_FREE_SEGMENTS: usize = 64;

/// Prefixes shorter than this are copied when a segment is split, longer ones share memory.
///
/// Sharing tiny slices of a segment would pin a whole segment worth of memory for a handful of
/// bytes, so below this threshold copying is the cheaper option.
pub(crate) const SHARE_MINIMUM: usize = 1024;

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because segment accounting can no longer be trusted";

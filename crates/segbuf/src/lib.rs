// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Segmented byte buffers built from pooled fixed-size memory segments.
//!
//! A [`Buffer`] is a mutable, logically contiguous sequence of bytes stored as a queue of
//! fixed-capacity segments. Bytes are appended at the tail and consumed from the head, so a
//! buffer behaves like a FIFO pipe of bytes:
//!
//! ```
//! use segbuf::Buffer;
//!
//! let mut buffer = Buffer::new();
//!
//! buffer.write_utf8("hello ");
//! buffer.write_num_be(0x1234_u16);
//! buffer.write_slice(b" world");
//!
//! assert_eq!(buffer.read_utf8(6).unwrap(), "hello ");
//! assert_eq!(buffer.read_num_be::<u16>().unwrap(), 0x1234);
//! assert_eq!(buffer.read_to_vec(), b" world");
//! ```
//!
//! # Segments and pooling
//!
//! Each segment holds up to [`SEGMENT_SIZE`] bytes. Segments are obtained from a
//! [`SegmentPool`] and are returned to it once their content has been fully consumed, so a
//! steady-state workload does not allocate. Buffers created via [`Buffer::new()`] use the
//! process-wide pool from [`SegmentPool::global()`]; use [`Buffer::with_pool()`] to supply
//! your own pool instance.
//!
//! # Zero-copy sharing
//!
//! Moving bytes between buffers via [`Buffer::write_from()`] relinks whole segments instead of
//! copying their contents whenever possible. Cloning a buffer (or calling [`Buffer::peek()`])
//! shares the underlying memory between both buffers. Shared memory is never mutated: when a
//! buffer needs to append to a segment whose memory is shared, it first takes a private copy.
//!
//! ```
//! use segbuf::Buffer;
//!
//! let mut original = Buffer::new();
//! original.write_utf8("snapshot");
//!
//! let mut copy = original.clone();
//! original.write_utf8(" and more");
//!
//! assert_eq!(copy.read_utf8_to_end().unwrap(), "snapshot");
//! assert_eq!(original.read_utf8_to_end().unwrap(), "snapshot and more");
//! ```
//!
//! # Scanning and decoding
//!
//! All search and decode operations work across segment boundaries without first copying
//! the data into contiguous memory:
//!
//! * [`Buffer::index_of()`], [`Buffer::index_of_bytes()`] and [`Buffer::index_of_element()`]
//!   locate bytes and byte sequences.
//! * [`Buffer::select()`] matches the buffer prefix against a set of [`Options`].
//! * [`Buffer::read_utf8()`], [`Buffer::read_utf8_code_point()`] and [`Buffer::read_line()`]
//!   decode UTF-8 text, reporting malformed input as an [`Error`] of kind
//!   [`ErrorKind::MalformedData`].
//! * [`Buffer::sha256()`] and friends stream the content through a message digest.
//!
//! # Errors
//!
//! Reads that need more bytes than the buffer holds fail with [`ErrorKind::EndOfData`] and
//! consume nothing. Arguments that are out of range for the call (for example an offset past
//! the end of the buffer) are programming errors and panic.

mod buffer;
mod buffer_num;
mod buffer_search;
mod byte_string;
mod constants;
mod error;
mod hash;
mod io_adapter;
mod line;
mod options;
mod pool;
mod segment;
mod utf8;

pub use buffer::{Buffer, BufferSlices};
pub use byte_string::ByteString;
pub use constants::{DEFAULT_MAX_FREE_SEGMENTS, SEGMENT_SIZE};
pub use error::{Error, ErrorKind, Result};
pub use line::{Line, LineTerminator};
pub use options::{Options, Selection};
pub use pool::{PoolStats, SegmentPool, SegmentPoolBuilder};
pub use utf8::utf8_sequence_width;

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Streaming byte sources and sinks driven through [`segbuf::Buffer`].
//!
//! Transports implement the minimal [`RawSource`] and [`RawSink`] contract: a source appends
//! whatever bytes it has to a buffer, a sink removes bytes from a buffer. Everything else is
//! layered on top:
//!
//! * [`BufferedSource`] and [`BufferedSink`] keep a [`Buffer`] between the caller and the
//!   transport and offer typed reads and writes (numbers, UTF-8 text, lines, prefix selection).
//! * [`HashingSource`] and [`HashingSink`] compute a message digest of the bytes passing
//!   through.
//! * [`TransformSource`] and [`TransformSink`] run the bytes through a [`Transform`] such as
//!   [`Deflate`] and [`Inflate`].
//! * [`IoSource`] and [`IoSink`] adapt any [`std::io::Read`] or [`std::io::Write`] (files,
//!   sockets, standard streams) to the contract.
//! * [`AsyncRawSource`], [`AsyncRawSink`], [`AsyncBufferedSource`] and [`AsyncBufferedSink`]
//!   are the asynchronous counterparts, with [`Blocking`] lifting a synchronous transport.
//!
//! ```
//! use segbuf::Buffer;
//! use segbuf_io::{BufferedSink, BufferedSource};
//!
//! // A `Buffer` is itself both a raw source and a raw sink.
//! let mut sink = BufferedSink::new(Buffer::new());
//! sink.write_utf8("hello world").unwrap();
//! sink.write_num_be(42_u32).unwrap();
//! let transport = sink.into_inner().unwrap();
//!
//! let mut source = BufferedSource::new(transport);
//! assert_eq!(source.read_utf8(11).unwrap(), "hello world");
//! assert_eq!(source.read_num_be::<u32>().unwrap(), 42);
//! assert!(source.exhausted().unwrap());
//! ```
//!
//! # Errors
//!
//! All buffered operations report failures as [`segbuf::Error`]. Errors raised by a transport
//! are wrapped with the kind [`ErrorKind::Transport`] and attached as the cause, unless the
//! transport is itself a layer of this crate, whose errors keep their kind. Operations on a
//! closed source or sink fail with [`ErrorKind::Closed`].
//!
//! The `zstd` feature adds Zstandard codecs. The `test-util` feature enables fake transports
//! for testing code that consumes or produces streams of bytes. These are in the `testing`
//! module.

mod async_raw;
mod async_source;
mod async_sink;
mod blocking;
mod flate;
mod hashing;
mod io_transport;
mod peek;
mod raw;
mod sink;
mod source;
mod transform;
#[cfg(feature = "zstd")]
mod zstd_codec;

pub use async_raw::{AsyncRawSink, AsyncRawSource};
pub use async_sink::AsyncBufferedSink;
pub use async_source::{AsyncBufferedSource, StreamingDecoder};
pub use blocking::Blocking;
pub use flate::{Compression, Deflate, Inflate};
pub use hashing::{HashingSink, HashingSource};
pub use io_transport::{IoSink, IoSource};
pub use peek::PeekSource;
use raw::from_transport;
pub use raw::{RawSink, RawSource};
#[doc(inline)]
pub use segbuf::{Buffer, Error, ErrorKind, Result};
pub use sink::{BufferedSink, BufferedSinkBuilder, DEFAULT_EMIT_THRESHOLD};
pub use source::{BufferedSource, BufferedSourceBuilder, DEFAULT_FILL_SIZE};
pub use transform::{Transform, TransformSink, TransformSource};
#[cfg(feature = "zstd")]
pub use zstd_codec::{ZstdCompress, ZstdDecompress};

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

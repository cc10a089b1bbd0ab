// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::convert::Infallible;
use std::fmt::Debug;

use segbuf::{Buffer, Error};

/// A transport that produces bytes.
///
/// This is the minimal contract a byte producer (a file, a socket, a decompressor, ...) has to
/// fulfill. Wrap it in a [`BufferedSource`][crate::BufferedSource] to get typed reads.
///
/// # Ownership
///
/// The buffer passed to [`read_at_most_to()`][Self::read_at_most_to] is only borrowed for the
/// duration of the call. Implementations must not keep references to its segments.
pub trait RawSource: Debug {
    /// Type used to signal errors by the implementation of this trait.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Appends at most `byte_count` bytes to the end of `sink`.
    ///
    /// Returns the number of bytes appended, or `None` if the source is exhausted. Once a source
    /// has returned `None` it keeps doing so. `Some(0)` is only returned if `byte_count` is 0.
    /// Bytes already in `sink` are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if the transport fails.
    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, Self::Error>;

    /// Releases the resources held by the source.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if releasing the resources fails.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// A transport that consumes bytes.
///
/// Wrap it in a [`BufferedSink`][crate::BufferedSink] to get typed writes.
pub trait RawSink: Debug {
    /// Type used to signal errors by the implementation of this trait.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Removes exactly `byte_count` bytes from the front of `source` and writes them.
    ///
    /// Callers guarantee that `source` holds at least `byte_count` bytes.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if the transport fails. How many bytes were removed
    /// from `source` in that case is up to the implementation.
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), Self::Error>;

    /// Pushes any bytes held by the transport itself to their final destination.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if the transport fails.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Flushes and releases the resources held by the sink.
    ///
    /// Bytes held by the transport itself must reach their final destination before the
    /// resources are released, exactly as if [`flush()`][Self::flush] had been called first.
    /// [`BufferedSink`][crate::BufferedSink] flushes before closing, but other callers may not.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if flushing or releasing the resources fails.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Converts an error raised by a transport into an [`Error`] of kind
/// [`Transport`][segbuf::ErrorKind::Transport].
///
/// Transports that are themselves built from buffered layers (decorators, peek sources) raise
/// [`Error`]s already. Those pass through unchanged so that their kind is preserved.
pub(crate) fn from_transport(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
    match error.into().downcast::<Error>() {
        Ok(error) => *error,
        Err(other) => Error::transport(other),
    }
}

/// An in-memory buffer is a source of the bytes it holds.
impl RawSource for Buffer {
    type Error = Infallible;

    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, Infallible> {
        Ok(Self::read_at_most_to(self, sink, byte_count))
    }

    fn close(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// An in-memory buffer is a sink that accumulates everything written to it.
impl RawSink for Buffer {
    type Error = Infallible;

    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), Infallible> {
        self.write_from(source, byte_count);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

impl<T: RawSource + ?Sized> RawSource for &mut T {
    type Error = T::Error;

    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, Self::Error> {
        (**self).read_at_most_to(sink, byte_count)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        (**self).close()
    }
}

impl<T: RawSink + ?Sized> RawSink for &mut T {
    type Error = T::Error;

    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), Self::Error> {
        (**self).write(source, byte_count)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        (**self).close()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_as_source_honors_contract() {
        let mut source = Buffer::from("abc");
        let mut sink = Buffer::new();

        assert_eq!(RawSource::read_at_most_to(&mut source, &mut sink, 0).unwrap(), Some(0));
        assert_eq!(RawSource::read_at_most_to(&mut source, &mut sink, 2).unwrap(), Some(2));
        assert_eq!(RawSource::read_at_most_to(&mut source, &mut sink, 10).unwrap(), Some(1));
        assert_eq!(RawSource::read_at_most_to(&mut source, &mut sink, 10).unwrap(), None);
        assert_eq!(RawSource::read_at_most_to(&mut source, &mut sink, 10).unwrap(), None);

        assert_eq!(sink, b"abc");
    }

    #[test]
    fn buffer_as_sink_moves_exact_count() {
        let mut source = Buffer::from("hello world");
        let mut sink = Buffer::new();

        RawSink::write(&mut sink, &mut source, 5).unwrap();

        assert_eq!(sink, b"hello");
        assert_eq!(source, b" world");
    }

    #[test]
    fn transport_errors_keep_own_kind() {
        let wrapped = from_transport(std::io::Error::other("disk on fire"));
        assert_eq!(wrapped.kind(), segbuf::ErrorKind::Transport);

        let passed = from_transport(Error::malformed("bad checksum"));
        assert_eq!(passed.kind(), segbuf::ErrorKind::MalformedData);
    }

    #[test]
    fn mutable_reference_forwards() {
        let mut inner = Buffer::from("xy");
        let mut by_ref = &mut inner;
        let mut sink = Buffer::new();

        assert_eq!(RawSource::read_at_most_to(&mut by_ref, &mut sink, 1).unwrap(), Some(1));
        RawSink::close(&mut by_ref).unwrap();

        assert_eq!(inner, b"y");
    }
}

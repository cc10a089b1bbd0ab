// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;
use std::num::NonZero;

use segbuf::Buffer;

use crate::{AsyncRawSource, RawSource};

/// A [`RawSource`] and [`AsyncRawSource`] that produces bytes from memory.
///
/// Reads can be limited to a maximum size to force callers through many small reads, and a
/// failure can be injected after a number of bytes. Closes are counted.
///
/// This is for test and example purposes only and is not optimized for performance.
#[derive(Debug)]
pub struct FakeSource {
    contents: Buffer,

    // For testing purposes, we may choose to limit the read size and
    // thereby force the caller to do multiple read operations.
    max_read_size: Option<NonZero<usize>>,

    // Reads fail once this many bytes have been delivered.
    fail_after: Option<usize>,

    delivered: usize,
    read_count: usize,
    close_count: usize,
}

impl FakeSource {
    /// Starts building a new `FakeSource`.
    #[must_use]
    pub fn builder() -> FakeSourceBuilder {
        FakeSourceBuilder {
            contents: Buffer::new(),
            max_read_size: None,
            fail_after: None,
        }
    }

    /// Creates a new `FakeSource` with the given contents and the default configuration.
    #[must_use]
    pub fn new(contents: &[u8]) -> Self {
        Self::builder().contents(contents).build()
    }

    /// Appends at most `byte_count` bytes to `sink`.
    ///
    /// Returns `None` once all the contents have been delivered.
    ///
    /// # Errors
    ///
    /// Fails if a failure was injected via the builder and the configured number of bytes has
    /// been delivered.
    #[cfg_attr(test, mutants::skip)] // Mutations easily lead to infinite loops, not worth the effort.
    pub fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, io::Error> {
        self.read_count += 1;

        let mut limit = byte_count.min(self.max_read_size.map_or(usize::MAX, NonZero::get));

        if let Some(fail_after) = self.fail_after {
            if self.delivered >= fail_after {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "injected read failure"));
            }

            limit = limit.min(fail_after - self.delivered);
        }

        if byte_count == 0 {
            return Ok(Some(0));
        }

        let count = self.contents.read_at_most_to(sink, limit);

        if let Some(count) = count {
            self.delivered += count;
        }

        Ok(count)
    }

    /// Discards the remaining contents. Counted by [`close_count()`][Self::close_count].
    ///
    /// # Errors
    ///
    /// This call never fails.
    pub fn close(&mut self) -> Result<(), io::Error> {
        self.close_count += 1;
        self.contents.clear();
        Ok(())
    }

    /// How many bytes have been delivered so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// How many read calls have been made so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// How many times the source has been closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count
    }
}

impl RawSource for FakeSource {
    type Error = io::Error;

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, io::Error> {
        self.read_at_most_to(sink, byte_count)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn close(&mut self) -> Result<(), io::Error> {
        self.close()
    }
}

impl AsyncRawSource for FakeSource {
    type Error = io::Error;

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, io::Error> {
        self.read_at_most_to(sink, byte_count)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn close(&mut self) -> Result<(), io::Error> {
        self.close()
    }
}

/// Creates an instance of [`FakeSource`].
///
/// Access through [`FakeSource::builder()`][FakeSource::builder].
#[derive(Debug)]
pub struct FakeSourceBuilder {
    contents: Buffer,
    max_read_size: Option<NonZero<usize>>,
    fail_after: Option<usize>,
}

impl FakeSourceBuilder {
    /// Appends to the data to return from read operations.
    ///
    /// Optional. Defaults to no data.
    #[must_use]
    pub fn contents(mut self, contents: &[u8]) -> Self {
        self.contents.write_slice(contents);
        self
    }

    /// The maximum number of bytes to return in a single read operation.
    ///
    /// Optional. Defaults to no limit beyond what the caller asks for.
    ///
    /// # Panics
    ///
    /// Panics if `max_read_size` is 0.
    #[must_use]
    pub fn max_read_size(mut self, max_read_size: usize) -> Self {
        self.max_read_size = Some(NonZero::new(max_read_size).expect("the maximum read size must be at least one byte"));
        self
    }

    /// Fails every read once `byte_count` bytes have been delivered.
    ///
    /// Optional. Defaults to never failing.
    #[must_use]
    pub fn fail_after(mut self, byte_count: usize) -> Self {
        self.fail_after = Some(byte_count);
        self
    }

    /// Builds the `FakeSource` with the provided configuration.
    #[must_use]
    pub fn build(self) -> FakeSource {
        FakeSource {
            contents: self.contents,
            max_read_size: self.max_read_size,
            fail_after: self.fail_after,
            delivered: 0,
            read_count: 0,
            close_count: 0,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use testing_aids::async_test;

    use super::*;

    #[test]
    fn respects_limits() {
        let mut source = FakeSource::builder().contents(b"Hello, ").contents(b"world!").max_read_size(5).build();
        let mut sink = Buffer::new();

        assert_eq!(source.read_at_most_to(&mut sink, 100).unwrap(), Some(5));
        assert_eq!(source.read_at_most_to(&mut sink, 3).unwrap(), Some(3));
        assert_eq!(source.read_at_most_to(&mut sink, 0).unwrap(), Some(0));
        assert_eq!(source.read_at_most_to(&mut sink, 100).unwrap(), Some(5));
        assert_eq!(source.read_at_most_to(&mut sink, 100).unwrap(), None);

        assert_eq!(sink, b"Hello, world!");
        assert_eq!(source.delivered(), 13);
        assert_eq!(source.read_count(), 5);
    }

    #[test]
    fn injected_failure() {
        let mut source = FakeSource::builder().contents(b"abcdef").fail_after(4).build();
        let mut sink = Buffer::new();

        assert_eq!(source.read_at_most_to(&mut sink, 100).unwrap(), Some(4));

        let error = source.read_at_most_to(&mut sink, 100).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(sink, b"abcd");
    }

    #[test]
    fn close_is_counted() {
        let mut source = FakeSource::new(b"abc");

        source.close().unwrap();
        source.close().unwrap();

        assert_eq!(source.close_count(), 2);
        assert_eq!(source.read_at_most_to(&mut Buffer::new(), 10).unwrap(), None);
    }

    #[test]
    fn async_read() {
        async_test(async || {
            let mut source = FakeSource::new(b"xyz");
            let mut sink = Buffer::new();

            let count = AsyncRawSource::read_at_most_to(&mut source, &mut sink, 2).await.unwrap();

            assert_eq!(count, Some(2));
            assert_eq!(sink, b"xy");
        });
    }
}

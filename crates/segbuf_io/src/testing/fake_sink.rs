// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;

use segbuf::Buffer;

use crate::{AsyncRawSink, RawSink};

/// A [`RawSink`] and [`AsyncRawSink`] that collects written bytes in memory.
///
/// Writes, flushes and closes are counted, and failures can be injected.
///
/// This is for test and example purposes only and is not optimized for performance.
#[derive(Debug, Default)]
pub struct FakeSink {
    contents: Buffer,

    fail_writes: bool,
    fail_close: bool,

    write_count: usize,
    flush_count: usize,
    close_count: usize,
}

impl FakeSink {
    /// Starts building a new `FakeSink`.
    #[must_use]
    pub fn builder() -> FakeSinkBuilder {
        FakeSinkBuilder {
            fail_writes: false,
            fail_close: false,
        }
    }

    /// Creates a new `FakeSink` with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Moves `byte_count` bytes from the front of `source` into the collected contents.
    ///
    /// # Errors
    ///
    /// Fails without touching `source` if write failures were injected via the builder.
    ///
    /// # Panics
    ///
    /// Panics if `source` holds fewer than `byte_count` bytes.
    pub fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), io::Error> {
        self.write_count += 1;

        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected write failure"));
        }

        self.contents.write_from(source, byte_count);
        Ok(())
    }

    /// Counted by [`flush_count()`][Self::flush_count].
    ///
    /// # Errors
    ///
    /// This call never fails.
    pub fn flush(&mut self) -> Result<(), io::Error> {
        self.flush_count += 1;
        Ok(())
    }

    /// Counted by [`close_count()`][Self::close_count].
    ///
    /// # Errors
    ///
    /// Fails if close failures were injected via the builder.
    pub fn close(&mut self) -> Result<(), io::Error> {
        self.close_count += 1;

        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected close failure"));
        }

        Ok(())
    }

    /// The bytes written so far.
    #[must_use]
    pub fn contents(&self) -> &Buffer {
        &self.contents
    }

    /// Takes the bytes written so far, leaving the sink empty.
    pub fn take_contents(&mut self) -> Buffer {
        let pool = self.contents.pool().clone();
        std::mem::replace(&mut self.contents, Buffer::with_pool(pool))
    }

    /// How many write calls have been made so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// How many times the sink has been flushed.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    /// How many times the sink has been closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count
    }
}

impl RawSink for FakeSink {
    type Error = io::Error;

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), io::Error> {
        self.write(source, byte_count)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn flush(&mut self) -> Result<(), io::Error> {
        self.flush()
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn close(&mut self) -> Result<(), io::Error> {
        self.close()
    }
}

impl AsyncRawSink for FakeSink {
    type Error = io::Error;

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), io::Error> {
        self.write(source, byte_count)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn flush(&mut self) -> Result<(), io::Error> {
        self.flush()
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn close(&mut self) -> Result<(), io::Error> {
        self.close()
    }
}

/// Creates an instance of [`FakeSink`].
///
/// Access through [`FakeSink::builder()`][FakeSink::builder].
#[derive(Debug)]
pub struct FakeSinkBuilder {
    fail_writes: bool,
    fail_close: bool,
}

impl FakeSinkBuilder {
    /// Makes every write fail.
    ///
    /// Optional. Defaults to writes succeeding.
    #[must_use]
    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Makes every close fail. The close is still counted.
    ///
    /// Optional. Defaults to closes succeeding.
    #[must_use]
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Builds the `FakeSink` with the provided configuration.
    #[must_use]
    pub fn build(self) -> FakeSink {
        FakeSink {
            contents: Buffer::new(),
            fail_writes: self.fail_writes,
            fail_close: self.fail_close,
            write_count: 0,
            flush_count: 0,
            close_count: 0,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_and_counts() {
        let mut sink = FakeSink::new();
        let mut source = Buffer::from("hello world");

        sink.write(&mut source, 5).unwrap();
        sink.flush().unwrap();
        sink.close().unwrap();

        assert_eq!(sink.contents(), &b"hello");
        assert_eq!(source, b" world");
        assert_eq!(
            (sink.write_count(), sink.flush_count(), sink.close_count()),
            (1, 1, 1)
        );

        assert_eq!(sink.take_contents(), b"hello");
        assert!(sink.contents().is_empty());
    }

    #[test]
    fn injected_failures_leave_source_alone() {
        let mut sink = FakeSink::builder().fail_writes().fail_close().build();
        let mut source = Buffer::from("abc");

        assert_eq!(sink.write(&mut source, 3).unwrap_err().kind(), io::ErrorKind::BrokenPipe);
        assert!(sink.close().is_err());

        assert_eq!(source, b"abc");
        assert_eq!(sink.close_count(), 1);
    }
}

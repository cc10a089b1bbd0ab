// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use segbuf::Buffer;

use crate::{RawSink, RawSource};

/// Adapts an [`io::Read`] (a file, a socket, standard input) to a [`RawSource`].
///
/// Bytes are read directly into the spare capacity of the destination buffer, one segment at
/// a time. Interrupted reads are retried.
///
/// ```
/// use segbuf_io::{BufferedSource, IoSource};
///
/// let mut source = BufferedSource::new(IoSource::new(&b"line one\nline two"[..]));
///
/// assert_eq!(source.read_utf8_line().unwrap().as_deref(), Some("line one"));
/// assert_eq!(source.read_utf8_line().unwrap().as_deref(), Some("line two"));
/// assert_eq!(source.read_utf8_line().unwrap(), None);
/// ```
#[derive(Debug)]
pub struct IoSource<R> {
    inner: R,
    exhausted: bool,
}

impl<R: Read> IoSource<R> {
    /// Reads from `inner`.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self { inner, exhausted: false }
    }

    /// The wrapped reader.
    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwraps the reader.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl IoSource<File> {
    /// Opens the file at `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the operating system if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        File::open(path).map(Self::new)
    }
}

impl<R: Read + std::fmt::Debug> RawSource for IoSource<R> {
    type Error = io::Error;

    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> io::Result<Option<usize>> {
        if self.exhausted {
            return Ok(None);
        }

        if byte_count == 0 {
            return Ok(Some(0));
        }

        match sink.write_from_reader(&mut self.inner, byte_count)? {
            0 => {
                self.exhausted = true;
                Ok(None)
            }
            count => Ok(Some(count)),
        }
    }

    #[cfg_attr(test, mutants::skip)] // This does nothing, pointless to mutate.
    fn close(&mut self) -> io::Result<()> {
        self.exhausted = true;
        Ok(())
    }
}

/// Adapts an [`io::Write`] (a file, a socket, standard output) to a [`RawSink`].
///
/// Segments are handed to the writer as vectored writes, without an intermediate copy.
/// Closing flushes the writer; the underlying handle is released when the sink is dropped.
///
/// ```
/// use segbuf_io::{BufferedSink, IoSink};
///
/// let mut sink = BufferedSink::new(IoSink::new(Vec::new()));
/// sink.write_utf8("written through").unwrap();
///
/// let vec = sink.into_inner().unwrap().into_inner();
/// assert_eq!(vec, b"written through");
/// ```
#[derive(Debug)]
pub struct IoSink<W> {
    inner: W,
}

impl<W: Write> IoSink<W> {
    /// Writes to `inner`.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// The wrapped writer.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwraps the writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl IoSink<File> {
    /// Creates the file at `path`, truncating it if it exists.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the operating system if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        File::create(path).map(Self::new)
    }

    /// Opens the file at `path` for appending, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the operating system if the file cannot be opened.
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        OpenOptions::new().append(true).create(true).open(path).map(Self::new)
    }
}

impl<W: Write + std::fmt::Debug> RawSink for IoSink<W> {
    type Error = io::Error;

    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> io::Result<()> {
        source.read_to_writer(&mut self.inner, byte_count)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

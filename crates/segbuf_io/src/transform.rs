// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use segbuf::{Buffer, Error, Result, SEGMENT_SIZE};
use tracing::{Level, event};

use crate::{RawSink, RawSource, from_transport};

/// A streaming byte-to-byte conversion, such as a compressor or a decompressor.
///
/// Drivers ([`TransformSink`] and [`TransformSource`]) hand the transform one slice of input at
/// a time and collect what it produces. Once all input has been handed over, they call
/// [`finish()`][Self::finish] until it reports that the transform is done.
pub trait Transform: Debug {
    /// Converts a prefix of `input`, appending the result to `output`.
    ///
    /// Returns how many bytes of `input` were consumed and how many bytes were appended. A call
    /// with non-empty `input` must consume or produce at least one byte.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the input cannot be
    /// converted.
    fn transform(&mut self, input: &[u8], output: &mut Buffer) -> Result<(usize, usize)>;

    /// Produces the output that remains once there is no more input.
    ///
    /// Returns how many bytes were appended to `output` and whether the transform is done. Called
    /// repeatedly until it reports being done.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][segbuf::ErrorKind::MalformedData] if the input ended at a
    /// point where it cannot end.
    fn finish(&mut self, output: &mut Buffer) -> Result<(usize, bool)>;
}

fn stalled() -> Error {
    Error::malformed("the transform made no progress")
}

/// A sink that converts bytes with a [`Transform`] before writing them to another sink.
///
/// The transform is finished when the sink is closed, so close it to write out the end of the
/// converted stream.
///
/// ```
/// use segbuf::Buffer;
/// use segbuf_io::{BufferedSink, BufferedSource, Compression, Deflate, Inflate, TransformSink, TransformSource};
///
/// let mut sink = BufferedSink::new(TransformSink::new(Buffer::new(), Deflate::zlib(Compression::default())));
/// sink.write_utf8("hello hello hello hello").unwrap();
/// sink.close().unwrap();
///
/// let compressed = sink.get_ref().get_ref().clone();
///
/// let mut source = BufferedSource::new(TransformSource::new(compressed, Inflate::zlib()));
/// assert_eq!(source.read_utf8_to_end().unwrap(), "hello hello hello hello");
/// ```
#[derive(Debug)]
pub struct TransformSink<W: RawSink, T: Transform> {
    inner: W,
    transform: T,
    output: Buffer,
    closed: bool,
}

impl<W: RawSink, T: Transform> TransformSink<W, T> {
    /// Converts bytes with `transform` and writes the result to `inner`.
    #[must_use]
    pub fn new(inner: W, transform: T) -> Self {
        Self {
            inner,
            transform,
            output: Buffer::new(),
            closed: false,
        }
    }

    /// The wrapped sink.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwraps the sink. Output of an unfinished transform is lost.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_output(&mut self) -> Result<()> {
        let len = self.output.len();

        if len > 0 {
            self.inner.write(&mut self.output, len).map_err(from_transport)?;
        }

        Ok(())
    }

    fn finish_transform(&mut self) -> Result<()> {
        loop {
            let (produced, done) = self.transform.finish(&mut self.output)?;

            if done {
                break;
            }

            if produced == 0 {
                return Err(stalled());
            }

            if self.output.len() >= SEGMENT_SIZE {
                self.write_output()?;
            }
        }

        self.write_output()
    }
}

impl<W: RawSink, T: Transform> RawSink for TransformSink<W, T> {
    type Error = Error;

    #[cfg_attr(test, mutants::skip)] // Mutations easily lead to infinite loops, not worth the effort.
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        if self.closed {
            return Err(Error::closed("the sink has been closed"));
        }

        if byte_count > source.len() {
            return Err(Error::end_of_data(format!(
                "{byte_count} bytes to write but the source holds {}",
                source.len()
            )));
        }

        let mut remaining = byte_count;

        // Input leaves `source` as soon as the transform takes it.
        while remaining > 0 {
            let Some(slice) = source.slices().next() else {
                break;
            };

            let input = &slice[..remaining.min(slice.len())];
            let (consumed, produced) = self.transform.transform(input, &mut self.output)?;

            if consumed == 0 && produced == 0 {
                return Err(stalled());
            }

            source.skip(consumed)?;
            remaining -= consumed;
        }

        self.write_output()
    }

    fn flush(&mut self) -> Result<()> {
        self.write_output()?;
        self.inner.flush().map_err(from_transport)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;

        let finished = self.finish_transform();
        self.output.clear();

        let closed = self.inner.close().map_err(from_transport);

        match (finished, closed) {
            (Err(first), Err(second)) => {
                event!(
                    Level::WARN,
                    message = "failed to close transport after failing to finish transform",
                    error = %second
                );
                Err(first)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

/// A source that reads bytes from another source and converts them with a [`Transform`].
///
/// The transform is finished once the wrapped source is exhausted.
#[derive(Debug)]
pub struct TransformSource<R: RawSource, T: Transform> {
    inner: R,
    transform: T,

    // Bytes read from `inner` and not yet handed to the transform.
    input: Buffer,
    input_exhausted: bool,

    // Bytes produced by the transform and not yet handed out.
    output: Buffer,
    finished: bool,
}

impl<R: RawSource, T: Transform> TransformSource<R, T> {
    /// Reads bytes from `inner` and converts them with `transform`.
    #[must_use]
    pub fn new(inner: R, transform: T) -> Self {
        Self {
            inner,
            transform,
            input: Buffer::new(),
            input_exhausted: false,
            output: Buffer::new(),
            finished: false,
        }
    }

    /// The wrapped source.
    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwraps the source. Bytes read ahead from it are lost.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Makes one step of progress: reads input, converts some or finishes the transform.
    fn step(&mut self) -> Result<()> {
        if self.input.is_empty() && !self.input_exhausted {
            let read = self
                .inner
                .read_at_most_to(&mut self.input, SEGMENT_SIZE)
                .map_err(from_transport)?;

            if read.is_none() {
                self.input_exhausted = true;
            }

            return Ok(());
        }

        if let Some(input) = self.input.slices().next() {
            let (consumed, produced) = self.transform.transform(input, &mut self.output)?;

            if consumed == 0 && produced == 0 {
                return Err(stalled());
            }

            return self.input.skip(consumed);
        }

        let (produced, done) = self.transform.finish(&mut self.output)?;

        if done {
            self.finished = true;
        } else if produced == 0 {
            return Err(stalled());
        }

        Ok(())
    }
}

impl<R: RawSource, T: Transform> RawSource for TransformSource<R, T> {
    type Error = Error;

    #[cfg_attr(test, mutants::skip)] // Mutations easily lead to infinite loops, not worth the effort.
    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        if byte_count == 0 {
            return Ok(Some(0));
        }

        loop {
            if !self.output.is_empty() {
                let count = byte_count.min(self.output.len());
                sink.write_from(&mut self.output, count);
                return Ok(Some(count));
            }

            if self.finished {
                return Ok(None);
            }

            self.step()?;
        }
    }

    fn close(&mut self) -> Result<()> {
        self.input.clear();
        self.output.clear();
        self.inner.close().map_err(from_transport)
    }
}

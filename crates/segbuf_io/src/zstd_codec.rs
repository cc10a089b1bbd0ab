// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Zstandard compression.

use std::fmt;

use segbuf::{Buffer, Error, Result};
use zstd::stream::raw::{Decoder, Encoder, Operation, OutBuffer};

use crate::Transform;

/// Compresses with Zstandard, producing a single frame.
pub struct ZstdCompress {
    inner: Encoder<'static>,
    level: i32,
}

impl ZstdCompress {
    /// Compresses at `level`. 0 selects the library default, negative levels favor speed.
    ///
    /// # Errors
    ///
    /// Fails if the compression context cannot be created, for example because `level` is out
    /// of range.
    pub fn new(level: i32) -> Result<Self> {
        Ok(Self {
            inner: Encoder::new(level).map_err(Error::malformed)?,
            level,
        })
    }
}

impl Transform for ZstdCompress {
    fn transform(&mut self, input: &[u8], output: &mut Buffer) -> Result<(usize, usize)> {
        let inner = &mut self.inner;
        let mut consumed = 0;

        let produced = output.write_with(|out| {
            let status = inner.run_on_buffers(input, out).map_err(Error::malformed)?;
            consumed = status.bytes_read;
            Ok::<_, Error>(status.bytes_written)
        })?;

        Ok((consumed, produced))
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<(usize, bool)> {
        let inner = &mut self.inner;
        let mut remaining = 0;

        let produced = output.write_with(|out| {
            let mut out = OutBuffer::around(out);
            remaining = inner.finish(&mut out, true).map_err(Error::malformed)?;
            Ok::<_, Error>(out.pos())
        })?;

        Ok((produced, remaining == 0))
    }
}

impl fmt::Debug for ZstdCompress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZstdCompress").field("level", &self.level).finish_non_exhaustive()
    }
}

/// Decompresses Zstandard. Concatenated frames decode to the concatenation of their content.
///
/// Input that is not Zstandard and a frame that ends early are both
/// [`MalformedData`][segbuf::ErrorKind::MalformedData].
pub struct ZstdDecompress {
    inner: Decoder<'static>,
    // No frame is partially decoded.
    at_frame_boundary: bool,
}

impl ZstdDecompress {
    /// Creates a decompression context.
    ///
    /// # Errors
    ///
    /// Fails if the decompression context cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: Decoder::new().map_err(Error::malformed)?,
            at_frame_boundary: true,
        })
    }

    fn run(&mut self, input: &[u8], output: &mut Buffer) -> Result<(usize, usize)> {
        let inner = &mut self.inner;
        let mut consumed = 0;
        let mut remaining = 0;

        let produced = output.write_with(|out| {
            let status = inner.run_on_buffers(input, out).map_err(Error::malformed)?;
            consumed = status.bytes_read;
            remaining = status.remaining;
            Ok::<_, Error>(status.bytes_written)
        })?;

        if consumed > 0 || produced > 0 {
            self.at_frame_boundary = remaining == 0;
        }

        Ok((consumed, produced))
    }
}

impl Transform for ZstdDecompress {
    fn transform(&mut self, input: &[u8], output: &mut Buffer) -> Result<(usize, usize)> {
        self.run(input, output)
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<(usize, bool)> {
        let (_, produced) = self.run(&[], output)?;

        if produced > 0 {
            Ok((produced, false))
        } else if self.at_frame_boundary {
            Ok((0, true))
        } else {
            Err(Error::malformed("the compressed stream is truncated"))
        }
    }
}

impl fmt::Debug for ZstdDecompress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZstdDecompress")
            .field("at_frame_boundary", &self.at_frame_boundary)
            .finish_non_exhaustive()
    }
}

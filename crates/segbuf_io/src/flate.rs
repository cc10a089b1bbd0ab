// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! DEFLATE compression, raw or with the zlib header and checksum.

pub use flate2::Compression;
use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};
use segbuf::{Buffer, Error, Result};

use crate::Transform;

/// The number of bytes a single codec call moved, from the codec's running totals.
fn delta(after: u64, before: u64) -> Result<usize> {
    usize::try_from(after - before).map_err(Error::malformed)
}

/// Compresses with DEFLATE.
///
/// Use with [`TransformSink`][crate::TransformSink] to compress what is written, or with
/// [`TransformSource`][crate::TransformSource] to compress what is read.
#[derive(Debug)]
pub struct Deflate {
    inner: Compress,
}

impl Deflate {
    /// A raw DEFLATE stream, without header or checksum.
    #[must_use]
    pub fn raw(level: Compression) -> Self {
        Self {
            inner: Compress::new(level, false),
        }
    }

    /// A zlib stream: DEFLATE with a header and an Adler-32 checksum.
    #[must_use]
    pub fn zlib(level: Compression) -> Self {
        Self {
            inner: Compress::new(level, true),
        }
    }

    fn run(&mut self, input: &[u8], output: &mut Buffer, flush: FlushCompress) -> Result<(usize, usize, Status)> {
        let inner = &mut self.inner;
        let mut consumed = 0;
        let mut status = Status::Ok;

        let produced = output.write_with(|out| {
            let before_in = inner.total_in();
            let before_out = inner.total_out();

            status = inner.compress(input, out, flush).map_err(Error::malformed)?;
            consumed = delta(inner.total_in(), before_in)?;

            delta(inner.total_out(), before_out)
        })?;

        Ok((consumed, produced, status))
    }
}

impl Transform for Deflate {
    fn transform(&mut self, input: &[u8], output: &mut Buffer) -> Result<(usize, usize)> {
        let (consumed, produced, _) = self.run(input, output, FlushCompress::None)?;
        Ok((consumed, produced))
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<(usize, bool)> {
        let (_, produced, status) = self.run(&[], output, FlushCompress::Finish)?;
        Ok((produced, status == Status::StreamEnd))
    }
}

/// Decompresses DEFLATE.
///
/// Data after the end of the compressed stream and a stream that ends early are both
/// [`MalformedData`][segbuf::ErrorKind::MalformedData].
#[derive(Debug)]
pub struct Inflate {
    inner: Decompress,
    ended: bool,
}

impl Inflate {
    /// A raw DEFLATE stream, without header or checksum.
    #[must_use]
    pub fn raw() -> Self {
        Self {
            inner: Decompress::new(false),
            ended: false,
        }
    }

    /// A zlib stream. The checksum is verified.
    #[must_use]
    pub fn zlib() -> Self {
        Self {
            inner: Decompress::new(true),
            ended: false,
        }
    }

    fn run(&mut self, input: &[u8], output: &mut Buffer, flush: FlushDecompress) -> Result<(usize, usize)> {
        let inner = &mut self.inner;
        let mut consumed = 0;
        let mut status = Status::Ok;

        let produced = output.write_with(|out| {
            let before_in = inner.total_in();
            let before_out = inner.total_out();

            status = inner.decompress(input, out, flush).map_err(Error::malformed)?;
            consumed = delta(inner.total_in(), before_in)?;

            delta(inner.total_out(), before_out)
        })?;

        if status == Status::StreamEnd {
            self.ended = true;
        }

        Ok((consumed, produced))
    }
}

impl Transform for Inflate {
    fn transform(&mut self, input: &[u8], output: &mut Buffer) -> Result<(usize, usize)> {
        if self.ended {
            return Err(Error::malformed(format!(
                "{} bytes of trailing data after the end of the compressed stream",
                input.len()
            )));
        }

        self.run(input, output, FlushDecompress::None)
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<(usize, bool)> {
        if self.ended {
            return Ok((0, true));
        }

        let (_, produced) = self.run(&[], output, FlushDecompress::Finish)?;

        if self.ended {
            Ok((produced, true))
        } else if produced == 0 {
            Err(Error::malformed("the compressed stream is truncated"))
        } else {
            Ok((produced, false))
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io::Write;

    use segbuf::SEGMENT_SIZE;
    use testing_aids::pattern_bytes;

    use super::*;
    use crate::testing::FakeSource;
    use crate::{BufferedSink, BufferedSource, RawSink, TransformSink, TransformSource};

    fn compress(data: &[u8], deflate: Deflate) -> Buffer {
        let mut sink = BufferedSink::new(TransformSink::new(Buffer::new(), deflate));
        sink.write_slice(data).unwrap();
        sink.close().unwrap();
        sink.get_ref().get_ref().clone()
    }

    fn decompress(compressed: &[u8], inflate: Inflate) -> Result<Vec<u8>> {
        let fake = FakeSource::builder().contents(compressed).max_read_size(100).build();
        BufferedSource::new(TransformSource::new(fake, inflate)).read_to_vec()
    }

    #[test]
    fn codec_counter_deltas() {
        assert_eq!(delta(10, 4).unwrap(), 6);
        assert_eq!(delta(7, 7).unwrap(), 0);
    }

    #[test]
    fn zlib_round_trip() {
        let data = pattern_bytes(SEGMENT_SIZE * 5 + 3);

        let compressed = compress(&data, Deflate::zlib(Compression::default()));
        assert!(compressed.len() < data.len());

        assert_eq!(decompress(&compressed.to_vec(), Inflate::zlib()).unwrap(), data);
    }

    #[test]
    fn raw_round_trip() {
        let data = b"a raw deflate stream has neither header nor checksum".repeat(50);

        let compressed = compress(&data, Deflate::raw(Compression::best()));

        assert_eq!(decompress(&compressed.to_vec(), Inflate::raw()).unwrap(), data);
    }

    #[test]
    fn empty_input_round_trip() {
        let compressed = compress(b"", Deflate::zlib(Compression::fast()));

        assert!(!compressed.is_empty());
        assert!(decompress(&compressed.to_vec(), Inflate::zlib()).unwrap().is_empty());
    }

    #[test]
    fn interoperates_with_flate2_streams() {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"produced elsewhere").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decompress(&compressed, Inflate::zlib()).unwrap(), b"produced elsewhere");
    }

    #[test]
    fn corrupt_stream_is_malformed() {
        let mut compressed = compress(b"some text to corrupt", Deflate::zlib(Compression::default())).to_vec();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;

        assert!(decompress(&compressed, Inflate::zlib()).unwrap_err().is_malformed());
        assert!(decompress(b"definitely not zlib", Inflate::zlib()).unwrap_err().is_malformed());
    }

    #[test]
    fn truncated_stream_is_malformed() {
        let compressed = compress(&pattern_bytes(10_000), Deflate::zlib(Compression::default())).to_vec();

        let error = decompress(&compressed[..compressed.len() / 2], Inflate::zlib()).unwrap_err();
        assert!(error.is_malformed());
    }

    #[test]
    fn trailing_data_is_malformed() {
        let mut compressed = compress(b"payload", Deflate::zlib(Compression::default())).to_vec();
        compressed.extend_from_slice(b"junk");

        let error = decompress(&compressed, Inflate::zlib()).unwrap_err();
        assert!(error.is_malformed());
    }

    #[test]
    fn decompressing_sink() {
        let data = pattern_bytes(3000);
        let mut compressed = compress(&data, Deflate::raw(Compression::default()));

        let mut sink = TransformSink::new(Buffer::new(), Inflate::raw());
        let len = compressed.len();
        sink.write(&mut compressed, len).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.get_ref().to_vec(), data);
    }
}

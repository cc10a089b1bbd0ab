// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::{self, BufRead, IoSlice, Read, Write};

use smallvec::SmallVec;

use crate::Buffer;

/// Vectored writes pass at most this many segments to the writer per call.
const MAX_VECTORED_SLICES: usize = 8;

impl Buffer {
    /// Reads at most `max_bytes` bytes from `reader` into the end of the buffer.
    ///
    /// At most one segment worth of bytes is requested from the reader per call. Returns the
    /// number of bytes appended, which is 0 if `max_bytes` is 0 or if the reader reached its end.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the reader. Interrupted reads are retried.
    pub fn write_from_reader(&mut self, reader: &mut impl Read, max_bytes: usize) -> io::Result<usize> {
        if max_bytes == 0 {
            return Ok(0);
        }

        self.write_with(|spare| {
            let limit = spare.len().min(max_bytes);

            loop {
                match reader.read(&mut spare[..limit]) {
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    result => return result,
                }
            }
        })
    }

    /// Writes the first `byte_count` bytes to `writer`, consuming them as the writer accepts them.
    ///
    /// Segments are handed to the writer as a vectored write, so no intermediate copy is made.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the writer, or [`io::ErrorKind::WriteZero`] if the writer
    /// stops accepting bytes. Bytes accepted before the failure are consumed, the rest stay in
    /// the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer holds fewer than `byte_count` bytes.
    pub fn read_to_writer(&mut self, writer: &mut impl Write, byte_count: usize) -> io::Result<()> {
        assert!(
            byte_count <= self.len(),
            "cannot write {byte_count} bytes from a buffer of {} bytes",
            self.len()
        );

        let mut remaining = byte_count;

        while remaining > 0 {
            let result = {
                let slices = self.io_slices(remaining);
                writer.write_vectored(&slices)
            };

            match result {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(written) => {
                    self.advance(written);
                    remaining -= written;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// The readable segments covering the first `max_bytes` bytes, as vectored I/O slices.
    fn io_slices(&self, max_bytes: usize) -> SmallVec<[IoSlice<'_>; MAX_VECTORED_SLICES]> {
        let mut remaining = max_bytes;

        self.slices()
            .take(MAX_VECTORED_SLICES)
            .map_while(|slice| {
                if remaining == 0 {
                    return None;
                }

                let count = slice.len().min(remaining);
                remaining -= count;
                Some(IoSlice::new(&slice[..count]))
            })
            .collect()
    }
}

impl Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf))
    }
}

/// A buffer already holds its bytes in memory, so there is no need to wrap it in a
/// [`std::io::BufReader`].
impl BufRead for Buffer {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.first_slice())
    }

    fn consume(&mut self, amount: usize) {
        self.advance(amount);
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! UTF-8 encoding and decoding over the segments of a buffer.

use std::{mem, str};

use crate::{Buffer, Error, Result};

/// Longest encoded form of a code point.
const MAX_SEQUENCE_LEN: usize = 4;

/// The number of bytes in the UTF-8 sequence that starts with `lead`.
///
/// Returns `None` for bytes that can never start a well-formed sequence: continuation bytes,
/// the overlong leads `0xC0` and `0xC1`, and leads of sequences beyond U+10FFFF.
///
/// ```
/// use segbuf::utf8_sequence_width;
///
/// assert_eq!(utf8_sequence_width(b'a'), Some(1));
/// assert_eq!(utf8_sequence_width(0xE2), Some(3));
/// assert_eq!(utf8_sequence_width(0x80), None);
/// ```
#[must_use]
pub fn utf8_sequence_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// Decodes a byte sequence that arrives in arbitrary chunks.
///
/// Each chunk is validated in place. A sequence cut off at the end of a chunk is held back
/// until the next chunk completes it.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: [u8; MAX_SEQUENCE_LEN],
    pending_len: usize,

    /// Replace malformed sequences with U+FFFD instead of failing.
    lossy: bool,
}

impl Utf8Decoder {
    pub(crate) fn strict() -> Self {
        Self::default()
    }

    pub(crate) fn lossy() -> Self {
        Self {
            lossy: true,
            ..Self::default()
        }
    }

    pub(crate) fn push(&mut self, mut bytes: &[u8], out: &mut String) -> Result<()> {
        if self.pending_len > 0 {
            bytes = self.complete_pending(bytes, out)?;
        }

        while !bytes.is_empty() {
            match str::from_utf8(bytes) {
                Ok(text) => {
                    out.push_str(text);
                    return Ok(());
                }
                Err(e) => {
                    let (valid, rest) = bytes.split_at(e.valid_up_to());
                    push_validated(out, valid);

                    match e.error_len() {
                        None => {
                            // The chunk ends in the middle of a sequence.
                            self.pending[..rest.len()].copy_from_slice(rest);
                            self.pending_len = rest.len();
                            return Ok(());
                        }
                        Some(invalid) => {
                            self.malformed(out, &rest[..invalid])?;
                            bytes = &rest[invalid..];
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Signals that no more bytes follow.
    pub(crate) fn finish(&mut self, out: &mut String) -> Result<()> {
        let pending_len = mem::take(&mut self.pending_len);

        if pending_len == 0 {
            return Ok(());
        }

        self.malformed(out, &self.pending[..pending_len])
    }

    /// Feeds bytes into a sequence held back from the previous chunk and returns what is left of
    /// `bytes` afterwards.
    fn complete_pending<'a>(&mut self, bytes: &'a [u8], out: &mut String) -> Result<&'a [u8]> {
        let mut candidate = self.pending;
        let take = (MAX_SEQUENCE_LEN - self.pending_len).min(bytes.len());
        candidate[self.pending_len..self.pending_len + take].copy_from_slice(&bytes[..take]);

        let candidate_len = self.pending_len + take;
        let held = self.pending_len;

        match str::from_utf8(&candidate[..candidate_len]) {
            Ok(text) => {
                out.push_str(text);
                self.pending_len = 0;
                Ok(&bytes[take..])
            }
            Err(e) if e.valid_up_to() > 0 => {
                // The first sequence completed, something else follows it.
                let completed = e.valid_up_to();
                push_validated(out, &candidate[..completed]);
                self.pending_len = 0;
                Ok(&bytes[completed - held..])
            }
            Err(e) => match e.error_len() {
                None => {
                    // Still incomplete, so all of `bytes` was absorbed.
                    self.pending = candidate;
                    self.pending_len = candidate_len;
                    Ok(&[])
                }
                Some(invalid) => {
                    self.pending_len = 0;
                    self.malformed(out, &candidate[..invalid])?;
                    Ok(&bytes[invalid.saturating_sub(held)..])
                }
            },
        }
    }

    fn malformed(&self, out: &mut String, sequence: &[u8]) -> Result<()> {
        if self.lossy {
            out.push(char::REPLACEMENT_CHARACTER);
            Ok(())
        } else {
            Err(Error::malformed(format!("malformed UTF-8 sequence {sequence:02x?}")))
        }
    }
}

fn push_validated(out: &mut String, bytes: &[u8]) {
    // The caller has already validated these bytes, so this cannot fail.
    if let Ok(text) = str::from_utf8(bytes) {
        out.push_str(text);
    }
}

impl Buffer {
    /// Appends the UTF-8 encoding of `text`.
    pub fn write_utf8(&mut self, text: &str) {
        self.write_slice(text.as_bytes());
    }

    /// Appends the UTF-8 encoding of a single code point.
    pub fn write_utf8_code_point(&mut self, code_point: char) {
        let mut encoded = [0; MAX_SEQUENCE_LEN];
        self.write_slice(code_point.encode_utf8(&mut encoded).as_bytes());
    }

    /// Consumes `byte_count` bytes and decodes them as UTF-8.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer bytes and
    /// with [`MalformedData`][crate::ErrorKind::MalformedData] if the bytes are not well-formed
    /// UTF-8, including when `byte_count` ends in the middle of a sequence. Nothing is consumed
    /// on failure.
    pub fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
        self.require(byte_count)?;

        let text = self.decode_prefix(byte_count, Utf8Decoder::strict())?;
        self.advance(byte_count);
        Ok(text)
    }

    /// Consumes all bytes and decodes them as UTF-8.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][crate::ErrorKind::MalformedData] if the content is not
    /// well-formed UTF-8, in which case nothing is consumed.
    pub fn read_utf8_to_end(&mut self) -> Result<String> {
        self.read_utf8(self.len())
    }

    /// Consumes `byte_count` bytes and decodes them as UTF-8, replacing each malformed sequence
    /// with U+FFFD.
    ///
    /// ```
    /// use segbuf::Buffer;
    ///
    /// let mut buffer = Buffer::from(&b"a\xC0\x80b"[..]);
    ///
    /// assert_eq!(buffer.read_utf8_lossy(4).unwrap(), "a\u{FFFD}\u{FFFD}b");
    /// ```
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer bytes.
    pub fn read_utf8_lossy(&mut self, byte_count: usize) -> Result<String> {
        self.require(byte_count)?;

        let text = self.decode_prefix(byte_count, Utf8Decoder::lossy())?;
        self.advance(byte_count);
        Ok(text)
    }

    /// Consumes one UTF-8 encoded code point.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer is empty or ends
    /// before the sequence started by its first byte does, and with
    /// [`MalformedData`][crate::ErrorKind::MalformedData] if the sequence is not well-formed.
    /// Nothing is consumed on failure.
    pub fn read_utf8_code_point(&mut self) -> Result<char> {
        let lead = self.get(0).ok_or_else(|| Error::end_of_data("buffer is empty"))?;

        let width = utf8_sequence_width(lead)
            .ok_or_else(|| Error::malformed(format!("{lead:#04x} cannot start a UTF-8 sequence")))?;

        self.require(width)?;

        let mut encoded = [0; MAX_SEQUENCE_LEN];
        self.copy_prefix(&mut encoded[..width]);

        let code_point = str::from_utf8(&encoded[..width])
            .ok()
            .and_then(|text| text.chars().next())
            .ok_or_else(|| Error::malformed(format!("malformed UTF-8 sequence {:02x?}", &encoded[..width])))?;

        self.advance(width);
        Ok(code_point)
    }

    /// Decodes the first `byte_count` bytes without consuming them.
    pub(crate) fn decode_prefix(&self, byte_count: usize, mut decoder: Utf8Decoder) -> Result<String> {
        debug_assert!(byte_count <= self.len());

        let mut text = String::with_capacity(byte_count);
        let mut remaining = byte_count;

        for slice in self.slices() {
            if remaining == 0 {
                break;
            }

            let count = remaining.min(slice.len());
            decoder.push(&slice[..count], &mut text)?;
            remaining -= count;
        }

        decoder.finish(&mut text)?;
        Ok(text)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, SEGMENT_SIZE, SegmentPool};

    /// A buffer holding `bytes`, of which the first `before_boundary` are at the end of one
    /// segment and the rest in the next.
    fn straddling(pool: &SegmentPool, before_boundary: usize, bytes: &[u8]) -> Buffer {
        let mut buffer = Buffer::with_pool(pool.clone());
        buffer.write_slice(&vec![b'-'; SEGMENT_SIZE - before_boundary]);
        buffer.write_slice(bytes);
        buffer.skip(SEGMENT_SIZE - before_boundary).unwrap();
        buffer
    }

    #[test]
    fn sequence_widths() {
        assert_eq!(utf8_sequence_width(0x00), Some(1));
        assert_eq!(utf8_sequence_width(0x7F), Some(1));
        assert_eq!(utf8_sequence_width(0x80), None);
        assert_eq!(utf8_sequence_width(0xBF), None);
        assert_eq!(utf8_sequence_width(0xC0), None);
        assert_eq!(utf8_sequence_width(0xC1), None);
        assert_eq!(utf8_sequence_width(0xC2), Some(2));
        assert_eq!(utf8_sequence_width(0xE0), Some(3));
        assert_eq!(utf8_sequence_width(0xF4), Some(4));
        assert_eq!(utf8_sequence_width(0xF5), None);
        assert_eq!(utf8_sequence_width(0xFF), None);
    }

    #[test]
    fn round_trip_multilingual() {
        let text = "ascii, ünïcödé, 日本語, 🦀🦀";
        let mut buffer = Buffer::new();
        buffer.write_utf8(text);

        assert_eq!(buffer.read_utf8_to_end().unwrap(), text);
    }

    #[test]
    fn sequences_straddling_segments() {
        let pool = SegmentPool::new();
        let text = "€🦀";

        for split in 0..=text.len() {
            let mut buffer = straddling(&pool, split, text.as_bytes());
            assert_eq!(buffer.read_utf8(text.len()).unwrap(), text, "split at {split}");
        }
    }

    #[test]
    fn code_points_straddling_segments() {
        let pool = SegmentPool::new();

        for split in 0..4 {
            let mut buffer = straddling(&pool, split, "🦀x".as_bytes());
            assert_eq!(buffer.read_utf8_code_point().unwrap(), '🦀');
            assert_eq!(buffer.read_utf8_code_point().unwrap(), 'x');
        }
    }

    #[test]
    fn overlong_nul_is_malformed() {
        let mut buffer = Buffer::from(&[0xC0_u8, 0x80][..]);

        assert_eq!(buffer.read_utf8(2).unwrap_err().kind(), ErrorKind::MalformedData);
        assert_eq!(buffer.read_utf8_code_point().unwrap_err().kind(), ErrorKind::MalformedData);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn malformed_inputs() {
        let cases: &[&[u8]] = &[
            // Overlong three byte encoding of '/'.
            &[0xE0, 0x80, 0xAF],
            // Surrogate half.
            &[0xED, 0xA0, 0x80],
            // Beyond U+10FFFF.
            &[0xF4, 0x90, 0x80, 0x80],
            // Bad continuation.
            &[0xE2, 0x28, 0xA1],
            // Lone continuation.
            &[0x80],
        ];

        for case in cases {
            let mut buffer = Buffer::from(*case);
            assert!(buffer.read_utf8(case.len()).unwrap_err().is_malformed(), "{case:02x?}");
            assert!(buffer.read_utf8_code_point().unwrap_err().is_malformed(), "{case:02x?}");
        }
    }

    #[test]
    fn truncated_sequence() {
        let mut buffer = Buffer::from(&[b'a', 0xE2, 0x82][..]);

        // Cutting the sequence short is malformed for a fixed-length read.
        assert!(buffer.read_utf8(3).unwrap_err().is_malformed());

        buffer.skip(1).unwrap();
        // For a code point read, more bytes could still complete it.
        assert!(buffer.read_utf8_code_point().unwrap_err().is_end_of_data());
    }

    #[test]
    fn malformed_straddling_segments() {
        let pool = SegmentPool::new();

        let mut buffer = straddling(&pool, 1, &[0xE2, 0x28, 0xA1]);
        assert!(buffer.read_utf8(3).unwrap_err().is_malformed());

        let mut buffer = straddling(&pool, 2, &[0xE2, 0x82]);
        assert!(buffer.read_utf8(2).unwrap_err().is_malformed());
    }

    #[test]
    fn lossy_replaces_each_maximal_subpart() {
        let mut buffer = Buffer::from(&b"a\xE2\x82b\xFFc\xF0\x9F\xA6"[..]);
        let len = buffer.len();

        assert_eq!(buffer.read_utf8_lossy(len).unwrap(), "a\u{FFFD}b\u{FFFD}c\u{FFFD}");
    }

    #[test]
    fn lossy_matches_std_across_segments() {
        let pool = SegmentPool::new();
        let bytes = b"x\xF0\x9F\xA6\x80\xE2\x82y\xC3\xA9\xED\xA0\x80z";

        for split in 0..bytes.len() {
            let mut buffer = straddling(&pool, split, bytes);
            assert_eq!(
                buffer.read_utf8_lossy(bytes.len()).unwrap(),
                String::from_utf8_lossy(bytes),
                "split at {split}"
            );
        }
    }

    #[test]
    fn write_code_points() {
        let mut buffer = Buffer::new();

        for c in ['a', 'é', '€', '🦀'] {
            buffer.write_utf8_code_point(c);
        }

        assert_eq!(buffer.read_utf8_to_end().unwrap(), "aé€🦀");
    }

    #[test]
    fn empty_reads() {
        let mut buffer = Buffer::new();

        assert_eq!(buffer.read_utf8(0).unwrap(), "");
        assert!(buffer.read_utf8(1).unwrap_err().is_end_of_data());
        assert!(buffer.read_utf8_code_point().unwrap_err().is_end_of_data());
    }
}

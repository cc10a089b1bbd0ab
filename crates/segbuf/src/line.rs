// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use crate::utf8::Utf8Decoder;
use crate::{Buffer, Error, Result};

/// How a [`Line`] was terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineTerminator {
    /// `\n`
    Lf,

    /// `\r\n`
    CrLf,

    /// A lone `\r` at the very end of the input.
    Cr,

    /// The input ended without any terminator.
    EndOfInput,
}

impl LineTerminator {
    /// The number of bytes the terminator occupies.
    #[must_use]
    pub fn len(self) -> usize {
        match self {
            Self::Lf | Self::Cr => 1,
            Self::CrLf => 2,
            Self::EndOfInput => 0,
        }
    }

    /// Whether the terminator occupies no bytes.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::EndOfInput
    }
}

/// A line of UTF-8 text read from a buffer, without its terminator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Line {
    text: String,
    terminator: LineTerminator,
}

impl Line {
    /// The text of the line, excluding the terminator.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// How the line ended.
    #[must_use]
    pub fn terminator(&self) -> LineTerminator {
        self.terminator
    }

    /// Takes the text of the line, discarding the terminator.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Buffer {
    /// Consumes the next line of UTF-8 text.
    ///
    /// A line ends at `\n`, and a `\r` right before the `\n` belongs to the terminator. The
    /// buffer is treated as the complete input: if there is no `\n`, the remaining bytes are the
    /// last line, minus a trailing `\r` if there is one. Returns `None` if the buffer is empty.
    ///
    /// ```
    /// use segbuf::{Buffer, LineTerminator};
    ///
    /// let mut buffer = Buffer::from("first\r\nsecond\nthird");
    ///
    /// let line = buffer.read_line().unwrap().unwrap();
    /// assert_eq!(line.text(), "first");
    /// assert_eq!(line.terminator(), LineTerminator::CrLf);
    ///
    /// assert_eq!(buffer.read_utf8_line().unwrap().as_deref(), Some("second"));
    /// assert_eq!(buffer.read_utf8_line().unwrap().as_deref(), Some("third"));
    /// assert_eq!(buffer.read_utf8_line().unwrap(), None);
    /// ```
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][crate::ErrorKind::MalformedData] if the line is not valid
    /// UTF-8. Nothing is consumed in that case.
    pub fn read_line(&mut self) -> Result<Option<Line>> {
        if self.is_empty() {
            return Ok(None);
        }

        if let Some(newline) = self.index_of(b'\n') {
            return self.read_line_ending_at(newline).map(Some);
        }

        let len = self.len();

        let line = if self.get(len - 1) == Some(b'\r') {
            self.take_line(len - 1, LineTerminator::Cr)?
        } else {
            self.take_line(len, LineTerminator::EndOfInput)?
        };

        Ok(Some(line))
    }

    /// Consumes the next line of UTF-8 text, discarding its terminator.
    ///
    /// Follows the same rules as [`read_line()`][Self::read_line].
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][crate::ErrorKind::MalformedData] if the line is not valid
    /// UTF-8.
    pub fn read_utf8_line(&mut self) -> Result<Option<String>> {
        Ok(self.read_line()?.map(Line::into_text))
    }

    /// Consumes the next line of UTF-8 text, requiring it to be terminated.
    ///
    /// With a `limit`, the line text may be at most `limit` bytes long.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if no `\n` is found (within the
    /// limit, if any) and with [`MalformedData`][crate::ErrorKind::MalformedData] if the line is
    /// not valid UTF-8. Nothing is consumed on failure.
    pub fn read_utf8_line_strict(&mut self, limit: Option<usize>) -> Result<String> {
        let scan_len = limit.map_or(usize::MAX, |limit| limit.saturating_add(1));

        if let Some(newline) = self.index_of_in(b'\n', 0, scan_len) {
            return self.read_line_ending_at(newline).map(Line::into_text);
        }

        // A line of exactly `limit` bytes followed by "\r\n".
        if let Some(limit) = limit
            && self.get(limit) == Some(b'\r')
            && self.get(limit + 1) == Some(b'\n')
        {
            return self.take_line(limit, LineTerminator::CrLf).map(Line::into_text);
        }

        Err(Error::end_of_data(match limit {
            Some(limit) => format!("no line terminator within {limit} bytes (buffered: {})", self.len()),
            None => format!("no line terminator in {} buffered bytes", self.len()),
        }))
    }

    /// Consumes the line whose `\n` is at `newline`.
    pub(crate) fn read_line_ending_at(&mut self, newline: usize) -> Result<Line> {
        if newline > 0 && self.get(newline - 1) == Some(b'\r') {
            self.take_line(newline - 1, LineTerminator::CrLf)
        } else {
            self.take_line(newline, LineTerminator::Lf)
        }
    }

    fn take_line(&mut self, text_len: usize, terminator: LineTerminator) -> Result<Line> {
        let text = self.decode_prefix(text_len, Utf8Decoder::strict())?;
        self.advance(text_len + terminator.len());

        Ok(Line { text, terminator })
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SEGMENT_SIZE, SegmentPool};

    fn line(buffer: &mut Buffer) -> (String, LineTerminator) {
        let line = buffer.read_line().unwrap().unwrap();
        let terminator = line.terminator();
        (line.into_text(), terminator)
    }

    #[test]
    fn all_terminators() {
        let mut buffer = Buffer::from("lf\ncrlf\r\n\nlast\r");

        assert_eq!(line(&mut buffer), ("lf".to_string(), LineTerminator::Lf));
        assert_eq!(line(&mut buffer), ("crlf".to_string(), LineTerminator::CrLf));
        assert_eq!(line(&mut buffer), (String::new(), LineTerminator::Lf));
        assert_eq!(line(&mut buffer), ("last".to_string(), LineTerminator::Cr));
        assert_eq!(buffer.read_line().unwrap(), None);
    }

    #[test]
    fn trailing_cr_at_end_of_input() {
        let mut buffer = Buffer::from("hello\r");

        assert_eq!(line(&mut buffer), ("hello".to_string(), LineTerminator::Cr));
        assert!(buffer.is_empty());
    }

    #[test]
    fn unterminated_last_line() {
        let mut buffer = Buffer::from("no newline");

        assert_eq!(line(&mut buffer), ("no newline".to_string(), LineTerminator::EndOfInput));
    }

    #[test]
    fn cr_in_the_middle_is_text() {
        let mut buffer = Buffer::from("a\rb\n");

        assert_eq!(buffer.read_utf8_line().unwrap().as_deref(), Some("a\rb"));
    }

    #[test]
    fn crlf_straddling_segments() {
        let pool = SegmentPool::new();
        let mut buffer = Buffer::with_pool(pool);
        buffer.write_slice(&vec![b'x'; SEGMENT_SIZE - 1]);
        buffer.write_slice(b"\r\nnext");

        let (text, terminator) = line(&mut buffer);

        assert_eq!(text.len(), SEGMENT_SIZE - 1);
        assert_eq!(terminator, LineTerminator::CrLf);
        assert_eq!(buffer, b"next");
    }

    #[test]
    fn malformed_line_consumes_nothing() {
        let mut buffer = Buffer::from(&b"bad \xFF\nok\n"[..]);

        assert!(buffer.read_line().unwrap_err().is_malformed());
        assert_eq!(buffer.len(), 9);
    }

    #[test]
    fn strict_requires_terminator() {
        let mut buffer = Buffer::from("complete\nincomplete");

        assert_eq!(buffer.read_utf8_line_strict(None).unwrap(), "complete");
        assert!(buffer.read_utf8_line_strict(None).unwrap_err().is_end_of_data());
        assert_eq!(buffer, b"incomplete");
    }

    #[test]
    fn strict_with_limit() {
        let mut buffer = Buffer::from("12345\n");
        assert!(buffer.read_utf8_line_strict(Some(4)).unwrap_err().is_end_of_data());
        assert_eq!(buffer.read_utf8_line_strict(Some(5)).unwrap(), "12345");

        let mut buffer = Buffer::from("12345\r\n");
        assert_eq!(buffer.read_utf8_line_strict(Some(5)).unwrap(), "12345");
        assert!(buffer.is_empty());

        let mut buffer = Buffer::from("\n");
        assert_eq!(buffer.read_utf8_line_strict(Some(0)).unwrap(), "");
    }

    #[test]
    fn terminator_lengths() {
        assert_eq!(LineTerminator::Lf.len(), 1);
        assert_eq!(LineTerminator::CrLf.len(), 2);
        assert_eq!(LineTerminator::Cr.len(), 1);
        assert!(LineTerminator::EndOfInput.is_empty());
    }
}

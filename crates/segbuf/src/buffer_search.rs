// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Searching and prefix matching over the segments of a buffer.

use crate::{Buffer, Options, Selection};

impl Buffer {
    /// The offset of the first occurrence of `byte`, if any.
    #[must_use]
    pub fn index_of(&self, byte: u8) -> Option<usize> {
        self.index_of_in(byte, 0, self.len())
    }

    /// The offset of the first occurrence of `byte` in the range `[from, to)`.
    ///
    /// `to` is clamped to the length of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `from` is greater than `to`.
    #[must_use]
    pub fn index_of_in(&self, byte: u8, from: usize, to: usize) -> Option<usize> {
        assert!(from <= to, "search range start {from} is past its end {to}");

        let to = to.min(self.len());
        let mut base = 0;

        for slice in self.slices() {
            if base >= to {
                break;
            }

            let end = base + slice.len();

            if end > from {
                let start = from.saturating_sub(base);
                let stop = slice.len().min(to - base);

                if let Some(found) = slice[start..stop].iter().position(|b| *b == byte) {
                    return Some(base + start + found);
                }
            }

            base = end;
        }

        None
    }

    /// The offset of the first occurrence of `needle` that starts at or after `from`.
    ///
    /// Occurrences that span segments are found like any other.
    ///
    /// # Panics
    ///
    /// Panics if `needle` is empty.
    #[must_use]
    pub fn index_of_bytes(&self, needle: &[u8], from: usize) -> Option<usize> {
        assert!(!needle.is_empty(), "cannot search for an empty byte sequence");

        let last_start = self.len().checked_sub(needle.len())?;
        let first = needle[0];
        let mut candidate = from;

        while candidate <= last_start {
            candidate = self.index_of_in(first, candidate, last_start + 1)?;

            if self.range_equals(candidate, needle) {
                return Some(candidate);
            }

            candidate += 1;
        }

        None
    }

    /// The offset of the first byte at or after `from` that is contained in `set`.
    #[must_use]
    pub fn index_of_element(&self, set: &[u8], from: usize) -> Option<usize> {
        let mut base = 0;

        for slice in self.slices() {
            let end = base + slice.len();

            if end > from {
                let start = from.saturating_sub(base);

                if let Some(found) = slice[start..].iter().position(|b| set.contains(b)) {
                    return Some(base + start + found);
                }
            }

            base = end;
        }

        None
    }

    /// Whether the bytes starting at `offset` equal `bytes`.
    ///
    /// Returns `false` if the buffer ends before the comparison does.
    #[must_use]
    pub fn range_equals(&self, offset: usize, bytes: &[u8]) -> bool {
        if offset.checked_add(bytes.len()).is_none_or(|end| end > self.len()) {
            return false;
        }

        let mut skip = offset;
        let mut remaining = bytes;

        for slice in self.slices() {
            if remaining.is_empty() {
                break;
            }

            if skip >= slice.len() {
                skip -= slice.len();
                continue;
            }

            let slice = &slice[skip..];
            skip = 0;

            let count = slice.len().min(remaining.len());

            if slice[..count] != remaining[..count] {
                return false;
            }

            remaining = &remaining[count..];
        }

        remaining.is_empty()
    }

    /// Consumes the first option that the buffer starts with and returns its index.
    ///
    /// Returns `None` and consumes nothing if no option matches. The buffer is treated as all the
    /// data there is, so an option longer than the buffer never matches.
    ///
    /// ```
    /// use segbuf::{Buffer, Options};
    ///
    /// let options = Options::new(["a", "ab", "abc"]);
    ///
    /// // The earliest registered match wins.
    /// assert_eq!(Buffer::from("abc").select(&options), Some(0));
    /// assert_eq!(Buffer::from("x").select(&options), None);
    /// ```
    pub fn select(&mut self, options: &Options) -> Option<usize> {
        let index = match self.try_select(options) {
            Selection::Matched(index)
            | Selection::NeedMoreData {
                best_so_far: Some(index),
            } => index,
            Selection::NoMatch | Selection::NeedMoreData { best_so_far: None } => return None,
        };

        let len = options.get(index).map_or(0, <[u8]>::len);
        self.advance(len);

        Some(index)
    }

    /// Matches the start of the buffer against `options` without consuming anything.
    ///
    /// Unlike [`select()`][Self::select], this tells apart a definite answer from one that more
    /// data could change, which is what streaming sources need to decide whether to read more.
    #[must_use]
    pub fn try_select(&self, options: &Options) -> Selection {
        options.evaluate(self.slices().flatten().copied())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use crate::{Buffer, Options, SEGMENT_SIZE, SegmentPool, Selection};

    /// A buffer holding `prefix_len` filler bytes followed by `tail`.
    fn with_prefix(pool: &SegmentPool, prefix_len: usize, tail: &[u8]) -> Buffer {
        let mut buffer = Buffer::with_pool(pool.clone());
        buffer.write_slice(&vec![b'.'; prefix_len]);
        buffer.write_slice(tail);
        buffer
    }

    #[test]
    fn index_of_single_byte() {
        let buffer = Buffer::from("hello world");

        assert_eq!(buffer.index_of(b'o'), Some(4));
        assert_eq!(buffer.index_of_in(b'o', 5, 11), Some(7));
        assert_eq!(buffer.index_of_in(b'o', 5, 7), None);
        assert_eq!(buffer.index_of_in(b'o', 5, 100), Some(7));
        assert_eq!(buffer.index_of(b'z'), None);
    }

    #[test]
    fn index_of_in_later_segment() {
        let pool = SegmentPool::new();
        let buffer = with_prefix(&pool, SEGMENT_SIZE * 2 + 5, b"x");

        assert_eq!(buffer.index_of(b'x'), Some(SEGMENT_SIZE * 2 + 5));
        assert_eq!(buffer.index_of_in(b'.', SEGMENT_SIZE + 3, buffer.len()), Some(SEGMENT_SIZE + 3));
    }

    #[test]
    #[should_panic]
    fn index_of_in_inverted_range_panics() {
        let _ = Buffer::from("abc").index_of_in(b'a', 2, 1);
    }

    #[test]
    fn needle_straddling_segment_boundary() {
        let pool = SegmentPool::new();
        // 'a' is the last byte of the first segment, 'b' the first byte of the second.
        let buffer = with_prefix(&pool, SEGMENT_SIZE - 1, b"ab");

        assert_eq!(buffer.segment_count(), 2);
        assert_eq!(buffer.index_of_bytes(b"ab", 0), Some(SEGMENT_SIZE - 1));
        assert_eq!(buffer.index_of_bytes(b".ab", 0), Some(SEGMENT_SIZE - 2));
        assert_eq!(buffer.index_of_bytes(b"ab", SEGMENT_SIZE), None);
    }

    #[test]
    fn needle_with_repeated_prefix() {
        let buffer = Buffer::from("aaab aab");

        assert_eq!(buffer.index_of_bytes(b"aab", 0), Some(1));
        assert_eq!(buffer.index_of_bytes(b"aab", 2), Some(5));
        assert_eq!(buffer.index_of_bytes(b"aabb", 0), None);
        assert_eq!(buffer.index_of_bytes(b"longer than the buffer", 0), None);
    }

    #[test]
    fn index_of_element_finds_any_of_set() {
        let pool = SegmentPool::new();
        let buffer = with_prefix(&pool, SEGMENT_SIZE + 1, b"x\r\n");

        assert_eq!(buffer.index_of_element(b"\r\n", 0), Some(SEGMENT_SIZE + 2));
        assert_eq!(buffer.index_of_element(b"\n", SEGMENT_SIZE + 3), Some(SEGMENT_SIZE + 3));
        assert_eq!(buffer.index_of_element(b"\t", 0), None);
        assert_eq!(buffer.index_of_element(b"", 0), None);
    }

    #[test]
    fn range_equals_bounds() {
        let pool = SegmentPool::new();
        let buffer = with_prefix(&pool, SEGMENT_SIZE - 2, b"abcd");

        assert!(buffer.range_equals(SEGMENT_SIZE - 2, b"abcd"));
        assert!(buffer.range_equals(SEGMENT_SIZE - 1, b"bc"));
        assert!(!buffer.range_equals(SEGMENT_SIZE - 1, b"bd"));
        assert!(!buffer.range_equals(SEGMENT_SIZE, b"cde"));
        assert!(buffer.range_equals(buffer.len(), b""));
        assert!(!buffer.range_equals(usize::MAX, b"a"));
    }

    #[test]
    fn select_priority_rules() {
        let options = Options::new(["a", "ab", "abc"]);

        let mut buffer = Buffer::from("abc");
        assert_eq!(buffer.select(&options), Some(0));
        assert_eq!(buffer, b"bc");

        let mut buffer = Buffer::from("ax");
        assert_eq!(buffer.select(&options), Some(0));
        assert_eq!(buffer, b"x");
    }

    #[test]
    fn select_uses_buffer_as_complete_input() {
        let options = Options::new(["abc", "ab"]);

        let mut buffer = Buffer::from("ab");
        assert_eq!(buffer.try_select(&options), Selection::NeedMoreData { best_so_far: Some(1) });
        assert_eq!(buffer.select(&options), Some(1));
        assert!(buffer.is_empty());

        let mut buffer = Buffer::from("a");
        assert_eq!(buffer.select(&options), None);
        assert_eq!(buffer, b"a");
    }

    #[test]
    fn select_option_longer_than_a_segment() {
        let pool = SegmentPool::new();
        let long = vec![b'z'; SEGMENT_SIZE + 10];
        let options = Options::new([&b"zz!"[..], long.as_slice()]);

        let mut buffer = Buffer::with_pool(pool);
        buffer.write_slice(&long);
        buffer.write_slice(b"tail");

        assert_eq!(buffer.select(&options), Some(1));
        assert_eq!(buffer, b"tail");
    }
}

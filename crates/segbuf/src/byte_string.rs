// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::ops::{Deref, RangeBounds};
use std::str;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE};
use base64::engine::DecodePaddingMode;

use crate::{Error, Result};

/// Accepts padded and unpadded input.
const BASE64_DECODE_CONFIG: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

const BASE64_STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&base64::alphabet::STANDARD, BASE64_DECODE_CONFIG);
const BASE64_URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&base64::alphabet::URL_SAFE, BASE64_DECODE_CONFIG);

/// An immutable sequence of bytes.
///
/// Cloning a byte string is cheap, as clones share the same memory. Byte strings compare,
/// order and hash by content.
///
/// ```
/// use segbuf::ByteString;
///
/// let bytes = ByteString::from("hello");
///
/// assert_eq!(bytes.hex(), "68656c6c6f");
/// assert_eq!(bytes.base64(), "aGVsbG8=");
/// assert_eq!(ByteString::from_base64("aGVsbG8").unwrap(), bytes);
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteString {
    bytes: Arc<[u8]>,
}

impl ByteString {
    /// A byte string of length zero.
    #[must_use]
    pub fn empty() -> Self {
        Self { bytes: Arc::from([]) }
    }

    /// The bytes as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// The number of bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the byte string has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies the bytes in `range` into a new byte string.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    #[must_use]
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let bounds = (range.start_bound().cloned(), range.end_bound().cloned());
        Self::from(&self.bytes[bounds])
    }

    /// The bytes as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][crate::ErrorKind::MalformedData] if the bytes are not
    /// well-formed UTF-8.
    pub fn utf8(&self) -> Result<&str> {
        str::from_utf8(&self.bytes).map_err(Error::malformed)
    }

    /// Lowercase hexadecimal encoding of the bytes.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Decodes hexadecimal text in either letter case.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][crate::ErrorKind::MalformedData] if the text has an odd
    /// length or contains a character that is not a hex digit.
    pub fn from_hex(text: &str) -> Result<Self> {
        hex::decode(text).map(Self::from).map_err(Error::malformed)
    }

    /// Standard padded base64 encoding of the bytes.
    #[must_use]
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// URL and filename safe padded base64 encoding of the bytes.
    #[must_use]
    pub fn base64_url(&self) -> String {
        URL_SAFE.encode(&self.bytes)
    }

    /// Decodes base64 text.
    ///
    /// Both the standard and the URL-safe alphabet are accepted, with or without padding.
    /// ASCII whitespace (such as line breaks in MIME-formatted text) is ignored.
    ///
    /// # Errors
    ///
    /// Fails with [`MalformedData`][crate::ErrorKind::MalformedData] if the text is not valid
    /// base64.
    pub fn from_base64(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();

        let engine = if compact.contains(['-', '_']) {
            BASE64_URL_SAFE_LENIENT
        } else {
            BASE64_STANDARD_LENIENT
        };

        engine.decode(compact).map(Self::from).map_err(Error::malformed)
    }

    /// Whether the bytes start with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.bytes.starts_with(prefix)
    }

    /// Whether the bytes end with `suffix`.
    #[must_use]
    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        self.bytes.ends_with(suffix)
    }

    /// The offset of the first occurrence of `needle` at or after `from`.
    #[must_use]
    pub fn index_of(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() {
            return (from <= self.len()).then_some(from);
        }

        self.bytes
            .get(from..)?
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|found| from + found)
    }

    /// Copies the bytes into a new vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl Default for ByteString {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for ByteString {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes: bytes.into() }
    }
}

impl From<&[u8]> for ByteString {
    fn from(bytes: &[u8]) -> Self {
        Self { bytes: bytes.into() }
    }
}

impl From<&str> for ByteString {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes())
    }
}

impl From<String> for ByteString {
    fn from(text: String) -> Self {
        Self::from(text.into_bytes())
    }
}

impl PartialEq<[u8]> for ByteString {
    fn eq(&self, other: &[u8]) -> bool {
        *self.bytes == *other
    }
}

impl PartialEq<&[u8]> for ByteString {
    fn eq(&self, other: &&[u8]) -> bool {
        *self.bytes == **other
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match str::from_utf8(&self.bytes) {
            Ok(text) if !text.chars().any(char::is_control) => write!(f, "ByteString[text={text:?}]"),
            _ => write!(f, "ByteString[hex={}]", self.hex()),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::ErrorKind;

    assert_impl_all!(ByteString: Send, Sync, Clone, Default, std::hash::Hash, Ord);

    #[test]
    fn hex_codec() {
        let bytes = ByteString::from(&[0x00_u8, 0x7F, 0x80, 0xFF][..]);

        assert_eq!(bytes.hex(), "007f80ff");
        assert_eq!(ByteString::from_hex("007F80fF").unwrap(), bytes);
        assert_eq!(ByteString::from_hex("").unwrap(), ByteString::empty());
    }

    #[test]
    fn malformed_hex() {
        assert_eq!(ByteString::from_hex("abc").unwrap_err().kind(), ErrorKind::MalformedData);
        assert_eq!(ByteString::from_hex("zz").unwrap_err().kind(), ErrorKind::MalformedData);
    }

    #[test]
    fn base64_codec() {
        let bytes = ByteString::from(&[0xFB_u8, 0xFF, 0xBF][..]);

        assert_eq!(bytes.base64(), "+/+/");
        assert_eq!(bytes.base64_url(), "-_-_");
        assert_eq!(ByteString::from_base64("+/+/").unwrap(), bytes);
        assert_eq!(ByteString::from_base64("-_-_").unwrap(), bytes);
    }

    #[test]
    fn base64_ignores_whitespace_and_padding() {
        let expected = ByteString::from("any carnal pleasure");

        assert_eq!(ByteString::from_base64("YW55IGNhcm5hbCBwbGVhc3VyZQ==").unwrap(), expected);
        assert_eq!(ByteString::from_base64("YW55IGNhcm5h\r\nbCBwbGVhc3VyZQ").unwrap(), expected);
    }

    #[test]
    fn malformed_base64() {
        assert!(ByteString::from_base64("!!!!").unwrap_err().is_malformed());
        assert!(ByteString::from_base64("+_").unwrap_err().is_malformed());
    }

    #[test]
    fn utf8_view() {
        assert_eq!(ByteString::from("héllo").utf8().unwrap(), "héllo");
        assert!(ByteString::from(&[0xC0_u8, 0x80][..]).utf8().unwrap_err().is_malformed());
    }

    #[test]
    fn slicing_and_searching() {
        let bytes = ByteString::from("hello world");

        assert_eq!(bytes.slice(6..), ByteString::from("world"));
        assert_eq!(bytes.slice(..5), ByteString::from("hello"));
        assert!(bytes.starts_with(b"hello"));
        assert!(bytes.ends_with(b"world"));
        assert_eq!(bytes.index_of(b"o", 0), Some(4));
        assert_eq!(bytes.index_of(b"o", 5), Some(7));
        assert_eq!(bytes.index_of(b"xyz", 0), None);
        assert_eq!(bytes.index_of(b"o", 100), None);
    }

    #[test]
    fn equality_and_hashing_by_content() {
        let a = ByteString::from("same");
        let b = ByteString::from(String::from("same"));

        assert_eq!(a, b);
        assert_eq!(a, &b"same"[..]);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn debug_shows_text_or_hex() {
        assert_eq!(format!("{:?}", ByteString::from("hi")), "ByteString[text=\"hi\"]");
        assert_eq!(format!("{:?}", ByteString::from(&[0_u8, 1][..])), "ByteString[hex=0001]");
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use digest::Digest;
use md5::Md5;
use segbuf::{Buffer, ByteString};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::{RawSink, RawSource};

/// Feeds `byte_count` bytes of `buffer`, starting at `offset`, to `hasher`.
fn update_range<D: Digest>(hasher: &mut D, buffer: &Buffer, offset: usize, byte_count: usize) {
    let mut skip = offset;
    let mut remaining = byte_count;

    for slice in buffer.slices() {
        if remaining == 0 {
            break;
        }

        if skip >= slice.len() {
            skip -= slice.len();
            continue;
        }

        let take = remaining.min(slice.len() - skip);
        hasher.update(&slice[skip..skip + take]);

        skip = 0;
        remaining -= take;
    }
}

fn finish<D: Digest + Clone>(hasher: &D) -> ByteString {
    ByteString::from(hasher.clone().finalize().as_slice())
}

/// A source that computes a message digest of every byte it produces.
///
/// ```
/// use segbuf::Buffer;
/// use segbuf_io::{BufferedSource, HashingSource};
///
/// let mut source = BufferedSource::new(HashingSource::sha256(Buffer::from("abc")));
/// source.read_to_vec().unwrap();
///
/// assert_eq!(
///     source.get_ref().hash().hex(),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
pub struct HashingSource<R, D> {
    inner: R,
    hasher: D,
}

impl<R: RawSource, D: Digest + Clone> HashingSource<R, D> {
    /// Hashes the bytes produced by `inner` with `D`.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self { inner, hasher: D::new() }
    }

    /// The digest of the bytes produced so far.
    #[must_use]
    pub fn hash(&self) -> ByteString {
        finish(&self.hasher)
    }

    /// The wrapped source.
    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwraps the source.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: RawSource> HashingSource<R, Md5> {
    /// Hashes the bytes produced by `inner` with MD5.
    #[must_use]
    pub fn md5(inner: R) -> Self {
        Self::new(inner)
    }
}

impl<R: RawSource> HashingSource<R, Sha1> {
    /// Hashes the bytes produced by `inner` with SHA-1.
    #[must_use]
    pub fn sha1(inner: R) -> Self {
        Self::new(inner)
    }
}

impl<R: RawSource> HashingSource<R, Sha256> {
    /// Hashes the bytes produced by `inner` with SHA-256.
    #[must_use]
    pub fn sha256(inner: R) -> Self {
        Self::new(inner)
    }
}

impl<R: RawSource> HashingSource<R, Sha512> {
    /// Hashes the bytes produced by `inner` with SHA-512.
    #[must_use]
    pub fn sha512(inner: R) -> Self {
        Self::new(inner)
    }
}

impl<R: RawSource, D: Digest + Clone> RawSource for HashingSource<R, D> {
    type Error = R::Error;

    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, R::Error> {
        let start = sink.len();
        let result = self.inner.read_at_most_to(sink, byte_count)?;

        if let Some(count) = result {
            update_range(&mut self.hasher, sink, start, count);
        }

        Ok(result)
    }

    fn close(&mut self) -> Result<(), R::Error> {
        self.inner.close()
    }
}

impl<R: fmt::Debug, D> fmt::Debug for HashingSource<R, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashingSource").field("inner", &self.inner).finish_non_exhaustive()
    }
}

/// A sink that computes a message digest of every byte written to it.
///
/// ```
/// use segbuf::Buffer;
/// use segbuf_io::{BufferedSink, HashingSink};
///
/// let mut sink = BufferedSink::new(HashingSink::md5(Buffer::new()));
/// sink.write_utf8("hello world").unwrap();
/// let hashing = sink.into_inner().unwrap();
///
/// assert_eq!(hashing.hash().hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
/// assert_eq!(hashing.get_ref(), &b"hello world");
/// ```
pub struct HashingSink<W, D> {
    inner: W,
    hasher: D,
}

impl<W: RawSink, D: Digest + Clone> HashingSink<W, D> {
    /// Hashes the bytes written to `inner` with `D`.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self { inner, hasher: D::new() }
    }

    /// The digest of the bytes written so far.
    #[must_use]
    pub fn hash(&self) -> ByteString {
        finish(&self.hasher)
    }

    /// The wrapped sink.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwraps the sink.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: RawSink> HashingSink<W, Md5> {
    /// Hashes the bytes written to `inner` with MD5.
    #[must_use]
    pub fn md5(inner: W) -> Self {
        Self::new(inner)
    }
}

impl<W: RawSink> HashingSink<W, Sha1> {
    /// Hashes the bytes written to `inner` with SHA-1.
    #[must_use]
    pub fn sha1(inner: W) -> Self {
        Self::new(inner)
    }
}

impl<W: RawSink> HashingSink<W, Sha256> {
    /// Hashes the bytes written to `inner` with SHA-256.
    #[must_use]
    pub fn sha256(inner: W) -> Self {
        Self::new(inner)
    }
}

impl<W: RawSink> HashingSink<W, Sha512> {
    /// Hashes the bytes written to `inner` with SHA-512.
    #[must_use]
    pub fn sha512(inner: W) -> Self {
        Self::new(inner)
    }
}

impl<W: RawSink, D: Digest + Clone> RawSink for HashingSink<W, D> {
    type Error = W::Error;

    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), W::Error> {
        // Hashed up front, as the bytes are gone from `source` once written.
        update_range(&mut self.hasher, source, 0, byte_count);
        self.inner.write(source, byte_count)
    }

    fn flush(&mut self) -> Result<(), W::Error> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<(), W::Error> {
        self.inner.close()
    }
}

impl<W: fmt::Debug, D> fmt::Debug for HashingSink<W, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashingSink").field("inner", &self.inner).finish_non_exhaustive()
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Message digests over buffers and byte strings.
//!
//! Each segment is fed to the hash function in place, so hashing a buffer never requires its
//! content to be contiguous.

use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::{Buffer, ByteString};

fn hash_slices<'a, D: Digest>(slices: impl IntoIterator<Item = &'a [u8]>) -> ByteString {
    let mut hasher = D::new();
    slices.into_iter().for_each(|slice| hasher.update(slice));
    ByteString::from(hasher.finalize().as_slice())
}

impl Buffer {
    /// Hashes the content with any [`Digest`] implementation, without consuming it.
    ///
    /// ```
    /// use segbuf::Buffer;
    /// use sha2::Sha384;
    ///
    /// let buffer = Buffer::from("abc");
    /// assert_eq!(buffer.digest::<Sha384>().len(), 48);
    /// ```
    #[must_use]
    pub fn digest<D: Digest>(&self) -> ByteString {
        hash_slices::<D>(self.slices())
    }

    /// The MD5 hash of the content.
    #[must_use]
    pub fn md5(&self) -> ByteString {
        self.digest::<Md5>()
    }

    /// The SHA-1 hash of the content.
    #[must_use]
    pub fn sha1(&self) -> ByteString {
        self.digest::<Sha1>()
    }

    /// The SHA-256 hash of the content.
    #[must_use]
    pub fn sha256(&self) -> ByteString {
        self.digest::<Sha256>()
    }

    /// The SHA-512 hash of the content.
    #[must_use]
    pub fn sha512(&self) -> ByteString {
        self.digest::<Sha512>()
    }
}

impl ByteString {
    /// Hashes the bytes with any [`Digest`] implementation.
    #[must_use]
    pub fn digest<D: Digest>(&self) -> Self {
        hash_slices::<D>([self.as_slice()])
    }

    /// The MD5 hash of the bytes.
    #[must_use]
    pub fn md5(&self) -> Self {
        self.digest::<Md5>()
    }

    /// The SHA-1 hash of the bytes.
    #[must_use]
    pub fn sha1(&self) -> Self {
        self.digest::<Sha1>()
    }

    /// The SHA-256 hash of the bytes.
    #[must_use]
    pub fn sha256(&self) -> Self {
        self.digest::<Sha256>()
    }

    /// The SHA-512 hash of the bytes.
    #[must_use]
    pub fn sha512(&self) -> Self {
        self.digest::<Sha512>()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use testing_aids::repeating_incrementing_bytes;

    use super::*;
    use crate::{SEGMENT_SIZE, SegmentPool};

    #[test]
    fn known_digests() {
        let buffer = Buffer::from("hello world");

        assert_eq!(buffer.md5().hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(buffer.sha1().hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(
            buffer.sha256().hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(buffer.sha512().len(), 64);

        // Hashing does not consume.
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn empty_input() {
        assert_eq!(Buffer::new().md5().hex(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn segmentation_does_not_matter() {
        let pool = SegmentPool::new();
        let data: Vec<u8> = repeating_incrementing_bytes().take(SEGMENT_SIZE * 3 + 123).collect();

        let mut fragmented = Buffer::with_pool(pool.clone());
        let mut keep_shared = Vec::new();

        for chunk in data.chunks(1000) {
            let mut piece = Buffer::with_pool(pool.clone());
            piece.write_slice(chunk);
            keep_shared.push(piece.clone());
            fragmented.write_all_from(&mut piece);
        }

        let contiguous = ByteString::from(data);

        assert_eq!(fragmented.sha256(), contiguous.sha256());
        assert_eq!(fragmented.md5(), contiguous.md5());
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::io;

/// Classifies an [`Error`], allowing callers to tell apart the different failure modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// There are not enough bytes to complete the operation and no more can be obtained.
    ///
    /// For an in-memory [`Buffer`][crate::Buffer] this means the buffer holds fewer bytes than
    /// requested. For a streaming source it means the underlying transport is exhausted.
    EndOfData,

    /// The bytes exist but do not have the expected shape (e.g. invalid UTF-8, a malformed
    /// number or a corrupt compressed stream).
    MalformedData,

    /// The source or sink has already been closed.
    Closed,

    /// The underlying transport failed. The transport's own error is attached as the cause.
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EndOfData => "end of data",
            Self::MalformedData => "malformed data",
            Self::Closed => "closed",
            Self::Transport => "transport failure",
        };

        f.write_str(text)
    }
}

/// An error signaled by buffer, source or sink logic.
///
/// Use [`kind()`][Self::kind] to classify the error. Any underlying error (for example an
/// I/O error raised by a transport) is available via [`std::error::Error::source()`].
#[ohno::error]
#[display("{kind}")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Creates an error signaling that not enough bytes are available.
    #[must_use]
    pub fn end_of_data(detail: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::EndOfData, detail)
    }

    /// Creates an error signaling that the bytes do not have the expected shape.
    #[must_use]
    pub fn malformed(detail: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::MalformedData, detail)
    }

    /// Creates an error signaling use of a source or sink after it was closed.
    #[must_use]
    pub fn closed(detail: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Closed, detail)
    }

    /// Creates an error that wraps a failure raised by the underlying transport.
    #[must_use]
    pub fn transport(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Transport, cause)
    }

    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether this error signals the end of the data.
    #[must_use]
    pub fn is_end_of_data(&self) -> bool {
        self.kind == ErrorKind::EndOfData
    }

    /// Whether this error signals malformed data.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.kind == ErrorKind::MalformedData
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        let kind = match error.kind() {
            ErrorKind::EndOfData => io::ErrorKind::UnexpectedEof,
            ErrorKind::MalformedData => io::ErrorKind::InvalidData,
            ErrorKind::Closed => io::ErrorKind::BrokenPipe,
            ErrorKind::Transport => io::ErrorKind::Other,
        };

        Self::new(kind, error)
    }
}

/// A `Result` that may contain an [`Error`] from this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, std::error::Error);

    #[test]
    fn kinds_are_distinguishable() {
        assert!(Error::end_of_data("need 4 bytes").is_end_of_data());
        assert!(Error::malformed("bad byte").is_malformed());
        assert_eq!(Error::closed("sink").kind(), ErrorKind::Closed);
        assert_eq!(Error::transport("disk on fire").kind(), ErrorKind::Transport);
    }

    #[test]
    fn display_contains_kind_and_detail() {
        let error = Error::end_of_data("need 4 bytes but have 2");
        let text = error.to_string();

        assert!(text.contains("end of data"));
        assert!(text.contains("need 4 bytes but have 2"));
    }

    #[test]
    fn transport_cause_is_preserved() {
        let cause = io::Error::new(io::ErrorKind::ConnectionReset, "peer went away");
        let error = Error::transport(cause);

        assert!(error.source().is_some());
        assert!(error.to_string().contains("peer went away"));
    }

    #[test]
    fn converts_to_io_error() {
        let error: io::Error = Error::end_of_data("eof").into();
        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);

        let error: io::Error = Error::malformed("utf-8").into();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}

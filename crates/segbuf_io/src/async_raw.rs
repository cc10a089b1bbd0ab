// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use segbuf::Buffer;

/// Asynchronous counterpart of [`RawSource`][crate::RawSource].
///
/// Each call is a single suspension point. If the returned future is dropped before it
/// completes, bytes it already appended to `sink` stay there and no other state changes.
///
/// # Thread safety
///
/// This trait requires `Send` from both the implementation and any returned futures.
#[trait_variant::make(Send)]
pub trait AsyncRawSource: Debug {
    /// Type used to signal errors by the implementation of this trait.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Appends at most `byte_count` bytes to the end of `sink`.
    ///
    /// Returns the number of bytes appended, or `None` if the source is exhausted. `Some(0)` is
    /// only returned if `byte_count` is 0.
    ///
    /// # Example
    ///
    /// ```
    /// # testing_aids::execute_or_terminate_process(|| futures::executor::block_on(async {
    /// use segbuf::Buffer;
    /// use segbuf_io::{AsyncRawSource, Blocking};
    ///
    /// let mut source = Blocking::new(Buffer::from("abc"));
    /// let mut sink = Buffer::new();
    ///
    /// assert_eq!(source.read_at_most_to(&mut sink, 2).await.unwrap(), Some(2));
    /// assert_eq!(sink, b"ab");
    /// # }));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if the transport fails.
    async fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, Self::Error>;

    /// Releases the resources held by the source.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if releasing the resources fails.
    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// Asynchronous counterpart of [`RawSink`][crate::RawSink].
///
/// # Thread safety
///
/// This trait requires `Send` from both the implementation and any returned futures.
#[trait_variant::make(Send)]
pub trait AsyncRawSink: Debug {
    /// Type used to signal errors by the implementation of this trait.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Removes exactly `byte_count` bytes from the front of `source` and writes them.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if the transport fails.
    async fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), Self::Error>;

    /// Pushes any bytes held by the transport itself to their final destination.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if the transport fails.
    async fn flush(&mut self) -> Result<(), Self::Error>;

    /// Flushes and releases the resources held by the sink.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error if flushing or releasing the resources fails.
    async fn close(&mut self) -> Result<(), Self::Error>;
}

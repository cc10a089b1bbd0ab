// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use segbuf::Buffer;

use crate::{AsyncRawSink, AsyncRawSource, RawSink, RawSource};

/// Lifts a synchronous transport into the asynchronous traits.
///
/// Every operation runs the synchronous call to completion when the future is first polled, so
/// the futures never suspend. Suitable for in-memory transports and for tests. A transport that
/// actually blocks on I/O will block the executor thread.
#[derive(Debug)]
pub struct Blocking<T> {
    inner: T,
}

impl<T> Blocking<T> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// The wrapped transport.
    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutable access to the wrapped transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwraps the transport.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: RawSource + Send> AsyncRawSource for Blocking<T> {
    type Error = T::Error;

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, T::Error> {
        RawSource::read_at_most_to(&mut self.inner, sink, byte_count)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn close(&mut self) -> Result<(), T::Error> {
        RawSource::close(&mut self.inner)
    }
}

impl<T: RawSink + Send> AsyncRawSink for Blocking<T> {
    type Error = T::Error;

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<(), T::Error> {
        RawSink::write(&mut self.inner, source, byte_count)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn flush(&mut self) -> Result<(), T::Error> {
        RawSink::flush(&mut self.inner)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    async fn close(&mut self) -> Result<(), T::Error> {
        RawSink::close(&mut self.inner)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Blocking<Buffer>: AsyncRawSource, AsyncRawSink, Send);

    #[test]
    fn completes_on_first_poll() {
        let mut transport = Blocking::new(Buffer::from("hello"));
        let mut out = Buffer::new();

        let read = AsyncRawSource::read_at_most_to(&mut transport, &mut out, 3).now_or_never();
        assert_eq!(read.unwrap().unwrap(), Some(3));

        AsyncRawSink::write(&mut transport, &mut out, 3).now_or_never().unwrap().unwrap();
        AsyncRawSink::flush(&mut transport).now_or_never().unwrap().unwrap();

        assert_eq!(transport.into_inner(), b"lohel");
    }
}

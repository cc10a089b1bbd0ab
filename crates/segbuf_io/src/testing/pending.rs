// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::convert::Infallible;
use std::future;

use segbuf::Buffer;

use crate::{AsyncRawSink, AsyncRawSource};

/// An [`AsyncRawSource`] and [`AsyncRawSink`] that never completes any operation.
///
/// Intended for tests of cancellation and of code that must not wait on a transport.
#[derive(Debug, Default)]
pub struct Pending;

impl Pending {
    /// Creates a new `Pending`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl AsyncRawSource for Pending {
    type Error = Infallible;

    #[cfg_attr(test, mutants::skip)] // This does nothing, pointless to mutate.
    async fn read_at_most_to(&mut self, _sink: &mut Buffer, _byte_count: usize) -> Result<Option<usize>, Infallible> {
        future::pending::<()>().await;
        unreachable!();
    }

    #[cfg_attr(test, mutants::skip)] // This does nothing, pointless to mutate.
    async fn close(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

impl AsyncRawSink for Pending {
    type Error = Infallible;

    #[cfg_attr(test, mutants::skip)] // This does nothing, pointless to mutate.
    async fn write(&mut self, _source: &mut Buffer, _byte_count: usize) -> Result<(), Infallible> {
        future::pending::<()>().await;
        unreachable!();
    }

    #[cfg_attr(test, mutants::skip)] // This does nothing, pointless to mutate.
    async fn flush(&mut self) -> Result<(), Infallible> {
        future::pending::<()>().await;
        unreachable!();
    }

    #[cfg_attr(test, mutants::skip)] // This does nothing, pointless to mutate.
    async fn close(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use segbuf::{Buffer, Error};

use crate::{BufferedSource, RawSource};

/// Reads ahead through a [`BufferedSource`] without consuming its bytes.
///
/// Created by [`BufferedSource::peek()`]. Every byte produced is a copy of a byte held by the
/// upstream source, starting from the upstream's current read position. The upstream reads more
/// from its own transport when the peek source runs past what it has buffered.
#[derive(Debug)]
pub struct PeekSource<'a, R: RawSource> {
    upstream: &'a mut BufferedSource<R>,

    // Offset into the upstream buffer of the next byte to produce.
    offset: usize,
}

impl<'a, R: RawSource> PeekSource<'a, R> {
    pub(crate) fn new(upstream: &'a mut BufferedSource<R>) -> Self {
        Self { upstream, offset: 0 }
    }
}

impl<R: RawSource> RawSource for PeekSource<'_, R> {
    type Error = Error;

    fn read_at_most_to(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>, Error> {
        if byte_count == 0 {
            return Ok(Some(0));
        }

        if !self.upstream.request(self.offset + 1)? {
            return Ok(None);
        }

        let count = byte_count.min(self.upstream.buffer().len() - self.offset);
        self.upstream.buffer().copy_to(sink, self.offset, count);
        self.offset += count;

        Ok(Some(count))
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

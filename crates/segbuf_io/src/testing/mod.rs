// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Utilities for testing code that uses `segbuf_io` abstractions.

mod fake_sink;
mod fake_source;
mod pending;

pub use fake_sink::*;
pub use fake_source::*;
pub use pending::*;

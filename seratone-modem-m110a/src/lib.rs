// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Seratone crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

//! MIL-STD-188-110A serial-tone HF modem waveform codec.

pub mod chan;
pub mod eq;
pub mod fec;
pub mod gray;
pub mod interleave;
pub mod mapping;
pub mod mode;
pub mod passband;
pub mod preamble;
pub mod rx;
pub mod scrambler;
pub mod sync;
pub mod tx;

pub use seratone_core::errors;

pub use mode::ModeId;
pub use rx::{DecodeResult, Receiver, RxConfig};
pub use tx::{Transmitter, TxConfig};

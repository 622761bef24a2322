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

//! Pure Rust MIL-STD-188-110A serial-tone HF modem.
//!
//! This crate re-exports the Seratone workspace behind a small convenience surface. Use
//! [`encode`] and [`decode`] for one-shot conversions, or construct
//! [`Transmitter`]/[`Receiver`] sessions directly for full control over the mode, equaliser,
//! and search parameters.

pub use seratone_core::dsp;
pub use seratone_core::errors;
pub use seratone_core::wave;

pub use seratone_modem_m110a::{chan, eq, fec, gray, interleave, mapping, mode, passband};
pub use seratone_modem_m110a::{preamble, rx, scrambler, sync, tx};

pub use seratone_modem_m110a::{DecodeResult, ModeId, Receiver, RxConfig, Transmitter, TxConfig};

use seratone_core::errors::Result;

/// Encode a payload into a 48 kHz audio waveform with default settings.
pub fn encode(data: &[u8], mode: ModeId) -> Result<Vec<f32>> {
    Transmitter::new(TxConfig::for_mode(mode))?.encode(data)
}

/// Decode a 48 kHz audio waveform with default settings: automatic mode detection and the DFE
/// equaliser.
pub fn decode(samples: &[f32]) -> DecodeResult {
    match Receiver::new(RxConfig::default()) {
        Ok(receiver) => receiver.decode(samples),
        Err(err) => DecodeResult { error: Some(err), ..Default::default() },
    }
}

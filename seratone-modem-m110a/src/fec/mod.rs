// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `fec` module implements the rate-1/2, constraint-length-7 convolutional code: the
//! encoder, the hard-decision Viterbi decoder, and the soft-input/soft-output (BCJR) decoder
//! used by the turbo equaliser.

mod conv;
mod siso;
mod viterbi;

pub use conv::{encode, Trellis, CONSTRAINT_LENGTH, FLUSH_BITS, G1, G2, NUM_STATES};
pub use siso::{SisoConfig, SisoDecoder};
pub use viterbi::decode_block;

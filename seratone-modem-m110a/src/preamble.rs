// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `preamble` module generates the synchronisation preamble and maps its mode probes.
//!
//! The preamble is eleven 32-symbol blocks: nine common blocks whose D-patterns follow a fixed
//! selector sequence, then the D1 and D2 mode probes. Each block repeats an 8-entry Walsh
//! pattern four times and adds the 32-entry preamble scrambler modulo 8. The whole sequence is
//! deterministic and bit-for-bit reproducible.

use once_cell::sync::Lazy;

use seratone_core::dsp::complex::Complex;

use crate::mapping::PSK8;
use crate::mode::ModeId;

/// Symbols in one preamble block.
pub const BLOCK_LEN: usize = 32;

/// Symbols in the common segment (nine blocks).
pub const COMMON_LEN: usize = 288;

/// Total preamble symbols: common segment plus the two mode probes.
pub const TOTAL_LEN: usize = 352;

/// Symbol offset of the D1 probe.
pub const D1_OFFSET: usize = COMMON_LEN;

/// Symbol offset of the D2 probe.
pub const D2_OFFSET: usize = COMMON_LEN + BLOCK_LEN;

/// The eight order-8 Walsh patterns over constellation points {0, 4}.
pub const PSYMBOL: [[u8; 8]; 8] = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 4, 0, 4, 0, 4, 0, 4],
    [0, 0, 4, 4, 0, 0, 4, 4],
    [0, 4, 4, 0, 0, 4, 4, 0],
    [0, 0, 0, 0, 4, 4, 4, 4],
    [0, 4, 0, 4, 4, 0, 4, 0],
    [0, 0, 4, 4, 4, 4, 0, 0],
    [0, 4, 4, 0, 4, 0, 0, 4],
];

/// The 32-entry preamble scrambler sequence.
pub const PSCRAMBLE: [u8; 32] = [
    7, 4, 3, 0, 5, 1, 5, 0, 2, 2, 1, 1, 5, 7, 4, 3, 5, 0, 2, 6, 2, 1, 6, 2, 0, 0, 5, 0, 5, 2, 6,
    6,
];

/// D-pattern selector for the nine common blocks.
pub const P_C_SEQ: [u8; 9] = [0, 1, 3, 0, 1, 3, 1, 2, 0];

/// The constellation position of preamble symbol `k` within a block carrying pattern `d`.
///
/// `k` is the absolute symbol offset within the preamble; the scramble index runs continuously
/// and, being 32-periodic, aligns with block boundaries.
#[inline]
fn block_symbol(d: u8, k: usize) -> u8 {
    (PSYMBOL[d as usize][k % 8] + PSCRAMBLE[k % 32]) & 7
}

/// Generate the constellation positions of a full preamble carrying the given mode probes.
pub fn positions(d1: u8, d2: u8) -> [u8; TOTAL_LEN] {
    let mut out = [0u8; TOTAL_LEN];

    for (k, slot) in out.iter_mut().enumerate() {
        let d = match k / BLOCK_LEN {
            b @ 0..=8 => P_C_SEQ[b],
            9 => d1,
            _ => d2,
        };
        *slot = block_symbol(d, k);
    }

    out
}

/// The reference symbols of the common segment, shared by the correlator and the channel
/// estimator.
pub static COMMON_REFERENCE: Lazy<[Complex; COMMON_LEN]> = Lazy::new(|| {
    let mut out = [Complex::zero(); COMMON_LEN];
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = PSK8[block_symbol(P_C_SEQ[k / BLOCK_LEN], k) as usize];
    }
    out
});

/// Generate the first `count` common-segment reference symbols (at most [`COMMON_LEN`]).
pub fn reference(count: usize) -> &'static [Complex] {
    &COMMON_REFERENCE[..count.min(COMMON_LEN)]
}

/// The reference symbols of one mode-probe block hypothesis at the given probe offset.
pub fn probe_reference(d: u8, offset: usize) -> [Complex; BLOCK_LEN] {
    let mut out = [Complex::zero(); BLOCK_LEN];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = PSK8[block_symbol(d, offset + i) as usize];
    }
    out
}

/// The (D1, D2) probe values of a mode.
pub fn probes_of_mode(mode: ModeId) -> (u8, u8) {
    match mode {
        ModeId::M4800S => (7, 6),
        ModeId::M2400S => (6, 4),
        ModeId::M2400L => (4, 4),
        ModeId::M1200S => (6, 5),
        ModeId::M1200L => (4, 5),
        ModeId::M600S => (6, 6),
        ModeId::M600L => (4, 6),
        ModeId::M300S => (6, 7),
        ModeId::M300L => (4, 7),
        ModeId::M150S => (7, 4),
        ModeId::M150L => (5, 4),
        ModeId::M75S => (7, 5),
        ModeId::M75L => (5, 5),
    }
}

/// The mode identified by a (D1, D2) probe pair, if any.
pub fn mode_of_probes(d1: u8, d2: u8) -> Option<ModeId> {
    match (d1, d2) {
        (7, 6) => Some(ModeId::M4800S),
        (6, 4) => Some(ModeId::M2400S),
        (4, 4) => Some(ModeId::M2400L),
        (6, 5) => Some(ModeId::M1200S),
        (4, 5) => Some(ModeId::M1200L),
        (6, 6) => Some(ModeId::M600S),
        (4, 6) => Some(ModeId::M600L),
        (6, 7) => Some(ModeId::M300S),
        (4, 7) => Some(ModeId::M300L),
        (7, 4) => Some(ModeId::M150S),
        (5, 4) => Some(ModeId::M150L),
        (7, 5) => Some(ModeId::M75S),
        (5, 5) => Some(ModeId::M75L),
        _ => None,
    }
}

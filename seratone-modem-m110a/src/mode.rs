// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mode` module defines the thirteen operating modes and their parameters.

use std::fmt;

/// The channel symbol rate, in symbols per second. Constant across all modes.
pub const BAUD: u32 = 2400;

/// An operating mode: a user bit rate paired with an interleaver length.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModeId {
    /// 75 bps, short interleave.
    M75S,
    /// 75 bps, long interleave.
    M75L,
    /// 150 bps, short interleave.
    M150S,
    /// 150 bps, long interleave.
    M150L,
    /// 300 bps, short interleave.
    M300S,
    /// 300 bps, long interleave.
    M300L,
    /// 600 bps, short interleave.
    M600S,
    /// 600 bps, long interleave.
    M600L,
    /// 1200 bps, short interleave.
    M1200S,
    /// 1200 bps, long interleave.
    M1200L,
    /// 2400 bps, short interleave.
    M2400S,
    /// 2400 bps, long interleave.
    M2400L,
    /// 4800 bps, uncoded and uninterleaved.
    M4800S,
}

impl ModeId {
    /// All thirteen modes, in rate order.
    pub const ALL: [ModeId; 13] = [
        ModeId::M75S,
        ModeId::M75L,
        ModeId::M150S,
        ModeId::M150L,
        ModeId::M300S,
        ModeId::M300L,
        ModeId::M600S,
        ModeId::M600L,
        ModeId::M1200S,
        ModeId::M1200L,
        ModeId::M2400S,
        ModeId::M2400L,
        ModeId::M4800S,
    ];
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(lookup(*self).name)
    }
}

/// The modulation used by a mode's data symbols.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Modulation {
    /// Binary PSK on constellation points 0 and 4.
    Bpsk,
    /// Quaternary PSK on constellation points 0, 2, 4, 6.
    Qpsk,
    /// Full 8-ary PSK.
    Psk8,
}

impl Modulation {
    /// Bits carried by one data symbol.
    #[inline]
    pub fn bits_per_symbol(&self) -> usize {
        match *self {
            Modulation::Bpsk => 1,
            Modulation::Qpsk => 2,
            Modulation::Psk8 => 3,
        }
    }
}

/// Block interleaver dimensions and increments.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterleaverSpec {
    pub rows: usize,
    pub cols: usize,
    /// Row step while loading. Coprime with `rows`.
    pub row_inc: usize,
    /// Column step while fetching. Coprime with `cols`.
    pub col_inc: usize,
}

impl InterleaverSpec {
    /// The number of soft-bit cells in one block.
    #[inline]
    pub fn block_bits(&self) -> usize {
        self.rows * self.cols
    }
}

// Every interleaver loads on a row stride of 9 and fetches on a column stride of -17 (expressed
// modulo the column count).
const fn il(rows: usize, cols: usize) -> InterleaverSpec {
    InterleaverSpec { rows, cols, row_inc: 9, col_inc: (cols + cols - 17) % cols }
}

/// The full parameter set of one operating mode.
#[derive(Copy, Clone, Debug)]
pub struct ModeSpec {
    /// Human-readable name.
    pub name: &'static str,
    /// Nominal user bit rate, in bps.
    pub bit_rate: u32,
    /// Data-symbol modulation.
    pub modulation: Modulation,
    /// Coded-bit-pair repetition factor. 1 for modes without repetition.
    pub repetition: usize,
    /// Whether the rate-1/2 convolutional code is applied.
    pub fec: bool,
    /// Interleaver dimensions, or `None` for the uncoded mode.
    pub interleaver: Option<InterleaverSpec>,
    /// Data symbols per frame. Zero when the mode has no probes.
    pub unknown_len: usize,
    /// Probe symbols per frame. Zero when the mode has no probes.
    pub known_len: usize,
}

impl ModeSpec {
    /// Bits carried by one data symbol.
    #[inline]
    pub fn bits_per_symbol(&self) -> usize {
        self.modulation.bits_per_symbol()
    }

    /// Whether the mode inserts probe frames between data blocks.
    #[inline]
    pub fn has_probes(&self) -> bool {
        self.unknown_len > 0 && self.known_len > 0
    }

    /// Data plus probe symbols in one frame.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.unknown_len + self.known_len
    }
}

const fn spec(
    name: &'static str,
    bit_rate: u32,
    modulation: Modulation,
    repetition: usize,
    fec: bool,
    interleaver: Option<InterleaverSpec>,
    unknown_len: usize,
    known_len: usize,
) -> ModeSpec {
    ModeSpec { name, bit_rate, modulation, repetition, fec, interleaver, unknown_len, known_len }
}

/// The mode registry, in [`ModeId::ALL`] order.
///
/// Short interleaver blocks hold 0.6 s and long blocks 4.8 s of the post-repetition coded
/// stream. The 75 bps modes run without probe frames, making their data-symbol stream
/// continuous; 4800 bps is uncoded and uninterleaved.
static MODES: [ModeSpec; 13] = [
    spec("75S", 75, Modulation::Bpsk, 16, true, Some(il(40, 36)), 0, 0),
    spec("75L", 75, Modulation::Bpsk, 16, true, Some(il(40, 288)), 0, 0),
    spec("150S", 150, Modulation::Bpsk, 4, true, Some(il(40, 18)), 20, 20),
    spec("150L", 150, Modulation::Bpsk, 4, true, Some(il(40, 144)), 20, 20),
    spec("300S", 300, Modulation::Bpsk, 2, true, Some(il(40, 18)), 20, 20),
    spec("300L", 300, Modulation::Bpsk, 2, true, Some(il(40, 144)), 20, 20),
    spec("600S", 600, Modulation::Bpsk, 1, true, Some(il(40, 18)), 20, 20),
    spec("600L", 600, Modulation::Bpsk, 1, true, Some(il(40, 144)), 20, 20),
    spec("1200S", 1200, Modulation::Qpsk, 1, true, Some(il(40, 36)), 20, 20),
    spec("1200L", 1200, Modulation::Qpsk, 1, true, Some(il(40, 288)), 20, 20),
    spec("2400S", 2400, Modulation::Psk8, 1, true, Some(il(40, 72)), 32, 16),
    spec("2400L", 2400, Modulation::Psk8, 1, true, Some(il(40, 576)), 32, 16),
    spec("4800S", 4800, Modulation::Psk8, 1, false, None, 32, 16),
];

/// Look up the parameters of a mode.
pub fn lookup(mode: ModeId) -> &'static ModeSpec {
    &MODES[mode as usize]
}

// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mapping` module converts between bits, constellation positions, and symbols.
//!
//! Transmit direction: pack `bits_per_symbol` post-interleaver bits MSB first, apply the Gray
//! table, add the scrambler tribit, emit the unit-magnitude constellation point. Receive
//! direction: classify the noisy sample to the nearest position, subtract the scrambler,
//! invert the Gray table, and expand to signed-magnitude soft bits.
//!
//! The byte/bit convention of the payload itself is LSB first: bit 0 of each byte is the first
//! on the wire.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use seratone_core::dsp::complex::Complex;

use crate::gray::{INV_MGD2, INV_MGD3, MGD2, MGD3};
use crate::mode::Modulation;

/// A soft bit: +127 means a confident 0, -127 a confident 1.
pub type SoftBit = i8;

/// The 8-PSK constellation. Position `p` sits at an angle of `p * 45` degrees.
pub const PSK8: [Complex; 8] = [
    Complex { re: 1.0, im: 0.0 },
    Complex { re: FRAC_1_SQRT_2, im: FRAC_1_SQRT_2 },
    Complex { re: 0.0, im: 1.0 },
    Complex { re: -FRAC_1_SQRT_2, im: FRAC_1_SQRT_2 },
    Complex { re: -1.0, im: 0.0 },
    Complex { re: -FRAC_1_SQRT_2, im: -FRAC_1_SQRT_2 },
    Complex { re: 0.0, im: -1.0 },
    Complex { re: FRAC_1_SQRT_2, im: -FRAC_1_SQRT_2 },
];

/// Classify a noisy sample to the nearest constellation position.
#[inline]
pub fn position_of(sym: Complex) -> u8 {
    let sector = (sym.arg() * 4.0 / PI).round() as i32;
    (sector.rem_euclid(8)) as u8
}

/// Map a packed data value (MSB-first bit order) to a constellation position, before
/// scrambling.
#[inline]
pub fn map_value(value: u8, modulation: Modulation) -> u8 {
    match modulation {
        // BPSK puts bit 0 at position 0 and bit 1 at position 4; no Gray coding applies.
        Modulation::Bpsk => {
            if value != 0 {
                4
            }
            else {
                0
            }
        }
        // QPSK occupies the even positions.
        Modulation::Qpsk => 2 * MGD2[(value & 3) as usize],
        Modulation::Psk8 => MGD3[(value & 7) as usize],
    }
}

/// Expand a descrambled constellation position into soft bits, appending them to `out`.
///
/// Hard-classified positions expand to full-scale +/-127 metrics. For BPSK the two positions
/// orthogonal to the decision axis are ambiguous and expand to half-scale +/-64.
pub fn soft_bits_of(descrambled: u8, modulation: Modulation, out: &mut Vec<SoftBit>) {
    match modulation {
        Modulation::Bpsk => {
            let sb = match descrambled {
                0 | 1 | 7 => 127,
                3 | 4 | 5 => -127,
                2 => 64,
                _ => -64,
            };
            out.push(sb);
        }
        Modulation::Qpsk => {
            // Round the 8-ary position to the nearest even (QPSK) position.
            let qpsk = ((descrambled + 1) / 2) & 3;
            let dibit = INV_MGD2[qpsk as usize];
            out.push(if dibit & 2 != 0 { -127 } else { 127 });
            out.push(if dibit & 1 != 0 { -127 } else { 127 });
        }
        Modulation::Psk8 => {
            let tribit = INV_MGD3[descrambled as usize];
            out.push(if tribit & 4 != 0 { -127 } else { 127 });
            out.push(if tribit & 2 != 0 { -127 } else { 127 });
            out.push(if tribit & 1 != 0 { -127 } else { 127 });
        }
    }
}

/// Pack a run of hard bits (MSB first) into data values of `bits_per_symbol` width.
pub fn pack_values(bits: &[u8], bits_per_symbol: usize) -> Vec<u8> {
    let mut values = Vec::with_capacity(bits.len() / bits_per_symbol);

    for chunk in bits.chunks_exact(bits_per_symbol) {
        let mut v = 0u8;
        for &b in chunk {
            v = (v << 1) | (b & 1);
        }
        values.push(v);
    }

    values
}

/// Convert bytes to bits, LSB first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for i in 0..8 {
            bits.push((byte >> i) & 1);
        }
    }
    bits
}

/// Convert bits to bytes, LSB first. Trailing bits that do not fill a byte are dropped.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(bits.len() / 8);
    for chunk in bits.chunks_exact(8) {
        let mut byte = 0u8;
        for (i, &b) in chunk.iter().enumerate() {
            if b != 0 {
                byte |= 1 << i;
            }
        }
        bytes.push(byte);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_position_classification() {
        for (p, &point) in PSK8.iter().enumerate() {
            assert_eq!(position_of(point), p as u8);

            // A small perturbation must not change the decision.
            let noisy = point + Complex::new(0.05, -0.05);
            assert_eq!(position_of(noisy), p as u8);
        }
    }

    #[test]
    fn verify_map_demap_round_trip() {
        // Mapping a value and expanding the resulting position back to soft bits must recover
        // the original bits at full confidence.
        for bps in 1..=3usize {
            let modulation = match bps {
                1 => Modulation::Bpsk,
                2 => Modulation::Qpsk,
                _ => Modulation::Psk8,
            };

            for value in 0..(1u8 << bps) {
                let pos = map_value(value, modulation);

                let mut soft = Vec::new();
                soft_bits_of(pos, modulation, &mut soft);
                assert_eq!(soft.len(), bps);

                let mut recovered = 0u8;
                for &sb in &soft {
                    assert_eq!(sb.unsigned_abs(), 127);
                    recovered = (recovered << 1) | u8::from(sb < 0);
                }
                assert_eq!(recovered, value);
            }
        }
    }

    #[test]
    fn verify_bpsk_ambiguous_positions() {
        let mut soft = Vec::new();
        soft_bits_of(2, Modulation::Bpsk, &mut soft);
        soft_bits_of(6, Modulation::Bpsk, &mut soft);
        assert_eq!(soft, vec![64, -64]);
    }

    #[test]
    fn verify_lsb_first_byte_convention() {
        // 0x01 must emit its set bit first; a reversed convention would emit it last.
        assert_eq!(bytes_to_bits(&[0x01])[0], 1);
        assert_eq!(bytes_to_bits(&[0x80])[7], 1);

        let bytes = [0xA5, 0x3C, 0x01, 0xFE];
        assert_eq!(bits_to_bytes(&bytes_to_bits(&bytes)), bytes);
    }

    #[test]
    fn verify_pack_values_msb_first() {
        assert_eq!(pack_values(&[1, 0, 1, 0, 1, 1], 3), vec![0b101, 0b011]);
        assert_eq!(pack_values(&[1, 0], 2), vec![0b10]);
    }
}

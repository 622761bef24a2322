// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `tx` module assembles the transmit pipeline.
//!
//! Bytes are serialised LSB first, convolutionally encoded, repeated for the low-rate modes,
//! interleaved per block, packed into data values, Gray mapped, scrambled, and woven into
//! frames of unknown (data) and known (probe) symbols behind the synchronisation preamble.
//! The pulse shaper then produces the audio waveform.

use log::debug;

use seratone_core::wave;

use crate::errors::{config_error, Result};
use crate::fec;
use crate::interleave::BlockInterleaver;
use crate::mapping::{bytes_to_bits, map_value, pack_values};
use crate::mode::{lookup, ModeId, ModeSpec};
use crate::passband::Modulator;
use crate::preamble;
use crate::scrambler::{scramble, Scrambler};

/// The end-of-message marker, appended to the payload bits when enabled.
pub const EOM_BYTES: [u8; 4] = [0x4B, 0x65, 0xA5, 0xB2];

/// Carrier-settling symbols sent ahead of the preamble when enabled.
pub const LEADING_SYMBOLS: usize = 32;

/// Transmitter configuration.
#[derive(Copy, Clone, Debug)]
pub struct TxConfig {
    /// Operating mode.
    pub mode: ModeId,
    /// Output sample rate: 48000, or 9600 via the 5:1 resampling layer.
    pub sample_rate: u32,
    /// Peak amplitude of the waveform, within `[0, 1]`.
    pub amplitude: f32,
    /// Prepend the synchronisation preamble.
    pub include_preamble: bool,
    /// Append the end-of-message marker to the payload.
    pub include_eom: bool,
    /// Send carrier-settling symbols ahead of the preamble. Disable for wire compatibility
    /// with third-party modems that expect the bare standard preamble.
    pub include_leading_symbols: bool,
}

impl Default for TxConfig {
    fn default() -> Self {
        TxConfig {
            mode: ModeId::M2400S,
            sample_rate: wave::SAMPLE_RATE,
            amplitude: 1.0,
            include_preamble: true,
            include_eom: true,
            include_leading_symbols: true,
        }
    }
}

impl TxConfig {
    /// A default configuration for the given mode.
    pub fn for_mode(mode: ModeId) -> TxConfig {
        TxConfig { mode, ..Default::default() }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.amplitude) {
            return config_error("amplitude must be within [0, 1]");
        }
        if self.sample_rate != wave::SAMPLE_RATE && self.sample_rate != wave::SAMPLE_RATE_COMPAT
        {
            return config_error("sample rate must be 48000 or 9600");
        }
        Ok(())
    }
}

/// The transmitter for one session.
#[derive(Clone)]
pub struct Transmitter {
    config: TxConfig,
    spec: &'static ModeSpec,
}

impl Transmitter {
    pub fn new(config: TxConfig) -> Result<Transmitter> {
        config.validate()?;
        Ok(Transmitter { config, spec: lookup(config.mode) })
    }

    pub fn config(&self) -> &TxConfig {
        &self.config
    }

    /// Encode a payload into an audio waveform.
    ///
    /// A zero-length payload produces a preamble-only waveform.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<f32>> {
        let positions = self.burst_positions(data);

        debug!("tx: {} bytes as {} channel symbols ({})", data.len(), positions.len(), self.spec.name);

        let audio = Modulator::new(self.config.amplitude).modulate(&positions);

        if self.config.sample_rate == wave::SAMPLE_RATE_COMPAT {
            return Ok(wave::decimate_5(&audio));
        }
        Ok(audio)
    }

    /// Generate the preamble waveform alone.
    pub fn generate_preamble(&self) -> Vec<f32> {
        let (d1, d2) = preamble::probes_of_mode(self.config.mode);
        let audio = Modulator::new(self.config.amplitude)
            .modulate(&preamble::positions(d1, d2));

        if self.config.sample_rate == wave::SAMPLE_RATE_COMPAT {
            return wave::decimate_5(&audio);
        }
        audio
    }

    /// The transmit duration of a payload, in seconds, at the configured rate.
    pub fn duration(&self, data_bytes: usize) -> f32 {
        let symbols = self.burst_positions(&vec![0u8; data_bytes]).len();
        symbols as f32 / crate::mode::BAUD as f32
    }

    /// The complete burst, as constellation positions.
    fn burst_positions(&self, data: &[u8]) -> Vec<u8> {
        let mut positions = Vec::new();

        if self.config.include_leading_symbols {
            positions.extend(std::iter::repeat(0u8).take(LEADING_SYMBOLS));
        }

        if self.config.include_preamble {
            let (d1, d2) = preamble::probes_of_mode(self.config.mode);
            positions.extend_from_slice(&preamble::positions(d1, d2));
        }

        positions.extend(self.data_positions(data));
        positions
    }

    /// The data section: coded, interleaved, mapped, scrambled, and framed with probes.
    fn data_positions(&self, data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }

        let mut bits = bytes_to_bits(data);
        if self.config.include_eom {
            bits.extend(bytes_to_bits(&EOM_BYTES));
        }

        let mut coded = if self.spec.fec { fec::encode(&bits) } else { bits };

        // Low-rate modes repeat each (G1, G2) coded pair.
        if self.spec.repetition > 1 {
            let mut repeated = Vec::with_capacity(coded.len() * self.spec.repetition);
            for pair in coded.chunks_exact(2) {
                for _ in 0..self.spec.repetition {
                    repeated.extend_from_slice(pair);
                }
            }
            coded = repeated;
        }

        let bps = self.spec.bits_per_symbol();

        let values = match self.spec.interleaver.as_ref() {
            Some(il_spec) => {
                let il = BlockInterleaver::new(il_spec);
                while coded.len() % il.block_bits() != 0 {
                    coded.push(0);
                }
                pack_values(&il.interleave_stream(&coded), bps)
            }
            None => {
                // The uncoded mode has no interleaver; pad the values to whole frames so the
                // probe pattern completes.
                while coded.len() % bps != 0 {
                    coded.push(0);
                }
                let mut values = pack_values(&coded, bps);
                if self.spec.has_probes() {
                    while values.len() % self.spec.unknown_len != 0 {
                        values.push(0);
                    }
                }
                values
            }
        };

        // One continuous scrambler covers data and probe symbols alike.
        let mut positions = Vec::new();
        let mut scr = Scrambler::new();

        if !self.spec.has_probes() {
            for &v in &values {
                positions.push(scramble(map_value(v, self.spec.modulation), scr.next()));
            }
            return positions;
        }

        let mut idx = 0;
        while idx < values.len() {
            for _ in 0..self.spec.unknown_len {
                // Whole blocks always fill whole frames; the guard is for form.
                if idx >= values.len() {
                    break;
                }
                positions
                    .push(scramble(map_value(values[idx], self.spec.modulation), scr.next()));
                idx += 1;
            }

            // Probe symbols carry the bare scrambler sequence.
            for _ in 0..self.spec.known_len {
                positions.push(scr.next());
            }
        }

        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passband::{RRC_SPAN, SPS};
    use crate::scrambler;

    #[test]
    fn verify_empty_payload_is_preamble_only() {
        let tx = Transmitter::new(TxConfig {
            include_leading_symbols: false,
            ..TxConfig::for_mode(ModeId::M75S)
        })
        .unwrap();

        let audio = tx.encode(&[]).unwrap();
        assert_eq!(audio.len(), preamble::TOTAL_LEN * SPS + RRC_SPAN * SPS + 1);
    }

    #[test]
    fn verify_leading_symbols_lengthen_burst() {
        let without = Transmitter::new(TxConfig {
            include_leading_symbols: false,
            ..TxConfig::default()
        })
        .unwrap();
        let with = Transmitter::new(TxConfig::default()).unwrap();

        let delta = with.encode(&[]).unwrap().len() - without.encode(&[]).unwrap().len();
        assert_eq!(delta, LEADING_SYMBOLS * SPS);
    }

    #[test]
    fn verify_frame_structure_2400() {
        let tx = Transmitter::new(TxConfig {
            include_preamble: false,
            include_leading_symbols: false,
            include_eom: false,
            ..TxConfig::for_mode(ModeId::M2400S)
        })
        .unwrap();

        let positions = tx.data_positions(&[0u8; 54]);

        // One interleaver block: 2880 bits, 960 data symbols, 30 frames of 32+16.
        assert_eq!(positions.len(), 960 + 30 * 16);

        // Probe symbols carry the bare scrambler: check the first frame's probe block.
        let mut scr = scrambler::Scrambler::new();
        scr.skip(32);
        for i in 0..16 {
            assert_eq!(positions[32 + i], scr.next());
        }
    }

    #[test]
    fn verify_no_probes_at_75_bps() {
        let tx = Transmitter::new(TxConfig {
            include_preamble: false,
            include_leading_symbols: false,
            include_eom: false,
            ..TxConfig::for_mode(ModeId::M75S)
        })
        .unwrap();

        // One byte -> 8 bits -> 28 coded -> 448 repeated -> one 1440-bit block.
        let positions = tx.data_positions(&[0xFF]);
        assert_eq!(positions.len(), 1440);
    }

    #[test]
    fn verify_amplitude_bounds_enforced() {
        assert!(Transmitter::new(TxConfig { amplitude: 1.5, ..Default::default() }).is_err());
        assert!(Transmitter::new(TxConfig { amplitude: -0.1, ..Default::default() }).is_err());
        assert!(Transmitter::new(TxConfig { sample_rate: 44100, ..Default::default() }).is_err());
    }

    #[test]
    fn verify_compat_rate_output_length() {
        let tx = Transmitter::new(TxConfig {
            sample_rate: wave::SAMPLE_RATE_COMPAT,
            ..Default::default()
        })
        .unwrap();

        let full = Transmitter::new(TxConfig::default()).unwrap();
        let a = tx.encode(b"hi").unwrap();
        let b = full.encode(b"hi").unwrap();

        assert_eq!(a.len(), b.len() / 5);
    }

    #[test]
    fn verify_waveform_scales_with_amplitude() {
        let peak = |amplitude: f32| {
            let tx = Transmitter::new(TxConfig { amplitude, ..Default::default() }).unwrap();
            let audio = tx.encode(b"THE QUICK BROWN FOX").unwrap();
            audio.iter().fold(0.0f32, |m, &s| m.max(s.abs()))
        };

        let full = peak(1.0);
        let quarter = peak(0.25);

        assert!((quarter - full * 0.25).abs() < 1e-4);
    }

    #[test]
    fn verify_duration_scales_with_rate() {
        let fast = Transmitter::new(TxConfig::for_mode(ModeId::M2400S)).unwrap();
        let slow = Transmitter::new(TxConfig::for_mode(ModeId::M150S)).unwrap();

        assert!(slow.duration(100) > fast.duration(100));
    }
}

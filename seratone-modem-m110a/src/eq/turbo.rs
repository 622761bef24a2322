// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turbo equalisation: iterative exchange of soft information between the MLSE and the SISO
//! decoder.
//!
//! Each iteration runs soft MLSE with the previous round's symbol priors, soft-descrambles and
//! soft-demaps the per-symbol probabilities into bit LLRs, deinterleaves, combines bit-pair
//! repetitions, and decodes with the SISO. The decoder's extrinsic output is damped,
//! soft-re-encoded into coded-bit LLRs, spread back across the repetitions, re-interleaved, and
//! mapped into symbol priors for the next pass. Iteration stops early when the mean absolute
//! change of the extrinsic falls below threshold.
//!
//! The coordinator owns the MLSE, the SISO, and the interleaver; the SISO never calls back
//! into the MLSE.

use log::debug;

use seratone_core::dsp::complex::Complex;

use crate::chan::ChannelEstimate;
use crate::errors::{config_error, Result};
use crate::fec::{SisoConfig, SisoDecoder};
use crate::interleave::BlockInterleaver;
use crate::mapping::map_value;
use crate::mode::{lookup, ModeId, ModeSpec, Modulation};

use super::mlse::{Mlse, MlseConfig};

const LLR_CLIP: f32 = 20.0;
const EPS: f32 = 1e-10;

/// Turbo equaliser parameters.
#[derive(Copy, Clone, Debug)]
pub struct TurboConfig {
    /// Maximum equaliser/decoder iterations.
    pub max_iterations: usize,
    /// Early-stop threshold on the mean absolute extrinsic change.
    pub convergence_threshold: f32,
    /// Damping applied to extrinsic information before feedback.
    pub damping: f32,
    /// Channel memory of the inner MLSE.
    pub channel_memory: usize,
    /// Noise variance for soft metrics.
    pub noise_variance: f32,
}

impl Default for TurboConfig {
    fn default() -> Self {
        TurboConfig {
            max_iterations: 5,
            convergence_threshold: 0.1,
            damping: 0.7,
            channel_memory: 3,
            noise_variance: 0.1,
        }
    }
}

/// Outcome counters of the last decode.
#[derive(Copy, Clone, Debug, Default)]
pub struct TurboStats {
    pub iterations: usize,
    pub converged: bool,
}

/// The turbo equaliser.
pub struct TurboEqualizer {
    config: TurboConfig,
    spec: &'static ModeSpec,
    mlse: Mlse,
    siso: SisoDecoder,
    interleaver: BlockInterleaver,
    stats: TurboStats,
}

impl TurboEqualizer {
    /// Build a turbo equaliser for a mode. Only coded, interleaved modes are eligible.
    pub fn new(mode: ModeId, config: TurboConfig) -> Result<TurboEqualizer> {
        let spec = lookup(mode);

        let Some(il_spec) = spec.interleaver.as_ref() else {
            return config_error("turbo equalizer requires an interleaved mode");
        };
        if !spec.fec {
            return config_error("turbo equalizer requires a coded mode");
        }

        let mlse = Mlse::new(MlseConfig {
            channel_memory: config.channel_memory,
            noise_variance: config.noise_variance,
            ..Default::default()
        });

        Ok(TurboEqualizer {
            config,
            spec,
            mlse,
            siso: SisoDecoder::new(SisoConfig::default()),
            interleaver: BlockInterleaver::new(il_spec),
            stats: TurboStats::default(),
        })
    }

    /// Counters from the last decode.
    pub fn stats(&self) -> TurboStats {
        self.stats
    }

    /// Iteratively equalise and decode a burst of data symbols.
    ///
    /// `received` holds the data symbols only (probes removed); `scramble` holds the scrambler
    /// tribit of each. Returns the decoded information bits of the padded codeword, flush and
    /// padding included.
    pub fn decode(
        &mut self,
        received: &[Complex],
        scramble: &[u8],
        channel: &ChannelEstimate,
    ) -> Vec<u8> {
        self.stats = TurboStats::default();

        let bps = self.spec.bits_per_symbol();
        let block_symbols = self.interleaver.block_bits() / bps;

        // Only whole interleaver blocks can participate.
        let usable = (received.len() / block_symbols) * block_symbols;
        if usable == 0 {
            return Vec::new();
        }
        let received = &received[..usable];
        let scramble = &scramble[..usable];

        self.mlse.set_channel(channel);

        let mut priors: Option<Vec<[f32; 8]>> = None;
        let mut prev_extrinsic: Vec<f32> = Vec::new();
        let mut extrinsic = Vec::new();

        for iter in 0..self.config.max_iterations {
            self.stats.iterations = iter + 1;

            let soft = self.mlse.soft_equalize(received, priors.as_deref());

            // Soft descramble, soft inverse Gray, and demap to bit LLRs in one pass.
            let mut bit_llrs = Vec::with_capacity(usable * bps);
            for (i, sym) in soft.iter().enumerate() {
                let value_probs = self.value_probs(&sym.probs, scramble[i]);
                push_bit_llrs(&value_probs, bps, &mut bit_llrs);
            }

            let deinterleaved = self.interleaver.deinterleave_stream(&bit_llrs);
            let channel_llrs = self.combine_repetitions(&deinterleaved);

            extrinsic = self.siso.decode(&channel_llrs, &[]);

            // Early termination on extrinsic stability.
            if iter > 0 && !prev_extrinsic.is_empty() {
                let change: f32 = extrinsic
                    .iter()
                    .zip(prev_extrinsic.iter())
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f32>()
                    / extrinsic.len().max(1) as f32;

                debug!("turbo: iteration {} extrinsic change {:.4}", iter + 1, change);

                if change < self.config.convergence_threshold {
                    self.stats.converged = true;
                    break;
                }
            }
            prev_extrinsic.clone_from(&extrinsic);

            if iter + 1 == self.config.max_iterations {
                break;
            }

            // Feedback path: damp, soft re-encode, spread over repetitions, re-interleave, and
            // scramble into symbol priors.
            let damped: Vec<f32> =
                extrinsic.iter().map(|&e| e * self.config.damping).collect();
            let coded_llr = self.siso.soft_encode(&damped);
            let spread = self.spread_repetitions(&coded_llr, bit_llrs.len());
            let interleaved = self.interleaver.interleave_stream(&spread);

            priors = Some(self.symbol_priors(&interleaved, scramble));
        }

        // With no a-priori term the extrinsic is the full posterior; slice it to bits.
        extrinsic.iter().map(|&l| u8::from(l < 0.0)).collect()
    }

    /// Probability of each pre-Gray data value given descrambled position probabilities.
    fn value_probs(&self, probs: &[f32; 8], scramble: u8) -> [f32; 8] {
        // Undo the scrambler rotation: P(g = s) = P(p = s + scramble).
        let mut descrambled = [0.0f32; 8];
        for (s, d) in descrambled.iter_mut().enumerate() {
            *d = probs[(s + scramble as usize) & 7];
        }

        let mut value_probs = [0.0f32; 8];
        match self.spec.modulation {
            Modulation::Bpsk => {
                // Decision sectors around the two antipodal points.
                value_probs[0] = descrambled[7] + descrambled[0] + descrambled[1];
                value_probs[1] = descrambled[3] + descrambled[4] + descrambled[5];
            }
            Modulation::Qpsk => {
                for v in 0..4usize {
                    let pos = map_value(v as u8, Modulation::Qpsk) as usize;
                    value_probs[v] = descrambled[pos]
                        + 0.5 * (descrambled[(pos + 7) & 7] + descrambled[(pos + 1) & 7]);
                }
            }
            Modulation::Psk8 => {
                for v in 0..8usize {
                    value_probs[v] = descrambled[map_value(v as u8, Modulation::Psk8) as usize];
                }
            }
        }

        value_probs
    }

    /// Sum the repeated (G1, G2) metric pairs down to one pair per coded bit pair.
    fn combine_repetitions(&self, llrs: &[f32]) -> Vec<f32> {
        let rep = self.spec.repetition;
        if rep == 1 {
            return llrs.to_vec();
        }

        let group = 2 * rep;
        let mut combined = Vec::with_capacity(llrs.len() / rep);

        for chunk in llrs.chunks_exact(group) {
            let mut g1 = 0.0;
            let mut g2 = 0.0;
            for r in 0..rep {
                g1 += chunk[2 * r];
                g2 += chunk[2 * r + 1];
            }
            combined.push(g1);
            combined.push(g2);
        }

        combined
    }

    /// Spread coded-bit LLRs back across the repetitions, restoring the pre-combine length.
    fn spread_repetitions(&self, llrs: &[f32], target_len: usize) -> Vec<f32> {
        let rep = self.spec.repetition;

        let mut spread = Vec::with_capacity(target_len);
        if rep == 1 {
            spread.extend_from_slice(llrs);
        }
        else {
            for pair in llrs.chunks_exact(2) {
                for _ in 0..rep {
                    spread.push(pair[0]);
                    spread.push(pair[1]);
                }
            }
        }

        spread.resize(target_len, 0.0);
        spread
    }

    /// Convert interleaved bit LLRs into scrambled symbol priors for the next MLSE pass.
    fn symbol_priors(&self, bit_llrs: &[f32], scramble: &[u8]) -> Vec<[f32; 8]> {
        let bps = self.spec.bits_per_symbol();
        let mut priors = Vec::with_capacity(scramble.len());

        for (i, chunk) in bit_llrs.chunks_exact(bps).enumerate() {
            // Bit probabilities, MSB first.
            let mut p0 = [0.5f32; 3];
            for (b, &llr) in chunk.iter().enumerate() {
                let clamped = llr.clamp(-LLR_CLIP, LLR_CLIP);
                p0[b] = 1.0 / (1.0 + (-clamped).exp());
            }

            // Value probabilities as a product over the bits, placed at the value's
            // constellation position.
            let mut pos_probs = [EPS; 8];
            for v in 0..(1usize << bps) {
                let mut p = 1.0f32;
                for (b, &pb0) in p0.iter().take(bps).enumerate() {
                    let bit = (v >> (bps - 1 - b)) & 1;
                    p *= if bit == 0 { pb0 } else { 1.0 - pb0 };
                }
                pos_probs[map_value(v as u8, self.spec.modulation) as usize] += p;
            }

            // Re-apply the scrambler rotation: P(p = s + scramble) = P(g = s).
            let scr = scramble[i] as usize;
            let mut prior = [0.0f32; 8];
            for (s, &p) in pos_probs.iter().enumerate() {
                prior[(s + scr) & 7] = p;
            }

            let sum: f32 = prior.iter().sum();
            for p in prior.iter_mut() {
                *p /= sum;
            }

            priors.push(prior);
        }

        priors
    }
}

/// Append per-bit LLRs (MSB first) computed from data-value probabilities.
fn push_bit_llrs(value_probs: &[f32; 8], bps: usize, out: &mut Vec<f32>) {
    for b in 0..bps {
        let mask = 1usize << (bps - 1 - b);

        let mut p0 = 0.0f32;
        let mut p1 = 0.0f32;
        for (v, &p) in value_probs.iter().enumerate().take(1 << bps) {
            if v & mask == 0 {
                p0 += p;
            }
            else {
                p1 += p;
            }
        }

        out.push(((p0 + EPS) / (p1 + EPS)).ln().clamp(-LLR_CLIP, LLR_CLIP));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec;
    use crate::mapping::{bytes_to_bits, pack_values, PSK8};
    use crate::scrambler;

    /// Encode bytes the way the transmitter does, returning the data symbols and the scrambler
    /// offsets (a continuous scrambler with no probe interruptions).
    fn encode_symbols(data: &[u8], mode: ModeId) -> (Vec<Complex>, Vec<u8>) {
        let spec = lookup(mode);
        let il = BlockInterleaver::new(spec.interleaver.as_ref().unwrap());

        let bits = bytes_to_bits(data);
        let mut coded = fec::encode(&bits);

        if spec.repetition > 1 {
            let mut repeated = Vec::with_capacity(coded.len() * spec.repetition);
            for pair in coded.chunks(2) {
                for _ in 0..spec.repetition {
                    repeated.extend_from_slice(pair);
                }
            }
            coded = repeated;
        }

        while coded.len() % il.block_bits() != 0 {
            coded.push(0);
        }

        let interleaved = il.interleave_stream(&coded);
        let values = pack_values(&interleaved, spec.bits_per_symbol());

        let mut symbols = Vec::with_capacity(values.len());
        let mut scramble = Vec::with_capacity(values.len());
        let mut scr = scrambler::Scrambler::new();

        for &v in &values {
            let tri = scr.next();
            let pos = scrambler::scramble(map_value(v, spec.modulation), tri);
            symbols.push(PSK8[pos as usize]);
            scramble.push(tri);
        }

        (symbols, scramble)
    }

    #[test]
    fn verify_clean_decode_2400() {
        let data: Vec<u8> = (0..108).map(|i| (i * 37 + 11) as u8).collect();
        let (symbols, scramble) = encode_symbols(&data, ModeId::M2400S);

        let mut turbo = TurboEqualizer::new(ModeId::M2400S, TurboConfig::default()).unwrap();
        let bits =
            turbo.decode(&symbols, &scramble, &ChannelEstimate::identity(3, true));

        let expected = bytes_to_bits(&data);
        assert!(bits.len() >= expected.len());
        assert_eq!(&bits[..expected.len()], expected.as_slice());
    }

    #[test]
    fn verify_decode_through_isi() {
        use smallvec::SmallVec;

        let data: Vec<u8> = (0..108).map(|i| (i * 13 + 7) as u8).collect();
        let (symbols, scramble) = encode_symbols(&data, ModeId::M2400S);

        // A two-path channel with a half-power echo.
        let taps = [Complex::new(1.0, 0.0), Complex::new(0.5, 0.0)];
        let received: Vec<Complex> = (0..symbols.len())
            .map(|n| {
                let mut acc = symbols[n];
                if n >= 1 {
                    acc += symbols[n - 1] * taps[1];
                }
                acc
            })
            .collect();

        let channel = ChannelEstimate {
            taps: SmallVec::from_slice(&taps),
            main_tap: 0,
            delay_spread: 0.5,
            rms_error: 0.0,
            valid: true,
        };

        let mut turbo = TurboEqualizer::new(ModeId::M2400S, TurboConfig::default()).unwrap();
        let bits = turbo.decode(&received, &scramble, &channel);

        let expected = bytes_to_bits(&data);
        assert_eq!(&bits[..expected.len()], expected.as_slice());
        assert!(turbo.stats().iterations >= 1);
    }

    #[test]
    fn verify_rejects_uncoded_mode() {
        assert!(TurboEqualizer::new(ModeId::M4800S, TurboConfig::default()).is_err());
    }

    #[test]
    fn verify_repetition_mode_round_trip() {
        let data = [0x5Au8; 18];
        let (symbols, scramble) = encode_symbols(&data, ModeId::M300S);

        let mut turbo = TurboEqualizer::new(ModeId::M300S, TurboConfig::default()).unwrap();
        let bits =
            turbo.decode(&symbols, &scramble, &ChannelEstimate::identity(3, true));

        let expected = bytes_to_bits(&data);
        assert_eq!(&bits[..expected.len()], expected.as_slice());
    }
}

// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Soft-input/soft-output decoding of the convolutional code with the BCJR algorithm.
//!
//! The decoder computes forward and backward state metrics in the log domain and emits
//! extrinsic log-likelihood ratios (posterior minus a-priori) for the information bits. The
//! max-log approximation is the default; exact log-sum-exp accumulation is available when
//! accuracy matters more than speed.
//!
//! For turbo feedback the decoder also supports soft re-encoding: propagating a state
//! probability distribution forward through the encoder under soft inputs to produce coded-bit
//! LLRs.

use super::conv::{Trellis, NUM_STATES};

const LOG_ZERO: f32 = -1e30;

/// SISO decoder options.
#[derive(Copy, Clone, Debug)]
pub struct SisoConfig {
    /// Use the max-log approximation instead of exact log-sum-exp.
    pub max_log: bool,
    /// Output LLRs are clipped to this magnitude.
    pub llr_clip: f32,
}

impl Default for SisoConfig {
    fn default() -> Self {
        SisoConfig { max_log: true, llr_clip: 50.0 }
    }
}

/// The soft-input/soft-output decoder.
pub struct SisoDecoder {
    config: SisoConfig,
    trellis: Trellis,
}

impl SisoDecoder {
    pub fn new(config: SisoConfig) -> SisoDecoder {
        SisoDecoder { config, trellis: Trellis::new() }
    }

    /// Decode one block, returning extrinsic LLRs for the information bits.
    ///
    /// `channel_llr` holds two LLRs per information bit, `[g1_0, g2_0, g1_1, g2_1, ...]`, with
    /// positive values favouring bit 0. `apriori_llr` holds one LLR per information bit and may
    /// be empty for a uniform prior. An all-zero channel input is valid and yields all-zero
    /// extrinsic output.
    pub fn decode(&self, channel_llr: &[f32], apriori_llr: &[f32]) -> Vec<f32> {
        let num_bits = channel_llr.len() / 2;
        if num_bits == 0 {
            return Vec::new();
        }

        let apriori = |t: usize| apriori_llr.get(t).copied().unwrap_or(0.0);

        // Forward metrics. Encoding starts in the all-zero state.
        let mut alpha = vec![[LOG_ZERO; NUM_STATES]; num_bits + 1];
        alpha[0][0] = 0.0;

        for t in 0..num_bits {
            let (lg1, lg2) = (channel_llr[2 * t], channel_llr[2 * t + 1]);
            let la = apriori(t);

            let (head, tail) = alpha.split_at_mut(t + 1);
            let cur = &head[t];
            let next = &mut tail[0];

            for state in 0..NUM_STATES {
                let a = cur[state];
                if a <= LOG_ZERO {
                    continue;
                }

                for input in 0..2 {
                    let g = self.gamma(state, input, lg1, lg2, la);
                    let ns = self.trellis.next[state][input] as usize;
                    next[ns] = self.accumulate(next[ns], a + g);
                }
            }

            normalize(next);
        }

        // Backward metrics. The codeword may be unterminated, so every end state is allowed.
        let mut beta = vec![[LOG_ZERO; NUM_STATES]; num_bits + 1];
        beta[num_bits] = [0.0; NUM_STATES];

        for t in (0..num_bits).rev() {
            let (lg1, lg2) = (channel_llr[2 * t], channel_llr[2 * t + 1]);
            let la = apriori(t);

            let (head, tail) = beta.split_at_mut(t + 1);
            let cur = &mut head[t];
            let next = &tail[0];

            for state in 0..NUM_STATES {
                let mut acc = LOG_ZERO;
                for input in 0..2 {
                    let g = self.gamma(state, input, lg1, lg2, la);
                    let ns = self.trellis.next[state][input] as usize;
                    acc = self.accumulate(acc, next[ns] + g);
                }
                cur[state] = acc;
            }

            normalize(cur);
        }

        // Per-bit posteriors, reduced to extrinsic by removing the prior.
        let mut extrinsic = Vec::with_capacity(num_bits);

        for t in 0..num_bits {
            let (lg1, lg2) = (channel_llr[2 * t], channel_llr[2 * t + 1]);
            let la = apriori(t);

            let mut sum = [LOG_ZERO; 2];

            for state in 0..NUM_STATES {
                let a = alpha[t][state];
                if a <= LOG_ZERO {
                    continue;
                }

                for input in 0..2 {
                    let g = self.gamma(state, input, lg1, lg2, la);
                    let ns = self.trellis.next[state][input] as usize;
                    sum[input] = self.accumulate(sum[input], a + g + beta[t + 1][ns]);
                }
            }

            let llr = (sum[0] - sum[1]).clamp(-self.config.llr_clip, self.config.llr_clip);
            extrinsic.push(llr - la);
        }

        extrinsic
    }

    /// Decode one block, returning full a-posteriori LLRs for the information bits.
    pub fn decode_app(&self, channel_llr: &[f32], apriori_llr: &[f32]) -> Vec<f32> {
        let extrinsic = self.decode(channel_llr, apriori_llr);

        extrinsic
            .iter()
            .enumerate()
            .map(|(t, &e)| e + apriori_llr.get(t).copied().unwrap_or(0.0))
            .collect()
    }

    /// Soft re-encode information-bit LLRs into coded-bit LLRs.
    ///
    /// A state probability distribution is pushed forward through the encoder; at each step the
    /// two branch families accumulate probability mass for the coded bits being 0 or 1. Used to
    /// turn decoder extrinsic output into symbol priors for the turbo equaliser.
    pub fn soft_encode(&self, info_llr: &[f32]) -> Vec<f32> {
        let mut coded = Vec::with_capacity(info_llr.len() * 2);

        let mut state_prob = [0.0f32; NUM_STATES];
        state_prob[0] = 1.0;

        for &llr in info_llr {
            let clamped = llr.clamp(-self.config.llr_clip, self.config.llr_clip);
            let p0 = 1.0 / (1.0 + (-clamped).exp());
            let p_input = [p0, 1.0 - p0];

            let mut mass_g1 = [0.0f32; 2];
            let mut mass_g2 = [0.0f32; 2];
            let mut next_prob = [0.0f32; NUM_STATES];

            for state in 0..NUM_STATES {
                let sp = state_prob[state];
                if sp < 1e-12 {
                    continue;
                }

                for input in 0..2 {
                    let prob = sp * p_input[input];
                    mass_g1[self.trellis.out_g1[state][input] as usize] += prob;
                    mass_g2[self.trellis.out_g2[state][input] as usize] += prob;
                    next_prob[self.trellis.next[state][input] as usize] += prob;
                }
            }

            let llr_of = |mass: [f32; 2]| {
                ((mass[0] + 1e-10) / (mass[1] + 1e-10))
                    .ln()
                    .clamp(-self.config.llr_clip, self.config.llr_clip)
            };
            coded.push(llr_of(mass_g1));
            coded.push(llr_of(mass_g2));

            // Renormalise the state distribution.
            let total: f32 = next_prob.iter().sum();
            if total > 0.0 {
                for p in next_prob.iter_mut() {
                    *p /= total;
                }
            }
            state_prob = next_prob;
        }

        coded
    }

    /// The log-domain branch metric.
    ///
    /// For antipodal coded bits, an LLR `l` contributes `(l/2) * (1 - 2b)` for a hypothesised
    /// bit `b`; likewise for the a-priori term on the input bit.
    #[inline]
    fn gamma(&self, state: usize, input: usize, lg1: f32, lg2: f32, la: f32) -> f32 {
        let c1 = self.trellis.out_g1[state][input] as i32;
        let c2 = self.trellis.out_g2[state][input] as i32;

        0.5 * la * (1 - 2 * input as i32) as f32
            + 0.5 * lg1 * (1 - 2 * c1) as f32
            + 0.5 * lg2 * (1 - 2 * c2) as f32
    }

    #[inline]
    fn accumulate(&self, a: f32, b: f32) -> f32 {
        if self.config.max_log {
            a.max(b)
        }
        else if a <= LOG_ZERO {
            b
        }
        else if b <= LOG_ZERO {
            a
        }
        else {
            log_add(a, b)
        }
    }
}

/// `log(exp(a) + exp(b))` computed stably.
#[inline]
fn log_add(a: f32, b: f32) -> f32 {
    if a > b {
        a + (b - a).exp().ln_1p()
    }
    else {
        b + (a - b).exp().ln_1p()
    }
}

/// Shift log metrics so the maximum sits at zero, preventing drift toward the floor.
fn normalize(metrics: &mut [f32; NUM_STATES]) {
    let max = metrics.iter().cloned().fold(LOG_ZERO, f32::max);
    if max > -1e20 {
        for m in metrics.iter_mut() {
            *m -= max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::conv::encode;
    use super::*;

    fn to_llr(coded: &[u8], scale: f32) -> Vec<f32> {
        coded.iter().map(|&b| if b == 0 { scale } else { -scale }).collect()
    }

    #[test]
    fn verify_clean_decode_sign() {
        let bits = [1u8, 0, 1, 1, 0, 0, 1, 0, 1, 1];
        let siso = SisoDecoder::new(SisoConfig::default());

        let app = siso.decode_app(&to_llr(&encode(&bits), 4.0), &[]);

        // The flush bits are included in the output; check only the data positions.
        for (t, &bit) in bits.iter().enumerate() {
            if bit == 0 {
                assert!(app[t] > 0.0, "bit {}", t);
            }
            else {
                assert!(app[t] < 0.0, "bit {}", t);
            }
        }
    }

    #[test]
    fn verify_all_zero_input_terminates_with_zero_output() {
        let siso = SisoDecoder::new(SisoConfig::default());
        let extrinsic = siso.decode(&vec![0.0; 256], &[]);

        assert_eq!(extrinsic.len(), 128);
        assert!(extrinsic.iter().all(|&e| e.abs() < 1e-3));
    }

    #[test]
    fn verify_apriori_breaks_ties() {
        // With a silent channel, a strong prior must dominate the posterior.
        let siso = SisoDecoder::new(SisoConfig::default());
        let apriori = vec![8.0f32; 8];

        let app = siso.decode_app(&vec![0.0; 16], &apriori);
        assert!(app.iter().all(|&l| l > 0.0));
    }

    #[test]
    fn verify_extrinsic_excludes_prior() {
        let bits = [0u8, 1, 0, 1, 1, 0];
        let siso = SisoDecoder::new(SisoConfig::default());
        let channel = to_llr(&encode(&bits), 2.0);

        let mut apriori = vec![0.0f32; bits.len()];
        apriori[2] = 5.0;

        let extrinsic = siso.decode(&channel, &apriori);
        let app = siso.decode_app(&channel, &apriori);

        assert!((app[2] - (extrinsic[2] + 5.0)).abs() < 1e-4);
    }

    #[test]
    fn verify_soft_encode_matches_hard_encoder() {
        // Saturated info LLRs must re-encode to LLRs whose signs match the hard codeword.
        let bits = [1u8, 0, 0, 1, 0, 1, 1, 1];
        let llrs: Vec<f32> = bits.iter().map(|&b| if b == 0 { 40.0 } else { -40.0 }).collect();

        let siso = SisoDecoder::new(SisoConfig::default());
        let coded_llr = siso.soft_encode(&llrs);
        let coded = encode(&bits);

        for (t, &c) in coded.iter().take(coded_llr.len()).enumerate() {
            if c == 0 {
                assert!(coded_llr[t] > 0.0, "coded bit {}", t);
            }
            else {
                assert!(coded_llr[t] < 0.0, "coded bit {}", t);
            }
        }
    }

    #[test]
    fn verify_max_log_and_exact_agree_on_clean_input() {
        let bits = [1u8, 1, 0, 0, 1, 0, 1];
        let channel = to_llr(&encode(&bits), 6.0);

        let max_log = SisoDecoder::new(SisoConfig { max_log: true, ..Default::default() });
        let exact = SisoDecoder::new(SisoConfig { max_log: false, ..Default::default() });

        let a = max_log.decode(&channel, &[]);
        let b = exact.decode(&channel, &[]);

        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.signum(), y.signum());
        }
    }
}

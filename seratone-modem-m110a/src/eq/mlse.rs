// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Maximum-likelihood sequence estimation over the ISI trellis.
//!
//! The trellis has `8^(L-1)` states, each encoding the last `L-1` transmitted symbols under a
//! channel of memory `L`. Every received sample triggers one add-compare-select step whose
//! branch metric is the squared Euclidean distance to the expected received value predicted by
//! the channel estimate. Decisions emerge after a fixed traceback depth.
//!
//! The adaptive variant refreshes the channel by LMS on its own (delayed) decisions between
//! probes and by a batch sweep over each probe block. A soft-output pass over the same trellis
//! serves the turbo equaliser.

use seratone_core::dsp::complex::Complex;
use smallvec::SmallVec;

use crate::chan::ChannelEstimate;
use crate::mapping::PSK8;

const METRIC_CEIL: f32 = 1e30;

/// MLSE parameters.
#[derive(Copy, Clone, Debug)]
pub struct MlseConfig {
    /// Channel memory `L`: 2 gives 8 trellis states, 3 gives 64.
    pub channel_memory: usize,
    /// Traceback depth before a decision is released.
    pub traceback: usize,
    /// LMS step size for channel tracking.
    pub adaptation_rate: f32,
    /// Track the channel on decisions and probe blocks.
    pub adaptive: bool,
    /// Noise variance used to scale soft outputs.
    pub noise_variance: f32,
}

impl Default for MlseConfig {
    fn default() -> Self {
        MlseConfig {
            channel_memory: 3,
            traceback: 20,
            adaptation_rate: 0.01,
            adaptive: false,
            noise_variance: 0.1,
        }
    }
}

/// A soft symbol decision: per-position probabilities plus the hard decision.
#[derive(Clone)]
pub struct SoftSymbol {
    /// Most likely constellation position.
    pub hard: u8,
    /// Normalised probability of each position.
    pub probs: [f32; 8],
    /// Log-domain confidence of the hard decision.
    pub reliability: f32,
}

impl Default for SoftSymbol {
    fn default() -> Self {
        SoftSymbol { hard: 0, probs: [0.125; 8], reliability: 0.0 }
    }
}

/// The MLSE equaliser.
#[derive(Clone)]
pub struct Mlse {
    config: MlseConfig,
    num_states: usize,
    /// Channel taps, `h[0]` first.
    h: SmallVec<[Complex; 8]>,
    /// `expected[state][input]`: the noiseless received value of a transition.
    expected: Vec<[Complex; 8]>,
    metrics: Vec<f32>,
    /// Survivor rings: the winning input symbol and predecessor state per step.
    surv_input: Vec<Vec<u8>>,
    surv_prev: Vec<Vec<u16>>,
    time: usize,
    /// Recent received samples awaiting their delayed decisions.
    rx_delay: Vec<Complex>,
    /// Emitted decisions, used as the LMS regressor.
    decisions: Vec<u8>,
}

impl Mlse {
    pub fn new(config: MlseConfig) -> Mlse {
        assert!(
            config.channel_memory >= 2 && config.channel_memory <= 3,
            "channel memory must be 2 or 3"
        );
        assert!(config.traceback >= 2);

        let num_states = 8usize.pow(config.channel_memory as u32 - 1);
        let depth = config.traceback + 10;

        let mut mlse = Mlse {
            config,
            num_states,
            h: SmallVec::new(),
            expected: vec![[Complex::zero(); 8]; num_states],
            metrics: vec![METRIC_CEIL; num_states],
            surv_input: vec![vec![0; num_states]; depth],
            surv_prev: vec![vec![0; num_states]; depth],
            time: 0,
            rx_delay: Vec::with_capacity(config.traceback + 1),
            decisions: Vec::new(),
        };

        mlse.set_channel(&ChannelEstimate::identity(config.channel_memory, true));
        mlse.reset_trellis();
        mlse
    }

    /// Load a channel estimate, truncated or zero-padded to the trellis memory.
    pub fn set_channel(&mut self, estimate: &ChannelEstimate) {
        self.h.clear();
        for k in 0..self.config.channel_memory {
            self.h.push(estimate.taps.get(k).copied().unwrap_or_else(Complex::zero));
        }
        self.update_expected();
    }

    /// A snapshot of the channel taps.
    pub fn taps(&self) -> SmallVec<[Complex; 8]> {
        self.h.clone()
    }

    /// Restart the survivor memory; the channel estimate is kept.
    pub fn reset_trellis(&mut self) {
        self.metrics.fill(METRIC_CEIL);
        self.metrics[0] = 0.0;
        self.time = 0;
        self.rx_delay.clear();
        self.decisions.clear();
    }

    /// Process one data symbol, returning a decision once the traceback has filled.
    pub fn process(&mut self, received: Complex) -> Option<u8> {
        self.acs(received, None, None);
        self.emit(received)
    }

    /// Process one probe symbol whose transmitted position is known. The trellis is constrained
    /// to the known transition.
    pub fn process_known(&mut self, received: Complex, known: u8) -> Option<u8> {
        self.acs(received, Some(known), None);
        self.emit(received)
    }

    /// Release the decisions still inside the traceback window, oldest first.
    pub fn flush(&mut self) -> Vec<u8> {
        let remaining = self.time.min(self.config.traceback - 1);
        if remaining == 0 {
            return Vec::new();
        }

        let mut state = self.best_state();
        let depth = self.surv_input.len();

        let mut reversed = Vec::with_capacity(remaining);
        for i in 0..remaining {
            let idx = (self.time - 1 - i) % depth;
            reversed.push(self.surv_input[idx][state]);
            state = self.surv_prev[idx][state] as usize;
        }

        reversed.reverse();
        reversed
    }

    /// Refresh the channel from one probe block by an LMS sweep over the known symbols.
    pub fn train_on_probes(&mut self, received: &[Complex], known: &[Complex]) {
        let l = self.h.len();
        if received.len() < l || !self.config.adaptive {
            return;
        }

        let mu = self.config.adaptation_rate;
        for n in (l - 1)..received.len().min(known.len()) {
            let mut predicted = Complex::zero();
            for k in 0..l {
                predicted += self.h[k] * known[n - k];
            }
            let error = received[n] - predicted;
            for k in 0..l {
                self.h[k] += error * known[n - k].conj() * mu;
            }
        }

        self.update_expected();
    }

    /// Soft-output equalisation of a whole block for the turbo loop.
    ///
    /// Runs the same ACS recursion, optionally folding per-symbol priors into the branch
    /// metrics, and emits instantaneous per-position probabilities derived from the updated
    /// path metrics.
    pub fn soft_equalize(
        &mut self,
        received: &[Complex],
        priors: Option<&[[f32; 8]]>,
    ) -> Vec<SoftSymbol> {
        self.reset_trellis();

        let mut output = Vec::with_capacity(received.len());

        for (t, &r) in received.iter().enumerate() {
            let prior = priors.map(|p| &p[t]);
            let (next_metrics, next_input) = self.acs(r, None, prior);

            // Per-position probabilities from the best path ending in each decision.
            let mut soft = SoftSymbol::default();
            let min_metric =
                next_metrics.iter().cloned().fold(METRIC_CEIL, f32::min).min(METRIC_CEIL - 1.0);

            let mut best_of = [METRIC_CEIL; 8];
            for state in 0..self.num_states {
                let s = next_input[state] as usize;
                best_of[s] = best_of[s].min(next_metrics[state]);
            }

            let mut sum = 0.0f32;
            for s in 0..8 {
                soft.probs[s] =
                    (-(best_of[s] - min_metric) / (2.0 * self.config.noise_variance)).exp();
                sum += soft.probs[s];
            }
            for p in soft.probs.iter_mut() {
                *p /= sum;
            }

            soft.hard = (0..8).max_by(|&a, &b| soft.probs[a].total_cmp(&soft.probs[b])).unwrap()
                as u8;
            soft.reliability = (soft.probs[soft.hard as usize] + 1e-10).ln();

            output.push(soft);
        }

        output
    }

    fn acs(
        &mut self,
        received: Complex,
        known: Option<u8>,
        prior: Option<&[f32; 8]>,
    ) -> (Vec<f32>, Vec<u8>) {
        let mut next_metrics = vec![METRIC_CEIL; self.num_states];
        let mut next_input = vec![0u8; self.num_states];
        let mut next_prev = vec![0u16; self.num_states];

        // A known (probe) symbol constrains the trellis to its single transition.
        let all = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let single;
        let inputs: &[u8] = match known {
            Some(k) => {
                single = [k & 7];
                &single
            }
            None => &all,
        };

        for state in 0..self.num_states {
            let pm = self.metrics[state];
            if pm >= METRIC_CEIL {
                continue;
            }

            for &input in inputs {
                let mut bm = (received - self.expected[state][input as usize]).norm_sqr();

                if let Some(p) = prior {
                    bm += 0.5 * -(p[input as usize] + 1e-10).ln();
                }

                let total = pm + bm;
                let ns = self.next_state(state, input);

                if total < next_metrics[ns] {
                    next_metrics[ns] = total;
                    next_input[ns] = input;
                    next_prev[ns] = state as u16;
                }
            }
        }

        let depth = self.surv_input.len();
        let idx = self.time % depth;
        self.surv_input[idx].copy_from_slice(&next_input);
        self.surv_prev[idx].copy_from_slice(&next_prev);
        self.metrics.copy_from_slice(&next_metrics);
        self.time += 1;

        (next_metrics, next_input)
    }

    /// Release the traceback decision for the oldest pending symbol and run decision-directed
    /// channel adaptation on it.
    fn emit(&mut self, received: Complex) -> Option<u8> {
        self.rx_delay.push(received);

        if self.time < self.config.traceback {
            return None;
        }

        let decision = self.traceback();

        // The oldest delayed sample pairs with this decision.
        let delayed_rx = self.rx_delay.remove(0);
        self.decisions.push(decision);

        if self.config.adaptive {
            self.adapt(delayed_rx);
        }

        Some(decision)
    }

    fn traceback(&self) -> u8 {
        let depth = self.surv_input.len();
        let mut state = self.best_state();

        let mut decision = 0;
        for i in 0..self.config.traceback {
            let idx = (self.time - 1 - i) % depth;
            decision = self.surv_input[idx][state];
            state = self.surv_prev[idx][state] as usize;
        }

        decision
    }

    fn best_state(&self) -> usize {
        let mut best = 0;
        let mut best_metric = self.metrics[0];
        for (s, &m) in self.metrics.iter().enumerate().skip(1) {
            if m < best_metric {
                best_metric = m;
                best = s;
            }
        }
        best
    }

    /// LMS update from the newest emitted decision and its received sample.
    fn adapt(&mut self, received: Complex) {
        let l = self.h.len();
        if self.decisions.len() < l {
            return;
        }

        let newest = self.decisions.len() - 1;
        let mut predicted = Complex::zero();
        for k in 0..l {
            predicted += self.h[k] * PSK8[self.decisions[newest - k] as usize];
        }

        let error = received - predicted;
        let mu = self.config.adaptation_rate;
        for k in 0..l {
            self.h[k] += error * PSK8[self.decisions[newest - k] as usize].conj() * mu;
        }

        self.update_expected();
    }

    #[inline]
    fn next_state(&self, state: usize, input: u8) -> usize {
        (state * 8 + input as usize) % self.num_states
    }

    fn update_expected(&mut self) {
        for state in 0..self.num_states {
            for input in 0..8usize {
                // x[n] is the hypothesised input; digit k-1 of the state is x[n-k].
                let mut acc = self.h[0] * PSK8[input];
                let mut digits = state;
                for k in 1..self.h.len() {
                    acc += self.h[k] * PSK8[digits % 8];
                    digits /= 8;
                }
                self.expected[state][input] = acc;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn positions(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 5 + i / 3) % 8) as u8).collect()
    }

    fn apply_channel(positions: &[u8], taps: &[Complex]) -> Vec<Complex> {
        (0..positions.len())
            .map(|n| {
                let mut acc = Complex::zero();
                for (k, &h) in taps.iter().enumerate() {
                    if n >= k {
                        acc += h * PSK8[positions[n - k] as usize];
                    }
                }
                acc
            })
            .collect()
    }

    fn estimate_of(taps: Vec<Complex>) -> ChannelEstimate {
        ChannelEstimate {
            taps: SmallVec::from_vec(taps),
            main_tap: 0,
            delay_spread: 0.5,
            rms_error: 0.0,
            valid: true,
        }
    }

    fn run_sequence(mlse: &mut Mlse, received: &[Complex]) -> Vec<u8> {
        let mut out = Vec::new();
        for &r in received {
            if let Some(d) = mlse.process(r) {
                out.push(d);
            }
        }
        out.extend(mlse.flush());
        out
    }

    #[test]
    fn verify_flat_channel_is_slicer() {
        let tx = positions(100);
        let rx: Vec<Complex> = tx.iter().map(|&p| PSK8[p as usize]).collect();

        let mut mlse = Mlse::new(MlseConfig { channel_memory: 2, ..Default::default() });
        let out = run_sequence(&mut mlse, &rx);

        assert_eq!(out, tx);
    }

    #[test]
    fn verify_equalizes_two_tap_isi() {
        let tx = positions(300);
        let taps = vec![Complex::new(1.0, 0.0), Complex::new(0.5, 0.2)];
        let rx = apply_channel(&tx, &taps);

        let mut mlse = Mlse::new(MlseConfig { channel_memory: 2, ..Default::default() });
        mlse.set_channel(&estimate_of(taps));

        let out = run_sequence(&mut mlse, &rx);
        assert_eq!(out, tx);
    }

    #[test]
    fn verify_equalizes_three_tap_isi_with_64_states() {
        let tx = positions(300);
        let taps =
            vec![Complex::new(1.0, 0.0), Complex::new(0.1, -0.3), Complex::new(0.0, 0.4)];
        let rx = apply_channel(&tx, &taps);

        let mut mlse = Mlse::new(MlseConfig { channel_memory: 3, ..Default::default() });
        mlse.set_channel(&estimate_of(taps));

        let out = run_sequence(&mut mlse, &rx);
        assert_eq!(out, tx);
    }

    #[test]
    fn verify_output_length_matches_input() {
        let tx = positions(57);
        let rx: Vec<Complex> = tx.iter().map(|&p| PSK8[p as usize]).collect();

        let mut mlse = Mlse::new(MlseConfig { channel_memory: 2, ..Default::default() });
        let out = run_sequence(&mut mlse, &rx);

        assert_eq!(out.len(), tx.len());
    }

    #[test]
    fn verify_adaptive_tracks_drifting_channel() {
        let tx = positions(800);

        // The echo tap rotates slowly over the burst.
        let mut rx = Vec::with_capacity(tx.len());
        for n in 0..tx.len() {
            let theta = 1.5e-3 * n as f32;
            let echo = Complex::expj(theta) * 0.4;
            let mut acc = PSK8[tx[n] as usize];
            if n >= 1 {
                acc += echo * PSK8[tx[n - 1] as usize];
            }
            rx.push(acc);
        }

        let initial: SmallVec<[Complex; 8]> =
            smallvec![Complex::new(1.0, 0.0), Complex::new(0.4, 0.0)];

        let make = |adaptive: bool| {
            let mut mlse = Mlse::new(MlseConfig {
                channel_memory: 2,
                adaptive,
                adaptation_rate: 0.02,
                ..Default::default()
            });
            mlse.set_channel(&ChannelEstimate {
                taps: initial.clone(),
                main_tap: 0,
                delay_spread: 0.4,
                rms_error: 0.0,
                valid: true,
            });
            mlse
        };

        let errors = |out: &[u8]| out.iter().zip(tx.iter()).filter(|(a, b)| a != b).count();

        let fixed_errors = errors(&run_sequence(&mut make(false), &rx));
        let adaptive_errors = errors(&run_sequence(&mut make(true), &rx));

        assert!(adaptive_errors <= fixed_errors, "{} > {}", adaptive_errors, fixed_errors);
        assert!(adaptive_errors * 50 < tx.len(), "{} errors", adaptive_errors);
    }

    #[test]
    fn verify_known_symbols_constrain_trellis() {
        let tx = positions(120);
        let taps = vec![Complex::new(1.0, 0.0), Complex::new(0.6, 0.0)];
        let rx = apply_channel(&tx, &taps);

        let mut mlse = Mlse::new(MlseConfig { channel_memory: 2, ..Default::default() });
        mlse.set_channel(&estimate_of(taps));

        let mut out = Vec::new();
        for (n, &r) in rx.iter().enumerate() {
            // Feed every fourth symbol as known, as a probe would be.
            let d = if n % 4 == 0 { mlse.process_known(r, tx[n]) } else { mlse.process(r) };
            if let Some(d) = d {
                out.push(d);
            }
        }
        out.extend(mlse.flush());

        assert_eq!(out, tx);
    }

    #[test]
    fn verify_soft_output_favours_true_symbol() {
        let tx = positions(64);
        let rx: Vec<Complex> = tx.iter().map(|&p| PSK8[p as usize]).collect();

        let mut mlse = Mlse::new(MlseConfig { channel_memory: 2, ..Default::default() });
        let soft = mlse.soft_equalize(&rx, None);

        for (s, &expected) in soft.iter().zip(tx.iter()).skip(2) {
            assert_eq!(s.hard, expected);
            assert!(s.probs[expected as usize] > 0.5);
        }
    }
}

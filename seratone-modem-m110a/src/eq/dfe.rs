// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decision-feedback equalisation with LMS or RLS adaptation.
//!
//! The filter combines a feed-forward section over recent received samples with a feedback
//! section over past decisions. During training the desired output is the known reference;
//! in decision-directed operation it is the hard decision of the filter's own output.
//!
//! The equaliser must be trained on the preamble before the first data symbol is consumed;
//! running it untrained leaves the feedback section cancelling garbage and is a documented
//! failure mode, guarded by a debug assertion.

use seratone_core::dsp::complex::Complex;
use seratone_core::dsp::solve::Matrix;
use smallvec::SmallVec;

use crate::mapping::{position_of, PSK8};

/// DFE parameters.
#[derive(Copy, Clone, Debug)]
pub struct DfeConfig {
    /// Feed-forward tap count.
    pub ff_taps: usize,
    /// Feedback tap count.
    pub fb_taps: usize,
    /// Use recursive least squares instead of LMS.
    pub rls: bool,
    /// LMS step size.
    pub mu: f32,
    /// RLS forgetting factor.
    pub forgetting: f32,
    /// Sliding error variance below which the state is declared converged.
    pub convergence_threshold: f32,
}

impl Default for DfeConfig {
    fn default() -> Self {
        DfeConfig {
            ff_taps: 11,
            fb_taps: 5,
            rls: false,
            mu: 0.01,
            forgetting: 0.99,
            convergence_threshold: 0.1,
        }
    }
}

/// A decision-feedback equaliser.
#[derive(Clone)]
pub struct Dfe {
    config: DfeConfig,
    /// Concatenated weights: feed-forward first, then feedback.
    weights: Vec<Complex>,
    /// Recent received samples, newest first.
    rx_line: Vec<Complex>,
    /// Past decisions, newest first.
    decision_line: Vec<Complex>,
    /// RLS inverse correlation matrix, present only in RLS operation.
    inv_corr: Option<Matrix>,
    error_variance: f32,
    trained: bool,
}

impl Dfe {
    pub fn new(config: DfeConfig) -> Dfe {
        let n = config.ff_taps + config.fb_taps;

        // Start as a pass-through: unit leading tap in the feed-forward section. Training
        // pairs rx[n] with tx[n], so the equaliser operates at zero decision lag and the
        // feed-forward section spans the current and past samples of a causal channel.
        let mut weights = vec![Complex::zero(); n];
        weights[0] = Complex::new(1.0, 0.0);

        let inv_corr = config.rls.then(|| Matrix::scaled_identity(n, 100.0));

        Dfe {
            config,
            weights,
            rx_line: vec![Complex::zero(); config.ff_taps],
            decision_line: vec![Complex::zero(); config.fb_taps],
            inv_corr,
            error_variance: 1.0,
            trained: false,
        }
    }

    /// Whether the sliding error variance has dropped below the convergence threshold.
    pub fn converged(&self) -> bool {
        self.error_variance < self.config.convergence_threshold
    }

    /// Train the filter on a run of known symbols. Must precede any data symbol.
    pub fn train(&mut self, received: &[Complex], reference: &[Complex]) {
        for (&rx, &known) in received.iter().zip(reference.iter()) {
            self.step(rx, Some(known));
        }
        self.trained = true;
    }

    /// Equalise one symbol. `known` carries the reference for probe symbols; data symbols run
    /// decision-directed.
    pub fn process(&mut self, received: Complex, known: Option<Complex>) -> Complex {
        debug_assert!(self.trained, "DFE consumed a data symbol before preamble training");
        self.step(received, known)
    }

    /// A snapshot of the current weights, feed-forward section first.
    pub fn taps(&self) -> SmallVec<[Complex; 16]> {
        SmallVec::from_slice(&self.weights)
    }

    fn step(&mut self, received: Complex, known: Option<Complex>) -> Complex {
        // Shift the received sample in, newest first.
        self.rx_line.rotate_right(1);
        self.rx_line[0] = received;

        let output = self.filter_output();

        // The desired output: training reference, or the slicer decision.
        let desired = match known {
            Some(k) => k,
            None => PSK8[position_of(output) as usize],
        };

        let error = desired - output;
        self.error_variance = 0.95 * self.error_variance + 0.05 * error.norm_sqr();

        if self.config.rls {
            self.update_rls(error);
        }
        else {
            self.update_lms(error);
        }

        // The decision feeds back, newest first.
        self.decision_line.rotate_right(1);
        self.decision_line[0] = desired;

        output
    }

    #[inline]
    fn filter_output(&self) -> Complex {
        let mut acc = Complex::zero();
        for (w, u) in self.weights.iter().zip(self.input_iter()) {
            acc += *w * u;
        }
        acc
    }

    fn input_iter(&self) -> impl Iterator<Item = Complex> + '_ {
        self.rx_line.iter().chain(self.decision_line.iter()).copied()
    }

    fn update_lms(&mut self, error: Complex) {
        let mu = self.config.mu;
        let inputs: SmallVec<[Complex; 16]> = self.input_iter().collect();

        for (w, u) in self.weights.iter_mut().zip(inputs.iter()) {
            *w += error * u.conj() * mu;
        }
    }

    fn update_rls(&mut self, error: Complex) {
        let n = self.weights.len();
        let lambda = self.config.forgetting;
        let inputs: SmallVec<[Complex; 16]> = self.input_iter().collect();

        let Some(p) = self.inv_corr.as_mut() else { return };

        // k = P u* / (lambda + u^T P u*)
        let mut pu = vec![Complex::zero(); n];
        for i in 0..n {
            for (j, u) in inputs.iter().enumerate() {
                pu[i] += p[(i, j)] * u.conj();
            }
        }

        let mut denom = Complex::new(lambda, 0.0);
        for (i, u) in inputs.iter().enumerate() {
            denom += *u * pu[i];
        }

        let gain: Vec<Complex> = pu.iter().map(|&v| v / denom).collect();

        for (w, k) in self.weights.iter_mut().zip(gain.iter()) {
            *w += error * *k;
        }

        // P = (P - k (u^T P)) / lambda
        let mut utp = vec![Complex::zero(); n];
        for j in 0..n {
            for (i, u) in inputs.iter().enumerate() {
                utp[j] += *u * p[(i, j)];
            }
        }

        for i in 0..n {
            for j in 0..n {
                p[(i, j)] = (p[(i, j)] - gain[i] * utp[j]) / lambda;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::PSK8;

    fn symbol_stream(len: usize) -> Vec<Complex> {
        (0..len).map(|i| PSK8[(i * 3 + i / 5) % 8]).collect()
    }

    fn two_path(symbols: &[Complex], echo: Complex, delay: usize) -> Vec<Complex> {
        (0..symbols.len())
            .map(|n| {
                let mut acc = symbols[n];
                if n >= delay {
                    acc += echo * symbols[n - delay];
                }
                acc
            })
            .collect()
    }

    fn run_equalizer(rls: bool) {
        let config = DfeConfig { rls, mu: 0.02, ..Default::default() };
        let mut dfe = Dfe::new(config);

        let tx = symbol_stream(600);
        let rx = two_path(&tx, Complex::new(0.4, 0.1), 2);

        // Train on the first half with the reference available.
        dfe.train(&rx[..300], &tx[..300]);
        assert!(dfe.converged());

        // Decision-directed over the rest: the slicer output must match the sent stream.
        let mut errors = 0;
        for n in 300..600 {
            let y = dfe.process(rx[n], None);
            if position_of(y) != position_of(tx[n]) {
                errors += 1;
            }
        }

        assert!(errors <= 3, "{} slicer errors ({})", errors, if rls { "rls" } else { "lms" });
    }

    #[test]
    fn verify_lms_converges_on_two_path_channel() {
        run_equalizer(false);
    }

    #[test]
    fn verify_rls_converges_on_two_path_channel() {
        run_equalizer(true);
    }

    #[test]
    fn verify_rls_converges_faster_than_lms() {
        let tx = symbol_stream(120);
        let rx = two_path(&tx, Complex::new(0.5, 0.0), 1);

        let residual = |rls: bool| {
            let mut dfe = Dfe::new(DfeConfig { rls, ..Default::default() });
            dfe.train(&rx, &tx);
            dfe.error_variance
        };

        assert!(residual(true) < residual(false));
    }

    #[test]
    fn verify_tap_snapshot_shape() {
        let config = DfeConfig::default();
        let dfe = Dfe::new(config);

        let taps = dfe.taps();
        assert_eq!(taps.len(), config.ff_taps + config.fb_taps);
        assert_eq!(taps[0], Complex::new(1.0, 0.0));
    }
}

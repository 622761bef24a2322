// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `chan` module estimates the channel impulse response from known symbols.
//!
//! The model is `r[n] = sum_k h[k] * s[n-k] + noise` over the known preamble and probe
//! symbols. The estimator accumulates the Tikhonov-regularised normal equations of the
//! overdetermined Toeplitz system and solves the resulting Hermitian L x L matrix by Gaussian
//! elimination with partial pivoting. A singular system falls back to an identity channel with
//! the validity flag cleared.

use log::warn;
use smallvec::SmallVec;

use seratone_core::dsp::complex::Complex;
use seratone_core::dsp::solve::{solve, Matrix};

/// Channel estimator parameters.
#[derive(Copy, Clone, Debug)]
pub struct EstimatorConfig {
    /// Number of channel taps to estimate.
    pub num_taps: usize,
    /// Tikhonov regularisation weight, scaled by the number of equations.
    pub regularization: f32,
    /// Normalise the tap vector so the main tap has unit magnitude.
    pub normalize: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig { num_taps: 5, regularization: 0.001, normalize: true }
    }
}

/// An estimated channel impulse response.
#[derive(Clone, Debug)]
pub struct ChannelEstimate {
    /// The tap vector, `h[0]` first.
    pub taps: SmallVec<[Complex; 8]>,
    /// Index of the strongest tap.
    pub main_tap: usize,
    /// RMS width of the power-delay profile, in symbols.
    pub delay_spread: f32,
    /// RMS residual between the received symbols and the fitted model.
    pub rms_error: f32,
    /// False when the solver fell back to the identity channel.
    pub valid: bool,
}

impl ChannelEstimate {
    /// An identity (single unit tap) channel of the given length.
    pub fn identity(num_taps: usize, valid: bool) -> ChannelEstimate {
        let mut taps = SmallVec::with_capacity(num_taps);
        taps.push(Complex::new(1.0, 0.0));
        for _ in 1..num_taps {
            taps.push(Complex::zero());
        }

        ChannelEstimate { taps, main_tap: 0, delay_spread: 0.0, rms_error: 0.0, valid }
    }

    /// The expected received value for the symbol history `x[n], x[n-1], ...`.
    pub fn predict(&self, history: &[Complex]) -> Complex {
        let mut acc = Complex::zero();
        for (k, &h) in self.taps.iter().enumerate() {
            if k >= history.len() {
                break;
            }
            acc += h * history[k];
        }
        acc
    }
}

/// Estimate the channel from aligned received/known symbol pairs.
///
/// At least `num_taps + 10` pairs are required; shorter inputs return the identity channel with
/// the validity flag cleared.
pub fn estimate(
    config: &EstimatorConfig,
    received: &[Complex],
    known: &[Complex],
) -> ChannelEstimate {
    let l = config.num_taps;
    let n = received.len().min(known.len());

    if n < l + 10 {
        return ChannelEstimate::identity(l, false);
    }

    // Accumulate the normal equations S^H S and S^H r.
    let mut shs = Matrix::zeros(l);
    let mut shr = vec![Complex::zero(); l];

    for idx in (l - 1)..n {
        for i in 0..l {
            let si = known[idx - i];
            shr[i] += si.conj() * received[idx];
            for j in 0..l {
                shs[(i, j)] += si.conj() * known[idx - j];
            }
        }
    }

    // Regularisation proportional to the equation count.
    let lambda = config.regularization * (n - l + 1) as f32;
    for i in 0..l {
        shs[(i, i)] += Complex::new(lambda, 0.0);
    }

    let taps = match solve(shs, shr, 1e-10) {
        Some(taps) => SmallVec::from_vec(taps),
        None => {
            warn!("channel estimator: singular normal equations, using identity channel");
            return ChannelEstimate::identity(l, false);
        }
    };

    let mut estimate = ChannelEstimate {
        taps,
        main_tap: 0,
        delay_spread: 0.0,
        rms_error: 0.0,
        valid: true,
    };

    // Main tap.
    let mut max_mag = 0.0f32;
    for (i, t) in estimate.taps.iter().enumerate() {
        let mag = t.abs();
        if mag > max_mag {
            max_mag = mag;
            estimate.main_tap = i;
        }
    }

    // Magnitude-only normalisation preserves the relative tap phases.
    if config.normalize && max_mag > 0.001 {
        for t in estimate.taps.iter_mut() {
            *t = *t / max_mag;
        }
    }

    estimate.delay_spread = delay_spread(&estimate.taps);
    estimate.rms_error = rms_error(received, known, &estimate.taps);

    estimate
}

fn delay_spread(taps: &[Complex]) -> f32 {
    let mut total = 0.0f32;
    let mut mean = 0.0f32;

    for (i, t) in taps.iter().enumerate() {
        let power = t.norm_sqr();
        total += power;
        mean += i as f32 * power;
    }

    if total < 1e-10 {
        return 0.0;
    }
    mean /= total;

    let mut rms = 0.0f32;
    for (i, t) in taps.iter().enumerate() {
        let diff = i as f32 - mean;
        rms += diff * diff * t.norm_sqr();
    }

    (rms / total).sqrt()
}

fn rms_error(received: &[Complex], known: &[Complex], taps: &[Complex]) -> f32 {
    let l = taps.len();
    let n = received.len().min(known.len());

    let mut mse = 0.0f32;
    let mut count = 0usize;

    for idx in (l - 1)..n {
        let mut predicted = Complex::zero();
        for (k, &h) in taps.iter().enumerate() {
            predicted += h * known[idx - k];
        }
        mse += (received[idx] - predicted).norm_sqr();
        count += 1;
    }

    if count > 0 {
        (mse / count as f32).sqrt()
    }
    else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::PSK8;

    fn training_symbols(len: usize) -> Vec<Complex> {
        (0..len).map(|i| PSK8[(i * 5 + i / 7) % 8]).collect()
    }

    fn apply_channel(symbols: &[Complex], taps: &[Complex]) -> Vec<Complex> {
        (0..symbols.len())
            .map(|n| {
                let mut acc = Complex::zero();
                for (k, &h) in taps.iter().enumerate() {
                    if n >= k {
                        acc += h * symbols[n - k];
                    }
                }
                acc
            })
            .collect()
    }

    #[test]
    fn verify_recovers_flat_channel() {
        let known = training_symbols(80);
        let est = estimate(&EstimatorConfig::default(), &known, &known);

        assert!(est.valid);
        assert_eq!(est.main_tap, 0);
        assert!((est.taps[0].abs() - 1.0).abs() < 0.01);
        for t in est.taps.iter().skip(1) {
            assert!(t.abs() < 0.05);
        }
        assert!(est.delay_spread < 0.1);
        assert!(est.rms_error < 0.05);
    }

    #[test]
    fn verify_recovers_two_path_channel() {
        let known = training_symbols(120);
        let true_taps =
            [Complex::new(1.0, 0.0), Complex::zero(), Complex::new(0.0, 0.5)];
        let received = apply_channel(&known, &true_taps);

        let est = estimate(&EstimatorConfig::default(), &received, &known);

        assert!(est.valid);
        assert_eq!(est.main_tap, 0);
        // The echo at two symbols delay must appear with roughly the right gain and phase.
        assert!((est.taps[2].im - 0.5).abs() < 0.1, "{:?}", est.taps);
        assert!(est.taps[2].re.abs() < 0.1);
        assert!(est.delay_spread > 0.5);
    }

    #[test]
    fn verify_short_input_falls_back_to_identity() {
        let known = training_symbols(8);
        let est = estimate(&EstimatorConfig::default(), &known, &known);

        assert!(!est.valid);
        assert_eq!(est.taps[0], Complex::new(1.0, 0.0));
    }

    #[test]
    fn verify_predict_matches_model() {
        let est = ChannelEstimate {
            taps: SmallVec::from_vec(vec![Complex::new(1.0, 0.0), Complex::new(0.5, 0.0)]),
            main_tap: 0,
            delay_spread: 0.5,
            rms_error: 0.0,
            valid: true,
        };

        // history[0] is x[n], history[1] is x[n-1].
        let y = est.predict(&[Complex::new(1.0, 0.0), Complex::new(0.0, 1.0)]);
        assert!((y.re - 1.0).abs() < 1e-6);
        assert!((y.im - 0.5).abs() < 1e-6);
    }
}

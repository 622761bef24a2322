// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `fir` module implements finite impulse response filtering and pulse-shape design.

use std::f64;

use super::complex::Complex;

/// A direct-form FIR filter over complex samples with a circular delay line.
#[derive(Clone)]
pub struct Fir {
    coeffs: Vec<f32>,
    delay: Vec<Complex>,
    pos: usize,
}

impl Fir {
    /// Instantiate a filter from the given tap coefficients.
    ///
    /// The coefficient slice must not be empty.
    pub fn new(coeffs: &[f32]) -> Fir {
        assert!(!coeffs.is_empty(), "fir requires at least one tap");

        Fir { coeffs: coeffs.to_vec(), delay: vec![Complex::zero(); coeffs.len()], pos: 0 }
    }

    /// The number of taps.
    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    /// Returns true if the filter has no taps.
    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Reset the delay line.
    pub fn reset(&mut self) {
        self.delay.fill(Complex::zero());
        self.pos = 0;
    }

    /// Push one sample and produce one output sample.
    pub fn process(&mut self, sample: Complex) -> Complex {
        self.delay[self.pos] = sample;

        let mut acc = Complex::zero();
        let mut idx = self.pos;

        for &c in self.coeffs.iter() {
            acc += self.delay[idx] * c;
            idx = if idx == 0 { self.delay.len() - 1 } else { idx - 1 };
        }

        self.pos += 1;
        if self.pos >= self.delay.len() {
            self.pos = 0;
        }

        acc
    }

    /// Filter a block of samples, producing one output per input.
    pub fn process_block(&mut self, input: &[Complex], output: &mut Vec<Complex>) {
        output.reserve(input.len());
        for &s in input {
            output.push(self.process(s));
        }
    }
}

/// Design a root-raised-cosine pulse with the given roll-off, spanning `span` symbol intervals at
/// `sps` samples per symbol. The returned filter has `span * sps + 1` taps normalised to unity DC
/// gain.
pub fn root_raised_cosine(rolloff: f32, span: usize, sps: usize) -> Vec<f32> {
    assert!(rolloff > 0.0 && rolloff < 1.0, "roll-off must be in (0, 1)");
    assert!(span > 0 && sps > 0);

    let n_taps = span * sps + 1;
    let a = rolloff as f64;

    let mut h = vec![0.0f32; n_taps];

    for (i, tap) in h.iter_mut().enumerate() {
        let t = (i as f64 - ((n_taps - 1) as f64 / 2.0)) / sps as f64;

        let value = if t.abs() < 1e-9 {
            1.0 - a + 4.0 * a / f64::consts::PI
        }
        else if (t.abs() - 1.0 / (4.0 * a)).abs() < 1e-9 {
            // The removable singularity at |t| = 1/(4a).
            (a / f64::consts::SQRT_2)
                * ((1.0 + 2.0 / f64::consts::PI) * (f64::consts::PI / (4.0 * a)).sin()
                    + (1.0 - 2.0 / f64::consts::PI) * (f64::consts::PI / (4.0 * a)).cos())
        }
        else {
            let num = (f64::consts::PI * t * (1.0 - a)).sin()
                + 4.0 * a * t * (f64::consts::PI * t * (1.0 + a)).cos();
            let den = f64::consts::PI * t * (1.0 - (4.0 * a * t).powi(2));
            num / den
        };

        *tap = value as f32;
    }

    // Normalise to unity DC gain.
    let sum: f32 = h.iter().sum();
    for tap in h.iter_mut() {
        *tap /= sum;
    }

    h
}

/// Design a windowed-sinc low-pass filter with the given normalised cutoff (as a fraction of the
/// sample rate, in `(0, 0.5)`) and tap count. A Hamming window is applied and the taps are
/// normalised to unity DC gain.
pub fn low_pass(cutoff: f32, n_taps: usize) -> Vec<f32> {
    assert!(cutoff > 0.0 && cutoff < 0.5, "cutoff must be in (0, 0.5)");
    assert!(n_taps >= 3);

    let fc = cutoff as f64;
    let mid = (n_taps - 1) as f64 / 2.0;

    let mut h = vec![0.0f32; n_taps];

    for (i, tap) in h.iter_mut().enumerate() {
        let t = i as f64 - mid;

        let sinc = if t.abs() < 1e-9 {
            2.0 * fc
        }
        else {
            (2.0 * f64::consts::PI * fc * t).sin() / (f64::consts::PI * t)
        };

        let window =
            0.54 - 0.46 * (2.0 * f64::consts::PI * i as f64 / (n_taps - 1) as f64).cos();

        *tap = (sinc * window) as f32;
    }

    let sum: f32 = h.iter().sum();
    for tap in h.iter_mut() {
        *tap /= sum;
    }

    h
}

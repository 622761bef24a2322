// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `nco` module implements a numerically controlled oscillator for carrier mixing.

use std::f32::consts::PI;

use super::complex::Complex;

/// Wrap a phase angle into the range `[-pi, pi)`.
#[inline]
pub fn wrap_phase(mut phase: f32) -> f32 {
    while phase >= PI {
        phase -= 2.0 * PI;
    }
    while phase < -PI {
        phase += 2.0 * PI;
    }
    phase
}

/// A numerically controlled oscillator.
///
/// Generates unit-magnitude phasors at a fixed frequency. A positive frequency rotates
/// counter-clockwise; pass a negative frequency to mix a signal down.
#[derive(Clone)]
pub struct Nco {
    phase: f32,
    phase_inc: f32,
}

impl Nco {
    /// Instantiate an oscillator at `freq_hz` for a stream sampled at `sample_rate` Hz.
    pub fn new(freq_hz: f32, sample_rate: f32) -> Nco {
        assert!(sample_rate > 0.0);

        Nco { phase: 0.0, phase_inc: 2.0 * PI * freq_hz / sample_rate }
    }

    /// Reset the oscillator phase to zero.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Produce the next oscillator sample and advance the phase.
    #[inline]
    pub fn step(&mut self) -> Complex {
        let out = Complex::expj(self.phase);
        self.phase = wrap_phase(self.phase + self.phase_inc);
        out
    }

    /// Mix a block of real samples with the oscillator, producing complex output.
    pub fn mix_real(&mut self, input: &[f32], output: &mut Vec<Complex>) {
        output.reserve(input.len());
        for &s in input {
            let lo = self.step();
            output.push(lo * s);
        }
    }

    /// Mix a block of complex samples with the oscillator in place.
    pub fn mix(&mut self, samples: &mut [Complex]) {
        for s in samples.iter_mut() {
            *s *= self.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_nco_frequency() {
        // At fs/4, each step advances the phase by 90 degrees.
        let mut nco = Nco::new(12000.0, 48000.0);

        let expected = [
            Complex::new(1.0, 0.0),
            Complex::new(0.0, 1.0),
            Complex::new(-1.0, 0.0),
            Complex::new(0.0, -1.0),
        ];

        for &e in expected.iter().cycle().take(16) {
            let s = nco.step();
            assert!((s.re - e.re).abs() < 1e-5);
            assert!((s.im - e.im).abs() < 1e-5);
        }
    }

    #[test]
    fn verify_mix_down_cancels_carrier() {
        // Mixing a pure carrier down by its own frequency yields DC.
        let fs = 48000.0;
        let fc = 1800.0;

        let carrier: Vec<f32> =
            (0..4800).map(|i| (2.0 * PI * fc * i as f32 / fs).cos()).collect();

        let mut nco = Nco::new(-fc, fs);
        let mut bb = Vec::new();
        nco.mix_real(&carrier, &mut bb);

        // The image at 2*fc averages out; the mean must sit near 0.5 + j0.
        let mut mean = Complex::zero();
        for &s in &bb {
            mean += s;
        }
        mean = mean / bb.len() as f32;

        assert!((mean.re - 0.5).abs() < 1e-3);
        assert!(mean.im.abs() < 1e-3);
    }
}

// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `agc` module implements asymmetric-attack/decay automatic gain control.
//!
//! The AGC normalises the average signal power ahead of equalisation so that the received
//! constellation most closely matches the ideal unit-power constellation.

use super::complex::Complex;

/// Automatic gain control parameters.
#[derive(Copy, Clone, Debug)]
pub struct AgcParams {
    /// Target output power.
    pub target_power: f32,
    /// Smoothing factor applied when the input power rises.
    pub attack: f32,
    /// Smoothing factor applied when the input power falls.
    pub decay: f32,
    /// Lower gain bound.
    pub min_gain: f32,
    /// Upper gain bound.
    pub max_gain: f32,
}

impl Default for AgcParams {
    fn default() -> Self {
        AgcParams { target_power: 1.0, attack: 0.1, decay: 0.01, min_gain: 0.01, max_gain: 100.0 }
    }
}

/// Block-wise automatic gain control over complex samples.
#[derive(Clone)]
pub struct Agc {
    params: AgcParams,
    gain: f32,
    power: f32,
}

impl Agc {
    pub fn new(params: AgcParams) -> Agc {
        Agc { params, gain: 1.0, power: params.target_power }
    }

    /// Reset to unity gain.
    pub fn reset(&mut self) {
        self.gain = 1.0;
        self.power = self.params.target_power;
    }

    /// The current gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Normalise a block of samples in place.
    pub fn process(&mut self, samples: &mut [Complex]) {
        if samples.is_empty() {
            return;
        }

        let input_power = mean_power(samples);

        // Fast attack, slow decay.
        let alpha =
            if input_power > self.power { self.params.attack } else { self.params.decay };
        self.power = alpha * input_power + (1.0 - alpha) * self.power;

        let desired = (self.params.target_power / (self.power + 1e-10)).sqrt();
        self.gain = desired.clamp(self.params.min_gain, self.params.max_gain);

        for s in samples.iter_mut() {
            *s = s.scale(self.gain);
        }
    }
}

/// Symbol-wise gain control that tracks constellation power with a single smoothing factor.
#[derive(Clone)]
pub struct SymbolAgc {
    target_power: f32,
    alpha: f32,
    gain: f32,
    power: f32,
}

impl SymbolAgc {
    pub fn new(target_power: f32, alpha: f32) -> SymbolAgc {
        SymbolAgc { target_power, alpha, gain: 1.0, power: target_power }
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
        self.power = self.target_power;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Normalise one symbol.
    #[inline]
    pub fn process(&mut self, sym: Complex) -> Complex {
        self.power = self.alpha * sym.norm_sqr() + (1.0 - self.alpha) * self.power;
        self.gain = (self.target_power / (self.power + 1e-10)).sqrt().clamp(0.1, 10.0);
        sym.scale(self.gain)
    }
}

/// One-shot normalisation of a block to the target power. Stateless helper.
pub fn normalize(samples: &mut [Complex], target_power: f32) {
    let power = mean_power(samples);
    if power < 1e-10 {
        return;
    }

    let gain = (target_power / power).sqrt();
    for s in samples.iter_mut() {
        *s = s.scale(gain);
    }
}

/// The mean power of a block of complex samples.
pub fn mean_power(samples: &[Complex]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f32 = samples.iter().map(|s| s.norm_sqr()).sum();
    sum / samples.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_normalize() {
        let mut samples = vec![Complex::new(4.0, 0.0); 64];
        normalize(&mut samples, 1.0);
        assert!((mean_power(&samples) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn verify_agc_converges_to_target() {
        let mut agc = Agc::new(AgcParams::default());

        // A weak signal must be boosted toward unit power once the slow decay has tracked the
        // power estimate down.
        let mut last_power = 0.0;
        for _ in 0..1000 {
            let mut block = vec![Complex::new(0.05, 0.05); 32];
            agc.process(&mut block);
            last_power = mean_power(&block);
        }

        assert!((last_power - 1.0).abs() < 0.05);
    }

    #[test]
    fn verify_agc_gain_bounds() {
        let params = AgcParams::default();
        let mut agc = Agc::new(params);

        // Silence must not drive the gain past its upper bound.
        for _ in 0..500 {
            let mut block = vec![Complex::new(1e-9, 0.0); 32];
            agc.process(&mut block);
        }

        assert!(agc.gain() <= params.max_gain);
    }
}

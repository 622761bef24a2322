// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pll` module implements a second-order decision-directed phase-locked loop.
//!
//! The loop corrects slow carrier phase drift during data reception. It is decision-directed on
//! data symbols and reference-aided on known (probe) symbols, where the update gains are doubled.

use std::f32::consts::PI;

use super::complex::Complex;
use super::nco::wrap_phase;

/// Phase tracker parameters.
#[derive(Copy, Clone, Debug)]
pub struct PllParams {
    /// Proportional gain (phase tracking bandwidth).
    pub alpha: f32,
    /// Integral gain (frequency offset tracking).
    pub beta: f32,
    /// Maximum frequency offset to track, in Hz.
    pub max_freq_hz: f32,
    /// Symbol rate in Hz.
    pub symbol_rate: f32,
    /// Squared-distance confidence threshold for decision-directed updates.
    pub dd_threshold: f32,
}

impl Default for PllParams {
    fn default() -> Self {
        PllParams {
            alpha: 0.05,
            beta: 0.002,
            max_freq_hz: 10.0,
            symbol_rate: 2400.0,
            dd_threshold: 0.7,
        }
    }
}

/// A second-order phase-locked loop over 8-PSK decisions.
#[derive(Clone)]
pub struct PhaseTracker {
    params: PllParams,
    phase: f32,
    freq: f32,
    max_freq_rad: f32,
    constellation: [Complex; 8],
}

impl PhaseTracker {
    pub fn new(params: PllParams) -> PhaseTracker {
        let max_freq_rad = 2.0 * PI * params.max_freq_hz / params.symbol_rate;

        let mut constellation = [Complex::zero(); 8];
        for (i, p) in constellation.iter_mut().enumerate() {
            *p = Complex::expj(i as f32 * PI / 4.0);
        }

        PhaseTracker { params, phase: 0.0, freq: 0.0, max_freq_rad, constellation }
    }

    /// Reset the tracker state.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.freq = 0.0;
    }

    /// Seed the phase estimate, in radians.
    pub fn set_phase(&mut self, phase: f32) {
        self.phase = wrap_phase(phase);
    }

    /// Seed the frequency estimate, in Hz.
    pub fn set_frequency(&mut self, freq_hz: f32) {
        let freq = 2.0 * PI * freq_hz / self.params.symbol_rate;
        self.freq = freq.clamp(-self.max_freq_rad, self.max_freq_rad);
    }

    /// The current phase estimate in radians.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// The current frequency offset estimate in Hz.
    pub fn frequency_hz(&self) -> f32 {
        self.freq * self.params.symbol_rate / (2.0 * PI)
    }

    /// Correct one data symbol, updating the loop from the hard decision when it is confident.
    pub fn track(&mut self, received: Complex) -> Complex {
        let corrected = received * Complex::expj(-self.phase);

        // Nearest constellation point.
        let mut best = 0;
        let mut best_dist = (corrected - self.constellation[0]).norm_sqr();
        for (i, p) in self.constellation.iter().enumerate().skip(1) {
            let dist = (corrected - *p).norm_sqr();
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }

        // Skip updates on unreliable decisions.
        if corrected.abs() > 0.1 && best_dist < self.params.dd_threshold {
            let err = (corrected * self.constellation[best].conj()).arg();
            self.update(err, 1.0);
        }

        corrected
    }

    /// Correct one symbol whose transmitted value is known. Known symbols update with doubled
    /// gains.
    pub fn track_known(&mut self, received: Complex, known: Complex) -> Complex {
        let corrected = received * Complex::expj(-self.phase);
        let err = (corrected * known.conj()).arg();
        self.update(err, 2.0);
        corrected
    }

    fn update(&mut self, phase_error: f32, weight: f32) {
        self.freq += self.params.beta * weight * phase_error;
        self.freq = self.freq.clamp(-self.max_freq_rad, self.max_freq_rad);
        self.phase = wrap_phase(self.phase + self.params.alpha * weight * phase_error + self.freq);
    }
}

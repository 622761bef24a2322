// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sync` module implements the preamble correlator, carrier-frequency search, and mode
//! detection.
//!
//! The correlator scans a two-dimensional grid. Along the frequency axis, a cached baseband
//! copy is retuned by each trial offset; along the timing axis, the first 256 symbols of a
//! candidate preamble are correlated against the known common pattern at every sample offset
//! (a strided coarse pass followed by a single-sample refinement around the peak). The joint
//! argmax gives the carrier offset, the start sample, and the coarse phase.
//!
//! The grid is exposed one trial frequency at a time so that a supervisor can abort a long
//! search between frequencies without losing partial results.

use log::debug;

use seratone_core::dsp::complex::Complex;

use crate::mode::ModeId;
use crate::passband::{derotate, SPS};
use crate::preamble::{self, BLOCK_LEN, D1_OFFSET, D2_OFFSET};

/// Symbols of the common segment used for correlation.
pub const CORRELATION_LEN: usize = 256;

/// Minimum normalised correlation accepted as synchronisation.
pub const SYNC_THRESHOLD: f32 = 0.2;

/// Minimum normalised probe correlation accepted during mode detection.
pub const PROBE_THRESHOLD: f32 = 0.25;

/// Stride of the coarse timing pass, in samples. One full symbol: the coarse correlation is
/// strong enough half a symbol off peak to localise it, and the refinement pass covers the
/// remainder at single-sample resolution.
const COARSE_STRIDE: usize = SPS;

/// Symbols correlated during the coarse timing pass.
const COARSE_LEN: usize = 64;

/// Synchronisation search parameters.
#[derive(Copy, Clone, Debug)]
pub struct SyncConfig {
    /// Half-width of the carrier-frequency grid, in Hz.
    pub freq_range_hz: f32,
    /// Grid step, in Hz.
    pub freq_step_hz: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig { freq_range_hz: 10.0, freq_step_hz: 1.0 }
    }
}

/// The outcome of a successful synchronisation search.
#[derive(Copy, Clone, Debug)]
pub struct SyncPoint {
    /// Detected carrier offset from nominal, in Hz.
    pub freq_offset_hz: f32,
    /// Sample index of the first preamble symbol.
    pub start_sample: usize,
    /// Coarse carrier phase at the start sample, in radians.
    pub phase: f32,
    /// Normalised correlation metric in `[0, 1]`.
    pub metric: f32,
}

/// A preamble search over a cached baseband buffer.
pub struct SyncSearch<'a> {
    baseband: &'a [Complex],
    config: SyncConfig,
    reference: Vec<Complex>,
}

impl<'a> SyncSearch<'a> {
    pub fn new(baseband: &'a [Complex], config: SyncConfig) -> SyncSearch<'a> {
        // Conjugated up front; the correlator only ever multiplies by the conjugate.
        let reference = preamble::reference(CORRELATION_LEN).iter().map(|r| r.conj()).collect();

        SyncSearch { baseband, config, reference }
    }

    /// The trial frequency grid, centre outward would buy nothing: scanned in ascending order.
    pub fn trial_frequencies(&self) -> Vec<f32> {
        let mut freqs = Vec::new();
        let steps = (self.config.freq_range_hz / self.config.freq_step_hz).round() as i32;
        for i in -steps..=steps {
            freqs.push(i as f32 * self.config.freq_step_hz);
        }
        freqs
    }

    /// Correlate the whole timing window at one trial frequency.
    ///
    /// This is the unit of cancellation: a supervisor may stop calling between trials, and no
    /// partial state is retained.
    pub fn scan_frequency(&self, freq_hz: f32) -> Option<SyncPoint> {
        let span = CORRELATION_LEN * SPS;
        if self.baseband.len() < span {
            return None;
        }

        let mut retuned = self.baseband.to_vec();
        derotate(&mut retuned, freq_hz);

        let window = self.baseband.len() - span;

        // Coarse pass: a short correlation on a one-symbol stride localises the preamble.
        let mut best_offset = 0;
        let mut best_metric = -1.0f32;
        let mut offset = 0;
        while offset <= window {
            let (metric, _) = self.correlate(&retuned, offset, COARSE_LEN);
            if metric > best_metric {
                best_metric = metric;
                best_offset = offset;
            }
            offset += COARSE_STRIDE;
        }

        // Single-sample refinement with the full correlation length around the coarse peak.
        let lo = best_offset.saturating_sub(COARSE_STRIDE);
        let hi = (best_offset + COARSE_STRIDE).min(window);
        let mut best = None;
        for offset in lo..=hi {
            let (metric, phase) = self.correlate(&retuned, offset, CORRELATION_LEN);
            if best.map_or(true, |b: SyncPoint| metric > b.metric) {
                best = Some(SyncPoint {
                    freq_offset_hz: freq_hz,
                    start_sample: offset,
                    phase,
                    metric,
                });
            }
        }

        best
    }

    /// Run the full grid search, returning the joint argmax when it clears the threshold.
    pub fn run(&self) -> Option<SyncPoint> {
        let mut best: Option<SyncPoint> = None;

        for freq in self.trial_frequencies() {
            if let Some(point) = self.scan_frequency(freq) {
                if best.map_or(true, |b| point.metric > b.metric) {
                    best = Some(point);
                }
            }
        }

        match best {
            Some(point) if point.metric >= SYNC_THRESHOLD => {
                debug!(
                    "sync: metric {:.3} at sample {} offset {:+.2} Hz",
                    point.metric, point.start_sample, point.freq_offset_hz
                );
                Some(point)
            }
            _ => None,
        }
    }

    fn correlate(&self, retuned: &[Complex], offset: usize, len: usize) -> (f32, f32) {
        let mut corr = Complex::zero();
        let mut energy = 0.0f32;

        for (k, &ref_conj) in self.reference.iter().take(len).enumerate() {
            let sample = retuned[offset + k * SPS];
            corr += sample * ref_conj;
            energy += sample.norm_sqr();
        }

        let metric = corr.norm_sqr() / (energy * len as f32 + 1e-9);
        (metric, corr.arg())
    }
}

/// Correlate one received probe block against the eight pattern hypotheses and return the best
/// `(d, metric)` pair.
fn classify_probe(received: &[Complex], probe_offset: usize) -> (u8, f32) {
    let mut energy = 0.0f32;
    for sym in received.iter().take(BLOCK_LEN) {
        energy += sym.norm_sqr();
    }

    let mut best = (0u8, -1.0f32);
    for d in 0..8u8 {
        let reference = preamble::probe_reference(d, probe_offset);

        let mut corr = Complex::zero();
        for (sym, r) in received.iter().zip(reference.iter()) {
            corr += *sym * r.conj();
        }

        let metric = corr.norm_sqr() / (energy * BLOCK_LEN as f32 + 1e-9);
        if metric > best.1 {
            best = (d, metric);
        }
    }

    best
}

/// Identify the operating mode from the D1/D2 probe symbols.
///
/// `d1` and `d2` are the 32 received symbols of each probe position, already derotated and
/// phase corrected. Returns `None` when either correlation is below threshold or the detected
/// pair maps to no known mode.
pub fn detect_mode(d1: &[Complex], d2: &[Complex]) -> Option<ModeId> {
    let (d1_value, d1_metric) = classify_probe(d1, D1_OFFSET);
    let (d2_value, d2_metric) = classify_probe(d2, D2_OFFSET);

    debug!(
        "mode probes: D1={} ({:.3}) D2={} ({:.3})",
        d1_value, d1_metric, d2_value, d2_metric
    );

    if d1_metric < PROBE_THRESHOLD || d2_metric < PROBE_THRESHOLD {
        return None;
    }

    preamble::mode_of_probes(d1_value, d2_value)
}

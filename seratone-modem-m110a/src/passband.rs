// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `passband` module converts between channel symbols and the audio passband.
//!
//! Both directions share a root-raised-cosine pulse with roll-off 0.35 spanning six symbol
//! intervals. At 2400 baud and 48 kHz there are twenty samples per symbol; the carrier sits at
//! 1800 Hz. The transmitter mixes the pulse-shaped complex envelope up with the
//! positive-rotating carrier; the receiver mixes the real input down with the negative-rotating
//! carrier and applies the matched filter.

use seratone_core::dsp::complex::Complex;
use seratone_core::dsp::fir::{root_raised_cosine, Fir};
use seratone_core::dsp::nco::Nco;

use crate::mapping::PSK8;
use crate::mode::BAUD;

/// Samples per channel symbol at the canonical rate.
pub const SPS: usize = 20;

/// The audio carrier frequency, in Hz.
pub const CARRIER_HZ: f32 = 1800.0;

/// The canonical sample rate, in Hz.
pub const SAMPLE_RATE: f32 = (BAUD as usize * SPS) as f32;

/// Pulse roll-off factor.
pub const RRC_ROLLOFF: f32 = 0.35;

/// Pulse span, in symbol intervals.
pub const RRC_SPAN: usize = 6;

/// Shape constellation positions into a real passband waveform.
pub struct Modulator {
    shaper: Fir,
    carrier: Nco,
    amplitude: f32,
}

impl Modulator {
    pub fn new(amplitude: f32) -> Modulator {
        Modulator {
            shaper: Fir::new(&root_raised_cosine(RRC_ROLLOFF, RRC_SPAN, SPS)),
            carrier: Nco::new(CARRIER_HZ, SAMPLE_RATE),
            amplitude,
        }
    }

    /// Modulate a sequence of constellation positions, returning 48 kHz audio samples.
    ///
    /// The output is extended past the last symbol so that its pulse fully decays, and is
    /// produced in stable FIFO order.
    pub fn modulate(&mut self, positions: &[u8]) -> Vec<f32> {
        let tail = self.shaper.len();
        let mut audio = Vec::with_capacity(positions.len() * SPS + tail);

        for &pos in positions {
            // Impulse at the symbol instant; the interpolation gain restores unit amplitude
            // after zero-stuffing.
            let impulse = PSK8[pos as usize].scale(SPS as f32);
            audio.push(self.step(impulse));
            for _ in 1..SPS {
                audio.push(self.step(Complex::zero()));
            }
        }

        for _ in 0..tail {
            audio.push(self.step(Complex::zero()));
        }

        audio
    }

    #[inline]
    fn step(&mut self, input: Complex) -> f32 {
        let envelope = self.shaper.process(input);
        let lo = self.carrier.step();
        (envelope * lo).re * self.amplitude
    }
}

/// Mix a passband recording to complex baseband through the matched filter.
///
/// The output has one complex sample per input sample; symbol-rate decimation happens later, at
/// the timing offset chosen by the synchroniser.
pub fn to_baseband(samples: &[f32]) -> Vec<Complex> {
    let mut carrier = Nco::new(-CARRIER_HZ, SAMPLE_RATE);
    let mut matched = Fir::new(&root_raised_cosine(RRC_ROLLOFF, RRC_SPAN, SPS));

    let mut baseband = Vec::with_capacity(samples.len());
    for &s in samples {
        let mixed = carrier.step() * s;
        baseband.push(matched.process(mixed));
    }

    baseband
}

/// Apply a frequency offset to a baseband buffer in place, rotating sample `i` by
/// `-2*pi*freq*i/fs`. Used to retune the cached baseband during the frequency search and to
/// remove the detected carrier offset.
pub fn derotate(baseband: &mut [Complex], freq_hz: f32) {
    let mut osc = Nco::new(-freq_hz, SAMPLE_RATE);
    for s in baseband.iter_mut() {
        *s *= osc.step();
    }
}

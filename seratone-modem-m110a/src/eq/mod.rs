// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `eq` module provides the pluggable equaliser set.
//!
//! The symbol-stream variants share a `process`/`flush`/`taps` contract behind a tagged enum
//! resolved once per decode session, so the hot path pays no dynamic dispatch. The turbo
//! variant is a block coordinator over the whole burst and is driven separately by the
//! receiver.

mod dfe;
mod mlse;
mod turbo;

pub use dfe::{Dfe, DfeConfig};
pub use mlse::{Mlse, MlseConfig, SoftSymbol};
pub use turbo::{TurboConfig, TurboEqualizer, TurboStats};

use seratone_core::dsp::complex::Complex;
use smallvec::SmallVec;

use crate::chan::ChannelEstimate;
use crate::mapping::{position_of, PSK8};

/// The equaliser selected by the receiver configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum EqualizerKind {
    /// No equalisation; symbols are sliced directly.
    None,
    /// Decision-feedback equaliser with LMS adaptation.
    #[default]
    Dfe,
    /// Decision-feedback equaliser with RLS adaptation.
    DfeRls,
    /// MLSE over an 8-state trellis (channel memory 2).
    MlseL2,
    /// MLSE over a 64-state trellis (channel memory 3).
    MlseL3,
    /// MLSE with per-frame channel tracking.
    MlseAdaptive,
    /// Iterative turbo equalisation.
    Turbo,
}

/// A symbol-stream equaliser, resolved from [`EqualizerKind`] at session start.
pub enum Equalizer {
    None,
    Dfe(Dfe),
    Mlse(Mlse),
}

impl Equalizer {
    /// Build the equaliser for a kind. [`EqualizerKind::Turbo`] is a block decoder, not a
    /// symbol filter, and is constructed separately by the receiver.
    pub fn new(kind: EqualizerKind, channel: &ChannelEstimate) -> Equalizer {
        match kind {
            EqualizerKind::None | EqualizerKind::Turbo => Equalizer::None,
            EqualizerKind::Dfe => Equalizer::Dfe(Dfe::new(DfeConfig::default())),
            EqualizerKind::DfeRls => {
                Equalizer::Dfe(Dfe::new(DfeConfig { rls: true, ..Default::default() }))
            }
            EqualizerKind::MlseL2 => {
                let mut mlse = Mlse::new(MlseConfig { channel_memory: 2, ..Default::default() });
                mlse.set_channel(channel);
                Equalizer::Mlse(mlse)
            }
            EqualizerKind::MlseL3 => {
                let mut mlse = Mlse::new(MlseConfig { channel_memory: 3, ..Default::default() });
                mlse.set_channel(channel);
                Equalizer::Mlse(mlse)
            }
            EqualizerKind::MlseAdaptive => {
                let mut mlse = Mlse::new(MlseConfig {
                    channel_memory: 3,
                    adaptive: true,
                    ..Default::default()
                });
                mlse.set_channel(channel);
                Equalizer::Mlse(mlse)
            }
        }
    }

    /// Pre-train on the preamble. A DFE must see this before any data symbol.
    pub fn train(&mut self, received: &[Complex], reference: &[Complex]) {
        match self {
            Equalizer::None => (),
            Equalizer::Dfe(dfe) => dfe.train(received, reference),
            // The MLSE channel estimate is produced by the channel estimator; the preamble
            // needs no separate training pass.
            Equalizer::Mlse(_) => (),
        }
    }

    /// Equalise one symbol. Probe symbols pass their known reference. MLSE variants release
    /// their decision after the traceback delay, so the output may lag the input.
    pub fn process(&mut self, received: Complex, known: Option<Complex>) -> Option<Complex> {
        match self {
            Equalizer::None => Some(received),
            Equalizer::Dfe(dfe) => Some(dfe.process(received, known)),
            Equalizer::Mlse(mlse) => {
                let decision = match known {
                    Some(k) => mlse.process_known(received, position_of(k)),
                    None => mlse.process(received),
                };
                decision.map(|d| PSK8[d as usize])
            }
        }
    }

    /// Release any symbols still buffered inside the equaliser.
    pub fn flush(&mut self) -> Vec<Complex> {
        match self {
            Equalizer::None | Equalizer::Dfe(_) => Vec::new(),
            Equalizer::Mlse(mlse) => {
                mlse.flush().into_iter().map(|d| PSK8[d as usize]).collect()
            }
        }
    }

    /// Refresh channel tracking from one probe block.
    pub fn train_on_probes(&mut self, received: &[Complex], reference: &[Complex]) {
        if let Equalizer::Mlse(mlse) = self {
            mlse.train_on_probes(received, reference);
        }
    }

    /// A snapshot of the adaptive state: filter weights or channel taps.
    pub fn taps(&self) -> SmallVec<[Complex; 16]> {
        match self {
            Equalizer::None => SmallVec::new(),
            Equalizer::Dfe(dfe) => dfe.taps(),
            Equalizer::Mlse(mlse) => SmallVec::from_slice(&mlse.taps()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_factory_kinds() {
        let channel = ChannelEstimate::identity(3, true);

        assert!(matches!(Equalizer::new(EqualizerKind::None, &channel), Equalizer::None));
        assert!(matches!(Equalizer::new(EqualizerKind::Dfe, &channel), Equalizer::Dfe(_)));
        assert!(matches!(Equalizer::new(EqualizerKind::DfeRls, &channel), Equalizer::Dfe(_)));
        assert!(matches!(Equalizer::new(EqualizerKind::MlseL2, &channel), Equalizer::Mlse(_)));
        assert!(matches!(
            Equalizer::new(EqualizerKind::MlseAdaptive, &channel),
            Equalizer::Mlse(_)
        ));
    }

    #[test]
    fn verify_none_is_passthrough() {
        let mut eq = Equalizer::new(EqualizerKind::None, &ChannelEstimate::identity(2, true));

        let sym = Complex::new(0.6, -0.3);
        assert_eq!(eq.process(sym, None), Some(sym));
        assert!(eq.flush().is_empty());
        assert!(eq.taps().is_empty());
    }

    #[test]
    fn verify_mlse_stream_alignment() {
        // Input length equals output length once flushed, preserving stream order.
        let mut eq = Equalizer::new(EqualizerKind::MlseL2, &ChannelEstimate::identity(2, true));

        let tx: Vec<Complex> = (0..50).map(|i| PSK8[(i * 3) % 8]).collect();
        let mut out = Vec::new();
        for &s in &tx {
            if let Some(y) = eq.process(s, None) {
                out.push(y);
            }
        }
        out.extend(eq.flush());

        assert_eq!(out.len(), tx.len());
        for (a, b) in out.iter().zip(tx.iter()) {
            assert_eq!(position_of(*a), position_of(*b));
        }
    }
}

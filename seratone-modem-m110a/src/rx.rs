// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rx` module assembles the receive pipeline.
//!
//! A recording is mixed to baseband through the matched filter, gain controlled, and searched
//! for the synchronisation preamble across the carrier-frequency grid. After mode detection the
//! data symbols are equalised by the configured variant, the 45-degree phase ambiguity is
//! resolved on the probe symbols, and the codec chain (descramble, demap, deinterleave,
//! repetition combining, Viterbi) recovers the payload bytes.
//!
//! Synchronisation and mode failures are surfaced as a success-with-empty-payload result
//! bearing an error tag, so batch callers can record them without unwinding. Decode failures
//! still return the suspect payload for inspection.

use log::{debug, warn};

use seratone_core::dsp::agc::{self, Agc, AgcParams};
use seratone_core::dsp::complex::Complex;
use seratone_core::dsp::pll::{PhaseTracker, PllParams};
use seratone_core::wave;

use crate::chan::{self, EstimatorConfig};
use crate::eq::{Equalizer, EqualizerKind, TurboConfig, TurboEqualizer};
use crate::errors::{config_error, Error, Result};
use crate::fec;
use crate::interleave::BlockInterleaver;
use crate::mapping::{bits_to_bytes, position_of, soft_bits_of, SoftBit, PSK8};
use crate::mode::{lookup, ModeId, ModeSpec};
use crate::passband::{derotate, to_baseband, SPS};
use crate::preamble;
use crate::scrambler::{descramble, Scrambler};
use crate::sync::{detect_mode, SyncConfig, SyncSearch};
use crate::tx::EOM_BYTES;

/// Pre-FEC bit error rate above which a decode is tagged unreliable.
const BER_FAILURE_THRESHOLD: f32 = 0.35;

/// Fraction of the preamble signal level below which the burst is considered ended.
const BURST_END_LEVEL: f32 = 0.4;

/// Frames inspected by the phase-ambiguity detector.
const AMBIGUITY_FRAMES: usize = 5;

/// Receiver configuration.
#[derive(Copy, Clone, Debug)]
pub struct RxConfig {
    /// Operating mode, or `None` to auto-detect from the preamble probes.
    pub mode: Option<ModeId>,
    /// Equaliser variant.
    pub equalizer: EqualizerKind,
    /// Track residual phase drift during data.
    pub phase_tracking: bool,
    /// Half-width of the carrier search grid, in Hz (at most 20).
    pub freq_search_range_hz: f32,
    /// Carrier search step, in Hz (at least 0.25).
    pub freq_search_step_hz: f32,
    /// Input sample rate: 48000, or 9600 via the 5:1 resampling layer.
    pub sample_rate: u32,
}

impl Default for RxConfig {
    fn default() -> Self {
        RxConfig {
            mode: None,
            equalizer: EqualizerKind::Dfe,
            phase_tracking: true,
            freq_search_range_hz: 10.0,
            freq_search_step_hz: 1.0,
            sample_rate: wave::SAMPLE_RATE,
        }
    }
}

impl RxConfig {
    fn validate(&self) -> Result<()> {
        if self.freq_search_range_hz <= 0.0 || self.freq_search_range_hz > 20.0 {
            return config_error("frequency search range must be within (0, 20] Hz");
        }
        if self.freq_search_step_hz < 0.25 {
            return config_error("frequency search step must be at least 0.25 Hz");
        }
        if self.sample_rate != wave::SAMPLE_RATE && self.sample_rate != wave::SAMPLE_RATE_COMPAT
        {
            return config_error("sample rate must be 48000 or 9600");
        }
        if self.equalizer == EqualizerKind::Turbo {
            if let Some(mode) = self.mode {
                if !lookup(mode).fec {
                    return config_error("turbo equalizer requires a coded mode");
                }
            }
        }
        Ok(())
    }
}

/// The outcome of a decode.
#[derive(Clone, Debug, Default)]
pub struct DecodeResult {
    /// True when a payload was recovered with no error tag.
    pub success: bool,
    /// The detected (or caller-supplied) mode, when synchronisation got that far.
    pub mode: Option<ModeId>,
    /// Decoded payload bytes.
    pub data: Vec<u8>,
    /// True when the end-of-message marker was found and stripped.
    pub eom_detected: bool,
    /// EVM-based signal-to-noise estimate, in dB.
    pub snr_db: f32,
    /// Estimated pre-FEC bit error rate.
    pub ber_estimate: f32,
    /// Detected carrier offset, in Hz.
    pub freq_offset_hz: f32,
    /// The error tag, when the decode did not fully succeed.
    pub error: Option<Error>,
}

impl DecodeResult {
    fn failed(error: Error) -> DecodeResult {
        DecodeResult { error: Some(error), ..Default::default() }
    }

    /// The payload interpreted as UTF-8 text, lossily.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// The receiver for one decode session.
///
/// Sessions own all their state and are `Clone`; independent sessions may run on separate
/// threads without sharing anything mutable.
#[derive(Clone)]
pub struct Receiver {
    config: RxConfig,
}

impl Receiver {
    pub fn new(config: RxConfig) -> Result<Receiver> {
        config.validate()?;
        Ok(Receiver { config })
    }

    pub fn config(&self) -> &RxConfig {
        &self.config
    }

    /// Decode a byte buffer holding either raw 16-bit PCM or a `.wav` container.
    pub fn decode_bytes(&self, bytes: &[u8]) -> DecodeResult {
        let parsed = if wave::is_wav(bytes) {
            wave::parse_wav(bytes, self.config.sample_rate)
        }
        else {
            wave::pcm_to_f32(bytes)
        };

        match parsed {
            Ok(samples) => self.decode(&samples),
            Err(err) => DecodeResult::failed(err),
        }
    }

    /// Decode an audio recording to payload bytes.
    pub fn decode(&self, samples: &[f32]) -> DecodeResult {
        let upsampled;
        let samples = if self.config.sample_rate == wave::SAMPLE_RATE_COMPAT {
            upsampled = wave::interpolate_5(samples);
            &upsampled
        }
        else {
            samples
        };

        // Downconvert once; the sync search retunes this cached baseband per trial frequency.
        let mut baseband = to_baseband(samples);

        // One gain for the whole recording; a time-varying gain would skew the channel-scale
        // model the MLSE metrics depend on.
        let mut agc = Agc::new(AgcParams::default());
        agc.process(&mut baseband);

        let sync_config = SyncConfig {
            freq_range_hz: self.config.freq_search_range_hz,
            freq_step_hz: self.config.freq_search_step_hz,
        };

        let Some(sync) = SyncSearch::new(&baseband, sync_config).run() else {
            return DecodeResult::failed(Error::NoSync);
        };

        // Remove the detected carrier offset and the coarse phase, then sample at the symbol
        // instants.
        derotate(&mut baseband, sync.freq_offset_hz);
        let rotation = Complex::expj(-sync.phase);

        let mut symbols = Vec::new();
        let mut k = 0;
        while sync.start_sample + k * SPS < baseband.len() {
            symbols.push(baseband[sync.start_sample + k * SPS] * rotation);
            k += 1;
        }

        if symbols.len() < preamble::TOTAL_LEN {
            return DecodeResult::failed(Error::NoSync);
        }

        agc::normalize(&mut symbols, 1.0);

        // Mode detection is bypassed when the caller supplies the mode.
        let mode = match self.config.mode {
            Some(mode) => mode,
            None => {
                let d1 = &symbols[preamble::D1_OFFSET..preamble::D2_OFFSET];
                let d2 = &symbols[preamble::D2_OFFSET..preamble::TOTAL_LEN];
                match detect_mode(d1, d2) {
                    Some(mode) => mode,
                    None => return DecodeResult::failed(Error::UnknownMode),
                }
            }
        };

        let spec = lookup(mode);
        debug!("rx: mode {} at {:+.2} Hz", spec.name, sync.freq_offset_hz);

        if self.config.equalizer == EqualizerKind::Turbo && !spec.fec {
            return DecodeResult::failed(Error::ConfigError(
                "turbo equalizer requires a coded mode",
            ));
        }

        // Trim the data region to whole transmit units. Burst-end detection is accurate to a
        // symbol or two (the matched filter output decays to the Nyquist zeros immediately
        // after the last symbol), so rounding to the nearest frame or block removes tail junk
        // without dropping data.
        let end = burst_end(&symbols);
        let data_region = &symbols[preamble::TOTAL_LEN..end.max(preamble::TOTAL_LEN)];
        let data_symbols = &data_region[..trim_to_units(spec, data_region.len())];

        // Channel estimate from the common preamble segment. The fitted scale is kept: the
        // MLSE branch metrics must predict the received samples as they are, gain included.
        let channel = chan::estimate(
            &EstimatorConfig { normalize: false, ..Default::default() },
            &symbols[..preamble::COMMON_LEN],
            preamble::reference(preamble::COMMON_LEN),
        );
        if !channel.valid {
            warn!("rx: channel estimate invalid, proceeding with identity");
        }

        let mut result = if self.config.equalizer == EqualizerKind::Turbo {
            self.decode_turbo(mode, data_symbols, &channel)
        }
        else {
            self.decode_stream(mode, &symbols, data_symbols, &channel)
        };

        result.mode = Some(mode);
        result.freq_offset_hz += sync.freq_offset_hz;

        if let Some(err) = &result.error {
            debug!("rx: decode tagged {:?}", err);
        }

        result
    }

    /// The symbol-stream path: equalise, resolve phase ambiguity, and run the codec chain.
    fn decode_stream(
        &self,
        mode: ModeId,
        symbols: &[Complex],
        data_symbols: &[Complex],
        channel: &chan::ChannelEstimate,
    ) -> DecodeResult {
        let spec = lookup(mode);

        let mut eq = Equalizer::new(self.config.equalizer, channel);

        // Pre-train on the full preamble, mode probes included. The DFE requires this before
        // any data symbol.
        let (d1, d2) = preamble::probes_of_mode(mode);
        let preamble_refs: Vec<Complex> =
            preamble::positions(d1, d2).iter().map(|&p| PSK8[p as usize]).collect();
        eq.train(&symbols[..preamble::TOTAL_LEN], &preamble_refs);

        let use_pll = self.config.phase_tracking
            && matches!(
                self.config.equalizer,
                EqualizerKind::None | EqualizerKind::Dfe | EqualizerKind::DfeRls
            );
        let mut pll = PhaseTracker::new(PllParams::default());

        // Walk the frame structure: data symbols run decision-directed, probe symbols are
        // reference-aided, and the scrambler advances across both.
        let mut equalized = Vec::with_capacity(data_symbols.len());
        let mut scr = Scrambler::new();
        let mut idx = 0;

        if spec.has_probes() {
            while idx < data_symbols.len() {
                for _ in 0..spec.unknown_len {
                    if idx >= data_symbols.len() {
                        break;
                    }
                    let mut sym = data_symbols[idx];
                    if use_pll {
                        sym = pll.track(sym);
                    }
                    if let Some(y) = eq.process(sym, None) {
                        equalized.push(y);
                    }
                    scr.skip(1);
                    idx += 1;
                }

                let mut probe_rx = Vec::with_capacity(spec.known_len);
                let mut probe_refs = Vec::with_capacity(spec.known_len);

                for _ in 0..spec.known_len {
                    if idx >= data_symbols.len() {
                        break;
                    }
                    let reference = PSK8[scr.next() as usize];
                    let mut sym = data_symbols[idx];
                    if use_pll {
                        sym = pll.track_known(sym, reference);
                    }
                    probe_rx.push(sym);
                    probe_refs.push(reference);
                    if let Some(y) = eq.process(sym, Some(reference)) {
                        equalized.push(y);
                    }
                    idx += 1;
                }

                eq.train_on_probes(&probe_rx, &probe_refs);
            }
        }
        else {
            for &sym in data_symbols {
                let mut sym = sym;
                if use_pll {
                    sym = pll.track(sym);
                }
                if let Some(y) = eq.process(sym, None) {
                    equalized.push(y);
                }
            }
        }
        equalized.extend(eq.flush());

        let snr_db = evm_snr_db(&equalized);
        let positions: Vec<u8> = equalized.iter().map(|&s| position_of(s)).collect();

        let mut result = self.decode_positions(spec, &positions);
        result.snr_db = snr_db;
        if use_pll {
            result.freq_offset_hz = pll.frequency_hz();
        }
        result
    }

    /// The codec chain over hard constellation positions.
    fn decode_positions(&self, spec: &ModeSpec, positions: &[u8]) -> DecodeResult {
        let phase_offset = detect_phase_offset(spec, positions);
        if phase_offset != 0 {
            debug!("rx: corrected {}x45 degree phase ambiguity", phase_offset);
        }

        // Descramble the data symbols into soft bits; probe positions advance the scrambler.
        let mut soft: Vec<SoftBit> = Vec::new();
        let mut scr = Scrambler::new();
        let mut idx = 0;

        while idx < positions.len() {
            let data_run =
                if spec.has_probes() { spec.unknown_len } else { positions.len() };

            for _ in 0..data_run {
                if idx >= positions.len() {
                    break;
                }
                let pos = (positions[idx] + phase_offset) & 7;
                let value = descramble(pos, scr.next());
                soft_bits_of(value, spec.modulation, &mut soft);
                idx += 1;
            }

            for _ in 0..spec.known_len {
                if idx >= positions.len() {
                    break;
                }
                scr.skip(1);
                idx += 1;
            }
        }

        // Deinterleave whole blocks, erasure-padding any partial tail.
        let deinterleaved = match spec.interleaver.as_ref() {
            Some(il_spec) => {
                let il = BlockInterleaver::new(il_spec);
                while soft.len() % il.block_bits() != 0 {
                    soft.push(0);
                }
                il.deinterleave_stream(&soft)
            }
            None => soft,
        };

        // Sum repeated (G1, G2) metric pairs into one pair per coded bit.
        let combined = combine_repetitions(&deinterleaved, spec.repetition);

        let bits = if spec.fec {
            fec::decode_block(&combined, true)
        }
        else {
            combined.iter().map(|&sb| u8::from(sb < 0)).collect()
        };

        let ber_estimate = if spec.fec { reencode_ber(&bits, &combined) } else { 0.0 };

        let mut result = finish(bits);
        result.ber_estimate = ber_estimate;

        if ber_estimate > BER_FAILURE_THRESHOLD {
            warn!("rx: pre-FEC BER estimate {:.2}, tagging decode as unreliable", ber_estimate);
            result.success = false;
            result.error = Some(Error::DecodeFailure("pre-FEC bit error rate above threshold"));
        }

        result
    }

    /// The turbo path: separate data from probes, then iterate MLSE and SISO.
    fn decode_turbo(
        &self,
        mode: ModeId,
        data_symbols: &[Complex],
        channel: &chan::ChannelEstimate,
    ) -> DecodeResult {
        let spec = lookup(mode);

        let mut turbo = match TurboEqualizer::new(mode, TurboConfig::default()) {
            Ok(turbo) => turbo,
            Err(err) => return DecodeResult::failed(err),
        };

        // Strip the probe frames, keeping each data symbol's scrambler tribit.
        let mut data = Vec::new();
        let mut scramble = Vec::new();
        let mut scr = Scrambler::new();
        let mut idx = 0;

        while idx < data_symbols.len() {
            let data_run = if spec.has_probes() { spec.unknown_len } else { data_symbols.len() };

            for _ in 0..data_run {
                if idx >= data_symbols.len() {
                    break;
                }
                data.push(data_symbols[idx]);
                scramble.push(scr.next());
                idx += 1;
            }

            for _ in 0..spec.known_len {
                if idx >= data_symbols.len() {
                    break;
                }
                scr.skip(1);
                idx += 1;
            }
        }

        let bits = turbo.decode(&data, &scramble, channel);
        let stats = turbo.stats();
        debug!("rx: turbo used {} iterations (converged: {})", stats.iterations, stats.converged);

        let mut result = finish(bits);
        result.snr_db = evm_snr_db(&data);
        result
    }
}

/// Pack decoded bits into bytes and strip the end-of-message marker.
fn finish(bits: Vec<u8>) -> DecodeResult {
    let mut data = bits_to_bytes(&bits);
    let mut eom_detected = false;

    if let Some(at) = find_eom(&data) {
        data.truncate(at);
        eom_detected = true;
    }

    DecodeResult { success: true, data, eom_detected, ..Default::default() }
}

/// Locate the end-of-message marker in the decoded bytes.
fn find_eom(data: &[u8]) -> Option<usize> {
    if data.len() < EOM_BYTES.len() {
        return None;
    }
    (0..=data.len() - EOM_BYTES.len()).find(|&i| data[i..i + EOM_BYTES.len()] == EOM_BYTES)
}

/// Round a data-region length to the transmitter's whole-unit granularity: frames for probe
/// modes, interleaver blocks for the continuous modes.
fn trim_to_units(spec: &ModeSpec, len: usize) -> usize {
    let unit = if spec.has_probes() {
        spec.frame_len()
    }
    else {
        match spec.interleaver.as_ref() {
            Some(il) => il.block_bits() / spec.bits_per_symbol(),
            None => spec.frame_len(),
        }
    };

    let units = (len + unit / 2) / unit;
    (units * unit).min(len)
}

/// Last symbol index carrying burst energy, judged against the preamble level.
fn burst_end(symbols: &[Complex]) -> usize {
    let preamble_level = symbols[..preamble::TOTAL_LEN.min(symbols.len())]
        .iter()
        .map(|s| s.abs())
        .sum::<f32>()
        / preamble::TOTAL_LEN.min(symbols.len()) as f32;

    let threshold = preamble_level * BURST_END_LEVEL;

    for i in (0..symbols.len()).rev() {
        if symbols[i].abs() > threshold {
            return i + 1;
        }
    }
    symbols.len()
}

/// Detect the 45-degree phase ambiguity on probe symbols.
///
/// For each of the eight candidate rotations, the scrambler is run over the first few frames
/// and the probe positions are checked against their expected descramble-to-zero target, with
/// one position of tolerance for noise. The rotation with the most matches wins. Modes without
/// probes rely on the unambiguous preamble phase.
fn detect_phase_offset(spec: &ModeSpec, positions: &[u8]) -> u8 {
    if !spec.has_probes() {
        return 0;
    }

    let frame_len = spec.frame_len();
    let mut counts = [0u32; 8];

    for trial in 0..8u8 {
        let mut scr = Scrambler::new();
        let mut idx = 0;
        let mut frames = 0;

        while idx + frame_len <= positions.len() && frames < AMBIGUITY_FRAMES {
            scr.skip(spec.unknown_len);

            for i in 0..spec.known_len {
                let pos = (positions[idx + spec.unknown_len + i] + trial) & 7;
                let value = descramble(pos, scr.next());
                if value == 0 || value == 1 || value == 7 {
                    counts[trial as usize] += 1;
                }
            }

            idx += frame_len;
            frames += 1;
        }
    }

    (0..8u8).max_by_key(|&t| counts[t as usize]).unwrap_or(0)
}

/// Sum repeated (G1, G2) soft pairs into one saturating pair per coded bit.
fn combine_repetitions(soft: &[SoftBit], repetition: usize) -> Vec<SoftBit> {
    if repetition == 1 {
        return soft.to_vec();
    }

    let group = 2 * repetition;
    let mut combined = Vec::with_capacity(soft.len() / repetition);

    for chunk in soft.chunks_exact(group) {
        let mut g1 = 0i32;
        let mut g2 = 0i32;
        for r in 0..repetition {
            g1 += i32::from(chunk[2 * r]);
            g2 += i32::from(chunk[2 * r + 1]);
        }
        combined.push(g1.clamp(-127, 127) as SoftBit);
        combined.push(g2.clamp(-127, 127) as SoftBit);
    }

    combined
}

/// Pre-FEC bit error rate: re-encode the decoded bits and compare against the received hard
/// decisions.
fn reencode_ber(bits: &[u8], combined: &[SoftBit]) -> f32 {
    let coded = fec::encode(bits);

    let mut errors = 0usize;
    let mut total = 0usize;

    for (&c, &sb) in coded.iter().zip(combined.iter()) {
        if sb == 0 {
            continue;
        }
        total += 1;
        let received_bit = u8::from(sb < 0);
        if received_bit != c {
            errors += 1;
        }
    }

    if total == 0 {
        0.0
    }
    else {
        errors as f32 / total as f32
    }
}

/// Error-vector-magnitude SNR estimate over equalised symbols.
fn evm_snr_db(symbols: &[Complex]) -> f32 {
    if symbols.is_empty() {
        return 0.0;
    }

    let mut noise = 0.0f32;
    let mut signal = 0.0f32;
    for &s in symbols {
        let ideal = PSK8[position_of(s) as usize];
        noise += (s - ideal).norm_sqr();
        signal += ideal.norm_sqr();
    }

    10.0 * ((signal + 1e-12) / (noise + 1e-12)).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_config_validation() {
        assert!(Receiver::new(RxConfig { freq_search_range_hz: 25.0, ..Default::default() })
            .is_err());
        assert!(Receiver::new(RxConfig { freq_search_step_hz: 0.1, ..Default::default() })
            .is_err());
        assert!(Receiver::new(RxConfig { sample_rate: 8000, ..Default::default() }).is_err());
        assert!(Receiver::new(RxConfig {
            equalizer: EqualizerKind::Turbo,
            mode: Some(ModeId::M4800S),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn verify_find_eom() {
        let mut data = b"PAYLOAD".to_vec();
        data.extend_from_slice(&EOM_BYTES);
        data.extend_from_slice(&[0, 0, 0]);

        assert_eq!(find_eom(&data), Some(7));
        assert_eq!(find_eom(b"NO MARKER HERE"), None);
    }

    #[test]
    fn verify_combine_repetitions_saturates() {
        let soft: Vec<SoftBit> = vec![100, -100, 100, -100, 50, -50, 60, -60];
        let combined = combine_repetitions(&soft, 2);

        assert_eq!(combined, vec![127, -127, 110, -110]);
    }

    #[test]
    fn verify_reencode_ber_clean() {
        let bits = vec![1, 0, 1, 1, 0];
        let coded = fec::encode(&bits);
        let soft: Vec<SoftBit> = coded.iter().map(|&b| if b == 0 { 127 } else { -127 }).collect();

        assert_eq!(reencode_ber(&bits, &soft), 0.0);
    }

    #[test]
    fn verify_evm_snr_monotonic() {
        let clean: Vec<Complex> = (0..64).map(|i| PSK8[i % 8]).collect();
        let noisy: Vec<Complex> =
            clean.iter().map(|&s| s + Complex::new(0.1, -0.08)).collect();

        assert!(evm_snr_db(&clean) > evm_snr_db(&noisy));
        assert!(evm_snr_db(&noisy) > 5.0);
    }

    #[test]
    fn verify_decode_pure_noise_is_no_sync() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(99);
        let noise: Vec<f32> = (0..96000).map(|_| rng.random_range(-0.3..0.3)).collect();

        let rx = Receiver::new(RxConfig::default()).unwrap();
        let result = rx.decode(&noise);

        assert!(!result.success);
        assert_eq!(result.error, Some(Error::NoSync));
        assert!(result.data.is_empty());
    }
}

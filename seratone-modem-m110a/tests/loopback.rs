// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end transmit/receive scenarios over simulated HF channel impairments.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use seratone_core::errors::Error;
use seratone_core::wave;

use seratone_modem_m110a::eq::EqualizerKind;
use seratone_modem_m110a::preamble;
use seratone_modem_m110a::{ModeId, Receiver, RxConfig, Transmitter, TxConfig};

const PANGRAM: &[u8] = b"THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG 1234567890";

fn encode(data: &[u8], mode: ModeId) -> Vec<f32> {
    Transmitter::new(TxConfig::for_mode(mode)).unwrap().encode(data).unwrap()
}

fn receiver(mode: Option<ModeId>, equalizer: EqualizerKind) -> Receiver {
    Receiver::new(RxConfig { mode, equalizer, ..Default::default() }).unwrap()
}

/// Add white Gaussian noise at the given SNR relative to the signal power.
fn awgn(samples: &mut [f32], snr_db: f32, rng: &mut SmallRng) {
    let power: f32 =
        samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32;
    let sigma = (power / 10f32.powf(snr_db / 10.0)).sqrt();

    // Box-Muller transform.
    for pair in samples.chunks_mut(2) {
        let u1: f32 = rng.random_range(1e-9..1.0f32);
        let u2: f32 = rng.random_range(0.0..1.0f32);
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * core::f32::consts::PI * u2;

        pair[0] += sigma * r * theta.cos();
        if pair.len() > 1 {
            pair[1] += sigma * r * theta.sin();
        }
    }
}

/// A two-path channel: the direct ray plus a delayed echo.
fn two_path_echo(samples: &[f32], delay: usize, gain: f32) -> Vec<f32> {
    (0..samples.len())
        .map(|n| samples[n] + if n >= delay { gain * samples[n - delay] } else { 0.0 })
        .collect()
}

/// Shift a real passband signal in frequency using an FIR Hilbert transformer to form the
/// analytic signal.
fn carrier_offset(samples: &[f32], offset_hz: f32) -> Vec<f32> {
    const TAPS: usize = 63;
    const MID: usize = TAPS / 2;

    let mut h = [0.0f32; TAPS];
    for (k, tap) in h.iter_mut().enumerate() {
        let n = k as i32 - MID as i32;
        if n % 2 != 0 {
            let window = 0.54
                - 0.46 * (2.0 * core::f32::consts::PI * k as f32 / (TAPS - 1) as f32).cos();
            *tap = 2.0 / (core::f32::consts::PI * n as f32) * window;
        }
    }

    let mut out = vec![0.0f32; samples.len()];
    for i in 0..samples.len() {
        // Quadrature component via the Hilbert FIR; in-phase delayed to match.
        let mut q = 0.0f32;
        for (k, &tap) in h.iter().enumerate() {
            if tap != 0.0 && i >= k {
                q += tap * samples[i - k];
            }
        }
        let inphase = if i >= MID { samples[i - MID] } else { 0.0 };

        let theta = 2.0 * core::f32::consts::PI * offset_hz * i as f32 / 48000.0;
        out[i] = inphase * theta.cos() - q * theta.sin();
    }

    out
}

#[test]
fn scenario_pangram_2400s_auto_detect() {
    let audio = encode(PANGRAM, ModeId::M2400S);
    let result = receiver(None, EqualizerKind::Dfe).decode(&audio);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.mode, Some(ModeId::M2400S));
    assert!(result.eom_detected);
    assert_eq!(result.data, PANGRAM);
}

#[test]
fn scenario_600s_awgn_dfe() {
    let payload = vec![0xA5u8; 100];
    let mut audio = encode(&payload, ModeId::M600S);

    let mut rng = SmallRng::seed_from_u64(0x600);
    awgn(&mut audio, 15.0, &mut rng);

    let result = receiver(Some(ModeId::M600S), EqualizerKind::Dfe).decode(&audio);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data, payload);
}

#[test]
fn scenario_1200s_multipath_mlse() {
    let payload = b"Hello, World!";
    let audio = encode(payload, ModeId::M1200S);

    // A 1 ms (48 sample) echo at half amplitude.
    let impaired = two_path_echo(&audio, 48, 0.5);

    let result = receiver(Some(ModeId::M1200S), EqualizerKind::MlseL3).decode(&impaired);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data, payload);
}

#[test]
fn scenario_2400s_carrier_offset_dfe() {
    let mut rng = SmallRng::seed_from_u64(0x2400);
    let payload: Vec<u8> = (0..64).map(|_| rng.random_range(0..=255u32) as u8).collect();

    let audio = encode(&payload, ModeId::M2400S);
    let shifted = carrier_offset(&audio, 3.0);

    let result = receiver(Some(ModeId::M2400S), EqualizerKind::Dfe).decode(&shifted);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data, payload);
    assert!(
        (result.freq_offset_hz - 3.0).abs() < 0.5,
        "detected {} Hz",
        result.freq_offset_hz
    );
}

#[test]
fn scenario_empty_payload_75s() {
    let audio = encode(&[], ModeId::M75S);
    let result = receiver(None, EqualizerKind::Dfe).decode(&audio);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.mode, Some(ModeId::M75S));
    assert!(result.data.is_empty());
}

#[test]
fn scenario_preamble_reference_is_stable() {
    let first = preamble::reference(288);
    let second = preamble::reference(288);

    assert_eq!(first.len(), 288);

    // Unit magnitude on 45 degree angles, identical across invocations, and a stable digest.
    let digest = |syms: &[seratone_core::dsp::complex::Complex]| {
        let mut hash = 0xcbf29ce484222325u64;
        for s in syms {
            assert!((s.norm_sqr() - 1.0).abs() < 1e-5);
            let eighths = (s.arg() * 4.0 / core::f32::consts::PI).round();
            let pos = (eighths as i32).rem_euclid(8) as u64;
            hash = (hash ^ pos).wrapping_mul(0x100000001b3);
        }
        hash
    };

    assert_eq!(digest(first), digest(second));

    // The first block carries the bare preamble scrambler.
    for k in 0..32 {
        let eighths = (first[k].arg() * 4.0 / core::f32::consts::PI).round();
        assert_eq!((eighths as i32).rem_euclid(8) as u8, preamble::PSCRAMBLE[k]);
    }
}

#[test]
fn all_modes_round_trip_clean() {
    for &mode in ModeId::ALL.iter() {
        let payload = b"interoperability check 0123456789";
        let audio = encode(payload, mode);

        // A tight frequency grid: these recordings carry no carrier offset, and the long
        // interleave modes produce several seconds of audio to scan.
        let rx = Receiver::new(RxConfig {
            mode: Some(mode),
            freq_search_range_hz: 2.0,
            ..Default::default()
        })
        .unwrap();
        let result = rx.decode(&audio);

        assert!(result.success, "{:?}: {:?}", mode, result.error);
        assert_eq!(result.data, payload, "{:?}", mode);
    }
}

#[test]
fn auto_detection_reports_the_sent_mode() {
    for &mode in &[ModeId::M600S, ModeId::M1200S, ModeId::M2400S, ModeId::M4800S] {
        let audio = encode(b"mode probe check", mode);
        let rx = Receiver::new(RxConfig { freq_search_range_hz: 2.0, ..Default::default() })
            .unwrap();
        let result = rx.decode(&audio);

        assert!(result.success, "{:?}: {:?}", mode, result.error);
        assert_eq!(result.mode, Some(mode));
    }
}

#[test]
fn turbo_equalizer_decodes_multipath() {
    let payload = b"turbo equalization over a two-path channel";
    let audio = encode(payload, ModeId::M2400S);
    let impaired = two_path_echo(&audio, 20, 0.4);

    let result = receiver(Some(ModeId::M2400S), EqualizerKind::Turbo).decode(&impaired);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data, payload);
}

#[test]
fn unknown_probe_pair_is_reported() {
    use seratone_modem_m110a::passband::Modulator;

    // A preamble carrying the invalid probe pair (0, 0) must sync but fail mode detection.
    let mut modulator = Modulator::new(1.0);
    let audio = modulator.modulate(&preamble::positions(0, 0));

    let result = receiver(None, EqualizerKind::Dfe).decode(&audio);

    assert!(!result.success);
    assert_eq!(result.error, Some(Error::UnknownMode));
}

#[test]
fn wav_container_round_trip() {
    let audio = encode(b"RIFF wrapped burst", ModeId::M2400S);
    let bytes = wave::write_wav(&audio, wave::SAMPLE_RATE);

    let result = receiver(None, EqualizerKind::Dfe).decode_bytes(&bytes);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data, b"RIFF wrapped burst");
}

#[test]
fn longer_payload_spans_multiple_interleaver_blocks() {
    // Three 2400S blocks: 54 bytes fill one, so 300 bytes need several.
    let payload: Vec<u8> = (0..300).map(|i| (i * 7 + 13) as u8).collect();
    let audio = encode(&payload, ModeId::M2400S);

    let result = receiver(Some(ModeId::M2400S), EqualizerKind::Dfe).decode(&audio);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data, payload);
}

#[test]
fn parallel_sessions_match_serial_decode() {
    use std::thread;

    let audio = encode(PANGRAM, ModeId::M2400S);
    let serial = receiver(None, EqualizerKind::Dfe).decode(&audio);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let rx = receiver(None, EqualizerKind::Dfe);
            let samples = audio.clone();
            thread::spawn(move || rx.decode(&samples))
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert_eq!(result.success, serial.success);
        assert_eq!(result.data, serial.data);
        assert_eq!(result.mode, serial.mode);
    }
}

#[test]
fn compat_rate_round_trip() {
    // Encode and decode through the 9.6 kHz resampling layer.
    let tx = Transmitter::new(TxConfig {
        sample_rate: wave::SAMPLE_RATE_COMPAT,
        ..TxConfig::for_mode(ModeId::M600S)
    })
    .unwrap();

    let rx = Receiver::new(RxConfig {
        mode: Some(ModeId::M600S),
        sample_rate: wave::SAMPLE_RATE_COMPAT,
        ..Default::default()
    })
    .unwrap();

    let audio = tx.encode(b"narrowband path").unwrap();
    let result = rx.decode(&audio);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data, b"narrowband path");
}

// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `wave` module is the waveform boundary layer.
//!
//! The canonical exchange format is real-valued, 16-bit signed little-endian PCM, mono, at
//! 48 kHz. A `.wav` wrapper is also accepted; its RIFF header is parsed to confirm the sample
//! rate, bit depth, and channel count before the payload is used. Internally all processing is
//! done on 32-bit floats normalised to +/-1.0.

use log::debug;

use crate::dsp::complex::Complex;
use crate::dsp::fir::{low_pass, Fir};
use crate::errors::{format_error, Result};

/// The canonical sample rate, in Hz.
pub const SAMPLE_RATE: u32 = 48000;

/// The compatibility sample rate served by the 5:1 resampling layer, in Hz.
pub const SAMPLE_RATE_COMPAT: u32 = 9600;

/// Convert raw little-endian 16-bit PCM bytes into normalised f32 samples.
pub fn pcm_to_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return format_error("pcm: odd byte count for 16-bit samples");
    }

    let mut samples = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let raw: [u8; 2] = pair.try_into().unwrap();
        samples.push(f32::from(i16::from_le_bytes(raw)) / 32768.0);
    }
    Ok(samples)
}

/// Convert normalised f32 samples into raw little-endian 16-bit PCM bytes. Samples are clamped to
/// the representable range.
pub fn f32_to_pcm(samples: &[f32]) -> Vec<u8> {
    let ints: Vec<i16> = samples
        .iter()
        .map(|&s| (s * 32767.0).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16)
        .collect();

    bytemuck::cast_slice::<i16, u8>(&ints).to_vec()
}

fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_u16_le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
}

/// Returns true when the byte buffer starts with a RIFF/WAVE header.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Parse a RIFF/WAVE byte buffer and return its samples as normalised f32.
///
/// Only the container shape used on the wire is admitted: PCM format, mono, 16 bits per sample,
/// at the expected rate. Anything else is a [`crate::errors::Error::FormatError`].
pub fn parse_wav(bytes: &[u8], expected_rate: u32) -> Result<Vec<f32>> {
    if !is_wav(bytes) {
        return format_error("wav: missing RIFF/WAVE header");
    }

    let mut pos = 12;
    let mut samples = None;
    let mut fmt_seen = false;

    // Walk the chunk list. Chunks are word-aligned.
    while pos + 8 <= bytes.len() {
        let tag = &bytes[pos..pos + 4];
        let len = read_u32_le(bytes, pos + 4) as usize;
        pos += 8;

        if pos + len > bytes.len() {
            return format_error("wav: truncated chunk");
        }

        match tag {
            b"fmt " => {
                if len < 16 {
                    return format_error("wav: malformed fmt chunk");
                }

                let format_tag = read_u16_le(bytes, pos);
                let n_channels = read_u16_le(bytes, pos + 2);
                let sample_rate = read_u32_le(bytes, pos + 4);
                let bits_per_sample = read_u16_le(bytes, pos + 14);

                if format_tag != 1 {
                    return format_error("wav: only PCM format is supported");
                }
                if n_channels != 1 {
                    return format_error("wav: only mono waveforms are supported");
                }
                if bits_per_sample != 16 {
                    return format_error("wav: only 16-bit samples are supported");
                }
                if sample_rate != expected_rate {
                    return format_error("wav: unexpected sample rate");
                }

                fmt_seen = true;
            }
            b"data" => {
                if !fmt_seen {
                    return format_error("wav: data chunk precedes fmt chunk");
                }
                samples = Some(pcm_to_f32(&bytes[pos..pos + len])?);
            }
            _ => (),
        }

        pos += len + (len & 1);
    }

    match samples {
        Some(samples) => {
            debug!("wav: {} samples at {} Hz", samples.len(), expected_rate);
            Ok(samples)
        }
        None => format_error("wav: missing data chunk"),
    }
}

/// Serialise samples into a RIFF/WAVE byte buffer (PCM, mono, 16-bit).
pub fn write_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data = f32_to_pcm(samples);
    let data_len = data.len() as u32;

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(&data);

    out
}

// The anti-alias filter for the 5:1 rate change cuts off at 0.8 of the Nyquist rate of the lower
// stream.
const RESAMPLE_TAPS: usize = 101;
const RESAMPLE_CUTOFF: f32 = 0.08;

/// Decimate a 48 kHz stream to 9.6 kHz (5:1) with anti-alias filtering.
pub fn decimate_5(input: &[f32]) -> Vec<f32> {
    let mut lpf = Fir::new(&low_pass(RESAMPLE_CUTOFF, RESAMPLE_TAPS));

    let mut out = Vec::with_capacity(input.len() / 5 + 1);
    for (i, &s) in input.iter().enumerate() {
        let y = lpf.process(Complex::new(s, 0.0));
        if i % 5 == 0 {
            out.push(y.re);
        }
    }
    out
}

/// Interpolate a 9.6 kHz stream to 48 kHz (1:5) by zero-stuffing and image-reject filtering.
pub fn interpolate_5(input: &[f32]) -> Vec<f32> {
    let mut lpf = Fir::new(&low_pass(RESAMPLE_CUTOFF, RESAMPLE_TAPS));

    let mut out = Vec::with_capacity(input.len() * 5);
    for &s in input {
        // The filter removes the spectral images; the gain of 5 restores the amplitude lost to
        // zero-stuffing.
        out.push(lpf.process(Complex::new(s * 5.0, 0.0)).re);
        for _ in 0..4 {
            out.push(lpf.process(Complex::zero()).re);
        }
    }
    out
}

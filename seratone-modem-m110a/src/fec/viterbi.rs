// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hard-decision Viterbi decoder over soft input metrics.

use crate::mapping::SoftBit;

use super::conv::{Trellis, FLUSH_BITS, NUM_STATES};

const METRIC_FLOOR: i64 = i64::MIN / 4;

/// Decode a block of soft coded-bit pairs.
///
/// The metric convention is +127 for a confident 0 and -127 for a confident 1. When `flushed`
/// is true the codeword is assumed to end in the six-bit register flush: traceback starts from
/// the all-zero state and the flush bits are removed from the output.
///
/// The whole block is decoded with full traceback, which subsumes the minimum 5*K survivor
/// depth of a streaming decoder.
pub fn decode_block(soft: &[SoftBit], flushed: bool) -> Vec<u8> {
    let num_bits = soft.len() / 2;
    if num_bits == 0 {
        return Vec::new();
    }

    let trellis = Trellis::new();

    // Path metrics. Decoding starts from the all-zero state.
    let mut metrics = [METRIC_FLOOR; NUM_STATES];
    metrics[0] = 0;

    // The chosen predecessor of every state at every step.
    let mut survivors = vec![[0u8; NUM_STATES]; num_bits];

    for t in 0..num_bits {
        let g1 = i64::from(soft[2 * t]);
        let g2 = i64::from(soft[2 * t + 1]);

        let mut next_metrics = [METRIC_FLOOR; NUM_STATES];
        let survivor = &mut survivors[t];

        for state in 0..NUM_STATES {
            let pm = metrics[state];
            if pm <= METRIC_FLOOR {
                continue;
            }

            for input in 0..2 {
                // Correlate the soft metrics against the expected coded bits.
                let mut bm = pm;
                bm += if trellis.out_g1[state][input] == 0 { g1 } else { -g1 };
                bm += if trellis.out_g2[state][input] == 0 { g2 } else { -g2 };

                let ns = trellis.next[state][input] as usize;
                if bm > next_metrics[ns] {
                    next_metrics[ns] = bm;
                    survivor[ns] = state as u8;
                }
            }
        }

        metrics = next_metrics;
    }

    // A flushed codeword terminates in state 0; otherwise take the best survivor.
    let mut state = if flushed && metrics[0] > METRIC_FLOOR {
        0usize
    }
    else {
        metrics
            .iter()
            .enumerate()
            .max_by_key(|&(_, &m)| m)
            .map(|(s, _)| s)
            .unwrap_or(0)
    };

    let mut bits = vec![0u8; num_bits];
    for t in (0..num_bits).rev() {
        bits[t] = Trellis::input_of(state as u8);
        state = survivors[t][state] as usize;
    }

    if flushed && num_bits >= FLUSH_BITS {
        bits.truncate(num_bits - FLUSH_BITS);
    }

    bits
}

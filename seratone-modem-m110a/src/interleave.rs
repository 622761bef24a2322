// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `interleave` module implements the mode-dependent rectangular block interleaver.
//!
//! Loading walks the matrix on a non-unit row stride, advancing the column when the row wraps.
//! Fetching walks rows one at a time on a non-unit column stride, resuming from a separate
//! last-column cursor when the row wraps. Both walks visit every cell exactly once, so a block
//! reduces to a fixed permutation that is computed at construction and applied to hard bits or
//! soft values alike.

use crate::mode::InterleaverSpec;

/// A block interleaver for one mode.
#[derive(Clone)]
pub struct BlockInterleaver {
    block: usize,
    /// Output index `j` takes input index `perm[j]`.
    perm: Vec<u32>,
}

impl BlockInterleaver {
    pub fn new(spec: &InterleaverSpec) -> BlockInterleaver {
        let rows = spec.rows;
        let cols = spec.cols;
        let n = rows * cols;

        // The cell visited by the i'th load.
        let mut cell_to_input = vec![0u32; n];
        {
            let (mut r, mut c) = (0, 0);
            for i in 0..n {
                cell_to_input[r * cols + c] = i as u32;
                r = (r + spec.row_inc) % rows;
                if r == 0 {
                    c = (c + 1) % cols;
                }
            }
        }

        // The cell visited by the j'th fetch, composed with the load map above.
        let mut perm = vec![0u32; n];
        {
            let (mut r, mut c, mut c_last) = (0, 0, 0);
            for p in perm.iter_mut() {
                *p = cell_to_input[r * cols + c];
                r = (r + 1) % rows;
                c = (c + spec.col_inc) % cols;
                if r == 0 {
                    c = (c_last + 1) % cols;
                    c_last = c;
                }
            }
        }

        BlockInterleaver { block: n, perm }
    }

    /// The number of cells in one block.
    pub fn block_bits(&self) -> usize {
        self.block
    }

    /// Permute one block into transmission order. The input length must equal the block size.
    pub fn interleave<T: Copy + Default>(&self, input: &[T]) -> Vec<T> {
        assert_eq!(input.len(), self.block, "interleaver requires exactly one block");

        self.perm.iter().map(|&i| input[i as usize]).collect()
    }

    /// Invert [`BlockInterleaver::interleave`] exactly.
    pub fn deinterleave<T: Copy + Default>(&self, input: &[T]) -> Vec<T> {
        assert_eq!(input.len(), self.block, "deinterleaver requires exactly one block");

        let mut output = vec![T::default(); self.block];
        for (j, &i) in self.perm.iter().enumerate() {
            output[i as usize] = input[j];
        }
        output
    }

    /// Permute a stream of whole blocks into transmission order. The input length must be a
    /// multiple of the block size; streams longer than one block are processed as independent
    /// blocks.
    pub fn interleave_stream<T: Copy + Default>(&self, input: &[T]) -> Vec<T> {
        assert_eq!(input.len() % self.block, 0, "stream must hold whole blocks");

        let mut output = Vec::with_capacity(input.len());
        for block in input.chunks_exact(self.block) {
            output.extend(self.interleave(block));
        }
        output
    }

    /// Invert [`BlockInterleaver::interleave_stream`] exactly.
    pub fn deinterleave_stream<T: Copy + Default>(&self, input: &[T]) -> Vec<T> {
        assert_eq!(input.len() % self.block, 0, "stream must hold whole blocks");

        let mut output = Vec::with_capacity(input.len());
        for block in input.chunks_exact(self.block) {
            output.extend(self.deinterleave(block));
        }
        output
    }
}

// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `solve` module implements dense complex linear-system solving.
//!
//! The systems solved here are small (normal equations of channel estimators, at most a dozen
//! unknowns), so Gaussian elimination with partial pivoting is sufficient.

use super::complex::Complex;

/// A dense, row-major complex matrix of `n x n` elements.
#[derive(Clone)]
pub struct Matrix {
    n: usize,
    data: Vec<Complex>,
}

impl Matrix {
    /// Create a zeroed `n x n` matrix.
    pub fn zeros(n: usize) -> Matrix {
        Matrix { n, data: vec![Complex::zero(); n * n] }
    }

    /// Create an identity matrix scaled by `value`.
    pub fn scaled_identity(n: usize, value: f32) -> Matrix {
        let mut m = Matrix::zeros(n);
        for i in 0..n {
            m[(i, i)] = Complex::new(value, 0.0);
        }
        m
    }

    /// The dimension of the matrix.
    pub fn dim(&self) -> usize {
        self.n
    }
}

impl core::ops::Index<(usize, usize)> for Matrix {
    type Output = Complex;

    #[inline(always)]
    fn index(&self, (row, col): (usize, usize)) -> &Complex {
        &self.data[row * self.n + col]
    }
}

impl core::ops::IndexMut<(usize, usize)> for Matrix {
    #[inline(always)]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Complex {
        &mut self.data[row * self.n + col]
    }
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
///
/// `A` and `b` are consumed as scratch space. Returns `None` when the system is singular to
/// working precision; the caller decides the fallback.
pub fn solve(mut a: Matrix, mut b: Vec<Complex>, pivot_eps: f32) -> Option<Vec<Complex>> {
    let n = a.dim();
    assert_eq!(b.len(), n);

    // Forward elimination.
    for col in 0..n {
        // Select the largest remaining pivot in this column.
        let mut pivot_row = col;
        let mut pivot_mag = a[(col, col)].abs();
        for row in col + 1..n {
            let mag = a[(row, col)].abs();
            if mag > pivot_mag {
                pivot_mag = mag;
                pivot_row = row;
            }
        }

        if pivot_mag < pivot_eps {
            return None;
        }

        if pivot_row != col {
            for j in 0..n {
                let tmp = a[(col, j)];
                a[(col, j)] = a[(pivot_row, j)];
                a[(pivot_row, j)] = tmp;
            }
            b.swap(col, pivot_row);
        }

        for row in col + 1..n {
            let factor = a[(row, col)] / a[(col, col)];
            for j in col..n {
                let v = a[(col, j)];
                a[(row, j)] -= factor * v;
            }
            let bv = b[col];
            b[row] -= factor * bv;
        }
    }

    // Back substitution.
    let mut x = vec![Complex::zero(); n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in i + 1..n {
            sum -= a[(i, j)] * x[j];
        }
        x[i] = sum / a[(i, i)];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_solve_identity() {
        let a = Matrix::scaled_identity(3, 2.0);
        let b = vec![Complex::new(2.0, 0.0), Complex::new(4.0, 2.0), Complex::new(-6.0, 0.0)];

        let x = solve(a, b, 1e-10).unwrap();

        assert!((x[0].re - 1.0).abs() < 1e-6);
        assert!((x[1].re - 2.0).abs() < 1e-6 && (x[1].im - 1.0).abs() < 1e-6);
        assert!((x[2].re + 3.0).abs() < 1e-6);
    }

    #[test]
    fn verify_solve_requires_pivoting() {
        // A system with a zero leading pivot that is solvable only with row exchange.
        let mut a = Matrix::zeros(2);
        a[(0, 0)] = Complex::zero();
        a[(0, 1)] = Complex::new(1.0, 0.0);
        a[(1, 0)] = Complex::new(1.0, 0.0);
        a[(1, 1)] = Complex::new(1.0, 0.0);

        let b = vec![Complex::new(3.0, 0.0), Complex::new(5.0, 0.0)];

        let x = solve(a, b, 1e-10).unwrap();
        assert!((x[0].re - 2.0).abs() < 1e-6);
        assert!((x[1].re - 3.0).abs() < 1e-6);
    }

    #[test]
    fn verify_singular_detected() {
        // Two identical rows make the system singular.
        let mut a = Matrix::zeros(2);
        a[(0, 0)] = Complex::new(1.0, 0.0);
        a[(0, 1)] = Complex::new(2.0, 0.0);
        a[(1, 0)] = Complex::new(1.0, 0.0);
        a[(1, 1)] = Complex::new(2.0, 0.0);

        let b = vec![Complex::new(1.0, 0.0), Complex::new(1.0, 0.0)];

        assert!(solve(a, b, 1e-10).is_none());
    }
}

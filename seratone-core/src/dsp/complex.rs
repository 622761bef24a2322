// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `complex` module implements a 32-bit floating point complex number.

/// A complex number.
#[derive(Copy, Clone, Default, Debug, PartialEq)]
#[repr(C)]
pub struct Complex {
    /// The real component.
    pub re: f32,
    /// The imaginary component.
    pub im: f32,
}

impl Complex {
    /// Create a new complex number.
    #[inline(always)]
    pub fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    /// Create a complex number with a value of `0 + j0`.
    #[inline(always)]
    pub fn zero() -> Self {
        Self { re: 0.0, im: 0.0 }
    }

    /// Create a complex number with a value of `0 + j1`.
    #[inline(always)]
    pub fn j() -> Self {
        Self { re: 0.0, im: 1.0 }
    }

    /// Create a unit-magnitude complex number at the given angle in radians, `e^(j*theta)`.
    #[inline(always)]
    pub fn expj(theta: f32) -> Self {
        Self { re: theta.cos(), im: theta.sin() }
    }

    /// Scale the complex number.
    #[inline(always)]
    pub fn scale(&self, scale: f32) -> Self {
        Self { re: self.re * scale, im: self.im * scale }
    }

    /// Take the complex conjugate of `self`.
    ///
    /// For a complex number defined as `a + jb` the complex conjugate is defined to be `a - jb`.
    #[inline(always)]
    pub fn conj(&self) -> Self {
        Self { re: self.re, im: -self.im }
    }

    /// The squared magnitude, `a^2 + b^2`.
    #[inline(always)]
    pub fn norm_sqr(&self) -> f32 {
        self.re * self.re + self.im * self.im
    }

    /// The magnitude, `sqrt(a^2 + b^2)`.
    #[inline(always)]
    pub fn abs(&self) -> f32 {
        self.norm_sqr().sqrt()
    }

    /// The argument (phase angle) in radians, in the range `(-pi, pi]`.
    #[inline(always)]
    pub fn arg(&self) -> f32 {
        self.im.atan2(self.re)
    }
}

impl core::ops::Add for Complex {
    type Output = Complex;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        Self::Output { re: self.re + rhs.re, im: self.im + rhs.im }
    }
}

impl core::ops::AddAssign for Complex {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl core::ops::Sub for Complex {
    type Output = Complex;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output { re: self.re - rhs.re, im: self.im - rhs.im }
    }
}

impl core::ops::SubAssign for Complex {
    #[inline(always)]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl core::ops::Mul for Complex {
    type Output = Complex;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        Self::Output {
            re: (self.re * rhs.re) - (self.im * rhs.im),
            im: (self.re * rhs.im) + (self.im * rhs.re),
        }
    }
}

impl core::ops::MulAssign for Complex {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl core::ops::Div for Complex {
    type Output = Complex;

    #[inline(always)]
    fn div(self, rhs: Self) -> Self::Output {
        let denom = rhs.re * rhs.re + rhs.im * rhs.im;

        Self::Output {
            re: (self.re * rhs.re + self.im * rhs.im) / denom,
            im: (self.im * rhs.re - self.re * rhs.im) / denom,
        }
    }
}

impl core::ops::DivAssign for Complex {
    #[inline(always)]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl core::ops::Mul<f32> for Complex {
    type Output = Complex;

    #[inline(always)]
    fn mul(self, rhs: f32) -> Self::Output {
        Self::Output { re: self.re * rhs, im: self.im * rhs }
    }
}

impl core::ops::Div<f32> for Complex {
    type Output = Complex;

    #[inline(always)]
    fn div(self, rhs: f32) -> Self::Output {
        Self::Output { re: self.re / rhs, im: self.im / rhs }
    }
}

impl core::ops::Neg for Complex {
    type Output = Complex;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        Self::Output { re: -self.re, im: -self.im }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_complex() {
        assert_eq!(Complex::j(), Complex::new(0.0, 1.0));

        // Conjugate
        assert_eq!(Complex::new(1.0, 10.0).conj(), Complex::new(1.0, -10.0));

        // Scale
        assert_eq!(Complex::new(5.0, 2.0).scale(3.0), Complex::new(15.0, 6.0));

        // Addition
        assert_eq!(Complex::new(8.0, -4.0) + Complex::new(-6.0, 1.5), Complex::new(2.0, -2.5));

        // Multiplication
        assert_eq!(Complex::new(3.0, 2.0) * Complex::new(1.0, 7.0), Complex::new(-11.0, 23.0));

        // Magnitude and argument
        assert!((Complex::new(3.0, 4.0).abs() - 5.0).abs() < 1e-6);
        assert!((Complex::j().arg() - core::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn verify_expj() {
        let w = Complex::expj(core::f32::consts::FRAC_PI_4);
        assert!((w.re - core::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((w.im - core::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((w.norm_sqr() - 1.0).abs() < 1e-6);
    }
}

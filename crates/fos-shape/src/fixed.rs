//! 26.6 fixed-point values for scaled metrics

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// 26.6-style fixed-point number, widened to 64 bits
///
/// - 6 bits for the fraction: precision of 1/64
/// - the rest for the integer part, so pen sums over long runs stay exact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct F26Dot6(i64);

impl F26Dot6 {
    pub const FRAC_BITS: u32 = 6;
    pub const SCALE: i64 = 1 << Self::FRAC_BITS;

    pub const ZERO: F26Dot6 = F26Dot6(0);
    pub const ONE: F26Dot6 = F26Dot6(Self::SCALE);

    #[inline]
    pub const fn from_bits(bits: i64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn to_bits(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn from_i32(value: i32) -> Self {
        Self((value as i64) << Self::FRAC_BITS)
    }

    /// Whole units, saturating at the representable range
    pub const fn from_i64(value: i64) -> Self {
        Self(value.saturating_mul(Self::SCALE))
    }

    /// `value * scale / units_per_em`, rounded to the nearest 1/64
    pub fn scaled(value: i64, scale: i64, units_per_em: u32) -> Self {
        let den = i64::from(units_per_em.max(1));
        let num = i128::from(value) * i128::from(scale) * i128::from(Self::SCALE);
        let den = i128::from(den);
        // Round half away from zero
        let half = den / 2;
        let bits = if num >= 0 { (num + half) / den } else { (num - half) / den };
        Self(bits.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }

    /// Integer part (floor)
    #[inline]
    pub const fn floor(self) -> i64 {
        self.0 >> Self::FRAC_BITS
    }

    /// Nearest integer
    #[inline]
    pub const fn round(self) -> i64 {
        (self.0 + Self::SCALE / 2) >> Self::FRAC_BITS
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / Self::SCALE as f32
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }
}

impl Add for F26Dot6 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for F26Dot6 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for F26Dot6 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl Mul<i32> for F26Dot6 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: i32) -> Self {
        Self(self.0.saturating_mul(i64::from(rhs)))
    }
}

impl From<i32> for F26Dot6 {
    #[inline]
    fn from(value: i32) -> Self {
        Self::from_i32(value)
    }
}

impl fmt::Display for F26Dot6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

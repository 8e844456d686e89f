use crate::error::TaylorError;
use crate::traits::Scalar;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign};

/// Closed bounded pair `[lo, hi]` with corner-enclosing arithmetic.
///
/// Orientation is not enforced: a pair built with `lo > hi` is kept as is,
/// and callers are responsible for keeping operands consistently oriented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval<T> {
    pub lo: T,
    pub hi: T,
}

impl<T: Scalar> Interval<T> {
    pub fn new(lo: T, hi: T) -> Self {
        Self { lo, hi }
    }

    /// Degenerate interval `[t, t]`.
    pub fn point(t: T) -> Self {
        Self::new(t, t)
    }

    pub fn zero() -> Self {
        Self::point(T::zero())
    }

    /// `[-r, r]`.
    pub fn symmetric(r: T) -> Self {
        Self::new(-r, r)
    }

    pub fn midpoint(&self) -> T {
        (self.lo + self.hi) / (T::one() + T::one())
    }

    pub fn radius(&self) -> T {
        ((self.hi - self.lo) / (T::one() + T::one())).abs()
    }

    /// Largest absolute value of either bound.
    pub fn magnitude(&self) -> T {
        self.lo.abs().max(self.hi.abs())
    }

    pub fn contains(&self, t: T) -> bool {
        self.lo <= t && t <= self.hi
    }

    /// Multiplies both bounds by `t` without re-sorting them.
    ///
    /// A negative factor flips the orientation of the pair.
    pub fn scale(self, t: T) -> Self {
        Self::new(self.lo * t, self.hi * t)
    }

    pub fn scale_assign(&mut self, t: T) {
        *self = self.scale(t);
    }

    /// Corner-evaluated quotient.
    ///
    /// Only a bound that is exactly zero is rejected; a divisor such as
    /// `[-1, 2]` that merely straddles zero goes through.
    pub fn checked_div(self, rhs: Self) -> Result<Self, TaylorError> {
        if rhs.lo == T::zero() || rhs.hi == T::zero() {
            return Err(TaylorError::DivideByZero);
        }
        Ok(Self::from_corners([
            self.lo / rhs.lo,
            self.hi / rhs.hi,
            self.lo / rhs.hi,
            self.hi / rhs.lo,
        ]))
    }

    pub fn checked_div_assign(&mut self, rhs: Self) -> Result<(), TaylorError> {
        *self = self.checked_div(rhs)?;
        Ok(())
    }

    pub fn checked_div_scalar(self, t: T) -> Result<Self, TaylorError> {
        if t == T::zero() {
            return Err(TaylorError::DivideByZero);
        }
        Ok(Self::new(self.lo / t, self.hi / t))
    }

    pub fn checked_div_scalar_assign(&mut self, t: T) -> Result<(), TaylorError> {
        *self = self.checked_div_scalar(t)?;
        Ok(())
    }

    /// `self^n` by repeated corner multiplication.
    pub fn powi(self, n: u32) -> Self {
        let mut acc = Self::point(T::one());
        for _ in 0..n {
            acc *= self;
        }
        acc
    }

    fn from_corners(corners: [T; 4]) -> Self {
        let lo = corners[1..].iter().fold(corners[0], |m, &c| m.min(c));
        let hi = corners[1..].iter().fold(corners[0], |m, &c| m.max(c));
        Self::new(lo, hi)
    }
}

impl<T: Scalar> Default for Interval<T> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<T: Scalar> Add for Interval<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.lo + rhs.lo, self.hi + rhs.hi)
    }
}

impl<T: Scalar> Sub for Interval<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.lo - rhs.hi, self.hi - rhs.lo)
    }
}

impl<T: Scalar> Mul for Interval<T> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::from_corners([
            self.lo * rhs.lo,
            self.hi * rhs.hi,
            self.lo * rhs.hi,
            self.hi * rhs.lo,
        ])
    }
}

impl<T: Scalar> AddAssign for Interval<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl<T: Scalar> SubAssign for Interval<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl<T: Scalar> MulAssign for Interval<T> {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

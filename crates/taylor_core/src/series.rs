//! Truncated multivariate Taylor series with a rigorous remainder interval.
//!
//! Every operation returns a fresh series whose `error` encloses the effect
//! of truncation and floating-point rounding, following
//! N. Revol, K. Makino, M. Berz, "Taylor models and floating-point
//! arithmetic: proof that arithmetic operations are validated in COSY".

use crate::coefficients::CoefficientIndex;
use crate::error::TaylorError;
use crate::interval::Interval;
use crate::traits::Scalar;
use std::rc::Rc;

/// Relative size of one rounding error.
pub const UNIT_ROUNDING: f64 = 1e-15;
/// Coefficients smaller than this in magnitude are flushed into the error.
pub const NEGLIGIBLE_COEFFICIENT: f64 = 1e-20;
/// Safety multiplier applied to every accumulated error term.
pub const SAFETY_FACTOR: f64 = 2.0;

/// A Taylor model: polynomial coefficients indexed by a shared
/// [`CoefficientIndex`] plus an interval remainder.
#[derive(Debug, Clone)]
pub struct TaylorSeries<T: Scalar> {
    coefficients: Vec<T>,
    error: Interval<T>,
    index: Rc<CoefficientIndex>,
}

/// Per-operation error bookkeeping: `t` collects magnitudes that were
/// rounded, `s` collects magnitudes flushed to zero.
struct Bookkeeping<T> {
    t: T,
    s: T,
}

impl<T: Scalar> Bookkeeping<T> {
    fn new() -> Self {
        Self {
            t: T::zero(),
            s: T::zero(),
        }
    }

    fn flush(&mut self, value: &mut T) {
        if value.abs() < constant::<T>(NEGLIGIBLE_COEFFICIENT) {
            self.s = self.s + value.abs();
            *value = T::zero();
        }
    }

    /// `[-t, t] * Em * E + [-s, s] * E`
    fn bound(&self) -> Interval<T> {
        let em = constant::<T>(UNIT_ROUNDING);
        let e = constant::<T>(SAFETY_FACTOR);
        Interval::symmetric(self.t).scale(em).scale(e) + Interval::symmetric(self.s).scale(e)
    }
}

fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::zero)
}

impl<T: Scalar> TaylorSeries<T> {
    /// Zero series with zero error, sized by `index`.
    pub fn new(index: Rc<CoefficientIndex>) -> Self {
        Self {
            coefficients: vec![T::zero(); index.series_size()],
            error: Interval::zero(),
            index,
        }
    }

    pub fn constant(index: Rc<CoefficientIndex>, value: T) -> Self {
        let mut series = Self::new(index);
        series.coefficients[0] = value;
        series
    }

    /// The polynomial `center + x_k`, where `x_k` is the `k`-th model
    /// variable.
    pub fn variable(
        index: Rc<CoefficientIndex>,
        k: usize,
        center: T,
    ) -> Result<Self, TaylorError> {
        let size = index.series_size();
        let position = index
            .first_order_position(k)
            .ok_or(TaylorError::OutOfRange { index: k, size })?;
        let mut series = Self::constant(index, center);
        series.coefficients[position] = T::one();
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn index(&self) -> &Rc<CoefficientIndex> {
        &self.index
    }

    pub fn coefficients(&self) -> &[T] {
        &self.coefficients
    }

    pub fn coefficient(&self, position: usize) -> Result<T, TaylorError> {
        self.coefficients
            .get(position)
            .copied()
            .ok_or(TaylorError::OutOfRange {
                index: position,
                size: self.len(),
            })
    }

    pub fn set_coefficient(&mut self, position: usize, value: T) -> Result<(), TaylorError> {
        let size = self.len();
        let slot = self
            .coefficients
            .get_mut(position)
            .ok_or(TaylorError::OutOfRange {
                index: position,
                size,
            })?;
        *slot = value;
        Ok(())
    }

    pub fn error(&self) -> Interval<T> {
        self.error
    }

    pub fn set_error(&mut self, error: Interval<T>) {
        self.error = error;
    }

    fn check_length(&self, rhs: &Self) -> Result<(), TaylorError> {
        if self.len() != rhs.len() {
            return Err(TaylorError::LengthMismatch {
                left: self.len(),
                right: rhs.len(),
            });
        }
        Ok(())
    }

    fn zip_with(&self, rhs: &Self, op: impl Fn(T, T) -> T) -> (Vec<T>, Bookkeeping<T>) {
        let mut book = Bookkeeping::new();
        let coefficients = self
            .coefficients
            .iter()
            .zip(&rhs.coefficients)
            .map(|(&a, &b)| {
                book.t = book.t + a.abs().max(b.abs());
                let mut value = op(a, b);
                book.flush(&mut value);
                value
            })
            .collect();
        (coefficients, book)
    }

    fn map_scalar(&self, op: impl Fn(T) -> T) -> (Vec<T>, Bookkeeping<T>) {
        let mut book = Bookkeeping::new();
        let coefficients = self
            .coefficients
            .iter()
            .map(|&a| {
                let mut value = op(a);
                book.t = book.t + value.abs();
                book.flush(&mut value);
                value
            })
            .collect();
        (coefficients, book)
    }

    pub fn checked_add(&self, rhs: &Self) -> Result<Self, TaylorError> {
        self.check_length(rhs)?;
        let (coefficients, book) = self.zip_with(rhs, |a, b| a + b);
        Ok(Self {
            coefficients,
            error: self.error + rhs.error + book.bound(),
            index: Rc::clone(&self.index),
        })
    }

    pub fn checked_sub(&self, rhs: &Self) -> Result<Self, TaylorError> {
        self.check_length(rhs)?;
        let (coefficients, book) = self.zip_with(rhs, |a, b| a - b);
        Ok(Self {
            coefficients,
            error: self.error - rhs.error + book.bound(),
            index: Rc::clone(&self.index),
        })
    }

    /// Multiplies by a constant. The error interval is scaled bound by bound,
    /// so a negative factor flips its orientation.
    pub fn scale(&self, c: T) -> Self {
        let (coefficients, book) = self.map_scalar(|a| a * c);
        Self {
            coefficients,
            error: self.error.scale(c) + book.bound(),
            index: Rc::clone(&self.index),
        }
    }

    pub fn checked_div(&self, c: T) -> Result<Self, TaylorError> {
        if c == T::zero() {
            return Err(TaylorError::DivideByZero);
        }
        let (coefficients, book) = self.map_scalar(|a| a / c);
        Ok(Self {
            coefficients,
            error: self.error.checked_div_scalar(c)? + book.bound(),
            index: Rc::clone(&self.index),
        })
    }

    pub fn negate(&self) -> Self {
        self.scale(-T::one())
    }

    /// Truncated product.
    ///
    /// Terms above the truncation order are not kept; for row `i` their
    /// magnitude is bounded by `|a_i| * Σ|b_j|` over the dropped `j` and
    /// folded into the error together with `b`'s own error.
    pub fn checked_mul(&self, rhs: &Self) -> Result<Self, TaylorError> {
        self.check_length(rhs)?;
        let n = self.len();
        let mut out = vec![T::zero(); n];
        let mut error = Interval::zero();
        let mut book = Bookkeeping::new();

        for i in 0..n {
            let a = self.coefficients[i];
            let mut dropped = Interval::zero();

            for j in 0..n {
                let b = rhs.coefficients[j];
                match self.index.mult_index(i, j) {
                    Some(k) => {
                        let p = a * b;
                        book.t = book.t + p.abs() + out[k].abs().max(p.abs());
                        out[k] = out[k] + p;
                    }
                    None => dropped += Interval::symmetric(b.abs()),
                }
            }
            error += Interval::symmetric(a.abs()) * (dropped + rhs.error);
        }

        let envelope = rhs
            .coefficients
            .iter()
            .fold(Interval::zero(), |acc, &b| acc + Interval::symmetric(b.abs()));
        error += self.error * (rhs.error + envelope);

        for value in out.iter_mut() {
            book.flush(value);
        }

        Ok(Self {
            coefficients: out,
            error: error + book.bound(),
            index: Rc::clone(&self.index),
        })
    }

    /// `self^n` by repeated truncated multiplication.
    pub fn powi(&self, n: u32) -> Result<Self, TaylorError> {
        let mut acc = Self::constant(Rc::clone(&self.index), T::one());
        for _ in 0..n {
            acc = acc.checked_mul(self)?;
        }
        Ok(acc)
    }

    /// Polynomial value at `point`, one coordinate per real model variable.
    /// Padding variables are treated as zero; the error term is ignored.
    pub fn evaluate(&self, point: &[T]) -> T {
        let real = self.index.real_variables() + self.index.real_parameters();
        self.coefficients
            .iter()
            .zip(self.index.monomials())
            .filter(|(c, _)| !c.is_zero())
            .filter_map(|(&c, exponents)| {
                let mut term = c;
                for (k, &e) in exponents.iter().enumerate() {
                    if e == 0 {
                        continue;
                    }
                    if k >= real {
                        return None;
                    }
                    term = term * point.get(k).copied().unwrap_or_else(T::zero).powi(e as i32);
                }
                Some(term)
            })
            .fold(T::zero(), |acc, term| acc + term)
    }

    /// Interval enclosure of the model over `domain` (one interval per real
    /// model variable), including the error term.
    pub fn range_bound(&self, domain: &[Interval<T>]) -> Interval<T> {
        let real = self.index.real_variables() + self.index.real_parameters();
        let mut acc = self.error;
        for (&c, exponents) in self.coefficients.iter().zip(self.index.monomials()) {
            if c.is_zero() {
                continue;
            }
            let mut term = Interval::point(c);
            for (k, &e) in exponents.iter().enumerate() {
                if e == 0 {
                    continue;
                }
                let range = if k < real {
                    domain.get(k).copied().unwrap_or_else(Interval::zero)
                } else {
                    Interval::zero()
                };
                term *= range.powi(e as u32);
            }
            acc += term;
        }
        acc
    }
}

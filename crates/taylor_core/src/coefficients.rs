//! Monomial indexing for truncated multivariate series.
//!
//! Every monomial of total degree `<= order` in `V` variables gets a linear
//! storage position. The exponent tuple is split into two halves of `V / 2`
//! digits and each half is packed into one integer in mixed radix
//! `order + 1` (the codes `c1` and `c2`). Because packing is additive, the
//! codes of a product are the sums of the factor codes, and two inverse
//! tables turn the summed codes back into a position:
//!
//! `position(i * j) = D1[c1(i) + c1(j)] + D2[c2(i) + c2(j)] - 1`
//!
//! This works because monomials are grouped by `c2`, each group starts at
//! `D2[c2]`, and inside every group the first-half monomials appear in the
//! same relative order as in the `c2 = 0` group, where `D1` is measured.
//!
//! Reference: M. Berz, "Algorithms for higher order automatic
//! differentiation in many variables with applications to beam physics".

use crate::error::TaylorError;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

/// Read-only monomial table shared by every series of one problem size.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientIndex {
    order: usize,
    real_variables: usize,
    real_parameters: usize,
    /// `real_variables + real_parameters`, rounded up to an even count.
    variables: usize,
    series_size: usize,
    c1: Vec<usize>,
    c2: Vec<usize>,
    degree: Vec<usize>,
    exponents: Vec<Vec<usize>>,
    /// 1-based position of the first monomial with a given `c1`, 0 if none.
    d1: Vec<usize>,
    /// 0-based position of the first monomial with a given `c2`, 0 if none.
    d2: Vec<usize>,
}

/// One line of the monomial table, as exposed for inspection and plotting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub position: usize,
    pub c1: usize,
    pub c2: usize,
    pub degree: usize,
    pub exponents: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Monomial {
    c1: usize,
    c2: usize,
    degree: usize,
    exponents: Vec<usize>,
}

impl CoefficientIndex {
    pub fn new(
        real_variables: usize,
        real_parameters: usize,
        order: usize,
    ) -> Result<Self, TaylorError> {
        let total = real_variables + real_parameters;
        let variables = total + total % 2;
        let too_large = || TaylorError::IndexTooLarge { variables, order };

        let series_size = count_monomials(variables, order).ok_or_else(too_large)?;
        let base = order + 1;
        let half = variables / 2;
        let table_size = u32::try_from(half)
            .ok()
            .and_then(|h| base.checked_pow(h))
            .ok_or_else(too_large)?;

        let weights: Vec<usize> = (0..half)
            .scan(1usize, |w, _| {
                let current = *w;
                *w = w.saturating_mul(base);
                Some(current)
            })
            .collect();
        let encode = |digits: &[usize]| -> usize {
            digits.iter().zip(&weights).map(|(d, w)| d * w).sum()
        };

        // Odometer over all V-digit strings in 0..=order, keeping those whose
        // digit sum stays within the order bound.
        let mut digits = vec![0usize; variables];
        let mut kept: Vec<Monomial> = Vec::with_capacity(series_size);
        loop {
            if kept.len() >= series_size {
                break;
            }

            let degree: usize = digits.iter().sum();
            if degree <= order {
                kept.push(Monomial {
                    c1: encode(&digits[..half]),
                    c2: encode(&digits[half..]),
                    degree,
                    exponents: digits.clone(),
                });
            }

            if !advance_odometer(&mut digits, order) {
                break;
            }
        }

        kept.sort_by_key(|m| (m.degree, m.c2, m.c1));
        let ordered = group_by_second_half(kept);

        let mut c1 = Vec::with_capacity(series_size);
        let mut c2 = Vec::with_capacity(series_size);
        let mut degree = Vec::with_capacity(series_size);
        let mut exponents = Vec::with_capacity(series_size);
        for m in ordered {
            c1.push(m.c1);
            c2.push(m.c2);
            degree.push(m.degree);
            exponents.push(m.exponents);
        }

        let mut d1 = vec![0usize; table_size];
        let mut d2 = vec![0usize; table_size];
        for position in (0..c1.len()).rev() {
            d1[c1[position]] = position + 1;
            d2[c2[position]] = position;
        }

        debug!(
            "Built coefficient index: {} variables ({} padded), order {}, {} terms, lookup tables of {}",
            total, variables, order, series_size, table_size
        );

        Ok(Self {
            order,
            real_variables,
            real_parameters,
            variables,
            series_size,
            c1,
            c2,
            degree,
            exponents,
            d1,
            d2,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn real_variables(&self) -> usize {
        self.real_variables
    }

    pub fn real_parameters(&self) -> usize {
        self.real_parameters
    }

    /// Variable count after padding to an even number.
    pub fn variables(&self) -> usize {
        self.variables
    }

    pub fn series_size(&self) -> usize {
        self.series_size
    }

    /// Total degree of the monomial at `position`, or `None` past the end
    /// of the series.
    pub fn degree(&self, position: usize) -> Option<usize> {
        self.degree.get(position).copied()
    }

    /// Exponent tuple of the monomial at `position`, one entry per padded
    /// variable.
    pub fn exponents(&self, position: usize) -> Option<&[usize]> {
        self.exponents.get(position).map(Vec::as_slice)
    }

    /// Exponent tuples in position order.
    pub fn monomials(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.exponents.iter().map(Vec::as_slice)
    }

    /// Position of the product of monomials `i` and `j`, or `None` when the
    /// product exceeds the truncation order.
    ///
    /// Panics if either position is out of range.
    pub fn mult_index(&self, i: usize, j: usize) -> Option<usize> {
        if self.degree[i] + self.degree[j] > self.order {
            return None;
        }
        let c1 = self.c1[i] + self.c1[j];
        let c2 = self.c2[i] + self.c2[j];
        Some(self.d1[c1] + self.d2[c2] - 1)
    }

    /// Position of the degree-one monomial of variable `k`.
    pub fn first_order_position(&self, k: usize) -> Option<usize> {
        if k >= self.variables {
            return None;
        }
        (0..self.series_size).find(|&p| self.degree[p] == 1 && self.exponents[p][k] == 1)
    }

    pub fn rows(&self) -> impl Iterator<Item = CoefficientRow> + '_ {
        (0..self.series_size).map(move |position| CoefficientRow {
            position,
            c1: self.c1[position],
            c2: self.c2[position],
            degree: self.degree[position],
            exponents: self.exponents[position].clone(),
        })
    }
}

/// Number of exponent tuples of length `variables` with digit sum
/// `<= order`, i.e. `C(order + variables, variables)`. `None` on overflow.
pub fn count_monomials(variables: usize, order: usize) -> Option<usize> {
    // exact[d]: tuples over the variables seen so far with digit sum d.
    let mut exact = vec![0usize; order + 1];
    exact[0] = 1;
    for _ in 0..variables {
        let mut running = 0usize;
        for slot in exact.iter_mut() {
            running = running.checked_add(*slot)?;
            *slot = running;
        }
    }
    exact
        .iter()
        .try_fold(0usize, |acc, &count| acc.checked_add(count))
}

/// Increments the digit string as an odometer in base `order + 1`, last
/// digit fastest. Returns `false` once every string has been visited.
fn advance_odometer(digits: &mut [usize], order: usize) -> bool {
    for pos in (0..digits.len()).rev() {
        if digits[pos] < order {
            digits[pos] += 1;
            return true;
        }
        digits[pos] = 0;
    }
    false
}

/// Gathers monomials sharing `c2` into contiguous runs, runs ordered by the
/// first appearance of their `c2`, each run keeping its incoming order.
fn group_by_second_half(sorted: Vec<Monomial>) -> Vec<Monomial> {
    let mut groups: Vec<Vec<Monomial>> = Vec::new();
    let mut slot_of: HashMap<usize, usize> = HashMap::new();
    for m in sorted {
        let slot = *slot_of.entry(m.c2).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(m);
    }
    groups.into_iter().flatten().collect()
}

use crate::coefficients::CoefficientIndex;
use crate::error::TaylorError;
use crate::series::TaylorSeries;
use crate::traits::{Scalar, SeriesSystem, Steppable};
use std::rc::Rc;

/// Classic Runge-Kutta 4th Order Solver on Taylor models.
///
/// Every stage goes through validated series arithmetic, so the remainder
/// intervals of the state pick up the rounding of each stage.
pub struct RK4<T: Scalar> {
    k1: Vec<TaylorSeries<T>>,
    k2: Vec<TaylorSeries<T>>,
    k3: Vec<TaylorSeries<T>>,
    k4: Vec<TaylorSeries<T>>,
    tmp: Vec<TaylorSeries<T>>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(index: &Rc<CoefficientIndex>, dim: usize) -> Self {
        let zero = TaylorSeries::new(Rc::clone(index));
        Self {
            k1: vec![zero.clone(); dim],
            k2: vec![zero.clone(); dim],
            k3: vec![zero.clone(); dim],
            k4: vec![zero; dim],
            tmp: Vec::new(),
        }
    }

    fn resize(&mut self, template: &TaylorSeries<T>, dim: usize) {
        for buffer in [&mut self.k1, &mut self.k2, &mut self.k3, &mut self.k4] {
            buffer.resize(dim, template.clone());
        }
    }
}

fn scale_all<T: Scalar>(stage: &mut [TaylorSeries<T>], dt: T) {
    for k in stage.iter_mut() {
        *k = k.scale(dt);
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(
        &mut self,
        system: &impl SeriesSystem<T>,
        t: &mut T,
        state: &mut [TaylorSeries<T>],
        dt: T,
    ) -> Result<(), TaylorError> {
        let dim = system.dimension();
        if state.len() < dim {
            return Err(TaylorError::LengthMismatch {
                left: state.len(),
                right: dim,
            });
        }
        if let Some(first) = state.first() {
            if self.k1.len() != dim {
                self.resize(first, dim);
            }
        }

        let two = T::one() + T::one();
        let half_dt = dt / two;
        let six = T::from_f64(6.0).unwrap_or_else(|| two + two + two);
        let t0 = *t;

        // Parameters ride along unchanged in the tail of `tmp`.
        self.tmp.clear();
        self.tmp.extend_from_slice(state);

        // k1 = f(t, y) * dt
        system.apply(t0, state, &mut self.k1)?;
        scale_all(&mut self.k1, dt);

        // k2 = f(t + dt/2, y + k1/2) * dt
        for i in 0..dim {
            self.tmp[i] = state[i].checked_add(&self.k1[i].checked_div(two)?)?;
        }
        system.apply(t0 + half_dt, &self.tmp, &mut self.k2)?;
        scale_all(&mut self.k2, dt);

        // k3 = f(t + dt/2, y + k2/2) * dt
        for i in 0..dim {
            self.tmp[i] = state[i].checked_add(&self.k2[i].checked_div(two)?)?;
        }
        system.apply(t0 + half_dt, &self.tmp, &mut self.k3)?;
        scale_all(&mut self.k3, dt);

        // k4 = f(t + dt, y + k3) * dt
        for i in 0..dim {
            self.tmp[i] = state[i].checked_add(&self.k3[i])?;
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4)?;
        scale_all(&mut self.k4, dt);

        // y_next = y + (k1 + 2(k2 + k3) + k4) / 6
        for i in 0..dim {
            let middle = self.k2[i].checked_add(&self.k3[i])?.scale(two);
            let increment = self.k1[i]
                .checked_add(&middle)?
                .checked_add(&self.k4[i])?
                .checked_div(six)?;
            state[i] = state[i].checked_add(&increment)?;
        }

        *t = t0 + dt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RK4;
    use crate::coefficients::CoefficientIndex;
    use crate::error::TaylorError;
    use crate::series::TaylorSeries;
    use crate::traits::{SeriesSystem, Steppable};
    use std::rc::Rc;

    /// x' = rate * x
    struct Linear {
        rate: f64,
    }

    impl SeriesSystem<f64> for Linear {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(
            &self,
            _t: f64,
            x: &[TaylorSeries<f64>],
            out: &mut [TaylorSeries<f64>],
        ) -> Result<(), TaylorError> {
            out[0] = x[0].scale(self.rate);
            Ok(())
        }
    }

    /// x' = a, with `a` an uncertain parameter stored after the state.
    struct Drift;

    impl SeriesSystem<f64> for Drift {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(
            &self,
            _t: f64,
            x: &[TaylorSeries<f64>],
            out: &mut [TaylorSeries<f64>],
        ) -> Result<(), TaylorError> {
            out[0] = x[1].clone();
            Ok(())
        }
    }

    #[test]
    fn rk4_matches_scalar_growth_factor() {
        let index = Rc::new(CoefficientIndex::new(1, 0, 3).unwrap());
        let mut state = vec![TaylorSeries::<f64>::constant(Rc::clone(&index), 1.0)];
        let mut solver = RK4::new(&index, 1);
        let mut t = 0.0;
        let dt = 0.1;
        solver.step(&Linear { rate: -1.0 }, &mut t, &mut state, dt).unwrap();

        let z: f64 = -dt;
        let factor = 1.0 + z + z * z / 2.0 + z * z * z / 6.0 + z * z * z * z / 24.0;
        let value = state[0].coefficient(0).unwrap();
        assert!((value - factor).abs() < 1e-14);
        assert!((t - 0.1).abs() < 1e-15);
        assert!(state[0].error().magnitude() < 1e-13);
    }

    #[test]
    fn rk4_leaves_parameters_untouched() {
        let index = Rc::new(CoefficientIndex::new(1, 1, 2).unwrap());
        let x = TaylorSeries::<f64>::constant(Rc::clone(&index), 0.0);
        let a = TaylorSeries::<f64>::variable(Rc::clone(&index), 1, 2.0).unwrap();
        let mut state = vec![x, a];
        let mut solver = RK4::new(&index, 1);
        let mut t = 0.0;
        solver.step(&Drift, &mut t, &mut state, 0.5).unwrap();

        let pa = index.first_order_position(1).unwrap();
        assert!((state[0].coefficient(0).unwrap() - 1.0).abs() < 1e-14);
        assert!((state[0].coefficient(pa).unwrap() - 0.5).abs() < 1e-14);
        assert_eq!(state[1].coefficient(0), Ok(2.0));
        assert_eq!(state[1].coefficient(pa), Ok(1.0));
    }

    #[test]
    fn rk4_rejects_short_state() {
        let index = Rc::new(CoefficientIndex::new(1, 0, 2).unwrap());
        let mut solver = RK4::new(&index, 1);
        let mut t = 0.0;
        let mut empty: Vec<TaylorSeries<f64>> = Vec::new();
        let err = solver.step(&Linear { rate: 1.0 }, &mut t, &mut empty, 0.5);
        assert_eq!(err, Err(TaylorError::LengthMismatch { left: 0, right: 1 }));
        assert_eq!(t, 0.0);
    }
}

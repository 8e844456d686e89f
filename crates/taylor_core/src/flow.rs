use crate::coefficients::CoefficientIndex;
use crate::error::TaylorError;
use crate::interval::Interval;
use crate::series::TaylorSeries;
use crate::solvers::RK4;
use crate::traits::{Scalar, SeriesSystem, Steppable};
use anyhow::{anyhow, bail, Result};
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntegrationSettings {
    pub t_start: f64,
    pub t_end: f64,
    pub step: f64,
    /// Slack allowed when deciding whether one more step still ends on or
    /// before `t_end`.
    pub end_tolerance: f64,
    /// Call the observer every this many steps (and before the first one).
    pub record_every: Option<usize>,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 6.0,
            step: 0.01,
            end_tolerance: 1e-6,
            record_every: None,
        }
    }
}

impl IntegrationSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.step.is_finite() || self.step <= 0.0 {
            bail!("Step size must be positive and finite.");
        }
        if !self.t_start.is_finite() || !self.t_end.is_finite() {
            bail!("Integration bounds must be finite.");
        }
        if self.t_end < self.t_start {
            bail!(
                "t_end ({}) must not precede t_start ({}).",
                self.t_end,
                self.t_start
            );
        }
        if self.end_tolerance < 0.0 {
            bail!("end_tolerance must be non-negative.");
        }
        if self.record_every == Some(0) {
            bail!("record_every must be at least 1.");
        }
        Ok(())
    }
}

/// State of the integrator at one instant, reduced to plain numbers.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot<T> {
    pub t: T,
    /// Constant coefficient of each state series.
    pub midpoints: Vec<T>,
    /// Remainder interval of each state series.
    pub errors: Vec<Interval<T>>,
    /// Enclosure of each state over the whole parameter box.
    pub enclosures: Vec<Interval<T>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IntegrationSummary {
    pub steps: usize,
    pub t: f64,
    pub max_error: f64,
}

/// Advances Taylor-model state through a fixed-step RK4 scheme.
///
/// Holds one series per state variable followed by one per declared
/// parameter. Parameters are visible to the right-hand side but never
/// integrated.
pub struct FlowIntegrator<T: Scalar> {
    index: Rc<CoefficientIndex>,
    state: Vec<TaylorSeries<T>>,
    parameter_box: Vec<Interval<T>>,
    t: T,
    stepper: RK4<T>,
}

impl<T: Scalar> FlowIntegrator<T> {
    pub fn new(
        real_variables: usize,
        real_parameters: usize,
        order: usize,
    ) -> Result<Self, TaylorError> {
        let index = Rc::new(CoefficientIndex::new(
            real_variables,
            real_parameters,
            order,
        )?);
        let size = real_variables + real_parameters;
        Ok(Self {
            state: vec![TaylorSeries::new(Rc::clone(&index)); size],
            parameter_box: vec![Interval::zero(); size],
            t: T::zero(),
            stepper: RK4::new(&index, real_variables),
            index,
        })
    }

    pub fn index(&self) -> &Rc<CoefficientIndex> {
        &self.index
    }

    pub fn dimension(&self) -> usize {
        self.index.real_variables()
    }

    pub fn t(&self) -> T {
        self.t
    }

    pub fn set_t(&mut self, t: T) {
        self.t = t;
    }

    /// State series followed by parameter series.
    pub fn series(&self) -> &[TaylorSeries<T>] {
        &self.state
    }

    /// Integrated state series only.
    pub fn state(&self) -> &[TaylorSeries<T>] {
        &self.state[..self.dimension()]
    }

    /// Range of each model variable, `[-p, p]` for an initial interval of
    /// half-width `p`.
    pub fn parameter_box(&self) -> &[Interval<T>] {
        &self.parameter_box
    }

    /// Seeds every series from its initial interval.
    ///
    /// Entry `k` becomes `midpoint + x_k` with `x_k` ranging over `[-p, p]`.
    /// Missing entries are treated as `[0, 0]`.
    pub fn initialize(&mut self, initial: &[Interval<T>]) -> Result<(), TaylorError> {
        let size = self.state.len();
        if initial.len() > size {
            return Err(TaylorError::LengthMismatch {
                left: initial.len(),
                right: size,
            });
        }

        for k in 0..size {
            let interval = initial.get(k).copied().unwrap_or_else(Interval::zero);
            let p = symmetric_half_width(interval)?;
            self.state[k] = TaylorSeries::variable(Rc::clone(&self.index), k, interval.lo + p)?;
            self.parameter_box[k] = Interval::symmetric(p);
        }
        Ok(())
    }

    /// Advances the state by one RK4 step. Fails without touching the
    /// state when `system` does not produce exactly one derivative per
    /// state variable.
    pub fn step(&mut self, system: &impl SeriesSystem<T>, dt: T) -> Result<(), TaylorError> {
        if system.dimension() != self.dimension() {
            return Err(TaylorError::LengthMismatch {
                left: system.dimension(),
                right: self.dimension(),
            });
        }
        self.stepper.step(system, &mut self.t, &mut self.state, dt)
    }

    pub fn snapshot(&self) -> FlowSnapshot<T> {
        let state = self.state();
        FlowSnapshot {
            t: self.t,
            midpoints: state.iter().map(|s| s.coefficients()[0]).collect(),
            errors: state.iter().map(|s| s.error()).collect(),
            enclosures: state
                .iter()
                .map(|s| s.range_bound(&self.parameter_box))
                .collect(),
        }
    }

    pub fn integrate(
        &mut self,
        system: &impl SeriesSystem<T>,
        settings: &IntegrationSettings,
    ) -> Result<IntegrationSummary> {
        self.integrate_with(system, settings, |_| Ok(()))
    }

    /// Steps from `settings.t_start` while one more step ends no later than
    /// `settings.t_end + settings.end_tolerance`. The observer sees the
    /// integrator before the first step and after every `record_every` steps.
    pub fn integrate_with<F>(
        &mut self,
        system: &impl SeriesSystem<T>,
        settings: &IntegrationSettings,
        mut observer: F,
    ) -> Result<IntegrationSummary>
    where
        F: FnMut(&Self) -> Result<()>,
    {
        settings.validate()?;
        if system.dimension() != self.dimension() {
            bail!(
                "System dimension mismatch. Expected {}, got {}.",
                self.dimension(),
                system.dimension()
            );
        }

        let convert = |value: f64| {
            T::from_f64(value).ok_or_else(|| anyhow!("{} is not representable", value))
        };
        let dt = convert(settings.step)?;
        let limit = convert(settings.t_end + settings.end_tolerance)?;
        self.t = convert(settings.t_start)?;

        let mut steps = 0usize;
        let mut warned = false;
        loop {
            if let Some(every) = settings.record_every {
                if steps % every == 0 {
                    observer(&*self)?;
                }
            }
            if self.t + dt > limit {
                break;
            }

            self.step(system, dt)?;
            steps += 1;

            let worst = self.max_error();
            trace!("step {} reached t = {:?}, max error {:?}", steps, self.t, worst);
            if !warned {
                if let Some(i) = self
                    .state()
                    .iter()
                    .position(|s| s.error().magnitude() > s.coefficients()[0].abs())
                {
                    warn!(
                        "Remainder of state {} outgrew its midpoint at t = {:?}; the enclosure is no longer informative.",
                        i, self.t
                    );
                    warned = true;
                }
            }
        }

        let summary = IntegrationSummary {
            steps,
            t: self.t.to_f64().unwrap_or(f64::NAN),
            max_error: self.max_error().to_f64().unwrap_or(f64::NAN),
        };
        info!(
            "Integrated {} steps to t = {}, max remainder {:e}",
            summary.steps, summary.t, summary.max_error
        );
        Ok(summary)
    }

    fn max_error(&self) -> T {
        self.state()
            .iter()
            .map(|s| s.error().magnitude())
            .fold(T::zero(), |acc, m| acc.max(m))
    }
}

/// Half-width `p` of `[lo, hi]`, rejecting pairs for which `hi - p` and
/// `lo + p` are not exactly equal.
fn symmetric_half_width<T: Scalar>(interval: Interval<T>) -> Result<T, TaylorError> {
    let p = ((interval.hi - interval.lo) / (T::one() + T::one())).abs();
    if interval.hi - p != interval.lo + p {
        return Err(TaylorError::AsymmetricInitialInterval {
            lo: interval.lo.to_f64().unwrap_or(f64::NAN),
            hi: interval.hi.to_f64().unwrap_or(f64::NAN),
        });
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::{symmetric_half_width, FlowIntegrator, IntegrationSettings};
    use crate::error::TaylorError;
    use crate::interval::Interval;
    use crate::series::TaylorSeries;
    use crate::traits::SeriesSystem;

    /// u' = v, v' = u^2
    struct Quadratic;

    impl SeriesSystem<f64> for Quadratic {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(
            &self,
            _t: f64,
            x: &[TaylorSeries<f64>],
            out: &mut [TaylorSeries<f64>],
        ) -> Result<(), TaylorError> {
            out[0] = x[1].clone();
            out[1] = x[0].checked_mul(&x[0])?;
            Ok(())
        }
    }

    fn rhs(y: [f64; 2]) -> [f64; 2] {
        [y[1], y[0] * y[0]]
    }

    /// Plain double RK4 with the same stage arrangement as the series solver.
    fn point_rk4(mut y: [f64; 2], h: f64, steps: usize) -> [f64; 2] {
        for _ in 0..steps {
            let f1 = rhs(y);
            let k1 = [f1[0] * h, f1[1] * h];
            let f2 = rhs([y[0] + k1[0] / 2.0, y[1] + k1[1] / 2.0]);
            let k2 = [f2[0] * h, f2[1] * h];
            let f3 = rhs([y[0] + k2[0] / 2.0, y[1] + k2[1] / 2.0]);
            let k3 = [f3[0] * h, f3[1] * h];
            let f4 = rhs([y[0] + k3[0], y[1] + k3[1]]);
            let k4 = [f4[0] * h, f4[1] * h];
            for i in 0..2 {
                y[i] += (k1[i] + (k2[i] + k3[i]) * 2.0 + k4[i]) / 6.0;
            }
        }
        y
    }

    fn initial_box() -> Vec<Interval<f64>> {
        vec![Interval::new(0.95, 1.05), Interval::new(-1.05, -0.95)]
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: anyhow::Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn half_width_requires_exact_symmetry() {
        assert_eq!(symmetric_half_width(Interval::new(-1.0, 1.0)), Ok(1.0));
        assert!(matches!(
            symmetric_half_width(Interval::new(1.0, -1.0)),
            Err(TaylorError::AsymmetricInitialInterval { .. })
        ));
        assert_eq!(symmetric_half_width(Interval::new(2.0, 2.0)), Ok(0.0));
        // In binary, 0.7 - 0.3 and 0.1 + 0.3 round to different values.
        let err = symmetric_half_width(Interval::new(0.1, 0.7)).unwrap_err();
        assert!(matches!(err, TaylorError::AsymmetricInitialInterval { .. }));
    }

    /// Differentiates every series it is handed, parameters included.
    struct Oversized;

    impl SeriesSystem<f64> for Oversized {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(
            &self,
            _t: f64,
            x: &[TaylorSeries<f64>],
            out: &mut [TaylorSeries<f64>],
        ) -> Result<(), TaylorError> {
            out[0] = x[1].clone();
            out[1] = x[0].clone();
            Ok(())
        }
    }

    #[test]
    fn step_rejects_system_covering_parameters() {
        let mut flow = FlowIntegrator::<f64>::new(1, 1, 2).unwrap();
        flow.initialize(&[Interval::new(-0.5, 0.5), Interval::new(1.5, 2.5)])
            .unwrap();
        let before: Vec<f64> = flow.series()[1].coefficients().to_vec();

        let err = flow.step(&Oversized, 0.5).unwrap_err();
        assert_eq!(err, TaylorError::LengthMismatch { left: 2, right: 1 });
        assert_eq!(flow.series()[1].coefficients(), before.as_slice());
        assert_eq!(flow.series()[1].coefficients()[0], 2.0);
        assert_eq!(flow.t(), 0.0);
    }

    #[test]
    fn initialize_seeds_midpoint_and_linear_term() {
        let mut flow = FlowIntegrator::<f64>::new(2, 0, 4).unwrap();
        flow.initialize(&initial_box()).unwrap();

        let index = flow.index().clone();
        for k in 0..2 {
            let series = &flow.series()[k];
            let linear = index.first_order_position(k).unwrap();
            assert_eq!(series.coefficient(linear), Ok(1.0));
            assert_eq!(series.error(), Interval::zero());
            let nonzero = series.coefficients().iter().filter(|c| **c != 0.0).count();
            assert_eq!(nonzero, 2);
        }
        assert!((flow.series()[0].coefficient(0).unwrap() - 1.0).abs() < 1e-15);
        assert!((flow.series()[1].coefficient(0).unwrap() + 1.0).abs() < 1e-15);
        for range in flow.parameter_box() {
            assert!((range.hi - 0.05).abs() < 1e-15);
            assert_eq!(range.lo, -range.hi);
        }
    }

    #[test]
    fn initialize_pads_missing_entries_and_rejects_extra() {
        let mut flow = FlowIntegrator::<f64>::new(1, 1, 3).unwrap();
        flow.initialize(&[Interval::new(-0.5, 0.5)]).unwrap();
        assert_eq!(flow.series()[1].coefficient(0), Ok(0.0));
        assert_eq!(flow.parameter_box()[1], Interval::symmetric(0.0));

        let err = flow
            .initialize(&[Interval::zero(), Interval::zero(), Interval::zero()])
            .unwrap_err();
        assert_eq!(err, TaylorError::LengthMismatch { left: 3, right: 2 });
    }

    #[test]
    fn initialize_rejects_asymmetric_interval() {
        let mut flow = FlowIntegrator::<f64>::new(1, 0, 3).unwrap();
        let err = flow.initialize(&[Interval::new(0.1, 0.7)]).unwrap_err();
        assert!(matches!(err, TaylorError::AsymmetricInitialInterval { .. }));
    }

    #[test]
    fn one_step_midpoint_matches_point_rk4() {
        let mut flow = FlowIntegrator::<f64>::new(2, 0, 18).unwrap();
        flow.initialize(&initial_box()).unwrap();
        flow.step(&Quadratic, 0.01).unwrap();

        let expected = point_rk4([1.0, -1.0], 0.01, 1);
        for i in 0..2 {
            let series = &flow.series()[i];
            let c0 = series.coefficient(0).unwrap();
            let bound = series.error().magnitude() + 1e-14;
            assert!(
                (c0 - expected[i]).abs() <= bound,
                "state {i}: {c0} vs {} (bound {bound})",
                expected[i]
            );
        }
        assert!((flow.t() - 0.01).abs() < 1e-15);
    }

    #[test]
    fn model_encloses_corner_trajectories() {
        let mut flow = FlowIntegrator::<f64>::new(2, 0, 6).unwrap();
        flow.initialize(&initial_box()).unwrap();
        let h = 0.01;
        let steps = 20;
        for _ in 0..steps {
            flow.step(&Quadratic, h).unwrap();
        }

        for &(a, b) in &[(0.05, 0.05), (-0.05, 0.05), (0.05, -0.05), (-0.05, -0.05)] {
            let exact = point_rk4([1.0 + a, -1.0 + b], h, steps);
            for i in 0..2 {
                let series = &flow.series()[i];
                let model = series.evaluate(&[a, b]);
                let bound = series.error().magnitude() + 1e-12;
                assert!((model - exact[i]).abs() <= bound);
            }
        }

        let snapshot = flow.snapshot();
        let center = point_rk4([1.0, -1.0], h, steps);
        for i in 0..2 {
            assert!(snapshot.enclosures[i].contains(center[i]));
            assert!((snapshot.midpoints[i] - center[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn integrate_counts_steps_and_records() {
        let mut flow = FlowIntegrator::<f64>::new(2, 0, 4).unwrap();
        flow.initialize(&initial_box()).unwrap();
        let settings = IntegrationSettings {
            t_start: 0.0,
            t_end: 0.1,
            step: 0.01,
            record_every: Some(5),
            ..IntegrationSettings::default()
        };
        let mut seen = Vec::new();
        let summary = flow
            .integrate_with(&Quadratic, &settings, |f| {
                seen.push(f.t());
                Ok(())
            })
            .unwrap();
        assert_eq!(summary.steps, 10);
        assert!((summary.t - 0.1).abs() < 1e-12);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], 0.0);
    }

    #[test]
    fn integrate_rejects_invalid_settings() {
        let mut flow = FlowIntegrator::<f64>::new(2, 0, 2).unwrap();
        let bad_step = IntegrationSettings {
            step: 0.0,
            ..IntegrationSettings::default()
        };
        assert_err_contains(flow.integrate(&Quadratic, &bad_step), "Step size");

        let reversed = IntegrationSettings {
            t_start: 1.0,
            t_end: 0.0,
            ..IntegrationSettings::default()
        };
        assert_err_contains(flow.integrate(&Quadratic, &reversed), "must not precede");

        let zero_stride = IntegrationSettings {
            record_every: Some(0),
            ..IntegrationSettings::default()
        };
        assert_err_contains(flow.integrate(&Quadratic, &zero_stride), "record_every");

        let mut scalar = FlowIntegrator::<f64>::new(1, 0, 2).unwrap();
        assert_err_contains(
            scalar.integrate(&Quadratic, &IntegrationSettings::default()),
            "dimension mismatch",
        );
    }

    #[test]
    fn integrate_surfaces_core_errors() {
        struct Broken;
        impl SeriesSystem<f64> for Broken {
            fn dimension(&self) -> usize {
                1
            }
            fn apply(
                &self,
                _t: f64,
                x: &[TaylorSeries<f64>],
                out: &mut [TaylorSeries<f64>],
            ) -> Result<(), TaylorError> {
                out[0] = x[0].checked_div(0.0)?;
                Ok(())
            }
        }

        let mut flow = FlowIntegrator::<f64>::new(1, 0, 2).unwrap();
        let err = flow
            .integrate(&Broken, &IntegrationSettings::default())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<TaylorError>(),
            Some(&TaylorError::DivideByZero)
        );
    }

    #[test]
    #[ignore = "full order-18 run over [0, 6]"]
    fn quadratic_flow_full_run() {
        let mut flow = FlowIntegrator::<f64>::new(2, 0, 18).unwrap();
        flow.initialize(&initial_box()).unwrap();
        let summary = flow
            .integrate(&Quadratic, &IntegrationSettings::default())
            .unwrap();
        assert_eq!(summary.steps, 600);
        assert!((summary.t - 6.0).abs() < 1e-9);
    }
}

use crate::error::TaylorError;
use crate::series::TaylorSeries;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in Taylor-model arithmetic.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side of an ODE evaluated on Taylor models.
pub trait SeriesSystem<T: Scalar> {
    /// Returns the number of integrated state variables.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: state series followed by the parameter series
    /// out: buffer of `dimension()` series receiving dx/dt
    fn apply(
        &self,
        t: T,
        x: &[TaylorSeries<T>],
        out: &mut [TaylorSeries<T>],
    ) -> Result<(), TaylorError>;
}

/// A trait for solvers that advance a set of series by one step.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: state series followed by parameter series; only the first
    /// `system.dimension()` entries are advanced
    fn step(
        &mut self,
        system: &impl SeriesSystem<T>,
        t: &mut T,
        state: &mut [TaylorSeries<T>],
        dt: T,
    ) -> Result<(), TaylorError>;
}

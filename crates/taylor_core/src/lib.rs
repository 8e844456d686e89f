pub mod boundary;
pub mod coefficients;
pub mod equation_engine;
pub mod error;
pub mod flow;
pub mod interval;
pub mod series;
pub mod solvers;
/// The `taylor_core` crate provides validated integration of ODEs whose initial
/// conditions are known only up to an interval.
/// Every state variable is carried as a Taylor model: a truncated polynomial in the
/// uncertain initial values plus an interval bounding truncation and rounding error.
///
/// Key components:
/// - **Interval**: bounded-pair arithmetic with corner evaluation.
/// - **Coefficients**: the monomial table with O(1) product-position lookup.
/// - **Series**: Taylor-model arithmetic with rigorous error propagation.
/// - **Solvers / Flow**: fixed-step RK4 over Taylor models and the integration driver.
/// - **Equation Engine**: a bytecode VM evaluating polynomial right-hand sides on series.
/// - **Boundary**: edge sampling of the parameter box for plotting.
pub mod traits;

pub use coefficients::CoefficientIndex;
pub use error::{ExpressionError, TaylorError};
pub use flow::{FlowIntegrator, IntegrationSettings};
pub use interval::Interval;
pub use series::TaylorSeries;

use thiserror::Error;

/// Faults raised by validated arithmetic. Each one terminates the
/// operation that raised it; nothing is salvaged from a partial result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaylorError {
    #[error("division by zero")]
    DivideByZero,

    #[error("series length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("coefficient index {index} out of range for series of size {size}")]
    OutOfRange { index: usize, size: usize },

    #[error("initial interval [{lo}, {hi}] is not symmetric about its midpoint")]
    AsymmetricInitialInterval { lo: f64, hi: f64 },

    #[error("coefficient table for {variables} variables at order {order} does not fit in memory")]
    IndexTooLarge { variables: usize, order: usize },
}

/// Failures while turning a right-hand-side expression into bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("{0}")]
    Syntax(String),

    #[error("unknown variable or parameter: {0}")]
    UnknownIdentifier(String),

    #[error("function {0}() has no polynomial Taylor-model form")]
    UnsupportedFunction(String),

    #[error("divisor must be a constant expression")]
    NonConstantDivisor,

    #[error("exponent must be a non-negative integer constant, got {0}")]
    InvalidExponent(String),
}

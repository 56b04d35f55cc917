//! Error types for problem construction and solving.

use thiserror::Error;

/// Errors raised while building or solving composite problems.
///
/// Numerical non-convergence is deliberately not represented here: a solve
/// that hits its iteration limit returns a normal
/// [`FitResult`](crate::prox::FitResult) whose status and objective trace let
/// the caller judge convergence quality.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operator/vector size disagreement, raised at construction.
    #[error("dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A dual problem was requested but the loss has no usable conjugate
    /// and no smoothing parameter was supplied.
    #[error("no usable conjugate: supply an exact conjugate or a smoothing epsilon")]
    ConjugateUnavailable,

    /// Moreau-Yosida smoothing needs a strictly positive parameter.
    #[error("smoothing parameter must be positive")]
    NonPositiveEpsilon,

    /// The backtracking line search grew the Lipschitz estimate past its
    /// budget without satisfying the descent condition.
    #[error("backtracking exhausted: descent condition still violated at L = {lipschitz:e}")]
    BacktrackExhausted { lipschitz: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;

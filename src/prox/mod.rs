//! Solvers for Composite Functions consisting of
//! a smooth part and non-smooth prox-friendly atoms
//!
//! This includes common objective functions such as the LASSO
//! as well as constrained problems, as a projection is
//! the proximal operator of a constraint set. Both solvers share the
//! [`fit`](Fista::fit) entry point and report an objective-value trace
//! rather than failing on non-convergence.

mod fista;
pub use fista::*;

mod blockwise;
pub use blockwise::*;

use crate::Float;

/// Controls for a single `fit` call, shared by both solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions<S> {
    /// Hard iteration cap; hitting it is reported, not an error.
    pub max_its: usize,
    /// Iterations to run before the convergence test is honored.
    pub min_its: usize,
    /// Relative objective-change tolerance (absolute when the previous
    /// objective is exactly zero).
    pub tol: S,
    /// Grow the Lipschitz estimate until the descent condition holds.
    /// Disabling it fixes the estimate for the whole run.
    pub backtrack: bool,
    /// Reset the acceleration sequence instead of accepting a
    /// non-decreasing step.
    pub monotonicity_restart: bool,
}

impl<S: Float> Default for FitOptions<S> {
    fn default() -> Self {
        FitOptions {
            max_its: 5000,
            min_its: 5,
            tol: S::from(1e-6).unwrap(),
            backtrack: true,
            monotonicity_restart: true,
        }
    }
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The relative objective change dropped below the tolerance.
    Converged,
    /// The iteration cap was hit first. Inspect the trace before trusting
    /// the coefficients.
    MaxIterationsReached,
}

/// What a solve leaves behind, besides the coefficients written into the
/// problem: the terminal status and the recorded objective values, one per
/// iteration (the first entry is the starting objective).
#[derive(Debug, Clone)]
pub struct FitResult<S> {
    pub status: SolveStatus,
    pub iterations: usize,
    pub objective: Vec<S>,
}

impl<S: Float> FitResult<S> {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// The last recorded objective value.
    pub fn final_objective(&self) -> S {
        *self.objective.last().expect("trace is never empty")
    }
}

//! Smooth Functions with L-Lipschitz Gradients
//!
//! The differentiable side of a composite objective. A [`SmoothFunction`]
//! knows its value, gradient and a Lipschitz estimate for that gradient;
//! solvers never look past this interface. [`SmoothSum`] adds components
//! together, which is how a loss absorbs Moreau-smoothed seminorms.

mod quadratic;
pub use quadratic::*;

mod moreau;
pub use moreau::*;

use std::rc::Rc;

use ndarray::prelude::*;

use crate::atoms::AtomRef;
use crate::error::Result;
use crate::Float;

/// A differentiable function with a Lipschitz-continuous gradient.
pub trait SmoothFunction<S: Float> {
    fn dim(&self) -> usize;
    fn value(&self, x: ArrayView1<S>) -> S;
    fn gradient(&self, x: ArrayView1<S>) -> Array1<S>;
    /// Upper estimate of the gradient's Lipschitz constant.
    fn lipschitz(&self) -> S;
    /// Exact convex conjugate, for losses that have one in closed form.
    fn conjugate(&self) -> Option<Box<dyn SmoothFunction<S>>> {
        None
    }
}

/// Additive composite of smooth parts: values, gradients and Lipschitz
/// estimates all sum.
pub struct SmoothSum<S: Float> {
    parts: Vec<Rc<dyn SmoothFunction<S>>>,
    dim: usize,
}

impl<S: Float> SmoothSum<S> {
    pub fn new(first: Rc<dyn SmoothFunction<S>>) -> SmoothSum<S> {
        let dim = first.dim();
        SmoothSum {
            parts: vec![first],
            dim,
        }
    }

    pub fn push(&mut self, part: Rc<dyn SmoothFunction<S>>) -> Result<()> {
        if part.dim() != self.dim {
            return Err(crate::error::Error::DimensionMismatch {
                expected: self.dim,
                found: part.dim(),
            });
        }
        self.parts.push(part);
        Ok(())
    }

    /// Merge a penalty atom into the smooth part through its Moreau
    /// envelope with parameter `epsilon`.
    pub fn add_seminorm(&mut self, atom: AtomRef<S>, epsilon: S) -> Result<()> {
        let smoothed = SmoothedSeminorm::new(atom, epsilon)?;
        self.push(Rc::new(smoothed))
    }
}

impl<S: Float> SmoothFunction<S> for SmoothSum<S> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn value(&self, x: ArrayView1<S>) -> S {
        self.parts.iter().map(|p| p.value(x)).sum()
    }

    fn gradient(&self, x: ArrayView1<S>) -> Array1<S> {
        let mut g = Array1::zeros(self.dim);
        for p in &self.parts {
            g += &p.gradient(x);
        }
        g
    }

    fn lipschitz(&self) -> S {
        self.parts.iter().map(|p| p.lipschitz()).sum()
    }
}

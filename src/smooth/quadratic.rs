//! Quadratic losses and the least-squares regression loss.

use ndarray::prelude::*;

use super::SmoothFunction;
use crate::linop::power_iteration;
use crate::Float;

/// `(coef/2) ||x - center||^2 + constant`, the workhorse quadratic.
///
/// With no center this is a plain squared-norm penalty; centered at the data
/// it is the signal-approximator loss. The conjugate is again a
/// [`Quadratic`], so duality stays in closed form.
#[derive(Clone)]
pub struct Quadratic<S: Float> {
    coef: S,
    center: Option<Array1<S>>,
    constant: S,
    dim: usize,
}

/// `(coef/2) ||x||^2` on `R^dim`.
pub fn l2normsq<S: Float>(dim: usize, coef: S) -> Quadratic<S> {
    Quadratic {
        coef,
        center: None,
        constant: S::zero(),
        dim,
    }
}

/// The signal-approximator loss `(1/2) ||x - y||^2`.
pub fn signal_approximator<S: Float>(y: ArrayView1<S>) -> Quadratic<S> {
    Quadratic {
        coef: S::one(),
        center: Some(y.to_owned()),
        constant: S::zero(),
        dim: y.len(),
    }
}

impl<S: Float> Quadratic<S> {
    /// Re-center the quadratic: `(coef/2) ||x - center||^2`.
    #[must_use]
    pub fn shifted(&self, center: ArrayView1<S>, coef: S) -> Quadratic<S> {
        Quadratic {
            coef,
            center: Some(center.to_owned()),
            constant: self.constant,
            dim: self.dim,
        }
    }

    pub fn coef(&self) -> S {
        self.coef
    }
}

impl<S: Float> SmoothFunction<S> for Quadratic<S> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn value(&self, x: ArrayView1<S>) -> S {
        let half = S::from(0.5).unwrap();
        let sq = match &self.center {
            Some(m) => {
                let d = &x - m;
                d.dot(&d)
            }
            None => x.dot(&x),
        };
        self.coef * half * sq + self.constant
    }

    fn gradient(&self, x: ArrayView1<S>) -> Array1<S> {
        match &self.center {
            Some(m) => (&x - m).mapv(|v| v * self.coef),
            None => x.mapv(|v| v * self.coef),
        }
    }

    fn lipschitz(&self) -> S {
        self.coef
    }

    /// `((coef/2)||x - m||^2 + k)* = (1/(2 coef))||v||^2 + <v, m> - k`,
    /// expressed as another centered quadratic.
    fn conjugate(&self) -> Option<Box<dyn SmoothFunction<S>>> {
        let half = S::from(0.5).unwrap();
        let inv = S::one() / self.coef;
        let (center, constant) = match &self.center {
            Some(m) => (
                Some(m.mapv(|v| -v * self.coef)),
                -self.coef * half * m.dot(m) - self.constant,
            ),
            None => (None, -self.constant),
        };
        Some(Box::new(Quadratic {
            coef: inv,
            center,
            constant,
            dim: self.dim,
        }))
    }
}

/// The regression loss `(1/2) ||A x - y||^2`.
///
/// The gradient Lipschitz constant is `sigma_1(A)^2`, estimated once by
/// power iteration (with a 5% safety margin). There is no closed-form
/// conjugate; dual constructions go through the generic smoothed path.
pub struct LeastSquares<S: Float> {
    a: Array2<S>,
    y: Array1<S>,
    lip: S,
}

/// Build the least-squares loss for a design matrix and response.
pub fn least_squares<S: Float>(a: Array2<S>, y: Array1<S>) -> crate::error::Result<LeastSquares<S>> {
    if a.nrows() != y.len() {
        return Err(crate::error::Error::DimensionMismatch {
            expected: a.nrows(),
            found: y.len(),
        });
    }
    let margin = S::from(1.05).unwrap();
    let lip = margin * power_iteration(&a, 50);
    Ok(LeastSquares { a, y, lip })
}

impl<S: Float> SmoothFunction<S> for LeastSquares<S> {
    fn dim(&self) -> usize {
        self.a.ncols()
    }

    fn value(&self, x: ArrayView1<S>) -> S {
        let r = self.a.dot(&x) - &self.y;
        S::from(0.5).unwrap() * r.dot(&r)
    }

    fn gradient(&self, x: ArrayView1<S>) -> Array1<S> {
        let r = self.a.dot(&x) - &self.y;
        self.a.t().dot(&r)
    }

    fn lipschitz(&self) -> S {
        self.lip
    }
}

//! Abstract Linear Operators and Adjoints
//!
//! Seminorm atoms are pre-composed with a linear map through the [`LinearMap`]
//! trait, which only asks for matrix-vector and transpose-vector products.
//! Dense matrices work out of the box; sparse or structured operators from
//! external linear-algebra crates plug in by implementing the trait.

use ndarray::prelude::*;

use crate::Float;

/// A linear operator `D: R^cols -> R^rows` exposed through its action on
/// vectors. Implementations must satisfy `<D x, u> == <x, D^T u>`.
pub trait LinearMap<S: Float> {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    /// Compute `D x`.
    fn apply(&self, x: ArrayView1<S>) -> Array1<S>;
    /// Compute `D^T u`.
    fn apply_adjoint(&self, u: ArrayView1<S>) -> Array1<S>;
}

impl<S: Float> LinearMap<S> for Array2<S> {
    fn rows(&self) -> usize {
        self.nrows()
    }

    fn cols(&self) -> usize {
        self.ncols()
    }

    fn apply(&self, x: ArrayView1<S>) -> Array1<S> {
        self.dot(&x)
    }

    fn apply_adjoint(&self, u: ArrayView1<S>) -> Array1<S> {
        self.t().dot(&u)
    }
}

/// The identity map on `R^dim`.
pub struct Identity {
    dim: usize,
}

impl Identity {
    #[must_use]
    pub fn new(dim: usize) -> Identity {
        Identity { dim }
    }
}

impl<S: Float> LinearMap<S> for Identity {
    fn rows(&self) -> usize {
        self.dim
    }

    fn cols(&self) -> usize {
        self.dim
    }

    fn apply(&self, x: ArrayView1<S>) -> Array1<S> {
        x.to_owned()
    }

    fn apply_adjoint(&self, u: ArrayView1<S>) -> Array1<S> {
        u.to_owned()
    }
}

/// Diagonal scaling by a fixed vector.
pub struct Diagonal<S> {
    diag: Array1<S>,
}

impl<S: Float> Diagonal<S> {
    #[must_use]
    pub fn new(diag: Array1<S>) -> Diagonal<S> {
        Diagonal { diag }
    }
}

impl<S: Float> LinearMap<S> for Diagonal<S> {
    fn rows(&self) -> usize {
        self.diag.len()
    }

    fn cols(&self) -> usize {
        self.diag.len()
    }

    fn apply(&self, x: ArrayView1<S>) -> Array1<S> {
        &self.diag * &x
    }

    fn apply_adjoint(&self, u: ArrayView1<S>) -> Array1<S> {
        &self.diag * &u
    }
}

/// First-difference operator `(D x)_i = x_{i+1} - x_i`, mapping `R^n` to
/// `R^{n-1}`. Composing an L1 atom with this map gives the fused-lasso
/// (total-variation) penalty.
pub struct FirstDifference {
    dim: usize,
}

/// Build the first-difference operator on signals of length `n`.
#[must_use]
pub fn first_difference(n: usize) -> FirstDifference {
    FirstDifference { dim: n }
}

impl<S: Float> LinearMap<S> for FirstDifference {
    fn rows(&self) -> usize {
        self.dim - 1
    }

    fn cols(&self) -> usize {
        self.dim
    }

    fn apply(&self, x: ArrayView1<S>) -> Array1<S> {
        Array1::from_shape_fn(self.dim - 1, |i| x[i + 1] - x[i])
    }

    fn apply_adjoint(&self, u: ArrayView1<S>) -> Array1<S> {
        let n = self.dim;
        Array1::from_shape_fn(n, |i| {
            if i == 0 {
                -u[0]
            } else if i == n - 1 {
                u[n - 2]
            } else {
                u[i - 1] - u[i]
            }
        })
    }
}

/// Estimate the squared spectral norm `sigma_1(D)^2` by power iteration on
/// `D^T D`, from a fixed (deterministic) starting vector.
///
/// Callers seeding a Lipschitz constant should scale the estimate up a
/// little (e.g. by 1.05) since power iteration converges from below.
pub fn power_iteration<S: Float>(op: &dyn LinearMap<S>, iters: usize) -> S {
    let n = op.cols();
    let half = S::from(0.5).unwrap();
    // mildly uneven start so we don't sit orthogonal to the top singular vector
    let mut v: Array1<S> = Array1::from_shape_fn(n, |i| {
        S::one() + half * S::from(((3 * i + 1) % 7) as f64 / 7.0).unwrap()
    });
    let mut estimate = S::one();
    for _ in 0..iters {
        let w = op.apply_adjoint(op.apply(v.view()).view());
        let vnorm = v.dot(&v);
        if vnorm <= S::zero() {
            return S::zero();
        }
        estimate = w.dot(&v) / vnorm;
        let wnorm = w.dot(&w).sqrt();
        if wnorm <= S::zero() {
            return S::zero();
        }
        v = w / wnorm;
    }
    estimate
}

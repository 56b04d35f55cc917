//! Seminorm atoms
//!
//! An [`Atom`] is one non-smooth penalty term: a seminorm family (L1, L2 or
//! sup-norm) with a regularization weight, optionally pre-composed with a
//! linear map and an affine shift. The `constraint` flag reinterprets the
//! weight as a ball radius, turning the penalty into a feasible-set
//! indicator. Both fields are public and may be flipped between solves;
//! containers share atoms through [`AtomRef`] so the last write wins.

mod projections;
pub use projections::*;

use std::cell::RefCell;
use std::rc::Rc;

use ndarray::prelude::*;

use crate::affine::AffineMap;
use crate::error::{Error, Result};
use crate::linop::LinearMap;
use crate::Float;

/// Slack used when a constraint atom reports feasibility of a point.
const FEASIBILITY_SLACK: f64 = 1e-6;

/// The seminorm families with closed-form proximal maps and projections.
///
/// Conjugacy pairs the families: the dual norm of L1 is the sup-norm and
/// vice versa, while L2 is self-dual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeminormFamily {
    L1,
    L2,
    Sup,
}

impl SeminormFamily {
    /// The family of the dual norm.
    #[must_use]
    pub fn dual(self) -> SeminormFamily {
        match self {
            SeminormFamily::L1 => SeminormFamily::Sup,
            SeminormFamily::Sup => SeminormFamily::L1,
            SeminormFamily::L2 => SeminormFamily::L2,
        }
    }

    /// Norm value at `z`.
    pub fn value<S: Float>(self, z: ArrayView1<S>) -> S {
        match self {
            SeminormFamily::L1 => z.iter().map(|v| v.abs()).sum(),
            SeminormFamily::L2 => z.dot(&z).sqrt(),
            SeminormFamily::Sup => z.iter().fold(S::zero(), |m, v| m.max(v.abs())),
        }
    }

    /// `prox_{t ||.||}(z)`.
    pub fn prox<S: Float>(self, z: ArrayView1<S>, t: S) -> Array1<S> {
        match self {
            SeminormFamily::L1 => soft_threshold(z, t),
            SeminormFamily::L2 => prox_l2(z, t),
            SeminormFamily::Sup => prox_supnorm(z, t),
        }
    }

    /// Projection onto `{z : ||z|| <= r}`.
    pub fn project<S: Float>(self, z: ArrayView1<S>, r: S) -> Array1<S> {
        match self {
            SeminormFamily::L1 => project_l1_ball(z, r),
            SeminormFamily::L2 => project_l2_ball(z, r),
            SeminormFamily::Sup => clip(z, r),
        }
    }
}

/// Shared handle to an atom. Containers and problems hold these; mutating
/// `weight` or `constraint` through one handle is seen by all of them
/// (single-threaded, last-writer-wins).
pub type AtomRef<S> = Rc<RefCell<Atom<S>>>;

/// A single seminorm penalty `weight * ||D x + b||`, or in constraint mode
/// the indicator of `{x : ||D x + b|| <= weight}`.
#[derive(Clone)]
pub struct Atom<S: Float> {
    /// Lagrange multiplier in penalty mode, ball radius in constraint mode.
    /// Must be nonnegative.
    pub weight: S,
    /// Penalty (`false`) versus constraint (`true`) interpretation.
    pub constraint: bool,
    family: SeminormFamily,
    dim: usize,
    transform: AffineMap<S>,
}

impl<S: Float> std::fmt::Debug for Atom<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("weight", &self.weight)
            .field("constraint", &self.constraint)
            .field("family", &self.family)
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

/// An L1-norm atom on `R^dim` with the given weight.
pub fn l1norm<S: Float>(dim: usize, weight: S) -> Atom<S> {
    Atom::new(SeminormFamily::L1, dim, weight)
}

/// A Euclidean-norm atom on `R^dim` with the given weight.
pub fn l2norm<S: Float>(dim: usize, weight: S) -> Atom<S> {
    Atom::new(SeminormFamily::L2, dim, weight)
}

/// A sup-norm atom on `R^dim` with the given weight.
pub fn supnorm<S: Float>(dim: usize, weight: S) -> Atom<S> {
    Atom::new(SeminormFamily::Sup, dim, weight)
}

impl<S: Float> Atom<S> {
    pub fn new(family: SeminormFamily, dim: usize, weight: S) -> Atom<S> {
        debug_assert!(weight >= S::zero());
        Atom {
            weight,
            constraint: false,
            family,
            dim,
            transform: AffineMap::identity(dim),
        }
    }

    pub fn family(&self) -> SeminormFamily {
        self.family
    }

    /// Dimension the seminorm itself acts on (rows of the linear part).
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Dimension of the primal variable the atom sees (columns of the
    /// linear part).
    pub fn input_dim(&self) -> usize {
        self.transform.cols()
    }

    pub fn transform(&self) -> &AffineMap<S> {
        &self.transform
    }

    /// Pre-compose with a linear operator: the atom becomes
    /// `weight * ||D x + b||`. Only valid while the linear part is still the
    /// identity, and `D` must produce vectors of the atom's dimension.
    pub fn linear(mut self, op: Rc<dyn LinearMap<S>>) -> Result<Atom<S>> {
        if op.rows() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                found: op.rows(),
            });
        }
        let shift = self.transform.shift_part().map(|b| b.to_owned());
        let mut map = AffineMap::linear(op);
        if let Some(b) = shift {
            map = map.with_shift(b)?;
        }
        self.transform = map;
        Ok(self)
    }

    /// Fold an affine shift into the atom: `||D x + b||` gains `+ b`.
    pub fn shift(mut self, b: Array1<S>) -> Result<Atom<S>> {
        self.transform = self.transform.with_shift(b)?;
        Ok(self)
    }

    /// Pre-compose with both a linear operator and a shift.
    pub fn affine(self, op: Rc<dyn LinearMap<S>>, b: Array1<S>) -> Result<Atom<S>> {
        self.linear(op)?.shift(b)
    }

    /// Flip the atom to constraint mode, reading the weight as the radius.
    #[must_use]
    pub fn constrained(mut self) -> Atom<S> {
        self.constraint = true;
        self
    }

    /// Move into a shared handle for use in containers.
    #[must_use]
    pub fn shared(self) -> AtomRef<S> {
        Rc::new(RefCell::new(self))
    }

    /// Raw seminorm value `||D x + b||` at a primal point.
    pub fn seminorm(&self, x: ArrayView1<S>) -> S {
        self.family.value(self.transform.forward(x).view())
    }

    /// Contribution to the reported objective: `weight * ||D x + b||` in
    /// penalty mode; in constraint mode, zero when feasible (up to a small
    /// relative slack) and infinity otherwise.
    pub fn nonsmooth_objective(&self, x: ArrayView1<S>) -> S {
        let value = self.seminorm(x);
        if self.constraint {
            let slack = S::from(FEASIBILITY_SLACK).unwrap();
            if value <= self.weight * (S::one() + slack) + slack {
                S::zero()
            } else {
                S::infinity()
            }
        } else {
            self.weight * value
        }
    }

    /// Whether the closed-form proximal map below applies.
    pub fn has_closed_form_prox(&self) -> bool {
        self.transform.is_identity()
    }

    /// Closed-form proximal map at step `t`:
    /// `argmin_u ||u - z||^2 / (2t) + weight * ||u + b||` in penalty mode,
    /// or the projection onto `{u : ||u + b|| <= weight}` in constraint
    /// mode. Requires an identity linear part (shift allowed); atoms with a
    /// non-trivial linear map are handled by the container's dual fallback.
    pub fn proximal(&self, z: ArrayView1<S>, t: S) -> Array1<S> {
        debug_assert!(self.has_closed_form_prox());
        match self.transform.shift_part() {
            None => self.proximal_core(z, t),
            Some(b) => {
                // substitute v = u + b
                let shifted = &z + &b;
                self.proximal_core(shifted.view(), t) - &b
            }
        }
    }

    fn proximal_core(&self, z: ArrayView1<S>, t: S) -> Array1<S> {
        if self.constraint {
            self.family.project(z, self.weight)
        } else {
            self.family.prox(z, t * self.weight)
        }
    }

    /// The conjugate of the atom's core (transform excluded; containers
    /// account for `D` and `b` through the stacked dual transform).
    ///
    /// A penalty `w ||.||` conjugates to the indicator of the dual-norm ball
    /// of radius `w`; a ball indicator conjugates back to the support
    /// function `delta ||.||_dual`.
    #[must_use]
    pub fn conjugate(&self) -> Atom<S> {
        Atom {
            weight: self.weight,
            constraint: !self.constraint,
            family: self.family.dual(),
            dim: self.dim,
            transform: AffineMap::identity(self.dim),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linop::first_difference;
    use approx::assert_abs_diff_eq;

    #[test]
    fn prox_approaches_identity_as_t_vanishes() {
        let atom = l1norm(4, 2.0);
        let z = array![3., -1., 0.5, 2.];
        let p = atom.proximal(z.view(), 1e-9);
        assert_abs_diff_eq!(p, z, epsilon = 1e-8);
    }

    #[test]
    fn prox_approaches_penalty_minimizer_as_t_grows() {
        let atom = l1norm(4, 2.0);
        let z = array![3., -1., 0.5, 2.];
        let p = atom.proximal(z.view(), 1e9);
        assert_abs_diff_eq!(p, Array1::zeros(4), epsilon = 1e-8);
    }

    #[test]
    fn constraint_mode_projects() {
        let atom = supnorm(3, 1.0).constrained();
        let z = array![3., -0.5, -2.];
        // projection ignores the step size
        let p = atom.proximal(z.view(), 0.1);
        assert_abs_diff_eq!(p, array![1., -0.5, -1.]);
        assert_abs_diff_eq!(atom.proximal(z.view(), 10.), p);
    }

    #[test]
    fn shift_composes_by_substitution() {
        let b = array![1., -2., 0.];
        let atom = l1norm(3, 1.0).shift(b.clone()).unwrap();
        let plain = l1norm(3, 1.0);
        let z = array![0.5, 3., -1.];
        let t = 0.7;
        let expected = plain.proximal((&z + &b).view(), t) - &b;
        assert_abs_diff_eq!(atom.proximal(z.view(), t), expected, epsilon = 1e-12);
    }

    #[test]
    fn seminorm_uses_transform() {
        let atom = l1norm(3, 5.0)
            .linear(Rc::new(first_difference(4)))
            .unwrap();
        assert_eq!(atom.input_dim(), 4);
        assert!(!atom.has_closed_form_prox());
        let x = array![0., 2., 2., -1.];
        assert_abs_diff_eq!(atom.seminorm(x.view()), 5.0);
        assert_abs_diff_eq!(atom.nonsmooth_objective(x.view()), 25.0);
    }

    #[test]
    fn constraint_objective_is_indicator() {
        let atom = l1norm(2, 1.0).constrained();
        assert_abs_diff_eq!(atom.nonsmooth_objective(array![0.5, 0.4].view()), 0.0);
        assert!(atom
            .nonsmooth_objective(array![2.0_f64, 0.].view())
            .is_infinite());
    }

    #[test]
    fn conjugate_flips_mode_and_family() {
        let atom = l1norm(3, 2.5);
        let conj = atom.conjugate();
        assert_eq!(conj.family(), SeminormFamily::Sup);
        assert!(conj.constraint);
        assert_abs_diff_eq!(conj.weight, 2.5);
        let back = conj.conjugate();
        assert_eq!(back.family(), SeminormFamily::L1);
        assert!(!back.constraint);
    }

    #[test]
    fn linear_rejects_wrong_row_count() {
        let err = l1norm::<f64>(3, 1.0)
            .linear(Rc::new(first_difference(3)))
            .unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                found: 2
            }
        );
    }
}

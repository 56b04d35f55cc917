//! Composite problems: the objects solvers drive
//!
//! A [`Composite`] splits an objective into a smooth part (value + gradient
//! + Lipschitz estimate) and a non-smooth part reached only through its
//! proximal map. [`Problem`] is the primal form built by a container;
//! [`DualProblem`] is the Fenchel dual over stacked block variables, which
//! doubles as the inner problem of the generic proximal fallback.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use ndarray::prelude::*;
use ndarray::s;

use crate::affine::Stacked;
use crate::atoms::{Atom, AtomRef};
use crate::error::{Error, Result};
use crate::linop::{power_iteration, LinearMap};
use crate::prox::{Fista, FitOptions};
use crate::smooth::{l2normsq, SmoothFunction, SmoothSum};
use crate::Float;

/// The interface solvers iterate against: a smooth objective with gradient
/// and Lipschitz estimate, a non-smooth remainder with a proximal step, and
/// the coefficient state that persists across fits.
pub trait Composite<S: Float> {
    fn coefs(&self) -> ArrayView1<S>;
    fn set_coefs(&mut self, x: ArrayView1<S>);
    fn lipschitz(&self) -> S;
    fn set_lipschitz(&mut self, lip: S);
    fn smooth_objective(&self, x: ArrayView1<S>) -> S;
    fn gradient(&self, x: ArrayView1<S>) -> Array1<S>;
    fn nonsmooth_objective(&self, x: ArrayView1<S>) -> S;
    /// `argmin_u ||u - z||^2 / (2t) + nonsmooth(u)`.
    fn proximal_step(&mut self, z: ArrayView1<S>, t: S) -> Result<Array1<S>>;

    fn objective(&self, x: ArrayView1<S>) -> S {
        self.smooth_objective(x) + self.nonsmooth_objective(x)
    }
}

/// Iteration controls for the inner dual solve of the proximal fallback.
fn inner_fit_options<S: Float>() -> FitOptions<S> {
    FitOptions {
        max_its: 2000,
        min_its: 5,
        tol: S::from(1e-12).unwrap(),
        backtrack: false,
        monotonicity_restart: false,
    }
}

enum ProxStrategy<S: Float> {
    /// No unsmoothed atoms: the proximal step is the identity.
    Smooth,
    /// A single atom with identity linear part: closed-form prox.
    Separable,
    /// Anything else: solve the prox subproblem through its stacked dual.
    /// There is no closed-form proximal operator for a sum of
    /// differently-transformed seminorms, so this path runs an inner FISTA,
    /// warm-started with the previous dual minimizer.
    Stacked {
        transform: Rc<Stacked<S>>,
        opnorm: S,
        warm: RefCell<Option<Array1<S>>>,
    },
}

/// The primal composite problem `smooth(x) + sum_i atom_i(x)`.
///
/// Coefficients and the Lipschitz estimate live here and are mutated in
/// place by whichever solver currently holds the problem.
pub struct Problem<S: Float> {
    smooth: SmoothSum<S>,
    atoms: Vec<AtomRef<S>>,
    strategy: ProxStrategy<S>,
    coefs: Array1<S>,
    lipschitz: S,
}

impl<S: Float> std::fmt::Debug for Problem<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("atoms", &self.atoms.len())
            .field("lipschitz", &self.lipschitz)
            .finish_non_exhaustive()
    }
}

impl<S: Float> Problem<S> {
    pub fn new(smooth: SmoothSum<S>, atoms: Vec<AtomRef<S>>) -> Result<Problem<S>> {
        let n = smooth.dim();
        for atom in &atoms {
            let found = atom.borrow().input_dim();
            if found != n {
                return Err(Error::DimensionMismatch { expected: n, found });
            }
        }
        let strategy = if atoms.is_empty() {
            ProxStrategy::Smooth
        } else if atoms.len() == 1 && atoms[0].borrow().has_closed_form_prox() {
            ProxStrategy::Separable
        } else {
            let maps = atoms.iter().map(|a| a.borrow().transform().clone()).collect();
            let transform = Rc::new(Stacked::new(n, maps)?);
            let opnorm = S::from(1.05).unwrap() * power_iteration(&*transform, 50);
            ProxStrategy::Stacked {
                transform,
                opnorm,
                warm: RefCell::new(None),
            }
        };
        let lipschitz = smooth.lipschitz().max(S::epsilon());
        Ok(Problem {
            smooth,
            atoms,
            strategy,
            coefs: Array1::zeros(n),
            lipschitz,
        })
    }

    pub fn dim(&self) -> usize {
        self.smooth.dim()
    }

    /// Reset coefficients to the origin (fits otherwise warm-start from the
    /// previous solution).
    pub fn reset(&mut self) {
        self.coefs.fill(S::zero());
    }
}

impl<S: Float> Composite<S> for Problem<S> {
    fn coefs(&self) -> ArrayView1<S> {
        self.coefs.view()
    }

    fn set_coefs(&mut self, x: ArrayView1<S>) {
        self.coefs.assign(&x);
    }

    fn lipschitz(&self) -> S {
        self.lipschitz
    }

    fn set_lipschitz(&mut self, lip: S) {
        self.lipschitz = lip;
    }

    fn smooth_objective(&self, x: ArrayView1<S>) -> S {
        self.smooth.value(x)
    }

    fn gradient(&self, x: ArrayView1<S>) -> Array1<S> {
        self.smooth.gradient(x)
    }

    fn nonsmooth_objective(&self, x: ArrayView1<S>) -> S {
        self.atoms
            .iter()
            .map(|a| a.borrow().nonsmooth_objective(x))
            .sum()
    }

    fn proximal_step(&mut self, z: ArrayView1<S>, t: S) -> Result<Array1<S>> {
        match &self.strategy {
            ProxStrategy::Smooth => Ok(z.to_owned()),
            ProxStrategy::Separable => Ok(self.atoms[0].borrow().proximal(z, t)),
            ProxStrategy::Stacked {
                transform,
                opnorm,
                warm,
            } => {
                // dual of the prox subproblem: the conjugate of
                // (1/(2t))||x - z||^2 is itself a quadratic, so the inner
                // problem has separable ball projections as its prox
                let proxq = l2normsq(z.len(), S::one()).shifted(z, S::one() / t);
                let conj = proxq.conjugate().ok_or(Error::ConjugateUnavailable)?;
                let mut dual = DualProblem::from_parts(
                    conj,
                    Rc::clone(transform),
                    &self.atoms,
                    *opnorm * t,
                )?;
                if let Some(u) = &*warm.borrow() {
                    dual.set_coefs(u.view());
                }
                let result = Fista::new(&mut dual).fit(&inner_fit_options())?;
                log::debug!(
                    "prox fallback: inner dual solve took {} iterations",
                    result.iterations
                );
                *warm.borrow_mut() = Some(dual.coefs().to_owned());
                Ok(dual.primal())
            }
        }
    }
}

/// The Fenchel dual `min_u  L*(-D^T u) - <u, b> + sum_i f*_i(u_i)` over the
/// stacked dual vector `u`, one block per atom.
///
/// Conjugate atoms of penalties are ball indicators, so the proximal step is
/// a separable projection; conjugates of constraints are support functions
/// with their own closed-form prox.
pub struct DualProblem<S: Float> {
    conj: Box<dyn SmoothFunction<S>>,
    transform: Rc<Stacked<S>>,
    shift: Array1<S>,
    blocks: Vec<(Range<usize>, Atom<S>)>,
    coefs: Array1<S>,
    lipschitz: S,
}

impl<S: Float> std::fmt::Debug for DualProblem<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualProblem")
            .field("blocks", &self.blocks.len())
            .field("lipschitz", &self.lipschitz)
            .finish_non_exhaustive()
    }
}

impl<S: Float> DualProblem<S> {
    pub(crate) fn from_parts(
        conj: Box<dyn SmoothFunction<S>>,
        transform: Rc<Stacked<S>>,
        atoms: &[AtomRef<S>],
        lipschitz: S,
    ) -> Result<DualProblem<S>> {
        if conj.dim() != transform.cols() {
            return Err(Error::DimensionMismatch {
                expected: transform.cols(),
                found: conj.dim(),
            });
        }
        let blocks = atoms
            .iter()
            .enumerate()
            .map(|(i, a)| (transform.range(i), a.borrow().conjugate()))
            .collect();
        let shift = transform.shift_vector();
        let m = transform.rows();
        Ok(DualProblem {
            conj,
            transform,
            shift,
            blocks,
            coefs: Array1::zeros(m),
            lipschitz: lipschitz.max(S::epsilon()),
        })
    }

    /// `-D^T u`, the point the loss conjugate is evaluated at.
    fn negative_adjoint(&self, u: ArrayView1<S>) -> Array1<S> {
        self.transform.apply_adjoint(u).mapv(|v| -v)
    }

    /// Recover the primal point from the current dual coefficients via the
    /// stationarity relation `x = grad L*(-D^T u)`. Exact only up to the
    /// conjugate's own approximation error.
    pub fn primal(&self) -> Array1<S> {
        let v = self.negative_adjoint(self.coefs.view());
        self.conj.gradient(v.view())
    }
}

impl<S: Float> Composite<S> for DualProblem<S> {
    fn coefs(&self) -> ArrayView1<S> {
        self.coefs.view()
    }

    fn set_coefs(&mut self, u: ArrayView1<S>) {
        self.coefs.assign(&u);
    }

    fn lipschitz(&self) -> S {
        self.lipschitz
    }

    fn set_lipschitz(&mut self, lip: S) {
        self.lipschitz = lip;
    }

    fn smooth_objective(&self, u: ArrayView1<S>) -> S {
        let v = self.negative_adjoint(u);
        self.conj.value(v.view()) - u.dot(&self.shift)
    }

    fn gradient(&self, u: ArrayView1<S>) -> Array1<S> {
        let v = self.negative_adjoint(u);
        let g = self.conj.gradient(v.view());
        let mut out = self.transform.apply(g.view()).mapv(|w| -w);
        out -= &self.shift;
        out
    }

    fn nonsmooth_objective(&self, u: ArrayView1<S>) -> S {
        self.blocks
            .iter()
            .map(|(range, atom)| atom.nonsmooth_objective(u.slice(s![range.clone()])))
            .sum()
    }

    fn proximal_step(&mut self, z: ArrayView1<S>, t: S) -> Result<Array1<S>> {
        let mut out = Array1::zeros(z.len());
        for (range, atom) in &self.blocks {
            let block = atom.proximal(z.slice(s![range.clone()]), t);
            out.slice_mut(s![range.clone()]).assign(&block);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::{l1norm, soft_threshold};
    use crate::smooth::signal_approximator;
    use approx::assert_abs_diff_eq;

    fn lasso_problem(y: Array1<f64>, weight: f64) -> Problem<f64> {
        let smooth = SmoothSum::new(Rc::new(signal_approximator(y.view())));
        Problem::new(smooth, vec![l1norm(y.len(), weight).shared()]).unwrap()
    }

    #[test]
    fn separable_prox_is_soft_thresholding() {
        let y = array![1., -3., 0.2];
        let mut p = lasso_problem(y, 2.0);
        let z = array![3., -1., 0.5];
        let out = p.proximal_step(z.view(), 0.5).unwrap();
        assert_abs_diff_eq!(out, soft_threshold(z.view(), 1.0), epsilon = 1e-12);
    }

    #[test]
    fn stacked_fallback_matches_closed_form() {
        // two atoms forces the dual fallback; with the second atom's weight
        // at zero it must agree with the single-atom closed form
        let y = array![1., -3., 0.2, 4.];
        let n = y.len();
        let smooth = SmoothSum::new(Rc::new(signal_approximator(y.view())));
        let atoms = vec![l1norm(n, 2.0).shared(), l1norm(n, 0.0).shared()];
        let mut p = Problem::new(smooth, atoms).unwrap();
        let z = array![3., -1., 0.5, -4.];
        let t = 0.5;
        let out = p.proximal_step(z.view(), t).unwrap();
        assert_abs_diff_eq!(out, soft_threshold(z.view(), t * 2.0), epsilon = 1e-5);
    }

    #[test]
    fn problem_objective_combines_parts() {
        let y = array![1., 0.];
        let p = lasso_problem(y, 0.5);
        let x = array![1., -2.];
        // smooth: 0.5 * (0 + 4) = 2; nonsmooth: 0.5 * 3 = 1.5
        assert_abs_diff_eq!(p.objective(x.view()), 3.5);
    }

    #[test]
    fn rejects_atom_dimension_mismatch() {
        let smooth = SmoothSum::<f64>::new(Rc::new(signal_approximator(array![1., 2.].view())));
        let err = Problem::new(smooth, vec![l1norm(3, 1.0).shared()]).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }
}

//! Moreau-Yosida smoothing
//!
//! Two uses of the same regularization: [`SmoothedSeminorm`] replaces a
//! non-smooth atom by its Moreau envelope so a gradient-only solver can run
//! on a fully smoothed objective, and [`SmoothedConjugate`] stands in for a
//! loss conjugate that has no closed form. Both trade exactness for a
//! gradient whose Lipschitz constant scales as `O(1/epsilon)`.

use std::cell::RefCell;
use std::rc::Rc;

use ndarray::prelude::*;

use super::SmoothFunction;
use crate::atoms::AtomRef;
use crate::error::{Error, Result};
use crate::linop::power_iteration;
use crate::Float;

/// The Moreau envelope of a seminorm atom with parameter `epsilon`.
///
/// For a penalty atom `w ||D x + b||` the envelope is evaluated through the
/// dual ball: `sup { <u, Dx+b> - (eps/2)||u||^2 : ||u||_dual <= w }`, whose
/// maximizer is a ball projection. For a constraint atom the envelope of the
/// indicator is the scaled squared distance `||z - P(z)||^2 / (2 eps)`.
/// Either way the gradient is `D^T u` with `u` the dual maximizer, Lipschitz
/// with constant `||D||^2 / epsilon`.
pub struct SmoothedSeminorm<S: Float> {
    atom: AtomRef<S>,
    epsilon: S,
    opnorm: S,
}

/// Smooth a shared atom with parameter `epsilon > 0`.
pub fn smoothed_seminorm<S: Float>(atom: AtomRef<S>, epsilon: S) -> Result<SmoothedSeminorm<S>> {
    SmoothedSeminorm::new(atom, epsilon)
}

impl<S: Float> SmoothedSeminorm<S> {
    pub fn new(atom: AtomRef<S>, epsilon: S) -> Result<SmoothedSeminorm<S>> {
        if epsilon <= S::zero() {
            return Err(Error::NonPositiveEpsilon);
        }
        let opnorm = {
            let a = atom.borrow();
            if a.transform().is_identity() {
                S::one()
            } else {
                S::from(1.05).unwrap() * power_iteration(a.transform().linear_part().as_ref(), 50)
            }
        };
        Ok(SmoothedSeminorm {
            atom,
            epsilon,
            opnorm,
        })
    }

    /// Dual maximizer and envelope value at `z = D x + b`.
    fn envelope(&self, z: ArrayView1<S>) -> (Array1<S>, S) {
        let half = S::from(0.5).unwrap();
        let a = self.atom.borrow();
        if a.constraint {
            let p = a.family().project(z, a.weight);
            let u = (&z - &p).mapv(|v| v / self.epsilon);
            let value = self.epsilon * half * u.dot(&u);
            (u, value)
        } else {
            let scaled = z.mapv(|v| v / self.epsilon);
            let u = a.family().dual().project(scaled.view(), a.weight);
            let value = u.dot(&z) - self.epsilon * half * u.dot(&u);
            (u, value)
        }
    }
}

impl<S: Float> SmoothFunction<S> for SmoothedSeminorm<S> {
    fn dim(&self) -> usize {
        self.atom.borrow().input_dim()
    }

    fn value(&self, x: ArrayView1<S>) -> S {
        let z = self.atom.borrow().transform().forward(x);
        self.envelope(z.view()).1
    }

    fn gradient(&self, x: ArrayView1<S>) -> Array1<S> {
        let z = self.atom.borrow().transform().forward(x);
        let (u, _) = self.envelope(z.view());
        self.atom.borrow().transform().adjoint(u.view())
    }

    fn lipschitz(&self) -> S {
        self.opnorm / self.epsilon
    }
}

const CONJUGATE_MAX_INNER: usize = 2000;
const CONJUGATE_TOL: f64 = 1e-10;

/// Generic smoothed conjugate `L*_eps` of an arbitrary smooth loss:
///
/// `L*_eps(v) = sup_x <x, v> - L(x) - (eps/2)||x||^2`
///
/// The supremum is strongly concave, so it is computed by an accelerated
/// inner ascent, warm-started from the previous evaluation point. The
/// gradient of the smoothed conjugate is the inner maximizer itself, with
/// Lipschitz constant `1/eps`.
pub struct SmoothedConjugate<S: Float> {
    loss: Rc<dyn SmoothFunction<S>>,
    epsilon: S,
    cache: RefCell<Option<(Array1<S>, Array1<S>)>>,
}

impl<S: Float> SmoothedConjugate<S> {
    pub fn new(loss: Rc<dyn SmoothFunction<S>>, epsilon: S) -> Result<SmoothedConjugate<S>> {
        if epsilon <= S::zero() {
            return Err(Error::NonPositiveEpsilon);
        }
        Ok(SmoothedConjugate {
            loss,
            epsilon,
            cache: RefCell::new(None),
        })
    }

    /// Maximize `<x, v> - L(x) - (eps/2)||x||^2` over `x`.
    fn maximizer(&self, v: ArrayView1<S>) -> Array1<S> {
        if let Some((cached_v, cached_x)) = &*self.cache.borrow() {
            if cached_v == &v {
                return cached_x.clone();
            }
        }

        let eps = self.epsilon;
        let lip = self.loss.lipschitz() + eps;
        let step = S::one() / lip;
        // constant momentum for the strongly concave case
        let two = S::from(2.).unwrap();
        let four = S::from(4.).unwrap();
        let eight = S::from(8.).unwrap();
        let q = eps / lip;
        let beta = (two + q - (q.powi(2) + eight * q).sqrt()).powi(2) / four / (S::one() - q);

        let mut x = match &*self.cache.borrow() {
            Some((_, cached_x)) => cached_x.clone(),
            None => Array1::zeros(self.loss.dim()),
        };
        let mut y = x.clone();
        let tol = S::from(CONJUGATE_TOL).unwrap()
            * (S::one() + v.iter().fold(S::zero(), |m, c| m.max(c.abs())));
        for it in 0..CONJUGATE_MAX_INNER {
            let mut g = &v - &self.loss.gradient(y.view());
            g.scaled_add(-eps, &y);
            let x_new = &y + &g.mapv(|c| c * step);
            let sup = g.iter().fold(S::zero(), |m, c| m.max(c.abs()));
            y = &x_new + &((&x_new - &x) * beta);
            x = x_new;
            if sup <= tol {
                log::trace!("smoothed conjugate converged after {} inner steps", it + 1);
                break;
            }
        }
        *self.cache.borrow_mut() = Some((v.to_owned(), x.clone()));
        x
    }
}

impl<S: Float> SmoothFunction<S> for SmoothedConjugate<S> {
    fn dim(&self) -> usize {
        self.loss.dim()
    }

    fn value(&self, v: ArrayView1<S>) -> S {
        let x = self.maximizer(v);
        let half = S::from(0.5).unwrap();
        v.dot(&x) - self.loss.value(x.view()) - self.epsilon * half * x.dot(&x)
    }

    fn gradient(&self, v: ArrayView1<S>) -> Array1<S> {
        self.maximizer(v)
    }

    fn lipschitz(&self) -> S {
        S::one() / self.epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::l1norm;
    use crate::smooth::signal_approximator;
    use approx::assert_abs_diff_eq;

    #[test]
    fn envelope_approaches_seminorm_as_epsilon_vanishes() {
        let atom = l1norm(3, 2.0).shared();
        let x = array![1.0_f64, -0.5, 0.];
        let exact = atom.borrow().nonsmooth_objective(x.view());
        let coarse = SmoothedSeminorm::new(atom.clone(), 1e-1).unwrap();
        let fine = SmoothedSeminorm::new(atom.clone(), 1e-4).unwrap();
        let err_coarse = (exact - coarse.value(x.view())).abs();
        let err_fine = (exact - fine.value(x.view())).abs();
        assert!(err_fine < err_coarse);
        assert_abs_diff_eq!(fine.value(x.view()), exact, epsilon = 1e-3);
    }

    #[test]
    fn envelope_gradient_is_subgradient_like() {
        // away from kinks, the smoothed gradient matches w * sign(x)
        let atom = l1norm(2, 1.5).shared();
        let smoothed = SmoothedSeminorm::new(atom, 1e-3).unwrap();
        let g = smoothed.gradient(array![2., -3.].view());
        assert_abs_diff_eq!(g, array![1.5, -1.5], epsilon = 1e-9);
    }

    #[test]
    fn constraint_envelope_is_squared_distance() {
        let atom = l1norm(2, 1.0).constrained().shared();
        let eps = 0.5;
        let smoothed = SmoothedSeminorm::new(atom, eps).unwrap();
        // feasible points have zero envelope value
        assert_abs_diff_eq!(smoothed.value(array![0.3, 0.3].view()), 0.0);
        // infeasible: dist((2,0), B_1)^2 / (2 eps) = 1 / 1 = 1
        assert_abs_diff_eq!(smoothed.value(array![2., 0.].view()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_nonpositive_epsilon() {
        let atom = l1norm::<f64>(2, 1.0).shared();
        assert!(SmoothedSeminorm::new(atom, 0.0).is_err());
    }

    #[test]
    fn smoothed_conjugate_tracks_exact_quadratic_conjugate() {
        let loss = Rc::new(signal_approximator(array![1., -2., 0.5].view()));
        let exact = loss.conjugate().unwrap();
        let smoothed = SmoothedConjugate::new(loss.clone(), 1e-4).unwrap();
        let v = array![0.3, 0.1, -0.7];
        assert_abs_diff_eq!(
            smoothed.value(v.view()),
            exact.value(v.view()),
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(
            smoothed.gradient(v.view()),
            exact.gradient(v.view()),
            epsilon = 1e-3
        );
    }

    #[test]
    fn smoothed_conjugate_error_shrinks_with_epsilon() {
        let loss = Rc::new(signal_approximator(array![1.0_f64, -2.].view()));
        let exact = loss.conjugate().unwrap();
        let v = array![0.4, -0.2];
        let coarse = SmoothedConjugate::new(loss.clone(), 1e-2).unwrap();
        let fine = SmoothedConjugate::new(loss.clone(), 1e-4).unwrap();
        let err_coarse = (coarse.value(v.view()) - exact.value(v.view())).abs();
        let err_fine = (fine.value(v.view()) - exact.value(v.view())).abs();
        assert!(err_fine < err_coarse);
    }
}

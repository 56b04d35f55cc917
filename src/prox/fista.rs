//! Fast Iterative Shrinking/Thresholding Algorithm

use std::marker::PhantomData;

use ndarray::prelude::*;
use num_traits::ToPrimitive;

use crate::error::{Error, Result};
use crate::problem::Composite;
use crate::prox::{FitOptions, FitResult, SolveStatus};
use crate::Float;

/// How many times one iteration may double the Lipschitz estimate before
/// backtracking gives up.
const MAX_BACKTRACK: usize = 64;

/// Accelerated proximal-gradient solver over any [`Composite`] problem.
///
/// Each iteration takes a gradient step from an extrapolated point (the
/// standard `(theta_k - 1)/theta_{k+1}` momentum sequence) and applies the
/// problem's proximal operator at step size `1/L`; for a fully smoothed
/// problem the proximal step is the identity and this reduces to an
/// accelerated gradient method. The final coefficients are written back
/// into the problem, so repeated fits warm-start from the previous
/// solution.
pub struct Fista<'a, S: Float, P: Composite<S>> {
    problem: &'a mut P,
    marker: PhantomData<S>,
}

impl<'a, S: Float, P: Composite<S>> Fista<'a, S, P> {
    pub fn new(problem: &'a mut P) -> Fista<'a, S, P> {
        Fista {
            problem,
            marker: PhantomData,
        }
    }

    pub fn fit(&mut self, opts: &FitOptions<S>) -> Result<FitResult<S>> {
        let one = S::one();
        let two = S::from(2.).unwrap();
        let four = S::from(4.).unwrap();

        let p = &mut *self.problem;
        let mut x = p.coefs().to_owned();
        let mut y = x.clone();
        let mut theta = one;

        let mut f_prev = p.objective(x.view());
        let mut trace = Vec::with_capacity(opts.max_its + 1);
        trace.push(f_prev);

        let mut status = SolveStatus::MaxIterationsReached;
        let mut iterations = 0;

        for it in 1..=opts.max_its {
            iterations = it;

            let (mut x_new, mut f_new) = prox_gradient_step(p, y.view(), opts)?;
            if opts.monotonicity_restart && f_new > f_prev {
                if theta > one {
                    // accelerated methods can overshoot on non-strongly
                    // convex objectives: drop the momentum and retry from
                    // the last accepted iterate
                    log::debug!("objective rose at iteration {}; restarting momentum", it);
                    theta = one;
                    let retried = prox_gradient_step(p, x.view(), opts)?;
                    x_new = retried.0;
                    f_new = retried.1;
                }
                if f_new > f_prev {
                    // the plain step rose too (fixed L below the true
                    // Lipschitz constant): reject it to keep the trace
                    // non-increasing
                    x_new = x.clone();
                    f_new = f_prev;
                }
            }

            let theta_new = (one + (four * theta * theta + one).sqrt()) / two;
            let beta = (theta - one) / theta_new;
            y = &x_new + &((&x_new - &x) * beta);
            theta = theta_new;
            x = x_new;
            trace.push(f_new);
            log::debug!(
                "fista iteration {}: objective {:e}, L {:e}",
                it,
                f_new,
                p.lipschitz()
            );

            let delta = (f_prev - f_new).abs();
            let converged = if f_prev == S::zero() {
                delta <= opts.tol
            } else {
                delta / f_prev.abs() <= opts.tol
            };
            f_prev = f_new;
            if converged && it >= opts.min_its {
                status = SolveStatus::Converged;
                break;
            }
        }

        p.set_coefs(x.view());
        Ok(FitResult {
            status,
            iterations,
            objective: trace,
        })
    }
}

/// One proximal-gradient step from `y`, backtracking on the Lipschitz
/// estimate when requested. Returns the new point and its full objective.
fn prox_gradient_step<S: Float, P: Composite<S>>(
    p: &mut P,
    y: ArrayView1<S>,
    opts: &FitOptions<S>,
) -> Result<(Array1<S>, S)> {
    let one = S::one();
    let half = S::from(0.5).unwrap();
    let grad = p.gradient(y);
    let fy = p.smooth_objective(y);
    let mut lip = p.lipschitz();

    for _ in 0..MAX_BACKTRACK {
        let step = one / lip;
        let z = &y - &grad.mapv(|g| g * step);
        let x = p.proximal_step(z.view(), step)?;
        if !opts.backtrack {
            p.set_lipschitz(lip);
            let f = p.objective(x.view());
            return Ok((x, f));
        }

        // descent-sufficiency test for the smooth part
        let diff = &x - &y;
        let quad = fy + grad.dot(&diff) + lip * half * diff.dot(&diff);
        let fx = p.smooth_objective(x.view());
        let slack = S::from(10.).unwrap() * S::epsilon() * (one + quad.abs());
        if fx <= quad + slack {
            p.set_lipschitz(lip);
            let f = fx + p.nonsmooth_objective(x.view());
            return Ok((x, f));
        }
        lip = lip * S::from(2.).unwrap();
        log::trace!("backtracking: raising L to {:e}", lip);
    }
    Err(Error::BacktrackExhausted {
        lipschitz: lip.to_f64().unwrap_or(f64::NAN),
    })
}

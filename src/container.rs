//! Containers: a loss plus an ordered collection of seminorm atoms
//!
//! The container is the user-facing assembly point. It builds the primal
//! [`Problem`](crate::problem::Problem), a fully smoothed variant for
//! gradient-only runs, and the Fenchel-dual
//! [`DualProblem`](crate::problem::DualProblem) with either an exact or a
//! Moreau-smoothed loss conjugate.

use std::rc::Rc;

use ndarray::prelude::*;

use crate::affine::Stacked;
use crate::atoms::AtomRef;
use crate::error::{Error, Result};
use crate::linop::power_iteration;
use crate::problem::{DualProblem, Problem};
use crate::smooth::{SmoothFunction, SmoothSum, SmoothedConjugate};
use crate::Float;

/// An ordered collection of shared atoms around a smooth loss.
///
/// The atom sequence is fixed at construction; atoms themselves stay
/// mutable through their shared handles (weight and constraint flag), so
/// the same container can be solved in Lagrange form, re-weighted, or
/// flipped to constraint form without rebuilding.
pub struct Container<S: Float> {
    loss: Rc<dyn SmoothFunction<S>>,
    atoms: Vec<AtomRef<S>>,
}

impl<S: Float> std::fmt::Debug for Container<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("atoms", &self.atoms.len())
            .finish_non_exhaustive()
    }
}

/// Assemble a container from a loss and atoms.
pub fn container<S: Float>(
    loss: Rc<dyn SmoothFunction<S>>,
    atoms: Vec<AtomRef<S>>,
) -> Result<Container<S>> {
    Container::new(loss, atoms)
}

impl<S: Float> Container<S> {
    pub fn new(loss: Rc<dyn SmoothFunction<S>>, atoms: Vec<AtomRef<S>>) -> Result<Container<S>> {
        let n = loss.dim();
        for atom in &atoms {
            let found = atom.borrow().input_dim();
            if found != n {
                return Err(Error::DimensionMismatch { expected: n, found });
            }
        }
        Ok(Container { loss, atoms })
    }

    pub fn dim(&self) -> usize {
        self.loss.dim()
    }

    pub fn loss(&self) -> &Rc<dyn SmoothFunction<S>> {
        &self.loss
    }

    pub fn atoms(&self) -> &[AtomRef<S>] {
        &self.atoms
    }

    /// The primal problem: minimize the loss plus every penalty atom,
    /// subject to every constraint atom. With a single identity-map atom
    /// the proximal step is closed form; any other combination runs the
    /// documented two-loop fallback inside
    /// [`proximal_step`](crate::problem::Composite::proximal_step).
    pub fn problem(&self) -> Result<Problem<S>> {
        let smooth = SmoothSum::new(Rc::clone(&self.loss));
        Problem::new(smooth, self.atoms.clone())
    }

    /// A variant with every penalty atom replaced by its Moreau envelope
    /// with parameter `epsilon`, so the objective is fully differentiable
    /// apart from constraint atoms (which stay proximal). Useful as the
    /// first stage of a smooth-then-refine strategy.
    pub fn smoothed_problem(&self, epsilon: S) -> Result<Problem<S>> {
        let mut smooth = SmoothSum::new(Rc::clone(&self.loss));
        let mut proximal = Vec::new();
        for atom in &self.atoms {
            if atom.borrow().constraint {
                proximal.push(Rc::clone(atom));
            } else {
                smooth.add_seminorm(Rc::clone(atom), epsilon)?;
            }
        }
        Problem::new(smooth, proximal)
    }

    /// The exact conjugate of the loss, when it has one in closed form.
    pub fn exact_conjugate(&self) -> Option<Box<dyn SmoothFunction<S>>> {
        self.loss.conjugate()
    }

    /// Build the Fenchel-dual problem over the stacked dual variables.
    ///
    /// A supplied `true_conjugate` is used directly; otherwise the generic
    /// Moreau-smoothed conjugate with parameter `epsilon` is constructed
    /// (the default path, exact only as `epsilon` tends to zero). With
    /// neither available the dual cannot be formed.
    pub fn conjugate_problem(
        &self,
        true_conjugate: Option<Box<dyn SmoothFunction<S>>>,
        epsilon: Option<S>,
    ) -> Result<DualProblem<S>> {
        let n = self.dim();
        let conj: Box<dyn SmoothFunction<S>> = match true_conjugate {
            Some(c) => {
                if c.dim() != n {
                    return Err(Error::DimensionMismatch {
                        expected: n,
                        found: c.dim(),
                    });
                }
                c
            }
            None => match epsilon {
                Some(eps) => Box::new(SmoothedConjugate::new(Rc::clone(&self.loss), eps)?),
                None => return Err(Error::ConjugateUnavailable),
            },
        };

        let maps = self
            .atoms
            .iter()
            .map(|a| a.borrow().transform().clone())
            .collect();
        let transform = Rc::new(Stacked::new(n, maps)?);
        let opnorm = S::from(1.05).unwrap() * power_iteration(&*transform, 50);
        let lipschitz = opnorm * conj.lipschitz();
        DualProblem::from_parts(conj, transform, &self.atoms, lipschitz)
    }

    /// Recover an approximate primal solution from a solved dual problem
    /// via the stationarity relation of the Lagrangian.
    pub fn conjugate_primal_from_dual(&self, dual: &DualProblem<S>) -> Array1<S> {
        dual.primal()
    }
}

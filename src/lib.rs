//! The `ndarray-prox` crate solves regularized regression problems of the
//! form "smooth loss plus a sum of seminorm penalties", optionally subject
//! to seminorm constraints, using proximal first-order methods.
//!
//! The pieces compose the way the math does:
//! - a seminorm [`atoms::Atom`] is one non-smooth penalty with a known
//!   proximal operator, optionally pre-composed with a linear map or an
//!   affine shift, and flippable between Lagrange (penalty) and constraint
//!   (ball radius) form;
//! - a [`container::Container`] combines atoms with a loss and builds the
//!   primal problem, its Fenchel dual, and Moreau-smoothed variants;
//! - [`prox::Fista`] is an accelerated proximal-gradient solver with
//!   backtracking and monotonicity restarts, and [`prox::Blockwise`] is a
//!   coordinate-descent alternative for signal-approximation objectives.
//!
//! ```
//! use std::rc::Rc;
//! use ndarray::array;
//! use ndarray_prox::atoms::l1norm;
//! use ndarray_prox::container::container;
//! use ndarray_prox::problem::Composite;
//! use ndarray_prox::prox::{Fista, FitOptions};
//! use ndarray_prox::smooth::signal_approximator;
//!
//! let y = array![3., -0.5, 2., -4.];
//! let c = container(
//!     Rc::new(signal_approximator(y.view())),
//!     vec![l1norm(y.len(), 1.0).shared()],
//! ).unwrap();
//! let mut problem = c.problem().unwrap();
//! let result = Fista::new(&mut problem).fit(&FitOptions::default()).unwrap();
//! assert!(result.converged());
//! assert_eq!(problem.coefs().len(), 4);
//! ```

use std::iter::Sum;

use ndarray::NdFloat;

/// Scalar type driving every solver in this crate.
pub trait Float: NdFloat + Sum {}
impl Float for f32 {}
impl Float for f64 {}

pub mod affine;
pub mod atoms;
pub mod container;
pub mod error;
pub mod linop;
pub mod problem;
pub mod prox;
pub mod smooth;

pub use crate::error::{Error, Result};

//! Affine pre-composition of seminorm atoms
//!
//! An [`AffineMap`] bundles a shared linear operator with an optional shift,
//! so an atom evaluates its norm at `D x + b`. [`Stacked`] vertically stacks
//! the maps of several atoms into the single transform used by dual problems
//! and the generic proximal fallback.

use std::ops::Range;
use std::rc::Rc;

use ndarray::prelude::*;
use ndarray::s;

use crate::error::{Error, Result};
use crate::linop::{Identity, LinearMap};
use crate::Float;

/// A linear map plus optional shift, `x -> D x + b`.
///
/// The linear part is reference-counted: atoms sharing an operator (or a
/// container restacking them) never copy it.
#[derive(Clone)]
pub struct AffineMap<S: Float> {
    op: Rc<dyn LinearMap<S>>,
    shift: Option<Array1<S>>,
    identity: bool,
}

impl<S: Float> std::fmt::Debug for AffineMap<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffineMap")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl<S: Float> AffineMap<S> {
    /// The identity transform on `R^dim`.
    pub fn identity(dim: usize) -> AffineMap<S> {
        AffineMap {
            op: Rc::new(Identity::new(dim)),
            shift: None,
            identity: true,
        }
    }

    /// Wrap a linear operator, with no shift.
    pub fn linear(op: Rc<dyn LinearMap<S>>) -> AffineMap<S> {
        AffineMap {
            op,
            shift: None,
            identity: false,
        }
    }

    /// Number of rows of the linear part (the atom's argument dimension).
    pub fn rows(&self) -> usize {
        self.op.rows()
    }

    /// Number of columns of the linear part (the problem dimension).
    pub fn cols(&self) -> usize {
        self.op.cols()
    }

    /// Whether the linear part is the identity (shift may still be present).
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn linear_part(&self) -> &Rc<dyn LinearMap<S>> {
        &self.op
    }

    pub fn shift_part(&self) -> Option<ArrayView1<S>> {
        self.shift.as_ref().map(Array1::view)
    }

    /// Fold an additional shift into the transform. Shifts accumulate.
    pub fn with_shift(mut self, b: Array1<S>) -> Result<AffineMap<S>> {
        if b.len() != self.rows() {
            return Err(Error::DimensionMismatch {
                expected: self.rows(),
                found: b.len(),
            });
        }
        self.shift = match self.shift.take() {
            Some(old) => Some(old + &b),
            None => Some(b),
        };
        Ok(self)
    }

    /// `D x + b`.
    pub fn forward(&self, x: ArrayView1<S>) -> Array1<S> {
        let mut z = self.op.apply(x);
        if let Some(b) = &self.shift {
            z += b;
        }
        z
    }

    /// `D^T u` (the shift plays no role in the adjoint).
    pub fn adjoint(&self, u: ArrayView1<S>) -> Array1<S> {
        self.op.apply_adjoint(u)
    }
}

/// Vertical stack of atom transforms: `D = [D_1; ...; D_k]`, with the shifts
/// concatenated alongside. The stacked map is itself a [`LinearMap`], so the
/// usual power iteration estimates its norm.
pub struct Stacked<S: Float> {
    maps: Vec<AffineMap<S>>,
    ranges: Vec<Range<usize>>,
    input_dim: usize,
    total_rows: usize,
}

impl<S: Float> std::fmt::Debug for Stacked<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stacked")
            .field("input_dim", &self.input_dim)
            .field("total_rows", &self.total_rows)
            .finish_non_exhaustive()
    }
}

impl<S: Float> Stacked<S> {
    /// Stack transforms sharing the input dimension `input_dim`.
    pub fn new(input_dim: usize, maps: Vec<AffineMap<S>>) -> Result<Stacked<S>> {
        let mut ranges = Vec::with_capacity(maps.len());
        let mut offset = 0;
        for map in &maps {
            if map.cols() != input_dim {
                return Err(Error::DimensionMismatch {
                    expected: input_dim,
                    found: map.cols(),
                });
            }
            ranges.push(offset..offset + map.rows());
            offset += map.rows();
        }
        Ok(Stacked {
            maps,
            ranges,
            input_dim,
            total_rows: offset,
        })
    }

    pub fn blocks(&self) -> usize {
        self.maps.len()
    }

    /// Row range of block `i` within the stacked output.
    pub fn range(&self, i: usize) -> Range<usize> {
        self.ranges[i].clone()
    }

    pub fn map(&self, i: usize) -> &AffineMap<S> {
        &self.maps[i]
    }

    /// The concatenated shift vector `b` (zeros where a block has none).
    pub fn shift_vector(&self) -> Array1<S> {
        let mut b = Array1::zeros(self.total_rows);
        for (map, range) in self.maps.iter().zip(&self.ranges) {
            if let Some(shift) = map.shift_part() {
                b.slice_mut(s![range.clone()]).assign(&shift);
            }
        }
        b
    }
}

impl<S: Float> LinearMap<S> for Stacked<S> {
    fn rows(&self) -> usize {
        self.total_rows
    }

    fn cols(&self) -> usize {
        self.input_dim
    }

    fn apply(&self, x: ArrayView1<S>) -> Array1<S> {
        let mut out = Array1::zeros(self.total_rows);
        for (map, range) in self.maps.iter().zip(&self.ranges) {
            out.slice_mut(s![range.clone()])
                .assign(&map.linear_part().apply(x));
        }
        out
    }

    fn apply_adjoint(&self, u: ArrayView1<S>) -> Array1<S> {
        let mut out = Array1::zeros(self.input_dim);
        for (map, range) in self.maps.iter().zip(&self.ranges) {
            out += &map.adjoint(u.slice(s![range.clone()]));
        }
        out
    }
}

//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{ConvError, ConvResult};

/// Stores the logical dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty, ensuring every tensor has at least one axis.
    pub fn new<D: AsRef<[usize]>>(dims: D) -> Self {
        let dims = dims.as_ref();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        Shape {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> SmallVec<[usize; 4]> {
        let mut strides: SmallVec<[usize; 4]> = SmallVec::from_elem(1, self.dims.len());
        for axis in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }

    /// Converts a flat row-major offset back into per-axis coordinates.
    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        let mut coords = vec![0; self.dims.len()];
        for (axis, stride) in self.strides().iter().enumerate() {
            if *stride == 0 {
                continue;
            }
            coords[axis] = flat / stride;
            flat %= stride;
        }
        coords
    }

    /// Fails with [`ConvError::ShapeMismatch`] unless `other` matches exactly.
    pub fn ensure_same(&self, other: &Shape, context: &str) -> ConvResult<()> {
        if self != other {
            return Err(ConvError::shape(format!(
                "{context}: expected {self}, got {other}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, dim) in self.dims.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        let shape = Shape::new([2, 3, 4, 5]);
        assert_eq!(shape.strides().as_slice(), &[60, 20, 5, 1]);
        assert_eq!(shape.num_elements(), 120);
    }

    #[test]
    fn unravel_inverts_flat_offsets() {
        let shape = Shape::new([2, 3, 4]);
        assert_eq!(shape.unravel(0), vec![0, 0, 0]);
        assert_eq!(shape.unravel(23), vec![1, 2, 3]);
        assert_eq!(shape.unravel(13), vec![1, 0, 1]);
    }

    #[test]
    fn ensure_same_reports_both_shapes() {
        let err = Shape::new([1, 2])
            .ensure_same(&Shape::new([2, 1]), "output")
            .expect_err("shapes differ");
        assert_eq!(
            err.to_string(),
            "shape mismatch: output: expected [1, 2], got [2, 1]"
        );
    }

    #[test]
    #[should_panic(expected = "shape must have at least one dimension")]
    fn empty_shape_is_rejected() {
        let _ = Shape::new(Vec::<usize>::new());
    }
}

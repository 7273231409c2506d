//! Host-backed tensor used for reference data, kernel buffers and the cache.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::shape::Shape;
use crate::error::{ConvError, ConvResult};

/// Dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

impl Tensor {
    /// Constructs a tensor from raw values, validating the length against the shape.
    pub fn from_vec(shape: Shape, data: Vec<f32>) -> ConvResult<Self> {
        if data.len() != shape.num_elements() {
            return Err(ConvError::shape(format!(
                "tensor data length ({}) does not match shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Tensor { shape, data })
    }

    /// Returns a zero-initialized tensor of the requested shape.
    pub fn zeros(shape: Shape) -> Self {
        Self::full(shape, 0.0)
    }

    /// Returns a one-initialized tensor of the requested shape.
    pub fn ones(shape: Shape) -> Self {
        Self::full(shape, 1.0)
    }

    pub fn full(shape: Shape, value: f32) -> Self {
        let len = shape.num_elements();
        Tensor {
            shape,
            data: vec![value; len],
        }
    }

    /// Samples every element uniformly from `[0, 1)`.
    pub fn uniform(shape: Shape, rng: &mut impl Rng) -> Self {
        let len = shape.num_elements();
        let data = (0..len).map(|_| rng.gen::<f32>()).collect();
        Tensor { shape, data }
    }

    /// Returns the total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Reports whether the tensor contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Provides access to the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Reads one element by coordinates, returning `None` when out of range.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        let dims = self.shape.dims();
        if index.len() != dims.len() || index.iter().zip(dims).any(|(i, d)| i >= d) {
            return None;
        }
        let offset = index
            .iter()
            .zip(self.shape.strides().iter())
            .map(|(i, s)| i * s)
            .sum::<usize>();
        self.data.get(offset).copied()
    }

    /// Returns a new tensor with `f` applied to every element.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Fills the tensor with a constant value.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }
}

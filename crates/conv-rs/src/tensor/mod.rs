//! Dense host tensors shared by the reference engine, the compilers and the harness.
//!
//! Tensors are row-major `f32` buffers paired with a [`Shape`]. They are cheap to clone and
//! serializable so the harness can memoize generated reference data.

pub mod dtype;
mod host_tensor;
pub mod shape;

pub use dtype::DType;
pub use host_tensor::Tensor;
pub use shape::Shape;

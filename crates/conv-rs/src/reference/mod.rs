//! Direct-summation reference kernels.
//!
//! Everything here is a pure function of its inputs: no caching, no hidden state, so repeated
//! calls with equal tensors produce bit-identical results.

mod activation;
mod conv;
mod dilate;

pub use activation::relu;
pub use conv::{conv2d_nchw, conv2d_nchw_dilated, conv2d_output_dim, nchw_dims};
pub use dilate::{dilate, dilate_spatial};

//! Reference NCHW convolution engine and the operator compiler boundary it is verified against.
//!
//! The crate owns the portable pieces every backend and the verification harness agree on:
//! dense host tensors, convolution workloads, the direct-summation reference kernels and the
//! trait that external operator compilers implement.

pub mod backend;
pub mod error;
pub mod hashing;
pub mod reference;
pub mod tensor;
pub mod workload;

pub use backend::spec::{
    BackendError, BackendResult, CompiledKernel, ConvKernelSpec, ConvOp, OperatorCompiler,
};
pub use error::{ConvError, ConvResult};
pub use tensor::{DType, Shape, Tensor};
pub use workload::ConvWorkload;

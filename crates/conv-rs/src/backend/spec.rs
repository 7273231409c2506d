use std::fmt;

use thiserror::Error;

use crate::error::ConvResult;
use crate::tensor::{DType, Shape, Tensor};
use crate::workload::ConvWorkload;

/// Operator variants the harness asks a compiler to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvOp {
    /// Plain convolution.
    Conv2d,
    /// Convolution followed by an elementwise ReLU.
    Conv2dRelu,
}

impl ConvOp {
    /// Prefix used for generated kernel symbol names.
    pub fn prefix(self) -> &'static str {
        match self {
            ConvOp::Conv2d => "conv2d",
            ConvOp::Conv2dRelu => "relu",
        }
    }

    pub fn fuses_relu(self) -> bool {
        matches!(self, ConvOp::Conv2dRelu)
    }
}

impl fmt::Display for ConvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Symbolic description of one kernel: what to compute and the buffers it will be bound to.
///
/// The weight is bound undilated; compilers apply `workload.dilation` themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvKernelSpec {
    pub name: String,
    pub op: ConvOp,
    pub workload: ConvWorkload,
    pub dtype: DType,
    pub input_shape: Shape,
    pub weight_shape: Shape,
    pub output_shape: Shape,
}

impl ConvKernelSpec {
    pub fn new(workload: ConvWorkload, op: ConvOp) -> ConvResult<Self> {
        workload.validate()?;
        Ok(Self {
            name: workload.kernel_name(op.prefix()),
            op,
            workload,
            dtype: DType::F32,
            input_shape: workload.input_shape(),
            weight_shape: workload.weight_shape(),
            output_shape: workload.output_shape()?,
        })
    }

    /// Verifies that bound buffers have the shapes this kernel was compiled for.
    pub fn check_bindings(
        &self,
        input: &Tensor,
        weight: &Tensor,
        output: &Tensor,
    ) -> BackendResult<()> {
        for (role, expected, actual) in [
            ("input", &self.input_shape, input.shape()),
            ("weight", &self.weight_shape, weight.shape()),
            ("output", &self.output_shape, output.shape()),
        ] {
            if expected != actual {
                return Err(BackendError::execution(format!(
                    "{}: {role} buffer has shape {actual}, expected {expected}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Failures reported by an operator compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend {backend} is not available")]
    Unavailable { backend: String },
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: &'static str, reason: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
}

impl BackendError {
    pub fn unavailable(backend: impl Into<String>) -> Self {
        BackendError::Unavailable {
            backend: backend.into(),
        }
    }

    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;

/// A compiled, runnable kernel.
pub trait CompiledKernel: Send + Sync {
    fn name(&self) -> &str;

    /// Shape of the output buffer the kernel expects to be bound to.
    fn output_shape(&self) -> &Shape;

    /// Runs the kernel, overwriting every element of `output`.
    fn run(&self, input: &Tensor, weight: &Tensor, output: &mut Tensor) -> BackendResult<()>;
}

/// External operator compiler, treated as a black box by the harness.
pub trait OperatorCompiler: Send + Sync {
    /// Returns a human-readable backend identifier (e.g., `"cpu"`, `"cuda"`).
    fn backend_name(&self) -> &str;

    /// Whether the target environment exists on this machine.
    fn is_available(&self) -> bool {
        true
    }

    fn compile(&self, spec: &ConvKernelSpec) -> BackendResult<Box<dyn CompiledKernel>>;

    /// Compiles `spec`, binds a zero-initialized output of the kernel's declared shape and runs.
    fn compile_and_run(
        &self,
        spec: &ConvKernelSpec,
        input: &Tensor,
        weight: &Tensor,
    ) -> BackendResult<Tensor> {
        if !self.is_available() {
            return Err(BackendError::unavailable(self.backend_name()));
        }
        let kernel = self.compile(spec)?;
        let mut output = Tensor::zeros(kernel.output_shape().clone());
        kernel.run(input, weight, &mut output)?;
        Ok(output)
    }
}

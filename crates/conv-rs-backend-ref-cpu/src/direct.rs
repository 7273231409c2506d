//! Direct-loop convolution kernels.
//!
//! Kernels walk the undilated weight and step input indices by the dilation factor instead of
//! materializing a dilated weight. Accumulation happens in `f32`, so results differ from the
//! reference engine only by rounding.

use conv_rs::reference::nchw_dims;
use conv_rs::{
    BackendError, BackendResult, CompiledKernel, ConvKernelSpec, OperatorCompiler, Shape, Tensor,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectCpuCompiler;

impl DirectCpuCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl OperatorCompiler for DirectCpuCompiler {
    fn backend_name(&self) -> &str {
        "cpu"
    }

    fn compile(&self, spec: &ConvKernelSpec) -> BackendResult<Box<dyn CompiledKernel>> {
        let workload = spec.workload;
        if workload.stride == 0 || workload.dilation == 0 || workload.kernel_size == 0 {
            return Err(BackendError::execution(format!(
                "{}: stride, dilation and kernel size must be positive",
                spec.name
            )));
        }
        tracing::debug!(kernel = %spec.name, "compiled direct cpu kernel");
        Ok(Box::new(DirectConvKernel { spec: spec.clone() }))
    }
}

/// Compiled direct-loop kernel for one [`ConvKernelSpec`].
#[derive(Debug, Clone)]
pub struct DirectConvKernel {
    spec: ConvKernelSpec,
}

impl CompiledKernel for DirectConvKernel {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn output_shape(&self) -> &Shape {
        &self.spec.output_shape
    }

    fn run(&self, input: &Tensor, weight: &Tensor, output: &mut Tensor) -> BackendResult<()> {
        self.spec.check_bindings(input, weight, output)?;

        let dims = |shape: &Shape, what: &str| {
            nchw_dims(shape, what).map_err(|err| BackendError::execution(err.to_string()))
        };
        let [n, c_in, h, w] = dims(input.shape(), "input")?;
        let [c_out, _, k_h, k_w] = dims(weight.shape(), "weight")?;
        let [_, _, out_h, out_w] = dims(output.shape(), "output")?;

        let workload = self.spec.workload;
        let (stride, pad, dil) = (workload.stride, workload.padding, workload.dilation);
        let fuse_relu = self.spec.op.fuses_relu();
        let x = input.data();
        let wt = weight.data();
        let out = output.data_mut();

        for b in 0..n {
            for f in 0..c_out {
                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut acc = 0.0f32;
                        for c in 0..c_in {
                            let x_base = (b * c_in + c) * h * w;
                            let w_base = (f * c_in + c) * k_h * k_w;
                            for ky in 0..k_h {
                                let iy = (oy * stride + ky * dil) as isize - pad as isize;
                                if iy < 0 || iy >= h as isize {
                                    continue;
                                }
                                let row = x_base + iy as usize * w;
                                for kx in 0..k_w {
                                    let ix = (ox * stride + kx * dil) as isize - pad as isize;
                                    if ix < 0 || ix >= w as isize {
                                        continue;
                                    }
                                    acc += x[row + ix as usize] * wt[w_base + ky * k_w + kx];
                                }
                            }
                        }
                        if fuse_relu {
                            acc = acc.max(0.0);
                        }
                        out[((b * c_out + f) * out_h + oy) * out_w + ox] = acc;
                    }
                }
            }
        }
        Ok(())
    }
}

//! Operator compiler that lowers NCHW convolution to im2col followed by a faer GEMM.

use std::cell::RefCell;

use conv_rs::reference::nchw_dims;
use conv_rs::{
    BackendError, BackendResult, CompiledKernel, ConvKernelSpec, DType, OperatorCompiler, Shape,
    Tensor,
};
use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};

/// Upper bound on the im2col column tile of one GEMM call (4 MiB).
pub const DEFAULT_SCRATCH_LIMIT_BYTES: usize = 1 << 22;

thread_local! {
    static IM2COL_SCRATCH_F32: RefCell<Vec<f32>> = const { RefCell::new(Vec::new()) };
    static GEMM_TILE_F32: RefCell<Vec<f32>> = const { RefCell::new(Vec::new()) };
}

fn faer_parallelism() -> Par {
    let par = faer::get_global_parallelism();
    if par.degree() == 1 {
        Par::Seq
    } else {
        par
    }
}

/// Compiler producing [`Im2colGemmKernel`]s.
#[derive(Debug, Clone, Copy)]
pub struct FaerIm2colCompiler {
    scratch_limit_bytes: usize,
}

impl FaerIm2colCompiler {
    pub fn new() -> Self {
        Self {
            scratch_limit_bytes: DEFAULT_SCRATCH_LIMIT_BYTES,
        }
    }

    /// Caps the column tile; the output is computed in as many pixel tiles as needed.
    /// A single output pixel per tile is always allowed.
    pub fn with_scratch_limit(mut self, bytes: usize) -> Self {
        self.scratch_limit_bytes = bytes;
        self
    }
}

impl Default for FaerIm2colCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorCompiler for FaerIm2colCompiler {
    fn backend_name(&self) -> &str {
        "faer"
    }

    fn compile(&self, spec: &ConvKernelSpec) -> BackendResult<Box<dyn CompiledKernel>> {
        let geometry = Im2colGeometry::from_spec(spec, self.scratch_limit_bytes)?;
        tracing::debug!(
            kernel = %spec.name,
            rows = geometry.k,
            cols = geometry.out_hw,
            tile_cols = geometry.tile_cols,
            "compiled im2col kernel"
        );
        Ok(Box::new(Im2colGemmKernel {
            spec: spec.clone(),
            geometry,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct Im2colGeometry {
    batch: usize,
    c_in: usize,
    h: usize,
    w: usize,
    c_out: usize,
    k_h: usize,
    k_w: usize,
    out_h: usize,
    out_w: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
    /// Patch length: `c_in * k_h * k_w`.
    k: usize,
    out_hw: usize,
    /// Output pixels per GEMM call, at least 1.
    tile_cols: usize,
}

impl Im2colGeometry {
    fn from_spec(spec: &ConvKernelSpec, scratch_limit_bytes: usize) -> BackendResult<Self> {
        let dims = |shape: &Shape, what: &str| {
            nchw_dims(shape, what).map_err(|err| BackendError::execution(err.to_string()))
        };
        let [batch, c_in, h, w] = dims(&spec.input_shape, "input")?;
        let [c_out, _, k_h, k_w] = dims(&spec.weight_shape, "weight")?;
        let [_, _, out_h, out_w] = dims(&spec.output_shape, "output")?;
        let workload = spec.workload;
        if workload.stride == 0 || workload.dilation == 0 {
            return Err(BackendError::execution(format!(
                "{}: stride and dilation must be positive",
                spec.name
            )));
        }
        let k = c_in
            .checked_mul(k_h)
            .and_then(|v| v.checked_mul(k_w))
            .ok_or_else(|| BackendError::execution("im2col patch size overflow"))?;
        let out_hw = out_h
            .checked_mul(out_w)
            .ok_or_else(|| BackendError::execution("im2col output size overflow"))?;
        let limit_floats = scratch_limit_bytes / DType::F32.size_in_bytes();
        let tile_cols = (limit_floats / k.max(1)).clamp(1, out_hw.max(1));
        Ok(Self {
            batch,
            c_in,
            h,
            w,
            c_out,
            k_h,
            k_w,
            out_h,
            out_w,
            stride: workload.stride,
            padding: workload.padding,
            dilation: workload.dilation,
            k,
            out_hw,
            tile_cols,
        })
    }

    /// Fills `cols` (row-major `k x len`) with the patches of output pixels
    /// `first..first + len` of one image.
    fn fill_columns(&self, image: &[f32], first: usize, len: usize, cols: &mut [f32]) {
        let (h, w) = (self.h as isize, self.w as isize);
        let pad = self.padding as isize;
        for c in 0..self.c_in {
            let plane = &image[c * self.h * self.w..(c + 1) * self.h * self.w];
            for ky in 0..self.k_h {
                for kx in 0..self.k_w {
                    let row = (c * self.k_h + ky) * self.k_w + kx;
                    let dst = &mut cols[row * len..(row + 1) * len];
                    for (pixel, slot) in (first..first + len).zip(dst.iter_mut()) {
                        let (oy, ox) = (pixel / self.out_w, pixel % self.out_w);
                        let iy = (oy * self.stride + ky * self.dilation) as isize - pad;
                        let ix = (ox * self.stride + kx * self.dilation) as isize - pad;
                        *slot = if iy < 0 || iy >= h || ix < 0 || ix >= w {
                            0.0
                        } else {
                            plane[iy as usize * self.w + ix as usize]
                        };
                    }
                }
            }
        }
    }
}

/// Tiled im2col into thread-local scratch, then `out = W * cols` through faer one pixel tile at a time.
#[derive(Debug, Clone)]
pub struct Im2colGemmKernel {
    spec: ConvKernelSpec,
    geometry: Im2colGeometry,
}

impl CompiledKernel for Im2colGemmKernel {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn output_shape(&self) -> &Shape {
        &self.spec.output_shape
    }

    fn run(&self, input: &Tensor, weight: &Tensor, output: &mut Tensor) -> BackendResult<()> {
        self.spec.check_bindings(input, weight, output)?;
        let g = self.geometry;
        if g.k == 0 || g.out_hw == 0 || g.c_out == 0 {
            output.fill(0.0);
            return Ok(());
        }

        let image_len = g.c_in * g.h * g.w;
        let out_len = g.c_out * g.out_hw;
        let weight_view = MatRef::from_row_major_slice(weight.data(), g.c_out, g.k);
        let weight_t = weight_view.transpose();
        let par = faer_parallelism();
        let fuse_relu = self.spec.op.fuses_relu();

        IM2COL_SCRATCH_F32.with(|cols| {
            GEMM_TILE_F32.with(|tile| {
                let mut cols = cols.borrow_mut();
                let mut tile = tile.borrow_mut();
                cols.resize(g.k * g.tile_cols, 0.0);
                tile.resize(g.tile_cols * g.c_out, 0.0);

                for b in 0..g.batch {
                    let image = &input.data()[b * image_len..(b + 1) * image_len];
                    let out_image = &mut output.data_mut()[b * out_len..(b + 1) * out_len];
                    for first in (0..g.out_hw).step_by(g.tile_cols) {
                        let len = g.tile_cols.min(g.out_hw - first);
                        let cols = &mut cols[..g.k * len];
                        let tile = &mut tile[..len * g.c_out];
                        g.fill_columns(image, first, len, cols);

                        let cols_view = MatRef::from_row_major_slice(&*cols, g.k, len);
                        // tile^T = cols^T * W^T written column-major (len x c_out) holds
                        // row f of the output tile at tile[f * len..].
                        let mut tile_view = MatMut::from_column_major_slice_mut(tile, len, g.c_out);
                        matmul(
                            &mut tile_view,
                            Accum::Replace,
                            cols_view.transpose(),
                            weight_t,
                            1.0f32,
                            par,
                        );

                        for (f, src) in tile.chunks_exact(len).enumerate() {
                            let dst = &mut out_image[f * g.out_hw + first..][..len];
                            dst.copy_from_slice(src);
                            if fuse_relu {
                                for v in dst.iter_mut() {
                                    *v = v.max(0.0);
                                }
                            }
                        }
                    }
                }
            })
        });
        Ok(())
    }
}

/// Register the faer compiler with the global compiler registry under "faer".
pub fn register_faer_backend() {
    conv_rs::backend::registry::register_compiler("faer", FaerIm2colCompiler::new);
}

#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_FAER_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_faer_backend();
    }
    register
};

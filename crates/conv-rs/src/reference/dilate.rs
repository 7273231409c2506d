use smallvec::SmallVec;

use crate::error::{ConvError, ConvResult};
use crate::tensor::{Shape, Tensor};

/// Inserts `stride - 1` zeros between neighbouring elements along every axis.
///
/// `strides` carries one factor per axis. An axis of length `d` becomes `(d - 1) * s + 1` and
/// source element `i` lands at `i * s`.
pub fn dilate(tensor: &Tensor, strides: &[usize]) -> ConvResult<Tensor> {
    let src_shape = tensor.shape();
    let dims = src_shape.dims();
    if strides.len() != dims.len() {
        return Err(ConvError::invalid(format!(
            "dilate expects {} strides for shape {}, got {}",
            dims.len(),
            src_shape,
            strides.len()
        )));
    }
    if strides.iter().any(|&s| s == 0) {
        return Err(ConvError::invalid(format!(
            "dilation strides must be >= 1, got {strides:?}"
        )));
    }
    if strides.iter().all(|&s| s == 1) {
        return Ok(tensor.clone());
    }

    let out_dims: SmallVec<[usize; 4]> = dims
        .iter()
        .zip(strides)
        .map(|(&d, &s)| if d == 0 { 0 } else { (d - 1) * s + 1 })
        .collect();
    let out_shape = Shape::new(&out_dims);
    let src_strides = src_shape.strides();
    let dst_strides = out_shape.strides();

    let mut out = Tensor::zeros(out_shape);
    let dst = out.data_mut();
    for (flat, &value) in tensor.data().iter().enumerate() {
        let mut rem = flat;
        let mut offset = 0;
        for axis in 0..dims.len() {
            let idx = rem / src_strides[axis];
            rem %= src_strides[axis];
            offset += idx * strides[axis] * dst_strides[axis];
        }
        dst[offset] = value;
    }
    Ok(out)
}

/// Dilates the two spatial axes of an OIHW weight by `dilation`.
pub fn dilate_spatial(weight: &Tensor, dilation: usize) -> ConvResult<Tensor> {
    if weight.shape().rank() != 4 {
        return Err(ConvError::shape(format!(
            "dilate_spatial expects an OIHW weight, got {}",
            weight.shape()
        )));
    }
    dilate(weight, &[1, 1, dilation, dilation])
}

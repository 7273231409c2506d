use crate::error::{ConvError, ConvResult};
use crate::tensor::{Shape, Tensor};

use super::dilate_spatial;

/// Closed-form output extent: `floor((size + 2 * padding - kernel) / stride) + 1`.
pub fn conv2d_output_dim(
    size: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> ConvResult<usize> {
    if kernel == 0 {
        return Err(ConvError::invalid("conv2d kernel must be > 0"));
    }
    if stride == 0 {
        return Err(ConvError::invalid("conv2d stride must be > 0"));
    }
    let padded = padding
        .checked_mul(2)
        .and_then(|p| p.checked_add(size))
        .ok_or_else(|| ConvError::invalid("conv2d padded dimension overflow"))?;
    if padded < kernel {
        return Err(ConvError::invalid(format!(
            "conv2d kernel {kernel} exceeds padded input {padded}"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

/// Splits a rank-4 shape into its four dimensions.
pub fn nchw_dims(shape: &Shape, what: &str) -> ConvResult<[usize; 4]> {
    match *shape.dims() {
        [a, b, c, d] => Ok([a, b, c, d]),
        _ => Err(ConvError::shape(format!(
            "{what} must be rank 4, got {shape}"
        ))),
    }
}

/// Direct NCHW convolution with symmetric zero padding and no bias.
///
/// `input` is `[N, Cin, H, W]`, `weight` is `[Cout, Cin, Kh, Kw]`. Products are accumulated in
/// `f64` and rounded once per output element.
pub fn conv2d_nchw(
    input: &Tensor,
    weight: &Tensor,
    stride: usize,
    padding: usize,
) -> ConvResult<Tensor> {
    let [n, c_in, h, w] = nchw_dims(input.shape(), "conv2d input")?;
    let [c_out, w_c_in, k_h, k_w] = nchw_dims(weight.shape(), "conv2d weight")?;
    if w_c_in != c_in {
        return Err(ConvError::shape(format!(
            "conv2d weight has {w_c_in} input channels, input {} has {c_in}",
            input.shape()
        )));
    }
    let out_h = conv2d_output_dim(h, k_h, stride, padding)?;
    let out_w = conv2d_output_dim(w, k_w, stride, padding)?;

    let x = input.data();
    let wt = weight.data();
    let pad = padding as isize;
    let mut out = vec![0.0f32; n * c_out * out_h * out_w];

    for b in 0..n {
        for co in 0..c_out {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = 0.0f64;
                    for ci in 0..c_in {
                        let in_base = (b * c_in + ci) * h * w;
                        let w_base = (co * c_in + ci) * k_h * k_w;
                        for ky in 0..k_h {
                            let iy = (oy * stride + ky) as isize - pad;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            let row = in_base + iy as usize * w;
                            for kx in 0..k_w {
                                let ix = (ox * stride + kx) as isize - pad;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                acc += f64::from(x[row + ix as usize])
                                    * f64::from(wt[w_base + ky * k_w + kx]);
                            }
                        }
                    }
                    out[((b * c_out + co) * out_h + oy) * out_w + ox] = acc as f32;
                }
            }
        }
    }

    Tensor::from_vec(Shape::new([n, c_out, out_h, out_w]), out)
}

/// Dilates the weight's spatial axes, then convolves.
pub fn conv2d_nchw_dilated(
    input: &Tensor,
    weight: &Tensor,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> ConvResult<Tensor> {
    if dilation == 1 {
        return conv2d_nchw(input, weight, stride, padding);
    }
    let dilated = dilate_spatial(weight, dilation)?;
    conv2d_nchw(input, &dilated, stride, padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dim_matches_closed_form() {
        assert_eq!(conv2d_output_dim(224, 7, 2, 3).unwrap(), 112);
        assert_eq!(conv2d_output_dim(56, 1, 2, 0).unwrap(), 28);
        assert_eq!(conv2d_output_dim(4, 3, 1, 0).unwrap(), 2);
        assert_eq!(conv2d_output_dim(7, 3, 2, 1).unwrap(), 4);
    }

    #[test]
    fn output_dim_rejects_degenerate_parameters() {
        assert!(matches!(
            conv2d_output_dim(4, 0, 1, 0),
            Err(ConvError::InvalidParameter(_))
        ));
        assert!(matches!(
            conv2d_output_dim(4, 3, 0, 0),
            Err(ConvError::InvalidParameter(_))
        ));
        assert!(matches!(
            conv2d_output_dim(2, 5, 1, 1),
            Err(ConvError::InvalidParameter(_))
        ));
    }

    #[test]
    fn single_tap_kernel_scales_input() {
        let x = Tensor::from_vec(Shape::new([1, 1, 2, 2]), vec![1.0, -2.0, 3.0, 4.0]).unwrap();
        let w = Tensor::full(Shape::new([1, 1, 1, 1]), 0.5);
        let y = conv2d_nchw(&x, &w, 1, 0).unwrap();
        assert_eq!(y.data(), &[0.5, -1.0, 1.5, 2.0]);
    }

    #[test]
    fn channels_are_summed_per_filter() {
        // Two input channels of ones; filter 0 weighs them 1 and 2, filter 1 weighs -1 and 1.
        let x = Tensor::ones(Shape::new([1, 2, 3, 3]));
        let w = Tensor::from_vec(Shape::new([2, 2, 1, 1]), vec![1.0, 2.0, -1.0, 1.0]).unwrap();
        let y = conv2d_nchw(&x, &w, 2, 0).unwrap();
        assert_eq!(y.shape(), &Shape::new([1, 2, 2, 2]));
        assert_eq!(y.data(), &[3.0, 3.0, 3.0, 3.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rank_and_channel_mismatches_are_shape_errors() {
        let x = Tensor::ones(Shape::new([1, 3, 4, 4]));
        let w = Tensor::ones(Shape::new([2, 2, 3, 3]));
        assert!(matches!(
            conv2d_nchw(&x, &w, 1, 0),
            Err(ConvError::ShapeMismatch(_))
        ));
        let flat = Tensor::ones(Shape::new([3, 4, 4]));
        let w = Tensor::ones(Shape::new([2, 3, 3, 3]));
        assert!(matches!(
            conv2d_nchw(&flat, &w, 1, 0),
            Err(ConvError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn dilated_conv_matches_explicitly_dilated_weight() {
        let x = Tensor::from_vec(
            Shape::new([1, 1, 6, 6]),
            (0..36).map(|v| v as f32 * 0.25).collect(),
        )
        .unwrap();
        let w = Tensor::from_vec(
            Shape::new([1, 1, 2, 2]),
            vec![1.0, -1.0, 0.5, 2.0],
        )
        .unwrap();
        let direct = conv2d_nchw_dilated(&x, &w, 1, 1, 3).unwrap();
        let manual = conv2d_nchw(&x, &dilate_spatial(&w, 3).unwrap(), 1, 1).unwrap();
        assert_eq!(direct, manual);
        assert_eq!(direct.shape(), &Shape::new([1, 1, 5, 5]));
    }
}

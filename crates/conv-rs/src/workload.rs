//! Convolution workloads: one fully specified shape/parameter configuration per test case.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConvError, ConvResult};
use crate::reference::conv2d_output_dim;
use crate::tensor::Shape;

fn default_dilation() -> usize {
    1
}

/// Square-input, square-kernel NCHW convolution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvWorkload {
    pub batch: usize,
    pub in_channel: usize,
    /// Input height and width.
    pub in_size: usize,
    pub num_filter: usize,
    /// Kernel height and width before dilation.
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    #[serde(default = "default_dilation")]
    pub dilation: usize,
}

impl ConvWorkload {
    pub const fn new(
        batch: usize,
        in_channel: usize,
        in_size: usize,
        num_filter: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            batch,
            in_channel,
            in_size,
            num_filter,
            kernel_size,
            stride,
            padding,
            dilation: 1,
        }
    }

    pub const fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    /// Checks every field and that the dilated kernel fits the padded input.
    pub fn validate(&self) -> ConvResult<()> {
        let positive = [
            ("batch", self.batch),
            ("in_channel", self.in_channel),
            ("in_size", self.in_size),
            ("num_filter", self.num_filter),
            ("kernel_size", self.kernel_size),
            ("stride", self.stride),
            ("dilation", self.dilation),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConvError::invalid(format!(
                    "workload {self}: {name} must be > 0"
                )));
            }
        }
        self.output_size().map(|_| ())
    }

    pub fn input_shape(&self) -> Shape {
        Shape::new([self.batch, self.in_channel, self.in_size, self.in_size])
    }

    /// OIHW weight shape before dilation.
    pub fn weight_shape(&self) -> Shape {
        Shape::new([
            self.num_filter,
            self.in_channel,
            self.kernel_size,
            self.kernel_size,
        ])
    }

    /// Spatial extent of the kernel once `dilation - 1` zeros sit between taps.
    pub fn dilated_kernel_size(&self) -> ConvResult<usize> {
        self.kernel_size
            .checked_sub(1)
            .and_then(|k| k.checked_mul(self.dilation))
            .and_then(|k| k.checked_add(1))
            .ok_or_else(|| {
                ConvError::invalid(format!("workload {self}: invalid dilated kernel size"))
            })
    }

    pub fn dilated_weight_shape(&self) -> ConvResult<Shape> {
        let k = self.dilated_kernel_size()?;
        Ok(Shape::new([self.num_filter, self.in_channel, k, k]))
    }

    /// Output height and width.
    pub fn output_size(&self) -> ConvResult<usize> {
        conv2d_output_dim(
            self.in_size,
            self.dilated_kernel_size()?,
            self.stride,
            self.padding,
        )
    }

    pub fn output_shape(&self) -> ConvResult<Shape> {
        let out = self.output_size()?;
        Ok(Shape::new([self.batch, self.num_filter, out, out]))
    }

    /// Multiply-accumulate count of the dilated convolution, padded taps included.
    pub fn macs(&self) -> ConvResult<u64> {
        let out = self.output_size()? as u64;
        let kernel = self.kernel_size as u64;
        [
            self.batch as u64,
            self.num_filter as u64,
            out,
            out,
            self.in_channel as u64,
            kernel,
            kernel,
        ]
        .into_iter()
        .try_fold(1u64, u64::checked_mul)
        .ok_or_else(|| ConvError::invalid(format!("workload {self}: MAC count overflows u64")))
    }

    /// Kernel symbol name, e.g. `conv2d_1_3_224_64_7_2_3_1`.
    pub fn kernel_name(&self, prefix: &str) -> String {
        format!(
            "{prefix}_{}_{}_{}_{}_{}_{}_{}_{}",
            self.batch,
            self.in_channel,
            self.in_size,
            self.num_filter,
            self.kernel_size,
            self.stride,
            self.padding,
            self.dilation
        )
    }
}

impl fmt::Display for ConvWorkload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {}, {}, {})",
            self.batch,
            self.in_channel,
            self.in_size,
            self.num_filter,
            self.kernel_size,
            self.stride,
            self.padding,
            self.dilation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resnet_stem_output_shape() {
        let w = ConvWorkload::new(1, 3, 224, 64, 7, 2, 3);
        assert_eq!(w.output_shape().unwrap(), Shape::new([1, 64, 112, 112]));
        assert_eq!(w.weight_shape(), Shape::new([64, 3, 7, 7]));
    }

    #[test]
    fn dilation_grows_effective_kernel() {
        let w = ConvWorkload::new(1, 128, 122, 128, 3, 1, 1).with_dilation(2);
        assert_eq!(w.dilated_kernel_size().unwrap(), 5);
        assert_eq!(w.output_size().unwrap(), 120);
        assert_eq!(w.dilated_weight_shape().unwrap(), Shape::new([128, 128, 5, 5]));
    }

    #[test]
    fn zero_fields_are_invalid() {
        let w = ConvWorkload::new(1, 3, 8, 4, 3, 0, 1);
        assert!(matches!(w.validate(), Err(ConvError::InvalidParameter(_))));
        let w = ConvWorkload::new(1, 3, 8, 4, 3, 1, 1).with_dilation(0);
        assert!(matches!(w.validate(), Err(ConvError::InvalidParameter(_))));
    }

    #[test]
    fn kernel_larger_than_padded_input_is_invalid() {
        let w = ConvWorkload::new(1, 1, 2, 1, 5, 1, 1);
        assert!(matches!(w.validate(), Err(ConvError::InvalidParameter(_))));
    }

    #[test]
    fn display_and_kernel_names_list_every_field() {
        let w = ConvWorkload::new(1, 64, 56, 128, 3, 2, 1);
        assert_eq!(w.to_string(), "(1, 64, 56, 128, 3, 2, 1, 1)");
        assert_eq!(w.kernel_name("relu"), "relu_1_64_56_128_3_2_1_1");
    }

    #[test]
    fn dilation_defaults_to_one_when_deserializing() {
        let w: ConvWorkload = serde_json::from_str(
            r#"{"batch":1,"in_channel":1,"in_size":4,"num_filter":1,"kernel_size":3,"stride":1,"padding":0}"#,
        )
        .unwrap();
        assert_eq!(w.dilation, 1);
    }

    #[test]
    fn macs_count_every_tap() {
        let w = ConvWorkload::new(1, 3, 224, 64, 7, 2, 3);
        assert_eq!(w.macs().unwrap(), 64 * 112 * 112 * 3 * 7 * 7);
        let dilated = ConvWorkload::new(1, 2, 9, 4, 3, 1, 0).with_dilation(2);
        assert_eq!(dilated.macs().unwrap(), 4 * 5 * 5 * 2 * 3 * 3);
    }

    #[test]
    fn macs_overflow_is_an_error() {
        let w = ConvWorkload::new(usize::MAX, 1, 1, 2, 1, 1, 0);
        assert!(matches!(w.macs(), Err(ConvError::InvalidParameter(_))));
    }
}

//! Elementwise relative-tolerance comparison.

use conv_rs::{ConvError, ConvResult, Tensor};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RTOL: f64 = 1e-5;

/// Relative tolerance applied as `|actual - expected| <= rtol * max(1, |expected|)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    pub relative_tolerance: f64,
}

impl Default for ToleranceSpec {
    fn default() -> Self {
        Self {
            relative_tolerance: DEFAULT_RTOL,
        }
    }
}

impl ToleranceSpec {
    pub fn new(relative_tolerance: f64) -> Self {
        Self { relative_tolerance }
    }

    pub fn threshold(&self, expected: f32) -> f64 {
        self.relative_tolerance * f64::from(expected).abs().max(1.0)
    }

    /// NaN on either side never passes.
    pub fn accepts(&self, actual: f32, expected: f32) -> bool {
        let diff = (f64::from(actual) - f64::from(expected)).abs();
        diff <= self.threshold(expected)
    }
}

/// Compares `actual` against `expected`, shape first, then every element.
///
/// Fails with [`ConvError::ToleranceExceeded`] at the first offending element.
pub fn assert_close(actual: &Tensor, expected: &Tensor, tolerance: ToleranceSpec) -> ConvResult<()> {
    expected
        .shape()
        .ensure_same(actual.shape(), "candidate output")?;

    let offending = actual
        .data()
        .iter()
        .zip(expected.data())
        .position(|(&a, &e)| !tolerance.accepts(a, e));

    match offending {
        None => Ok(()),
        Some(index) => {
            let actual_value = actual.data()[index];
            let expected_value = expected.data()[index];
            Err(ConvError::ToleranceExceeded {
                index,
                coords: expected.shape().unravel(index),
                expected: expected_value,
                actual: actual_value,
                diff: (f64::from(actual_value) - f64::from(expected_value)).abs(),
                threshold: tolerance.threshold(expected_value),
                rtol: tolerance.relative_tolerance,
            })
        }
    }
}

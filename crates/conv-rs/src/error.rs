//! Error taxonomy shared by the reference engine, compilers and the verification harness.

use thiserror::Error;

use crate::backend::spec::BackendError;

/// Failures raised while building, running or comparing a convolution workload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvError {
    /// Malformed workload or operator parameters (zero stride, empty kernel, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Two stages disagree about a tensor shape.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// A candidate element is outside the relative tolerance of the reference.
    #[error(
        "tolerance exceeded at index {index} {coords:?}: expected {expected}, actual {actual}, \
         diff {diff}, threshold {threshold} (rtol {rtol})"
    )]
    ToleranceExceeded {
        index: usize,
        coords: Vec<usize>,
        expected: f32,
        actual: f32,
        diff: f64,
        threshold: f64,
        rtol: f64,
    },
    /// The requested backend is not enabled in this environment.
    #[error("backend {backend} is not enabled")]
    BackendUnavailable { backend: String },
    /// A compiler failed for a reason other than being unavailable.
    #[error(transparent)]
    Backend(BackendError),
    #[error("reference cache failure: {0}")]
    Cache(String),
    /// Every configured backend was skipped for a workload.
    #[error("no backend executed workload {workload}")]
    NoBackendExecuted { workload: String },
}

impl ConvError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConvError::InvalidParameter(message.into())
    }

    pub fn shape(message: impl Into<String>) -> Self {
        ConvError::ShapeMismatch(message.into())
    }

    pub fn cache(message: impl Into<String>) -> Self {
        ConvError::Cache(message.into())
    }

    /// Returns `true` for the only non-fatal kind: a backend that is not enabled.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ConvError::BackendUnavailable { .. })
    }
}

impl From<BackendError> for ConvError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { backend } => ConvError::BackendUnavailable { backend },
            other => ConvError::Backend(other),
        }
    }
}

/// Convenience alias for results produced by the reference engine and the harness.
pub type ConvResult<T> = Result<T, ConvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_backend_maps_to_skip_kind() {
        let err = ConvError::from(BackendError::unavailable("cuda"));
        assert!(err.is_unavailable());
        assert_eq!(err.to_string(), "backend cuda is not enabled");
    }

    #[test]
    fn execution_failure_stays_fatal() {
        let err = ConvError::from(BackendError::execution("kernel crashed"));
        assert!(!err.is_unavailable());
        assert!(matches!(err, ConvError::Backend(BackendError::Execution { .. })));
    }
}

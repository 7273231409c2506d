//! Numerical verification harness for convolution operator compilers.
//!
//! Reference data is generated deterministically, optionally memoized through a
//! [`cache::ReferenceCache`], and every configured compiler is compared against it elementwise.

pub mod cache;
pub mod config;
pub mod data;
pub mod harness;
pub mod report;
pub mod smoke;
pub mod tolerance;
pub mod workloads;

pub use conv_rs;

pub use cache::{CacheKey, DiskCache, MemoryCache, ReferenceCache, ReferenceData};
pub use config::{default_targets, ToleranceRules};
pub use data::{generate_reference, reference_data};
pub use harness::{verify_backend, CompilerSet, Harness, VerifyConfig};
pub use report::{BackendOutcome, BackendStatus, HarnessReport, WorkloadReport};
pub use tolerance::{assert_close, ToleranceSpec};
pub use workloads::Suite;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $compiler_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use ::std::sync::Arc;

            use $crate::smoke;

            fn compiler() -> Arc<dyn $crate::conv_rs::OperatorCompiler> {
                Arc::new(($compiler_ctor)())
            }

            #[test]
            fn smoke_suite_matches_reference() {
                smoke::suite_matches_reference(compiler());
            }

            #[test]
            fn smoke_padded_ones_counts_overlap() {
                smoke::padded_ones_counts_overlap(compiler());
            }

            #[test]
            fn smoke_fused_relu_clamps() {
                smoke::fused_relu_clamps(compiler());
            }

            #[test]
            fn smoke_rejects_mismatched_bindings() {
                smoke::rejects_mismatched_bindings(compiler());
            }
        }
    };
}

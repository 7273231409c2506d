//! Drives workloads through every configured operator compiler.

use std::sync::Arc;
use std::time::Instant;

use conv_rs::backend::registry;
use conv_rs::{ConvError, ConvKernelSpec, ConvOp, ConvResult, ConvWorkload, OperatorCompiler, Tensor};

use crate::cache::{ReferenceCache, ReferenceData};
use crate::config::ToleranceRules;
use crate::data::reference_data;
use crate::report::{BackendOutcome, BackendStatus, HarnessReport, WorkloadReport};
use crate::tolerance::{assert_close, ToleranceSpec};

pub const DEFAULT_TEST_ID: &str = "conv2d_nchw";

/// One configured target: a name and, when it resolved, its compiler.
#[derive(Clone)]
pub struct Target {
    pub name: String,
    pub compiler: Option<Arc<dyn OperatorCompiler>>,
}

/// Ordered list of targets to verify against.
#[derive(Clone, Default)]
pub struct CompilerSet {
    targets: Vec<Target>,
}

impl CompilerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves each name through the global registry; unknown names are kept and later skipped.
    pub fn from_registry<S: AsRef<str>>(names: &[S]) -> Self {
        let targets = names
            .iter()
            .map(|name| Target {
                name: name.as_ref().to_string(),
                compiler: registry::create_compiler(name.as_ref()),
            })
            .collect();
        Self { targets }
    }

    pub fn with_compiler(mut self, name: impl Into<String>, compiler: Arc<dyn OperatorCompiler>) -> Self {
        self.targets.push(Target {
            name: name.into(),
            compiler: Some(compiler),
        });
        self
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Namespaces reference data in the cache and seeds generation.
    pub test_id: String,
    pub tolerance: ToleranceSpec,
    pub rules: ToleranceRules,
    /// Treat a workload on which every target was skipped as passing.
    pub allow_all_skipped: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            test_id: DEFAULT_TEST_ID.to_string(),
            tolerance: ToleranceSpec::default(),
            rules: ToleranceRules::default(),
            allow_all_skipped: false,
        }
    }
}

impl VerifyConfig {
    pub fn tolerance_for(&self, backend: &str, kernel: &str) -> ToleranceSpec {
        self.rules.resolve(self.tolerance, backend, kernel)
    }
}

pub struct Harness {
    config: VerifyConfig,
    compilers: CompilerSet,
    cache: Option<Arc<dyn ReferenceCache>>,
}

impl Harness {
    pub fn new(config: VerifyConfig, compilers: CompilerSet) -> Self {
        Self {
            config,
            compilers,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ReferenceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    pub fn run(&self, workloads: &[ConvWorkload]) -> HarnessReport {
        let workloads = workloads
            .iter()
            .map(|workload| self.verify_workload(*workload))
            .collect();
        HarnessReport { workloads }
    }

    pub fn verify_workload(&self, workload: ConvWorkload) -> WorkloadReport {
        tracing::info!(%workload, "Workload");
        let mut report = WorkloadReport {
            workload,
            outcomes: Vec::new(),
            macs: workload.macs().ok(),
            error: None,
        };

        let data = match reference_data(&self.config.test_id, workload, self.cache.as_deref()) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(%workload, error = %err, "reference generation failed");
                report.error = Some(err);
                return report;
            }
        };

        for target in self.compilers.targets() {
            let outcome = self.verify_target(target, workload, &data);
            if let (true, Some(macs)) = (outcome.is_passed(), report.macs) {
                // conv and conv + ReLU both run
                let gmac_per_s = 2.0 * macs as f64 / (outcome.elapsed_ms * 1e6).max(f64::MIN_POSITIVE);
                tracing::info!(backend = %target.name, elapsed_ms = outcome.elapsed_ms, gmac_per_s, "passed");
            }
            report.outcomes.push(outcome);
        }

        if report.executed() == 0 && !self.config.allow_all_skipped {
            report.error = Some(ConvError::NoBackendExecuted {
                workload: workload.to_string(),
            });
        }
        report
    }

    fn verify_target(
        &self,
        target: &Target,
        workload: ConvWorkload,
        data: &ReferenceData,
    ) -> BackendOutcome {
        let skipped = |reason: &str| {
            tracing::warn!("Skip because {} is {reason}", target.name);
            BackendOutcome {
                backend: target.name.clone(),
                status: BackendStatus::Skipped {
                    reason: reason.to_string(),
                },
                elapsed_ms: 0.0,
            }
        };

        let Some(compiler) = target.compiler.as_deref() else {
            return skipped("not registered");
        };
        if !compiler.is_available() {
            return skipped("not enabled");
        }

        tracing::info!("Running on target: {}", target.name);
        let start = Instant::now();
        let result = verify_backend(compiler, workload, data, |kernel| {
            self.config.tolerance_for(&target.name, kernel)
        });
        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;

        let status = match result {
            Ok(()) => BackendStatus::Passed,
            Err(err) if err.is_unavailable() => return skipped("not enabled"),
            Err(err) => {
                tracing::warn!(backend = %target.name, %workload, error = %err, "verification failed");
                BackendStatus::Failed(err)
            }
        };
        BackendOutcome {
            backend: target.name.clone(),
            status,
            elapsed_ms,
        }
    }
}

/// Compiles and runs the convolution and the fused convolution + ReLU kernels for `workload`
/// and compares both against `data`.
///
/// `tolerance` is consulted per kernel name. Stops at the first failing kernel.
pub fn verify_backend(
    compiler: &dyn OperatorCompiler,
    workload: ConvWorkload,
    data: &ReferenceData,
    tolerance: impl Fn(&str) -> ToleranceSpec,
) -> ConvResult<()> {
    for (op, expected) in [
        (ConvOp::Conv2d, &data.expected),
        (ConvOp::Conv2dRelu, &data.expected_relu),
    ] {
        let spec = ConvKernelSpec::new(workload, op)?;
        let kernel = compiler.compile(&spec)?;
        spec.output_shape
            .ensure_same(kernel.output_shape(), &format!("{} declared output", spec.name))?;

        let mut output = Tensor::zeros(kernel.output_shape().clone());
        kernel.run(&data.input, &data.weight, &mut output)?;
        assert_close(&output, expected, tolerance(&spec.name))?;
        tracing::debug!(kernel = %spec.name, backend = compiler.backend_name(), "kernel matches reference");
    }
    Ok(())
}

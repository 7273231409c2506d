//! Checks every operator compiler must pass, shared through [`crate::define_backend_tests!`].

use std::sync::Arc;

use conv_rs::{BackendError, ConvKernelSpec, ConvOp, ConvWorkload, OperatorCompiler, Shape, Tensor};

use crate::cache::MemoryCache;
use crate::harness::{CompilerSet, Harness, VerifyConfig};
use crate::workloads::SMOKE;

pub fn suite_matches_reference(compiler: Arc<dyn OperatorCompiler>) {
    let name = compiler.backend_name().to_string();
    let harness = Harness::new(
        VerifyConfig {
            test_id: format!("smoke-{name}"),
            ..VerifyConfig::default()
        },
        CompilerSet::new().with_compiler(name.clone(), compiler),
    )
    .with_cache(Arc::new(MemoryCache::default()));

    let report = harness.run(SMOKE);
    for workload in &report.workloads {
        for (backend, err) in workload.failures() {
            panic!(
                "{} failed on {}: {err}",
                backend.unwrap_or(&name),
                workload.workload
            );
        }
    }
    assert_eq!(report.passed(), SMOKE.len());
}

pub fn padded_ones_counts_overlap(compiler: Arc<dyn OperatorCompiler>) {
    let workload = ConvWorkload::new(1, 1, 4, 1, 3, 1, 1);
    let spec = ConvKernelSpec::new(workload, ConvOp::Conv2d).expect("valid workload");
    let out = compiler
        .compile_and_run(
            &spec,
            &Tensor::ones(workload.input_shape()),
            &Tensor::ones(workload.weight_shape()),
        )
        .expect("compile and run");
    assert_eq!(
        out.data(),
        &[4.0, 6.0, 6.0, 4.0, 6.0, 9.0, 9.0, 6.0, 6.0, 9.0, 9.0, 6.0, 4.0, 6.0, 6.0, 4.0]
    );
}

pub fn fused_relu_clamps(compiler: Arc<dyn OperatorCompiler>) {
    let workload = ConvWorkload::new(1, 2, 5, 2, 3, 1, 0);
    let spec = ConvKernelSpec::new(workload, ConvOp::Conv2dRelu).expect("valid workload");
    let out = compiler
        .compile_and_run(
            &spec,
            &Tensor::ones(workload.input_shape()),
            &Tensor::full(workload.weight_shape(), -0.5),
        )
        .expect("compile and run");
    assert_eq!(out.shape(), &Shape::new([1, 2, 3, 3]));
    assert!(out.data().iter().all(|&v| v == 0.0));
}

pub fn rejects_mismatched_bindings(compiler: Arc<dyn OperatorCompiler>) {
    let workload = ConvWorkload::new(1, 3, 6, 2, 3, 1, 0);
    let spec = ConvKernelSpec::new(workload, ConvOp::Conv2d).expect("valid workload");
    let err = compiler
        .compile_and_run(
            &spec,
            &Tensor::ones(Shape::new([1, 3, 7, 7])),
            &Tensor::ones(workload.weight_shape()),
        )
        .expect_err("input shape differs from the kernel spec");
    assert!(matches!(err, BackendError::Execution { .. }), "{err:?}");
}

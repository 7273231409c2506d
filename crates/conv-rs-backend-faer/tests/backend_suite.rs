use std::sync::Arc;

use conv_rs::backend::registry;
use conv_rs::ConvWorkload;
use conv_rs_backend_faer::{register_faer_backend, FaerIm2colCompiler};
use conv_rs_backend_tests::{CompilerSet, Harness, VerifyConfig};

conv_rs_backend_tests::define_backend_tests!(faer_im2col, FaerIm2colCompiler::new);

#[test]
fn registers_as_faer() {
    register_faer_backend();
    let compiler = registry::create_compiler("faer").expect("faer compiler registered");
    assert_eq!(compiler.backend_name(), "faer");
}

#[test]
fn scaled_down_network_layers_match_reference() {
    let workloads = [
        ConvWorkload::new(1, 3, 32, 8, 7, 2, 3),
        ConvWorkload::new(1, 16, 14, 32, 3, 2, 1),
        ConvWorkload::new(1, 32, 7, 16, 1, 1, 0),
        ConvWorkload::new(1, 1, 24, 8, 5, 1, 2),
        ConvWorkload::new(1, 8, 15, 8, 3, 1, 1).with_dilation(2),
    ];
    let harness = Harness::new(
        VerifyConfig::default(),
        CompilerSet::new().with_compiler("faer", Arc::new(FaerIm2colCompiler::new())),
    );
    let report = harness.run(&workloads);
    assert!(report.is_success(), "{}", report.render_table());
}

use conv_rs::backend::registry;
use conv_rs_backend_ref_cpu::{register_cpu_backend, DirectCpuCompiler};

conv_rs_backend_tests::define_backend_tests!(direct_cpu, DirectCpuCompiler::new);

#[test]
fn registers_under_both_names() {
    register_cpu_backend();
    for name in ["cpu", "cpu-direct"] {
        let compiler = registry::create_compiler(name).expect("cpu compiler registered");
        assert_eq!(compiler.backend_name(), "cpu");
        assert!(compiler.is_available());
    }
}

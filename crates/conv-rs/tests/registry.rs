use conv_rs::backend::registry::{create_compiler, has_compiler, list_compilers, register_compiler};
use conv_rs::{BackendResult, CompiledKernel, ConvKernelSpec, ConvOp, ConvWorkload, OperatorCompiler};
use conv_rs::{BackendError, Shape, Tensor};

struct FillKernel {
    output_shape: Shape,
}

impl CompiledKernel for FillKernel {
    fn name(&self) -> &str {
        "fill"
    }

    fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    fn run(&self, _input: &Tensor, _weight: &Tensor, output: &mut Tensor) -> BackendResult<()> {
        output.fill(7.0);
        Ok(())
    }
}

struct FillCompiler {
    available: bool,
}

impl OperatorCompiler for FillCompiler {
    fn backend_name(&self) -> &str {
        "fill"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn compile(&self, spec: &ConvKernelSpec) -> BackendResult<Box<dyn CompiledKernel>> {
        Ok(Box::new(FillKernel {
            output_shape: spec.output_shape.clone(),
        }))
    }
}

#[test]
fn registered_compilers_are_listed_and_constructed() {
    register_compiler("registry-test-fill", || FillCompiler { available: true });

    assert!(has_compiler("registry-test-fill"));
    assert!(list_compilers().contains(&"registry-test-fill".to_string()));
    let compiler = create_compiler("registry-test-fill").expect("registered compiler");
    assert_eq!(compiler.backend_name(), "fill");

    assert!(!has_compiler("registry-test-missing"));
    assert!(create_compiler("registry-test-missing").is_none());
}

#[test]
fn compile_and_run_binds_zeroed_output_of_declared_shape() {
    let workload = ConvWorkload::new(1, 2, 6, 3, 3, 1, 0);
    let spec = ConvKernelSpec::new(workload, ConvOp::Conv2d).unwrap();
    assert_eq!(spec.name, "conv2d_1_2_6_3_3_1_0_1");

    let compiler = FillCompiler { available: true };
    let input = Tensor::zeros(workload.input_shape());
    let weight = Tensor::zeros(workload.weight_shape());
    let out = compiler.compile_and_run(&spec, &input, &weight).unwrap();
    assert_eq!(out.shape(), &Shape::new([1, 3, 4, 4]));
    assert!(out.data().iter().all(|&v| v == 7.0));
}

#[test]
fn unavailable_compiler_reports_unavailable() {
    let spec = ConvKernelSpec::new(ConvWorkload::new(1, 1, 4, 1, 3, 1, 0), ConvOp::Conv2dRelu)
        .unwrap();
    let compiler = FillCompiler { available: false };
    let input = Tensor::zeros(spec.input_shape.clone());
    let weight = Tensor::zeros(spec.weight_shape.clone());
    let err = compiler
        .compile_and_run(&spec, &input, &weight)
        .expect_err("compiler is unavailable");
    assert_eq!(err, BackendError::unavailable("fill"));
}

#[test]
fn check_bindings_names_the_mismatched_buffer() {
    let workload = ConvWorkload::new(1, 1, 4, 1, 3, 1, 0);
    let spec = ConvKernelSpec::new(workload, ConvOp::Conv2d).unwrap();
    let input = Tensor::zeros(workload.input_shape());
    let weight = Tensor::zeros(Shape::new([1, 1, 2, 2]));
    let output = Tensor::zeros(spec.output_shape.clone());
    let err = spec
        .check_bindings(&input, &weight, &output)
        .expect_err("weight shape differs");
    assert!(err.to_string().contains("weight buffer has shape [1, 1, 2, 2]"));
}

pub mod direct;

pub use direct::{DirectConvKernel, DirectCpuCompiler};

/// Register the CPU compiler with the global compiler registry.
///
/// This function is called automatically via a static initializer, but can also
/// be called manually to ensure the compiler is registered.
/// The compiler is registered under both "cpu" and "cpu-direct" names.
pub fn register_cpu_backend() {
    let constructor = DirectCpuCompiler::new;

    conv_rs::backend::registry::register_compiler("cpu", constructor);
    conv_rs::backend::registry::register_compiler("cpu-direct", constructor);
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_CPU_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_cpu_backend();
    }
    register
};

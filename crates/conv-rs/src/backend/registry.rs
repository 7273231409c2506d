//! Runtime compiler registry for dynamic backend selection.
//!
//! Backends register a constructor under one or more names; the harness and the CLI resolve
//! target names through it instead of hardcoding compiler types.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::spec::OperatorCompiler;

/// Factory function that creates a new compiler instance.
pub type CompilerConstructor = Box<dyn Fn() -> Arc<dyn OperatorCompiler> + Send + Sync>;

/// Global registry mapping target names to constructors.
struct CompilerRegistry {
    compilers: RwLock<HashMap<String, CompilerConstructor>>,
}

impl CompilerRegistry {
    fn new() -> Self {
        Self {
            compilers: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: CompilerConstructor) {
        self.compilers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Arc<dyn OperatorCompiler>> {
        let registry = self
            .compilers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .compilers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn contains(&self, name: &str) -> bool {
        self.compilers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<CompilerRegistry> = OnceLock::new();

fn global_registry() -> &'static CompilerRegistry {
    GLOBAL_REGISTRY.get_or_init(CompilerRegistry::new)
}

/// Register a compiler by name with a constructor function.
///
/// The constructor runs each time the target is requested via [`create_compiler`]. Registering
/// an existing name replaces the previous constructor.
pub fn register_compiler<C, F>(name: impl Into<String>, constructor: F)
where
    C: OperatorCompiler + 'static,
    F: Fn() -> C + Send + Sync + 'static,
{
    let name = name.into();
    tracing::debug!(target_name = %name, "registering operator compiler");
    global_registry().register(
        name,
        Box::new(move || Arc::new(constructor()) as Arc<dyn OperatorCompiler>),
    );
}

/// Create a compiler instance by name, or `None` if nothing is registered under it.
pub fn create_compiler(name: &str) -> Option<Arc<dyn OperatorCompiler>> {
    global_registry().create(name)
}

/// List all registered target names, sorted.
pub fn list_compilers() -> Vec<String> {
    global_registry().list()
}

pub fn has_compiler(name: &str) -> bool {
    global_registry().contains(name)
}

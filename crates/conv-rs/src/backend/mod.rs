//! Operator compiler boundary and the runtime registry that resolves backends by name.

pub mod registry;
pub mod spec;

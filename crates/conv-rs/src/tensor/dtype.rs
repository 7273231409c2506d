//! Enumerates the scalar element types supported by host tensors.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier used in kernel specs and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    #[default]
    F32,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
        }
    }

    /// Canonical lowercase name, matching the usual array-library spelling.
    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "float32",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_is_four_bytes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::default().name(), "float32");
    }
}

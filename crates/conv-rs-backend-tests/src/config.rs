//! Environment lookups and the JSON tolerance rule file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::tolerance::ToleranceSpec;

/// Targets tried when none are configured, in order.
pub const DEFAULT_TARGETS: &[&str] = &[
    "cpu", "faer", "cuda", "opencl", "metal", "rocm", "vulkan", "nvptx",
];

pub const TARGETS_ENV: &str = "CONVRS_TARGETS";
pub const REF_CACHE_DIR_ENV: &str = "CONVRS_REF_CACHE_DIR";
pub const TOLERANCE_CONFIG_ENV: &str = "CONVRS_TOLERANCE_CONFIG";

static CONVRS_TARGETS: OnceLock<Option<Vec<String>>> = OnceLock::new();
static CONVRS_REF_CACHE_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();
static CONVRS_TOLERANCE_CONFIG: OnceLock<Option<PathBuf>> = OnceLock::new();

fn non_empty_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

/// Splits a comma separated target list, dropping empty entries.
pub fn parse_target_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// `CONVRS_TARGETS` when set, otherwise [`DEFAULT_TARGETS`].
pub fn default_targets() -> Vec<String> {
    CONVRS_TARGETS
        .get_or_init(|| non_empty_var(TARGETS_ENV).map(|value| parse_target_list(&value)))
        .clone()
        .unwrap_or_else(|| DEFAULT_TARGETS.iter().map(|name| name.to_string()).collect())
}

pub fn ref_cache_dir_from_env() -> Option<PathBuf> {
    CONVRS_REF_CACHE_DIR
        .get_or_init(|| non_empty_var(REF_CACHE_DIR_ENV).map(PathBuf::from))
        .clone()
}

pub fn tolerance_config_from_env() -> Option<PathBuf> {
    CONVRS_TOLERANCE_CONFIG
        .get_or_init(|| non_empty_var(TOLERANCE_CONFIG_ENV).map(PathBuf::from))
        .clone()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ToleranceOverride {
    #[serde(default)]
    pub rtol: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToleranceRule {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub rtol: Option<f64>,
}

/// Per-backend / per-kernel tolerance overrides.
///
/// ```json
/// { "default": { "rtol": 2e-5 },
///   "rules": [ { "backend": "faer", "test": "conv2d_1_128_*", "rtol": 1e-4 } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToleranceRules {
    #[serde(default)]
    pub default: Option<ToleranceOverride>,
    #[serde(default)]
    pub rules: Vec<ToleranceRule>,
}

impl ToleranceRules {
    /// Parses and validates a rule file; every `rtol` present must be finite and non-negative.
    pub fn from_json(contents: &str) -> Result<Self> {
        let rules: Self =
            serde_json::from_str(contents).context("failed to parse tolerance config")?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read tolerance config {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("invalid tolerance config {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if let Some(rtol) = self.default.and_then(|d| d.rtol) {
            ensure!(
                rtol.is_finite() && rtol >= 0.0,
                "default rtol must be a non-negative number, got {rtol}"
            );
        }
        for (idx, rule) in self.rules.iter().enumerate() {
            if let Some(rtol) = rule.rtol {
                ensure!(
                    rtol.is_finite() && rtol >= 0.0,
                    "rule {idx} rtol must be a non-negative number, got {rtol}"
                );
            }
        }
        Ok(())
    }

    /// Resolves the tolerance for `backend` running the kernel named `test`.
    ///
    /// Precedence, lowest to highest: `base`, `default`, backend-only rules, test-only rules,
    /// rules matching both. Within one class the last matching rule with an `rtol` wins.
    pub fn resolve(&self, base: ToleranceSpec, backend: &str, test: &str) -> ToleranceSpec {
        let mut resolved = base;
        if let Some(rtol) = self.default.and_then(|d| d.rtol) {
            resolved.relative_tolerance = rtol;
        }

        let mut backend_rule = None;
        let mut test_rule = None;
        let mut backend_test_rule = None;
        for rule in &self.rules {
            let Some(rtol) = rule.rtol else {
                continue;
            };
            let backend_match = rule
                .backend
                .as_deref()
                .is_some_and(|pattern| matches_pattern(backend, pattern));
            let test_match = rule
                .test
                .as_deref()
                .is_some_and(|pattern| matches_pattern(test, pattern));
            match (backend_match, test_match) {
                (true, true) => backend_test_rule = Some(rtol),
                (false, true) if rule.backend.is_none() => test_rule = Some(rtol),
                (true, false) if rule.test.is_none() => backend_rule = Some(rtol),
                _ => {}
            }
        }

        for rtol in [backend_rule, test_rule, backend_test_rule]
            .into_iter()
            .flatten()
        {
            resolved.relative_tolerance = rtol;
        }
        resolved
    }
}

/// Rule file shipped with the workspace.
pub fn default_tolerance_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/conv_parity.json")
}

/// `CONVRS_TOLERANCE_CONFIG` when set, otherwise the shipped rule file if it exists.
pub fn tolerance_config_path() -> Option<PathBuf> {
    tolerance_config_from_env().or_else(|| {
        let path = default_tolerance_config_path();
        path.is_file().then_some(path)
    })
}

/// Matches `value` against a pattern where `*` stands for any run of characters.
///
/// The text before the first `*` must be a prefix, the text after the last `*` a suffix, and
/// the pieces in between must appear in order without overlapping.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    let mut pieces = pattern.split('*');
    let head = pieces.next().unwrap_or_default();
    let Some(mut rest) = value.strip_prefix(head) else {
        return false;
    };
    let pieces: Vec<&str> = pieces.collect();
    let Some((tail, middle)) = pieces.split_last() else {
        // no wildcard
        return rest.is_empty();
    };
    for piece in middle {
        match rest.find(piece) {
            Some(at) => rest = &rest[at + piece.len()..],
            None => return false,
        }
    }
    rest.ends_with(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_patterns() {
        assert!(matches_pattern("conv2d_1_3_224", "conv2d_*"));
        assert!(matches_pattern("relu_1_3_224", "*_3_*"));
        assert!(matches_pattern("faer", "*"));
        assert!(matches_pattern("cpu-direct", "cpu*direct"));
        assert!(!matches_pattern("relu_1", "conv2d_*"));
        assert!(!matches_pattern("cpu", "cpu-direct"));
        assert!(!matches_pattern("conv2d_1_2", "*_3"));
        assert!(!matches_pattern("a", "a*a"));
        assert!(matches_pattern("aba", "a*a"));
        assert!(matches_pattern("conv2d", "**"));
    }

    #[test]
    fn target_list_parsing_drops_blanks() {
        assert_eq!(parse_target_list(" cpu, ,faer,"), vec!["cpu", "faer"]);
        assert!(parse_target_list("").is_empty());
    }

    #[test]
    fn rule_precedence_backend_test_over_test_over_backend() {
        let rules = ToleranceRules::from_json(
            r#"{
                "default": { "rtol": 2e-5 },
                "rules": [
                    { "backend": "faer", "test": "conv2d_*", "rtol": 1e-3 },
                    { "test": "conv2d_*", "rtol": 1e-4 },
                    { "backend": "faer", "rtol": 5e-5 }
                ]
            }"#,
        )
        .unwrap();
        let base = ToleranceSpec::default();

        let rtol = |backend: &str, test: &str| rules.resolve(base, backend, test).relative_tolerance;
        assert_eq!(rtol("faer", "conv2d_1_3_224_64_7_2_3_1"), 1e-3);
        assert_eq!(rtol("cpu", "conv2d_1_3_224_64_7_2_3_1"), 1e-4);
        assert_eq!(rtol("faer", "relu_1_3_224_64_7_2_3_1"), 5e-5);
        assert_eq!(rtol("cpu", "relu_1_3_224_64_7_2_3_1"), 2e-5);
    }

    #[test]
    fn empty_config_keeps_base() {
        let rules = ToleranceRules::from_json("{}").unwrap();
        let base = ToleranceSpec::new(3e-4);
        assert_eq!(rules.resolve(base, "cpu", "conv2d"), base);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(ToleranceRules::from_json("{ \"rules\": 3 }").is_err());
    }

    #[test]
    fn negative_or_non_finite_rtol_is_rejected() {
        assert!(ToleranceRules::from_json(r#"{ "default": { "rtol": -1e-5 } }"#).is_err());
        assert!(ToleranceRules::from_json(r#"{ "rules": [ { "backend": "cpu", "rtol": -0.5 } ] }"#).is_err());
        assert!(ToleranceRules::from_json(r#"{ "rules": [ { "backend": "cpu", "rtol": 1e400 } ] }"#).is_err());
        assert!(ToleranceRules::from_json(r#"{ "rules": [ { "backend": "cpu", "rtol": 0.0 } ] }"#).is_ok());
    }

    #[test]
    fn rule_without_rtol_does_not_discard_earlier_match() {
        let rules = ToleranceRules::from_json(
            r#"{ "rules": [
                { "backend": "faer", "rtol": 1e-3 },
                { "backend": "faer", "rtol": null },
                { "backend": "f*" }
            ] }"#,
        )
        .unwrap();
        let resolved = rules.resolve(ToleranceSpec::default(), "faer", "conv2d_1");
        assert_eq!(resolved.relative_tolerance, 1e-3);
    }

    #[test]
    fn shipped_rule_file_loads() {
        let rules = ToleranceRules::load(&default_tolerance_config_path()).unwrap();
        let base = ToleranceSpec::new(3e-5);
        assert_eq!(
            rules.resolve(base, "cpu", "conv2d_1_2048_7_512_1_1_0_1").relative_tolerance,
            5e-5
        );
        assert_eq!(rules.resolve(base, "cpu", "conv2d_1_3_224_64_7_2_3_1"), base);
    }
}

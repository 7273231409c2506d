//! Named workload suites taken from common image network layers.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use conv_rs::ConvWorkload;

const fn w(
    batch: usize,
    in_channel: usize,
    in_size: usize,
    num_filter: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> ConvWorkload {
    ConvWorkload::new(batch, in_channel, in_size, num_filter, kernel, stride, padding)
}

pub const SMOKE: &[ConvWorkload] = &[
    w(1, 3, 16, 4, 3, 1, 1),
    w(1, 4, 9, 8, 1, 2, 0),
    w(2, 3, 11, 5, 5, 2, 2),
    w(1, 8, 7, 8, 3, 1, 1),
    w(1, 4, 12, 4, 3, 1, 1).with_dilation(2),
];

pub const RESNET18: &[ConvWorkload] = &[
    w(1, 3, 224, 64, 7, 2, 3),
    w(1, 64, 56, 64, 3, 1, 1),
    w(1, 64, 56, 64, 1, 1, 0),
    w(1, 64, 56, 128, 3, 2, 1),
    w(1, 64, 56, 128, 1, 2, 0),
    w(1, 128, 28, 128, 3, 1, 1),
    w(1, 128, 28, 256, 3, 2, 1),
    w(1, 128, 28, 256, 1, 2, 0),
    w(1, 256, 14, 256, 3, 1, 1),
    w(1, 256, 14, 512, 3, 2, 1),
    w(1, 256, 14, 512, 1, 2, 0),
    w(1, 512, 7, 512, 3, 1, 1),
];

pub const RESNET50: &[ConvWorkload] = &[
    w(1, 64, 56, 256, 1, 1, 0),
    w(1, 256, 56, 64, 1, 1, 0),
    w(1, 256, 56, 128, 1, 2, 0),
    w(1, 128, 28, 512, 1, 1, 0),
    w(1, 256, 56, 512, 1, 2, 0),
    w(1, 512, 28, 128, 1, 1, 0),
    w(1, 512, 28, 256, 1, 2, 0),
    w(1, 256, 14, 1024, 1, 1, 0),
    w(1, 512, 28, 1024, 1, 2, 0),
    w(1, 1024, 14, 256, 1, 1, 0),
    w(1, 1024, 14, 512, 1, 2, 0),
    w(1, 512, 7, 2048, 1, 2, 0),
    w(1, 1024, 14, 2048, 1, 2, 0),
    w(1, 2048, 7, 512, 1, 1, 0),
];

pub const VGG16: &[ConvWorkload] = &[w(1, 128, 122, 128, 3, 1, 1)];

pub const SUPER_RESOLUTION: &[ConvWorkload] = &[
    w(1, 1, 224, 64, 5, 1, 2),
    w(1, 64, 224, 64, 3, 1, 1),
    w(1, 64, 224, 32, 3, 1, 1),
    w(1, 32, 224, 9, 3, 1, 1),
];

pub const DILATED: &[ConvWorkload] = &[w(1, 128, 122, 128, 3, 1, 1).with_dilation(2)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    Smoke,
    Resnet18,
    Resnet50,
    Vgg16,
    SuperResolution,
    Dilated,
    /// Every network suite; excludes `smoke`.
    All,
}

impl Suite {
    pub const NAMES: &'static [&'static str] = &[
        "smoke",
        "resnet18",
        "resnet50",
        "vgg16",
        "super-resolution",
        "dilated",
        "all",
    ];

    pub fn name(self) -> &'static str {
        match self {
            Suite::Smoke => "smoke",
            Suite::Resnet18 => "resnet18",
            Suite::Resnet50 => "resnet50",
            Suite::Vgg16 => "vgg16",
            Suite::SuperResolution => "super-resolution",
            Suite::Dilated => "dilated",
            Suite::All => "all",
        }
    }

    pub fn workloads(self) -> Vec<ConvWorkload> {
        match self {
            Suite::Smoke => SMOKE.to_vec(),
            Suite::Resnet18 => RESNET18.to_vec(),
            Suite::Resnet50 => RESNET50.to_vec(),
            Suite::Vgg16 => VGG16.to_vec(),
            Suite::SuperResolution => SUPER_RESOLUTION.to_vec(),
            Suite::Dilated => DILATED.to_vec(),
            Suite::All => [RESNET18, RESNET50, VGG16, SUPER_RESOLUTION, DILATED].concat(),
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Suite {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "smoke" => Suite::Smoke,
            "resnet18" => Suite::Resnet18,
            "resnet50" => Suite::Resnet50,
            "vgg16" => Suite::Vgg16,
            "super-resolution" | "super_resolution" => Suite::SuperResolution,
            "dilated" => Suite::Dilated,
            "all" => Suite::All,
            other => bail!(
                "unknown suite {other:?}, expected one of {}",
                Suite::NAMES.join(", ")
            ),
        })
    }
}

/// Reads a JSON array of workload objects; `dilation` defaults to 1.
pub fn load_workloads(path: &Path) -> Result<Vec<ConvWorkload>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read workloads {}", path.display()))?;
    let workloads: Vec<ConvWorkload> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse workloads {}", path.display()))?;
    for workload in &workloads {
        workload
            .validate()
            .with_context(|| format!("invalid workload in {}", path.display()))?;
    }
    Ok(workloads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_sizes() {
        assert_eq!(Suite::Resnet18.workloads().len(), 12);
        assert_eq!(Suite::Resnet50.workloads().len(), 14);
        assert_eq!(Suite::Vgg16.workloads().len(), 1);
        assert_eq!(Suite::SuperResolution.workloads().len(), 4);
        assert_eq!(Suite::Dilated.workloads().len(), 1);
        assert_eq!(Suite::All.workloads().len(), 32);
    }

    #[test]
    fn every_suite_workload_is_valid() {
        for name in Suite::NAMES {
            let suite: Suite = name.parse().unwrap();
            assert_eq!(suite.name(), *name);
            for workload in suite.workloads() {
                workload.validate().unwrap();
            }
        }
    }

    #[test]
    fn dilated_suite_output_size() {
        let out = DILATED[0].output_shape().unwrap();
        assert_eq!(out.dims(), &[1, 128, 120, 120]);
    }

    #[test]
    fn unknown_suite_is_rejected() {
        assert!("resnet101".parse::<Suite>().is_err());
    }
}

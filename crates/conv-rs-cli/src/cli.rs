use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use conv_rs_backend_tests::Suite;

#[derive(Parser, Debug)]
#[command(name = "conv-rs", version, about = "Verify convolution operator compilers against a reference")]
pub struct Cli {
    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run workloads through every target and compare with the reference
    Verify(VerifyArgs),
    /// List registered compilers and whether they are available
    Backends,
    /// Print the workloads of a suite
    Workloads {
        #[arg(long, default_value = "all")]
        suite: Suite,
    },
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Workload suite: smoke, resnet18, resnet50, vgg16, super-resolution, dilated or all
    #[arg(long, default_value = "all")]
    pub suite: Suite,

    /// JSON array of workloads, replaces --suite
    #[arg(long)]
    pub workloads: Option<PathBuf>,

    /// Comma separated targets (default: CONVRS_TARGETS or the built-in list)
    #[arg(long, value_delimiter = ',')]
    pub targets: Option<Vec<String>>,

    /// Relative tolerance
    #[arg(long)]
    pub rtol: Option<f64>,

    /// Tolerance rule file (default: CONVRS_TOLERANCE_CONFIG, else configs/conv_parity.json)
    #[arg(long)]
    pub tolerance_config: Option<PathBuf>,

    /// Reference data directory (default: CONVRS_REF_CACHE_DIR, else in-memory)
    #[arg(long, conflicts_with = "no_cache")]
    pub cache_dir: Option<PathBuf>,

    /// Regenerate reference data for every workload
    #[arg(long)]
    pub no_cache: bool,

    /// Namespace for cached reference data
    #[arg(long)]
    pub test_id: Option<String>,

    /// Pass workloads on which every target was skipped
    #[arg(long)]
    pub allow_all_skipped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_flags_parse() {
        let cli = Cli::try_parse_from([
            "conv-rs",
            "verify",
            "--suite",
            "resnet18",
            "--targets",
            "cpu,faer",
            "--rtol",
            "1e-4",
            "--no-cache",
            "--log",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log.as_deref(), Some("debug"));
        let Command::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(args.suite, Suite::Resnet18);
        assert_eq!(args.targets, Some(vec!["cpu".to_string(), "faer".to_string()]));
        assert_eq!(args.rtol, Some(1e-4));
        assert!(args.no_cache);
        assert!(!args.allow_all_skipped);
    }

    #[test]
    fn cache_dir_conflicts_with_no_cache() {
        let err = Cli::try_parse_from(["conv-rs", "verify", "--cache-dir", "x", "--no-cache"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn unknown_suite_is_rejected() {
        assert!(Cli::try_parse_from(["conv-rs", "workloads", "--suite", "alexnet"]).is_err());
    }
}

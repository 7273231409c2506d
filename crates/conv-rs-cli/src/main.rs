mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use cli::{Cli, Command, VerifyArgs};
use conv_rs::backend::registry;
use conv_rs_backend_tests::config::{default_targets, ref_cache_dir_from_env, tolerance_config_path};
use conv_rs_backend_tests::harness::DEFAULT_TEST_ID;
use conv_rs_backend_tests::workloads::load_workloads;
use conv_rs_backend_tests::{
    CompilerSet, DiskCache, Harness, MemoryCache, ReferenceCache, Suite, ToleranceRules,
    ToleranceSpec, VerifyConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    conv_rs_backend_ref_cpu::register_cpu_backend();
    conv_rs_backend_faer::register_faer_backend();

    match cli.command {
        Command::Verify(args) => verify(args),
        Command::Backends => {
            list_backends();
            Ok(ExitCode::SUCCESS)
        }
        Command::Workloads { suite } => {
            list_workloads(suite);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(log: Option<&str>) {
    let filter = match log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn verify(args: VerifyArgs) -> Result<ExitCode> {
    let workloads = match &args.workloads {
        Some(path) => load_workloads(path)?,
        None => args.suite.workloads(),
    };
    ensure!(!workloads.is_empty(), "no workloads to verify");

    let targets = args.targets.clone().unwrap_or_else(default_targets);
    let config = verify_config(&args)?;
    let mut harness = Harness::new(config, CompilerSet::from_registry(targets.as_slice()));
    if let Some(cache) = reference_cache(&args)? {
        harness = harness.with_cache(cache);
    }

    tracing::info!(
        workloads = workloads.len(),
        targets = %targets.join(","),
        rtol = harness.config().tolerance.relative_tolerance,
        "starting verification"
    );
    let report = harness.run(&workloads);
    println!("{}", report.render_table());

    for workload in &report.workloads {
        for (backend, err) in workload.failures() {
            match backend {
                Some(backend) => eprintln!("FAIL {} on {backend}: {err}", workload.workload),
                None => eprintln!("FAIL {}: {err}", workload.workload),
            }
        }
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn verify_config(args: &VerifyArgs) -> Result<VerifyConfig> {
    let mut tolerance = ToleranceSpec::default();
    if let Some(rtol) = args.rtol {
        ensure!(rtol.is_finite() && rtol >= 0.0, "--rtol must be a non-negative number");
        tolerance.relative_tolerance = rtol;
    }
    let rules = match args.tolerance_config.clone().or_else(tolerance_config_path) {
        Some(path) => ToleranceRules::load(&path)?,
        None => ToleranceRules::default(),
    };
    Ok(VerifyConfig {
        test_id: args
            .test_id
            .clone()
            .unwrap_or_else(|| DEFAULT_TEST_ID.to_string()),
        tolerance,
        rules,
        allow_all_skipped: args.allow_all_skipped,
    })
}

fn reference_cache(args: &VerifyArgs) -> Result<Option<Arc<dyn ReferenceCache>>> {
    if args.no_cache {
        return Ok(None);
    }
    let cache: Arc<dyn ReferenceCache> = match args.cache_dir.clone().or_else(ref_cache_dir_from_env) {
        Some(dir) => {
            let cache = DiskCache::new(&dir)
                .with_context(|| format!("failed to open reference cache {}", dir.display()))?;
            tracing::info!(dir = %dir.display(), "using disk reference cache");
            Arc::new(cache)
        }
        None => Arc::new(MemoryCache::default()),
    };
    Ok(Some(cache))
}

fn list_backends() {
    let registered = registry::list_compilers();
    for name in &registered {
        let available = registry::create_compiler(name)
            .map(|compiler| compiler.is_available())
            .unwrap_or(false);
        println!("{name}\t{}", if available { "available" } else { "unavailable" });
    }
    for name in default_targets() {
        if !registered.contains(&name) {
            println!("{name}\tunregistered");
        }
    }
}

fn list_workloads(suite: Suite) {
    for workload in suite.workloads() {
        println!("{workload}");
    }
}

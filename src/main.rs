//! Command-line front end for the hugetlb pool accounting check.
//!
//! All decisions live in the library. This file wires arguments and logging
//! to the driver and turns a [`RunReport`] into an exit code.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use hugecheck::{
    set_overcommit_limit, set_static_pool, CheckConfig, LifecycleCheck, Meminfo, RunReport,
};

// Exit codes for scripted/CI triage.
const EXIT_SUCCESS: i32 = 0;
const EXIT_COUNTER_MISMATCH: i32 = 1;
const EXIT_FATAL: i32 = 2;

/// Check kernel hugetlb pool accounting across a buffer lifecycle.
///
/// Maps STATIC_PAGES + overcommit worth of huge pages, touches them, then
/// unmaps one page at a time, verifying HugePages_Total/Free/Rsvd/Surp
/// against a predictive model after every step.
#[derive(Parser)]
#[command(name = "hugecheck")]
#[command(about = "Check hugetlb pool accounting across a buffer lifecycle")]
#[command(version)]
struct Cli {
    /// Huge pages to allocate statically (written to nr_hugepages).
    #[arg(value_name = "STATIC_PAGES")]
    static_pages: usize,

    /// Huge pages the test buffer spans; the excess over STATIC_PAGES is
    /// allowed as overcommit surplus.
    #[arg(value_name = "MAPPED_PAGES")]
    mapped_pages: usize,

    /// Meminfo-formatted file to read pool counters from instead of the
    /// kernel's /proc/meminfo.
    #[arg(long, value_name = "PATH")]
    meminfo: Option<PathBuf>,

    /// Leave /proc/sys/vm untouched and check against the pool as already
    /// configured. Useful for unprivileged runs.
    #[arg(long)]
    skip_tunables: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let outcome = run(&cli);
    match &outcome {
        Ok(report) if report.passed() => {
            info!(checks = report.checks, "pool accounting consistent at every step");
        }
        Ok(report) => {
            for discrepancy in &report.discrepancies {
                error!("{discrepancy}");
            }
            error!(
                failures = report.failures(),
                checks = report.checks,
                "pool accounting diverged from the model"
            );
        }
        Err(e) => {
            error!("fatal: {e}");
            for cause in e.chain().skip(1) {
                error!("  caused by: {cause}");
            }
        }
    }
    std::process::exit(exit_code(&outcome));
}

/// Maps the run outcome onto the exit codes above.
fn exit_code(outcome: &Result<RunReport>) -> i32 {
    match outcome {
        Ok(report) if report.passed() => EXIT_SUCCESS,
        Ok(_) => EXIT_COUNTER_MISMATCH,
        Err(_) => EXIT_FATAL,
    }
}

fn run(cli: &Cli) -> Result<RunReport> {
    let meminfo = match &cli.meminfo {
        Some(path) => Meminfo::at(path),
        None => Meminfo::system(),
    };
    let page_bytes = meminfo
        .huge_page_bytes()
        .context("cannot determine the huge page size")?;

    let config = CheckConfig {
        static_pages: cli.static_pages,
        mapped_pages: cli.mapped_pages,
        page_bytes,
    };

    if cli.skip_tunables {
        info!("leaving /proc/sys/vm untouched");
    } else {
        // Pool writes need root. A refused write is not fatal: the check
        // still runs, against whatever pool the system actually has.
        if let Err(e) = set_static_pool(config.static_pages) {
            warn!("cannot size the static pool: {e}");
        }
        if let Err(e) = set_overcommit_limit(config.overcommit()) {
            warn!("cannot set the overcommit limit: {e}");
        }
    }

    info!(
        static_pages = config.static_pages,
        mapped_pages = config.mapped_pages,
        overcommit = config.overcommit(),
        page_bytes = config.page_bytes,
        counters = %meminfo.path().display(),
        "starting lifecycle check"
    );

    let report = LifecycleCheck::new(config, meminfo).run()?;
    Ok(report)
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#![warn(missing_docs)]
//! Gauntlet CLI
//!
//! The driver tying the pieces together: discover tests, bucketize them
//! across workers, optionally stand up the server pool, stream status
//! events into the aggregator, write the JSON results artifact, and
//! compute the process exit code.

mod config;
mod discovery;
mod executor;
mod lock;
mod server_pool;
mod worker;

pub use config::{GauntletConfig, RunMode};
pub use discovery::find_tests;
pub use executor::ProcessExecutor;
pub use lock::TestLock;
pub use server_pool::{
    config_for, server_request, PoolError, ServerLauncher, ServerPool, ServerState, MAX_CONFIGS,
};
pub use worker::{run_bucket, run_buckets, WorkerContext, WorkerOptions};

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use gauntlet_core::bucketize;
use gauntlet_ipc::{aggregate, status_channel, AggregatorOptions, StatusEvent};
use gauntlet_report::{load_json_report, render_summary, write_json_report, RunReport, Totals};

/// Gauntlet CLI arguments
#[derive(Parser, Debug)]
#[command(name = "gauntlet")]
#[command(author, version, about = "Gauntlet - parallel conformance-test runner")]
pub struct Cli {
    /// Optional subcommand; defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Test files or directories to run
    pub paths: Vec<PathBuf>,

    /// Harness command: program plus fixed arguments
    /// (the test path is appended per invocation)
    #[arg(long, value_delimiter = ' ', num_args = 1..)]
    pub harness: Vec<String>,

    /// Number of worker slots (default: logical CPU count)
    #[arg(long, short = 'j')]
    pub threads: Option<usize>,

    /// Per-test wall-clock timeout, e.g. "300s", "5m"
    #[arg(long)]
    pub timeout: Option<String>,

    /// Route tests through long-lived server instances
    #[arg(long)]
    pub server: bool,

    /// Invocations per test against one persistent process
    #[arg(long)]
    pub repeat: Option<u32>,

    /// Treat the harness as a type-checking service
    #[arg(long)]
    pub typechecker: bool,

    /// Path of the JSON results artifact
    #[arg(long, short = 'o')]
    pub results: Option<PathBuf>,

    /// Log one line per test instead of drawing the progress bar
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run tests (default)
    Run,
    /// Re-print the summary of a saved results artifact
    Replay {
        /// Artifact written by a previous run
        artifact: PathBuf,
    },
}

/// Parse arguments and run; returns the process exit code.
pub fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "gauntlet=debug"
    } else {
        "gauntlet=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run_with_cli(cli)
}

/// Run with pre-parsed arguments (logging already initialized).
pub fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Some(Commands::Replay { ref artifact }) => replay(artifact),
        Some(Commands::Run) | None => run_tests(&cli),
    }
}

fn replay(artifact: &std::path::Path) -> anyhow::Result<i32> {
    let report = load_json_report(artifact)
        .with_context(|| format!("replaying {}", artifact.display()))?;
    let totals = Totals::from_records(&report.records);
    print!("{}", render_summary(&totals));
    Ok(totals.exit_code())
}

fn run_tests(cli: &Cli) -> anyhow::Result<i32> {
    let config = GauntletConfig::discover().unwrap_or_default();

    if cli.harness.is_empty() {
        bail!("no harness command; pass --harness or set one in gauntlet.toml");
    }
    let mode = if cli.typechecker {
        RunMode::Typechecker
    } else {
        config.runner.mode
    };
    let timeout = GauntletConfig::parse_duration(
        cli.timeout.as_deref().unwrap_or(&config.runner.timeout),
    )?;
    let threads = cli
        .threads
        .or(config.runner.threads)
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |p| p.get()));
    let server_mode = cli.server || config.runner.server;
    let options = WorkerOptions {
        harness: cli.harness.clone(),
        timeout,
        repeat: cli.repeat.unwrap_or(config.runner.repeat),
        mode,
    };
    let results_path = cli
        .results
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.results_path));

    let tests = find_tests(&cli.paths, mode.core())?;
    if tests.is_empty() {
        bail!("no tests found under the given paths");
    }
    let queued = tests.len();
    let buckets = bucketize(tests, threads);
    info!(queued, buckets = buckets.len(), "run planned");

    install_signal_handlers();
    let (status, rx) = status_channel();
    let aggregator_options = AggregatorOptions {
        progress: !cli.verbose,
    };
    let aggregator =
        std::thread::spawn(move || aggregate(&rx, &aggregator_options));
    status.send(StatusEvent::Started { queued });

    let mut server_pool = if server_mode {
        let configs: BTreeSet<String> = buckets
            .iter()
            .flat_map(|b| b.tests.iter())
            .map(|t| config_for(t.path()))
            .collect();
        Some(
            ServerPool::start(
                configs.into_iter().collect(),
                server_launcher(&cli.harness),
                status.clone(),
            )
            .context("starting server pool")?,
        )
    } else {
        None
    };

    run_buckets(
        &buckets,
        &ProcessExecutor,
        &status,
        server_pool.as_ref(),
        &options,
    )?;

    if let Some(pool) = server_pool.as_mut() {
        pool.shutdown();
    }
    status.finish();
    let aggregate_status = aggregator
        .join()
        .map_err(|_| anyhow::anyhow!("status aggregator panicked"))?;

    let report = RunReport::new(aggregate_status.records);
    write_json_report(&results_path, &report)
        .with_context(|| format!("writing {}", results_path.display()))?;

    let totals = Totals::from_records(&report.records);
    print!("{}", render_summary(&totals));
    if !totals.failed_tests.is_empty() {
        println!(
            "Re-run the failures with:\n  gauntlet --harness \"{}\" {}",
            cli.harness.join(" "),
            totals.failed_tests.join(" ")
        );
    }
    if aggregate_status.server_restarts > 0 {
        info!(
            restarts = aggregate_status.server_restarts,
            "servers were respawned during the run"
        );
    }

    if aggregate_status.interrupted {
        eprintln!("Interrupted; partial results in {}", results_path.display());
        return Ok(130);
    }
    Ok(totals.exit_code())
}

/// Servers are launched from the same harness command with a serve flag;
/// the shared default configuration omits `--config`.
fn server_launcher(harness: &[String]) -> ServerLauncher {
    let harness = harness.to_vec();
    Arc::new(move |config: &str, port: u16| {
        let mut command = Command::new(&harness[0]);
        command.args(&harness[1..]);
        command.arg("--serve").arg("--port").arg(port.to_string());
        if config != "default" {
            command.arg("--config").arg(config);
        }
        command
    })
}

extern "C" fn handle_shutdown_signal(_: libc::c_int) {
    // Only an atomic store is signal-safe here.
    gauntlet_ipc::request_shutdown();
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_shutdown_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_shutdown_signal as libc::sighandler_t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_report::TestStatus;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn touch(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn cli_for(dir: &Path, results: &Path) -> Cli {
        Cli {
            command: None,
            paths: vec![dir.to_path_buf()],
            // cat prints the test file, so file content == expectation
            // means pass.
            harness: vec!["/bin/cat".to_string()],
            threads: Some(2),
            timeout: Some("30s".to_string()),
            server: false,
            repeat: None,
            typechecker: false,
            results: Some(results.to_path_buf()),
            verbose: true,
        }
    }

    #[test]
    fn clean_run_exits_zero_and_writes_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.t"), "alpha\n");
        touch(&root.join("a.t.expect"), "alpha");
        touch(&root.join("b.t"), "beta\n");
        touch(&root.join("b.t.expect"), "beta");

        let results = root.join("results.json");
        let code = run_tests(&cli_for(root, &results)).unwrap();
        assert_eq!(code, 0);

        let report = load_json_report(&results).unwrap();
        assert_eq!(report.records.len(), 2);
        assert!(report
            .records
            .iter()
            .all(|r| r.status == TestStatus::Passed));
    }

    #[test]
    fn failing_test_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("bad.t"), "actual\n");
        touch(&root.join("bad.t.expect"), "expected");

        let results = root.join("results.json");
        let code = run_tests(&cli_for(root, &results)).unwrap();
        assert_eq!(code, 1);

        let report = load_json_report(&results).unwrap();
        assert_eq!(report.records[0].status, TestStatus::Failed);
        assert!(report.records[0].details.as_deref().unwrap().contains("001-"));
    }

    #[test]
    fn empty_suite_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.json");
        let err = run_tests(&cli_for(dir.path(), &results)).unwrap_err();
        assert!(err.to_string().contains("no tests"), "{err}");
    }

    #[test]
    fn missing_harness_is_rejected_before_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = cli_for(dir.path(), &dir.path().join("r.json"));
        cli.harness.clear();
        let err = run_tests(&cli).unwrap_err();
        assert!(err.to_string().contains("harness"), "{err}");
    }
}

//! Worker pool
//!
//! One rayon worker per bucket; within a bucket, tests run in their
//! assigned order. Each test holds its advisory lock for the whole
//! attempt, produces exactly one verdict, and reports exactly one status
//! event no matter which path (server, fallback, fresh) produced it.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use gauntlet_core::{
    Bucket, Expectation, ExecutionResult, Invocation, PassDetail, TestCase, TestExecutor, Verdict,
};
use gauntlet_ipc::{shutdown_requested, StatusEvent, StatusSender};
use gauntlet_report::{TestRecord, TestStatus};
use gauntlet_verify::verify;

use crate::config::RunMode;
use crate::lock::TestLock;
use crate::server_pool::{config_for, server_request, ServerPool};

/// Run-wide knobs shared by every worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Harness command: program plus fixed arguments; the test path is
    /// appended per invocation.
    pub harness: Vec<String>,
    /// Wall-clock budget per invocation.
    pub timeout: Duration,
    /// Invocations per test against one persistent process.
    pub repeat: u32,
    /// Runtime harness or type-checking service.
    pub mode: RunMode,
}

/// Shared collaborators handed to each worker.
pub struct WorkerContext<'a> {
    /// Runs invocations.
    pub executor: &'a dyn TestExecutor,
    /// Reports status events.
    pub status: StatusSender,
    /// Long-lived server instances, when server mode is on.
    pub server: Option<&'a ServerPool>,
    /// Run-wide options.
    pub options: &'a WorkerOptions,
}

/// Run every bucket on its own worker thread and wait for all of them.
pub fn run_buckets(
    buckets: &[Bucket],
    executor: &dyn TestExecutor,
    status: &StatusSender,
    server: Option<&ServerPool>,
    options: &WorkerOptions,
) -> anyhow::Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(buckets.len())
        .thread_name(|i| format!("gauntlet-worker-{i}"))
        .build()?;

    pool.scope(|scope| {
        for bucket in buckets {
            let status = status.clone();
            scope.spawn(move |_| {
                run_bucket(
                    bucket,
                    &WorkerContext {
                        executor,
                        status,
                        server,
                        options,
                    },
                );
            });
        }
    });
    Ok(())
}

/// Run one bucket's tests in order.
pub fn run_bucket(bucket: &Bucket, ctx: &WorkerContext<'_>) {
    debug!(slot = bucket.slot, tests = bucket.tests.len(), "bucket start");
    for test in &bucket.tests {
        if shutdown_requested() {
            return;
        }
        let started_at = Utc::now().timestamp();
        let clock = Instant::now();
        let verdict = run_one(test, ctx);
        let elapsed = clock.elapsed();
        ctx.status
            .send(event_for(test, verdict, started_at, elapsed));
    }
}

fn event_for(
    test: &TestCase,
    verdict: Verdict,
    started_at: i64,
    elapsed: Duration,
) -> StatusEvent {
    let (status, details, kind): (_, _, fn(TestRecord) -> StatusEvent) = match verdict {
        Verdict::Passed(_) => (TestStatus::Passed, None, StatusEvent::TestPassed),
        // Environmental skips were never really candidates for this run;
        // the artifact marks them not_relevant. Skips decided during
        // verification stay skipped.
        Verdict::Skipped(reason) if reason == "skipif" || reason == "server" => {
            (TestStatus::NotRelevant, Some(reason), StatusEvent::TestSkipped)
        }
        Verdict::Skipped(reason) => (TestStatus::Skipped, Some(reason), StatusEvent::TestSkipped),
        Verdict::Failed(diff) => (TestStatus::Failed, Some(diff), StatusEvent::TestFailed),
    };
    kind(TestRecord {
        name: test.name(),
        status,
        start_time: started_at,
        end_time: started_at + elapsed.as_secs() as i64,
        time: elapsed.as_secs_f64(),
        details,
    })
}

/// Produce the verdict for one test. Never panics, never aborts the
/// bucket; every problem becomes a verdict.
fn run_one(test: &TestCase, ctx: &WorkerContext<'_>) -> Verdict {
    // Held until return on every path.
    let _lock = match TestLock::acquire(test.path()) {
        Ok(lock) => lock,
        Err(e) => return Verdict::Failed(format!("Failed to lock test: {e}")),
    };

    if ctx.server.is_some() && test.is_server_incompatible() {
        return Verdict::skipped("server");
    }
    if let Some(program) = test.skipif() {
        if skip_check_fires(program, ctx) {
            return Verdict::skipped("skipif");
        }
    }

    let expectation = match Expectation::load(test.expect_file()) {
        Ok(expectation) => expectation,
        Err(e) => return Verdict::Failed(format!("couldn't read expectation: {e}")),
    };

    if let Some(pool) = ctx.server {
        if let Some(port) = pool.port_for(&config_for(test.path())) {
            let clock = Instant::now();
            match server_request(port, test.path(), ctx.options.timeout) {
                Ok(body) => {
                    let result = ExecutionResult::from_output(body, clock.elapsed());
                    if let Verdict::Passed(_) = verify(&result, &expectation, ctx.options.repeat) {
                        return Verdict::Passed(PassDetail::Server);
                    }
                    debug!(test = %test.name(), "server output mismatched, retrying fresh");
                }
                Err(e) => {
                    debug!(test = %test.name(), error = %e, "server request failed, retrying fresh");
                }
            }
            return fresh_process(test, ctx, &expectation, PassDetail::ServerFallback);
        }
    }

    fresh_process(test, ctx, &expectation, PassDetail::Fresh)
}

/// Run the skip-check program; non-empty output means skip. A check that
/// cannot even launch never blocks the test.
fn skip_check_fires(program: &std::path::Path, ctx: &WorkerContext<'_>) -> bool {
    let mut argv = ctx.options.harness.clone();
    argv.push(program.display().to_string());
    let invocation = Invocation::new(argv).with_timeout(ctx.options.timeout);
    match ctx.executor.execute(&invocation) {
        Ok(result) => !result.stdout.trim().is_empty(),
        Err(e) => {
            debug!(program = %program.display(), error = %e, "skip check failed to run");
            false
        }
    }
}

fn fresh_process(
    test: &TestCase,
    ctx: &WorkerContext<'_>,
    expectation: &Expectation,
    detail_on_pass: PassDetail,
) -> Verdict {
    let mut argv = ctx.options.harness.clone();
    let mut invocation;
    // Keeps the staged directory alive across the invocation.
    let _fixture;
    match ctx.options.mode {
        RunMode::Runtime => {
            argv.push(test.name());
            invocation = Invocation::new(argv);
        }
        // The type-checking service sees a staged copy of the test in a
        // private working directory, addressed by bare file name.
        RunMode::Typechecker => {
            let (dir, file_name) = match stage_fixture(test) {
                Ok(staged) => staged,
                Err(e) => return Verdict::Failed(format!("couldn't stage fixture: {e}")),
            };
            argv.push(file_name);
            invocation = Invocation::new(argv);
            invocation.working_dir = Some(dir.path().to_path_buf());
            _fixture = dir;
        }
    }
    let invocation = invocation.with_timeout(ctx.options.timeout);

    let result = match ctx.executor.execute(&invocation) {
        Ok(result) => result,
        Err(e) => return Verdict::Failed(e.to_string()),
    };
    if result.timed_out {
        return Verdict::Failed(format!(
            "Timed out after {:.0}s",
            ctx.options.timeout.as_secs_f64()
        ));
    }

    match verify(&result, expectation, ctx.options.repeat) {
        Verdict::Passed(_) => Verdict::Passed(detail_on_pass),
        other => other,
    }
}

/// Copy the test file into a fresh private directory and return the
/// directory handle plus the staged file name.
fn stage_fixture(test: &TestCase) -> std::io::Result<(tempfile::TempDir, String)> {
    let dir = tempfile::TempDir::new()?;
    let file_name = test
        .path()
        .file_name()
        .ok_or_else(|| std::io::Error::other("test path has no file name"))?
        .to_string_lossy()
        .into_owned();
    std::fs::copy(test.path(), dir.path().join(&file_name))?;
    Ok((dir, file_name))
}

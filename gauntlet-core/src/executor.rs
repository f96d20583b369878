//! Executor collaborator seam
//!
//! The engine never runs the executable under test directly; it hands an
//! [`Invocation`] to a [`TestExecutor`] and gets back the captured
//! streams, exit status, and timing. The same contract covers the
//! type-checking service variant, which runs against a per-test fixture
//! directory instead of a single file.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default wall-clock timeout for a single invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// One invocation of the executable under test.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Argument list; `argv[0]` is the executable.
    pub argv: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Text fed to the child's stdin, if any.
    pub stdin: Option<String>,
    /// Working directory for the child, if it differs from ours.
    pub working_dir: Option<PathBuf>,
    /// Wall-clock budget; the child process tree is killed on expiry.
    pub timeout: Duration,
}

impl Invocation {
    /// Build an invocation with default timeout and empty environment.
    pub fn new(argv: Vec<String>) -> Self {
        Invocation {
            argv,
            env: Vec::new(),
            stdin: None,
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured outcome of one invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code, `None` when the child died to a signal.
    pub exit_status: Option<i32>,
    /// Elapsed wall-clock time.
    pub wall_time: Duration,
    /// Whether the wall-clock budget expired and the child was killed.
    pub timed_out: bool,
}

impl ExecutionResult {
    /// A synthetic result for output that arrived without a process, such
    /// as a response from a long-lived server instance.
    pub fn from_output(stdout: String, wall_time: Duration) -> Self {
        ExecutionResult {
            stdout,
            stderr: String::new(),
            exit_status: Some(0),
            wall_time,
            timed_out: false,
        }
    }
}

/// Errors an executor can raise. A launch failure is recorded as a Failed
/// verdict by the worker; it never aborts the run.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The child could not be spawned.
    #[error("couldn't invoke {command}: {source}")]
    Launch {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O failed while driving the child.
    #[error("i/o error while running child: {0}")]
    Io(#[from] std::io::Error),
}

/// External collaborator that runs invocations.
pub trait TestExecutor: Send + Sync {
    /// Run one invocation to completion (or timeout) and capture streams.
    fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult, ExecError>;
}

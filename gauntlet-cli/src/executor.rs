//! Process-backed executor
//!
//! Runs one invocation as a child process in its own process group, with
//! core dumps suppressed and a wall-clock budget. On expiry the whole
//! group is killed so a test that forked helpers can't outlive its slot.

use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gauntlet_core::{ExecError, ExecutionResult, Invocation, TestExecutor};

/// Granularity of the child-exit poll.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Spawns a fresh process per invocation.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl TestExecutor for ProcessExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult, ExecError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| ExecError::Launch {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
            })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(invocation.env.iter().cloned())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        // New process group for group-wide kill; no core files from tests
        // that die to signals.
        unsafe {
            command.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                let no_core = libc::rlimit {
                    rlim_cur: 0,
                    rlim_max: 0,
                };
                libc::setrlimit(libc::RLIMIT_CORE, &no_core);
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|source| ExecError::Launch {
            command: invocation.argv.join(" "),
            source,
        })?;

        if let (Some(text), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            // A child that never reads sees EPIPE, not us.
            let _ = stdin.write_all(text.as_bytes());
        }

        let stdout = drain_stream(child.stdout.take());
        let stderr = drain_stream(child.stderr.take());

        let start = Instant::now();
        let (exit_status, timed_out) = wait_with_timeout(&mut child, invocation.timeout)?;
        let wall_time = start.elapsed();

        Ok(ExecutionResult {
            stdout: join_drain(stdout)?,
            stderr: join_drain(stderr)?,
            exit_status,
            wall_time,
            timed_out,
        })
    }
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<(Option<i32>, bool), ExecError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code(), false));
        }
        if Instant::now() >= deadline {
            unsafe {
                libc::killpg(child.id() as libc::pid_t, libc::SIGKILL);
            }
            let status = child.wait()?;
            return Ok((status.code(), true));
        }
        std::thread::sleep(WAIT_POLL);
    }
}

fn drain_stream<R: Read + Send + 'static>(
    stream: Option<R>,
) -> Option<JoinHandle<std::io::Result<String>>> {
    stream.map(|mut stream| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            stream.read_to_string(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_drain(handle: Option<JoinHandle<std::io::Result<String>>>) -> Result<String, ExecError> {
    match handle {
        None => Ok(String::new()),
        Some(handle) => {
            let text = handle
                .join()
                .map_err(|_| std::io::Error::other("output reader thread panicked"))??;
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> Invocation {
        Invocation::new(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ])
    }

    #[test]
    fn captures_stdout_and_exit_status() {
        let result = ProcessExecutor.execute(&sh("echo hello")).unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "");
        assert_eq!(result.exit_status, Some(0));
        assert!(!result.timed_out);
    }

    #[test]
    fn captures_stderr_separately() {
        let result = ProcessExecutor
            .execute(&sh("echo out; echo err 1>&2; exit 3"))
            .unwrap();
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.exit_status, Some(3));
    }

    #[test]
    fn feeds_stdin() {
        let mut invocation = sh("cat");
        invocation.stdin = Some("piped in".to_string());
        let result = ProcessExecutor.execute(&invocation).unwrap();
        assert_eq!(result.stdout, "piped in");
    }

    #[test]
    fn kills_the_process_group_on_timeout() {
        let invocation = sh("sleep 30").with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let result = ProcessExecutor.execute(&invocation).unwrap();
        assert!(result.timed_out);
        // Killed by signal, so no exit code.
        assert_eq!(result.exit_status, None);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn launch_failure_names_the_command() {
        let err = ProcessExecutor
            .execute(&Invocation::new(vec![
                "/nonexistent/gauntlet-harness".to_string()
            ]))
            .unwrap_err();
        assert!(matches!(err, ExecError::Launch { .. }));
        assert!(err.to_string().contains("gauntlet-harness"), "{err}");
    }
}

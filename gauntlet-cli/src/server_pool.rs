//! Server pool manager
//!
//! One long-lived server process per distinct server configuration file.
//! Each instance walks an explicit state machine: Starting → Listening →
//! (Crashed → Starting) | Terminated. The pool owns the OS-level child
//! wait through one monitor thread per instance; a crash mid-run emits
//! `ServerRestarted` and respawns on a freshly probed port, while
//! in-flight tests against the dead instance fail their request and fall
//! back to the fresh-process path.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tracing::{error, info, warn};

use gauntlet_ipc::{StatusEvent, StatusSender};

/// Builds the launch command for a configuration and port.
pub type ServerLauncher = Arc<dyn Fn(&str, u16) -> Command + Send + Sync>;

type ReadinessProbe = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Upper bound on distinct server configurations per run.
pub const MAX_CONFIGS: usize = 30;

/// Random ports probed before giving up.
const PORT_ATTEMPTS: usize = 50;

/// Wall-clock budget for an instance to start listening.
const STARTUP_CEILING: Duration = Duration::from_secs(10);

/// Poll interval during startup.
const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Relaunch attempts tolerated when a server exits nonzero during startup.
const RELAUNCH_ATTEMPTS: usize = 5;

/// Lifecycle of one server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Launched, not yet accepting connections.
    Starting,
    /// Accepting connections.
    Listening,
    /// Died mid-run; a respawn is underway.
    Crashed,
    /// Shut down for good.
    Terminated,
}

/// Fatal pool-level errors; all of them precede any test execution.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no free port found after {} probes", PORT_ATTEMPTS)]
    NoFreePort,

    #[error("too many server configurations: {count} (limit {})", MAX_CONFIGS)]
    TooManyConfigs { count: usize },

    #[error("couldn't launch server for {config}: {source}")]
    Launch {
        config: String,
        source: std::io::Error,
    },

    /// A zero-status exit during startup means the server decided there
    /// was nothing to do; relaunching it would decide the same.
    #[error("server for {config} exited cleanly before listening")]
    PrematureExit { config: String },

    #[error("server for {config} kept exiting during startup")]
    Unstable { config: String },

    #[error("server for {config} did not listen within {ceiling:?}")]
    StartupTimeout { config: String, ceiling: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    port: u16,
    state: ServerState,
}

/// Pool of long-lived server instances, one per configuration.
#[derive(Debug)]
pub struct ServerPool {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    pids: Arc<Mutex<HashMap<String, u32>>>,
    stopping: Arc<AtomicBool>,
    monitors: Vec<JoinHandle<()>>,
}

impl ServerPool {
    /// Launch one instance per configuration and wait for all of them to
    /// listen.
    pub fn start(
        configs: Vec<String>,
        launcher: ServerLauncher,
        status: StatusSender,
    ) -> Result<Self, PoolError> {
        Self::start_tuned(
            configs,
            launcher,
            status,
            STARTUP_CEILING,
            Arc::new(port_accepts),
        )
    }

    fn start_tuned(
        configs: Vec<String>,
        launcher: ServerLauncher,
        status: StatusSender,
        ceiling: Duration,
        probe: ReadinessProbe,
    ) -> Result<Self, PoolError> {
        if configs.len() > MAX_CONFIGS {
            return Err(PoolError::TooManyConfigs {
                count: configs.len(),
            });
        }

        let mut pool = ServerPool {
            entries: Arc::new(RwLock::new(HashMap::new())),
            pids: Arc::new(Mutex::new(HashMap::new())),
            stopping: Arc::new(AtomicBool::new(false)),
            monitors: Vec::with_capacity(configs.len()),
        };

        for config in configs {
            let (child, port) = spawn_listening(&launcher, &config, ceiling, &probe)?;
            info!(%config, port, "server listening");
            pool.entries.write().ignore_poison().insert(
                config.clone(),
                Entry {
                    port,
                    state: ServerState::Listening,
                },
            );
            pool.pids
                .lock()
                .ignore_poison()
                .insert(config.clone(), child.id());

            pool.monitors.push(spawn_monitor(MonitorContext {
                config,
                child,
                launcher: launcher.clone(),
                ceiling,
                probe: probe.clone(),
                entries: pool.entries.clone(),
                pids: pool.pids.clone(),
                stopping: pool.stopping.clone(),
                status: status.clone(),
            }));
        }

        Ok(pool)
    }

    /// A pool whose instances are taken as given, for exercising request
    /// routing without spawning children.
    #[cfg(test)]
    pub(crate) fn listening_on(instances: impl IntoIterator<Item = (String, u16)>) -> Self {
        let entries = instances
            .into_iter()
            .map(|(config, port)| {
                (
                    config,
                    Entry {
                        port,
                        state: ServerState::Listening,
                    },
                )
            })
            .collect();
        ServerPool {
            entries: Arc::new(RwLock::new(entries)),
            pids: Arc::new(Mutex::new(HashMap::new())),
            // Already "stopping": there are no children to tear down.
            stopping: Arc::new(AtomicBool::new(true)),
            monitors: Vec::new(),
        }
    }

    /// Port of the listening instance for `config`, if it is up.
    pub fn port_for(&self, config: &str) -> Option<u16> {
        let entries = self.entries.read().ignore_poison();
        entries
            .get(config)
            .filter(|e| e.state == ServerState::Listening)
            .map(|e| e.port)
    }

    /// Terminate every tracked instance and wait for the monitors.
    pub fn shutdown(&mut self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        for &pid in self.pids.lock().ignore_poison().values() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        for monitor in self.monitors.drain(..) {
            let _ = monitor.join();
        }
    }
}

impl Drop for ServerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct MonitorContext {
    config: String,
    child: Child,
    launcher: ServerLauncher,
    ceiling: Duration,
    probe: ReadinessProbe,
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    pids: Arc<Mutex<HashMap<String, u32>>>,
    stopping: Arc<AtomicBool>,
    status: StatusSender,
}

/// One thread per instance owns the wait. Nobody else may reap the
/// child, so crash detection has exactly one authority.
fn spawn_monitor(mut ctx: MonitorContext) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        let exit = ctx.child.wait();
        if ctx.stopping.load(Ordering::SeqCst) {
            set_state(&ctx.entries, &ctx.config, ServerState::Terminated);
            return;
        }

        warn!(config = %ctx.config, ?exit, "server exited mid-run");
        set_state(&ctx.entries, &ctx.config, ServerState::Crashed);
        ctx.status.send(StatusEvent::ServerRestarted {
            config_id: ctx.config.clone(),
        });

        match spawn_listening(&ctx.launcher, &ctx.config, ctx.ceiling, &ctx.probe) {
            Ok((child, port)) => {
                ctx.entries.write().ignore_poison().insert(
                    ctx.config.clone(),
                    Entry {
                        port,
                        state: ServerState::Listening,
                    },
                );
                ctx.pids
                    .lock()
                    .ignore_poison()
                    .insert(ctx.config.clone(), child.id());
                ctx.child = child;
            }
            Err(e) => {
                error!(config = %ctx.config, error = %e, "couldn't respawn server");
                set_state(&ctx.entries, &ctx.config, ServerState::Terminated);
                return;
            }
        }
    })
}

fn set_state(entries: &RwLock<HashMap<String, Entry>>, config: &str, state: ServerState) {
    if let Some(entry) = entries.write().ignore_poison().get_mut(config) {
        entry.state = state;
    }
}

/// Launch an instance and poll until it listens.
fn spawn_listening(
    launcher: &ServerLauncher,
    config: &str,
    ceiling: Duration,
    probe: &ReadinessProbe,
) -> Result<(Child, u16), PoolError> {
    for _ in 0..RELAUNCH_ATTEMPTS {
        let port = find_open_port().ok_or(PoolError::NoFreePort)?;
        let mut child = launcher(config, port)
            .spawn()
            .map_err(|source| PoolError::Launch {
                config: config.to_string(),
                source,
            })?;

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Err(source) => {
                    return Err(PoolError::Launch {
                        config: config.to_string(),
                        source,
                    })
                }
                Ok(Some(status)) if status.success() => {
                    return Err(PoolError::PrematureExit {
                        config: config.to_string(),
                    });
                }
                // Nonzero startup exit: often a lost port race, so try
                // again on a different port.
                Ok(Some(_)) => break,
                Ok(None) => {}
            }

            if probe(port) {
                return Ok((child, port));
            }
            if start.elapsed() >= ceiling {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PoolError::StartupTimeout {
                    config: config.to_string(),
                    ceiling,
                });
            }
            std::thread::sleep(STARTUP_POLL);
        }
    }
    Err(PoolError::Unstable {
        config: config.to_string(),
    })
}

/// Whether something accepts TCP connections on localhost:`port`.
fn port_accepts(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(100)).is_ok()
}

/// Probe random high ports until one is free.
fn find_open_port() -> Option<u16> {
    let mut rng = rand::thread_rng();
    for _ in 0..PORT_ATTEMPTS {
        let port: u16 = rng.gen_range(1024..=65535);
        if !port_accepts(port) {
            return Some(port);
        }
    }
    None
}

/// Server configuration governing `test`: the nearest `server.toml` in an
/// ancestor directory, or the shared default.
pub fn config_for(test: &Path) -> String {
    let mut dir = test.parent();
    while let Some(d) = dir {
        let candidate = d.join("server.toml");
        if candidate.is_file() {
            return candidate.display().to_string();
        }
        dir = d.parent();
    }
    "default".to_string()
}

/// Ask the instance on `port` to run `test` and return its raw output.
pub fn server_request(port: u16, test: &Path, timeout: Duration) -> reqwest::Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let url = format!("http://127.0.0.1:{port}/{}", test.display());
    client.get(url).send()?.error_for_status()?.text()
}

trait IgnorePoison<T> {
    fn ignore_poison(self) -> T;
}

impl<T> IgnorePoison<T> for Result<T, std::sync::PoisonError<T>> {
    // A poisoned lock means a monitor panicked; the map itself is still
    // usable.
    fn ignore_poison(self) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_ipc::status_channel;

    fn launcher_of(script: &'static str) -> ServerLauncher {
        Arc::new(move |_config, _port| {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(script);
            cmd
        })
    }

    #[test]
    fn open_port_is_actually_free() {
        let port = find_open_port().expect("some high port should be free");
        assert!(!port_accepts(port));
    }

    #[test]
    fn premature_clean_exit_is_fatal() {
        let (tx, _rx) = status_channel();
        let err = ServerPool::start_tuned(
            vec!["default".to_string()],
            launcher_of("exit 0"),
            tx,
            Duration::from_secs(5),
            Arc::new(|_| false),
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::PrematureExit { .. }), "{err}");
    }

    #[test]
    fn startup_ceiling_is_enforced() {
        let (tx, _rx) = status_channel();
        let err = ServerPool::start_tuned(
            vec!["default".to_string()],
            launcher_of("sleep 30"),
            tx,
            Duration::from_millis(200),
            Arc::new(|_| false),
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::StartupTimeout { .. }), "{err}");
    }

    #[test]
    fn config_cap_is_enforced() {
        let (tx, _rx) = status_channel();
        let configs: Vec<String> = (0..MAX_CONFIGS + 1).map(|i| format!("c{i}")).collect();
        let err = ServerPool::start_tuned(
            configs,
            launcher_of("sleep 30"),
            tx,
            Duration::from_secs(1),
            Arc::new(|_| true),
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::TooManyConfigs { count: 31 }), "{err}");
    }

    #[test]
    fn crash_emits_restart_event_and_respawns() {
        let (tx, rx) = status_channel();
        let calls = Arc::new(AtomicBool::new(false));
        let calls2 = calls.clone();
        // First launch dies quickly; the respawn stays up.
        let launcher: ServerLauncher = Arc::new(move |_config, _port| {
            let script = if calls2.swap(true, Ordering::SeqCst) {
                "sleep 30"
            } else {
                "sleep 0.2"
            };
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(script);
            cmd
        });

        let mut pool = ServerPool::start_tuned(
            vec!["default".to_string()],
            launcher,
            tx,
            Duration::from_secs(5),
            Arc::new(|_| true),
        )
        .unwrap();

        let event = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("restart event");
        assert!(
            matches!(event, StatusEvent::ServerRestarted { ref config_id } if config_id == "default")
        );

        // Give the monitor a moment to register the respawn.
        let deadline = Instant::now() + Duration::from_secs(10);
        while pool.port_for("default").is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(pool.port_for("default").is_some());
        pool.shutdown();
    }

    #[test]
    fn config_for_walks_up_to_the_nearest_server_toml() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("suite/nested")).unwrap();
        std::fs::write(root.join("suite/server.toml"), "").unwrap();

        let config = config_for(&root.join("suite/nested/a.t"));
        assert!(config.ends_with("suite/server.toml"), "{config}");

        assert_eq!(config_for(&root.join("elsewhere.t")), "default");
    }
}

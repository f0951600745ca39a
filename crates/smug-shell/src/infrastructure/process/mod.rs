//! Backend child-process supervision.
//!
//! [`Supervisor::spawn`] launches the backend with piped stdout/stderr and
//! starts three background tasks:
//!
//! ```text
//! Supervisor::spawn()
//!  ├─ stdout pump    -- handshake records → ServerHandle
//!  ├─ stderr pump    -- every line logged under the `backend` target
//!  └─ exit watcher   -- waits for the child (or a kill request), then
//!                       marks the handle Exited
//! ```
//!
//! There is no restart policy: once the backend exits it stays down.
//!
//! # Shutdown
//!
//! [`Supervisor::shutdown`] sends exactly one termination request, whatever
//! the current state and however many times it is called, then waits a
//! bounded time for the child to be reaped.  The child is also spawned with
//! `kill_on_drop`, so dropping the supervisor cannot leak the process.
//!
//! On Unix the termination request is `SIGTERM`, so the backend can close its
//! listener cleanly; a backend still running after [`TERMINATE_GRACE`] gets
//! `SIGKILL`.  Other platforms kill immediately.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::application::supervise_server::{pump_stderr, pump_stdout, ServerHandle};

/// How long `shutdown` waits for the child to be reaped.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How long a terminated backend gets to exit before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// How long the exit watcher lets the stdout pump drain after the child exits.
const STDOUT_DRAIN: Duration = Duration::from_secs(1);

/// Error type for backend supervision.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The backend executable could not be started.  Fatal at start-up.
    #[error("failed to spawn backend `{program}`: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The child was started without one of the requested pipes.
    #[error("backend `{program}` has no {stream} pipe")]
    MissingPipe {
        program: PathBuf,
        stream: &'static str,
    },
}

/// How to launch the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl BackendCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Running backend process and its supervision tasks.
pub struct Supervisor {
    handle: Arc<ServerHandle>,
    pid: Option<u32>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    shutdown_started: AtomicBool,
    termination_requests: AtomicUsize,
}

impl Supervisor {
    /// Spawns the backend and starts the stdout, stderr, and exit tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Spawn`] if the process cannot be started.
    pub fn spawn(
        command: &BackendCommand,
        handle: Arc<ServerHandle>,
    ) -> Result<Self, SupervisorError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(
            "spawned backend {} (pid {})",
            command.program.display(),
            pid.map_or_else(|| "?".to_string(), |p| p.to_string())
        );

        let missing = |stream| SupervisorError::MissingPipe {
            program: command.program.clone(),
            stream,
        };
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        // ── Stream pumps ──────────────────────────────────────────────────────
        let stdout_handle = Arc::clone(&handle);
        let stdout_task = tokio::spawn(async move {
            let accepted = pump_stdout(&stdout_handle, stdout).await;
            debug!("backend stdout closed after {accepted} handshake(s)");
        });
        tokio::spawn(pump_stderr(stderr));

        // ── Exit watcher ──────────────────────────────────────────────────────
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let exit_handle = Arc::clone(&handle);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                // A send or a dropped sender both mean "stop the backend".
                _ = kill_rx => terminate(&mut child).await,
            };

            // Let already-written handshake lines land before the terminal state.
            if tokio::time::timeout(STDOUT_DRAIN, stdout_task).await.is_err() {
                debug!("backend stdout still open after exit");
            }

            match status {
                Ok(status) => {
                    let code = status.code();
                    if status.success() {
                        info!("backend exited with code 0");
                    } else {
                        warn!("backend exited with {status}");
                    }
                    exit_handle.mark_exited(code);
                }
                Err(e) => {
                    error!("failed to wait for backend: {e}");
                    exit_handle.mark_exited(None);
                }
            }
        });

        Ok(Self {
            handle,
            pid,
            kill_tx: Mutex::new(Some(kill_tx)),
            shutdown_started: AtomicBool::new(false),
            termination_requests: AtomicUsize::new(0),
        })
    }

    /// Shared backend handle.
    pub fn handle(&self) -> &Arc<ServerHandle> {
        &self.handle
    }

    /// OS process id, if the child was still running right after spawn.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Number of termination requests sent so far (0 or 1).
    pub fn termination_requests(&self) -> usize {
        self.termination_requests.load(Ordering::SeqCst)
    }

    /// Terminates the backend and waits up to [`SHUTDOWN_GRACE`] for it to
    /// be reaped.
    ///
    /// Returns `true` for the call that sent the termination request and
    /// `false` for every later call.
    pub async fn shutdown(&self) -> bool {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let kill_tx = self
            .kill_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = kill_tx {
            self.termination_requests.fetch_add(1, Ordering::SeqCst);
            // The watcher may already be gone if the backend exited first.
            if tx.send(()).is_err() {
                debug!("backend had already exited before shutdown");
            }
        }

        let mut state = self.handle.subscribe();
        let reaped = tokio::time::timeout(SHUTDOWN_GRACE, state.wait_for(|s| s.is_terminal()))
            .await
            .is_ok();
        if reaped {
            info!("backend stopped");
        } else {
            warn!(
                "backend not reaped within {} s",
                SHUTDOWN_GRACE.as_secs()
            );
        }
        true
    }
}

/// Asks the child to exit, then kills it if it is still running after
/// [`TERMINATE_GRACE`].
async fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    if request_exit(child) {
        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(status) => return status,
            Err(_) => warn!(
                "backend still running {} s after SIGTERM; killing",
                TERMINATE_GRACE.as_secs()
            ),
        }
    }
    if let Err(e) = child.start_kill() {
        debug!("backend already gone when killed: {e}");
    }
    child.wait().await
}

#[cfg(unix)]
fn request_exit(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            debug!("could not send SIGTERM to backend: {e}");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_exit(_child: &Child) -> bool {
    false
}

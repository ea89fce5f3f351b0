//! # Wrapper around a single spawned OS process.
//!
//! [`ChildProcess`] owns one child from spawn to termination. A monitor task waits
//! for the exit status and latches the terminal outcome exactly once; every
//! [`listen`](ChildProcess::listen) and [`kill`](ChildProcess::kill) caller observes
//! that same value.
//!
//! ## Architecture
//! ```text
//! spawn() ──► tokio::process::Command ──► monitor task
//!                                            │
//!               kill() ── kill request ──────┤ select! {
//!                                            │   child.wait()   → Ok(ChildOutput)
//!                                            │   kill request   → SIGTERM (error → Err(Kill))
//!                                            │ }
//!                                            ▼
//!                               watch latch: Option<Result<ChildOutput, ProcessError>>
//!                                            │
//!                      listen() / kill() ◄───┘ (wait_for is_some, clone)
//! ```
//!
//! ## Rules
//! - The outcome is produced **once**, by whichever of "killed" or "exited" is observed first.
//! - `kill()` after the outcome is latched fails with [`ProcessError::AlreadyExited`].
//! - Lifecycle milestones are published on the [`Bus`].

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

use crate::config::{StdioMode, WorkerConfig};
use crate::error::ProcessError;
use crate::events::{Bus, Event, EventKind};

type Outcome = Result<ChildOutput, ProcessError>;

/// Terminal status of a finished child process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChildOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Name of the terminating signal (`SIGTERM`, `SIGKILL`, ...).
    pub signal: Option<String>,
}

impl ChildOutput {
    fn from_status(status: ExitStatus) -> Self {
        Self {
            exit_code: status.code(),
            signal: signal_name(status),
        }
    }

    /// True when the process exited on its own with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && self.signal.is_none()
    }
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> Option<String> {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|raw| match Signal::try_from(raw) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("signal {raw}"),
    })
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> Option<String> {
    None
}

/// Sends the termination signal to `child`.
#[cfg(unix)]
fn terminate(_child: &mut Child, pid: u32) -> Result<(), String> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|e| e.to_string())?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: u32) -> Result<(), String> {
    child.start_kill().map_err(|e| e.to_string())
}

/// One spawned OS process.
pub struct ChildProcess {
    pid: u32,
    name: Arc<str>,
    bus: Bus,
    kill_tx: mpsc::UnboundedSender<()>,
    outcome: watch::Receiver<Option<Outcome>>,
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl ChildProcess {
    /// Launches a process per `config` and starts monitoring it.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// [`ProcessError::Spawn`] if the OS refuses to create the process or no pid is available.
    pub fn spawn(config: &WorkerConfig, bus: Bus) -> Result<Self, ProcessError> {
        let name: Arc<str> = Arc::from(config.name.as_str());
        let (program, args) = config.command_line();

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(&config.env)
            .stdin(Stdio::null())
            .kill_on_drop(false);
        match config.stdio {
            StdioMode::Inherit => cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
            StdioMode::Null => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
        };
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let spawned = cmd.spawn().map_err(|e| ProcessError::Spawn {
            error: format!("{program}: {e}"),
        });
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                bus.publish(
                    Event::new(EventKind::ChildError)
                        .with_source(Arc::clone(&name))
                        .with_reason(e.to_string()),
                );
                return Err(e);
            }
        };
        let pid = child.id().ok_or_else(|| ProcessError::Spawn {
            error: "failed to get process ID".to_string(),
        })?;

        bus.publish(
            Event::new(EventKind::ChildSpawned)
                .with_source(Arc::clone(&name))
                .with_pid(pid),
        );

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome) = watch::channel(None);
        tokio::spawn(monitor(
            child,
            pid,
            Arc::clone(&name),
            bus.clone(),
            kill_rx,
            outcome_tx,
        ));

        Ok(Self {
            pid,
            name,
            bus,
            kill_tx,
            outcome,
        })
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True once the terminal outcome has been latched.
    pub fn has_exited(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Sends a termination signal and waits for the process to exit.
    ///
    /// # Errors
    /// - [`ProcessError::AlreadyExited`] if the child already terminated.
    /// - [`ProcessError::Kill`] if the signal could not be delivered.
    pub async fn kill(&self) -> Result<ChildOutput, ProcessError> {
        if self.has_exited() {
            return Err(ProcessError::AlreadyExited { pid: self.pid });
        }
        self.bus.publish(
            Event::new(EventKind::ChildKillRequested)
                .with_source(Arc::clone(&self.name))
                .with_pid(self.pid),
        );
        // The monitor only stops after latching an outcome, which listen() returns.
        let _ = self.kill_tx.send(());
        self.listen().await
    }

    /// Resolves with the terminal outcome, whatever caused it.
    ///
    /// Can be called any number of times; every call returns the same value.
    pub async fn listen(&self) -> Result<ChildOutput, ProcessError> {
        let mut rx = self.outcome.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(latched) => latched.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(ProcessError::Wait {
                pid: self.pid,
                error: "exit monitor stopped".to_string(),
            })
        })
    }
}

/// Waits for the child to exit, serving kill requests meanwhile, then latches the outcome.
async fn monitor(
    mut child: Child,
    pid: u32,
    name: Arc<str>,
    bus: Bus,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
    outcome_tx: watch::Sender<Option<Outcome>>,
) {
    let outcome = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map(ChildOutput::from_status).map_err(|e| ProcessError::Wait {
                    pid,
                    error: e.to_string(),
                });
            }
            Some(()) = kill_rx.recv() => {
                if let Err(error) = terminate(&mut child, pid) {
                    break Err(ProcessError::Kill { pid, error });
                }
            }
        }
    };

    let ev = match &outcome {
        Ok(out) => Event::new(EventKind::ChildExited)
            .with_exit_code(out.exit_code)
            .with_signal(out.signal.as_deref()),
        Err(e) => Event::new(EventKind::ChildError).with_reason(e.to_string()),
    };
    bus.publish(ev.with_source(name).with_pid(pid));
    outcome_tx.send_replace(Some(outcome));
}

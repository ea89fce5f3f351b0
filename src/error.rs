//! Error types used by workers, child processes and tunnel supervisors.
//!
//! This module defines three error enums:
//!
//! - [`ProcessError`]: failures of a single OS child process (spawn, signal, wait).
//! - [`WorkerError`]: usage and lifecycle failures of a [`Worker`](crate::Worker).
//! - [`TunnelError`]: connection and usage failures of a [`TunnelSupervisor`](crate::TunnelSupervisor).
//!
//! All types provide `as_label` (stable snake_case label) for logs/metrics.

use thiserror::Error;

use crate::tunnel::ReconnectionTrigger;
use crate::worker::WorkerStatus;

/// # Errors produced by a single child process.
///
/// Messages are stored as strings so the error can be cloned into every
/// observer of the terminal outcome.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The OS refused to create the process.
    #[error("failed to spawn process: {error}")]
    Spawn {
        /// The underlying error message.
        error: String,
    },

    /// The termination signal could not be delivered.
    #[error("failed to kill process {pid}: {error}")]
    Kill {
        /// OS process id.
        pid: u32,
        /// The underlying error message.
        error: String,
    },

    /// Waiting for the process exit status failed.
    #[error("failed to wait for process {pid}: {error}")]
    Wait {
        /// OS process id.
        pid: u32,
        /// The underlying error message.
        error: String,
    },

    /// `kill()` was called on a child that already exited.
    #[error("process {pid} already exited")]
    AlreadyExited {
        /// OS process id.
        pid: u32,
    },

    /// A reload was dropped before its new child went live.
    #[error("reload cancelled before the new process started (previous pid: {previous:?})")]
    Cancelled {
        /// Child that was being replaced; it may still be running.
        previous: Option<u32>,
    },
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::ProcessError;
    ///
    /// let err = ProcessError::AlreadyExited { pid: 42 };
    /// assert_eq!(err.as_label(), "process_already_exited");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Spawn { .. } => "process_spawn_failed",
            ProcessError::Kill { .. } => "process_kill_failed",
            ProcessError::Wait { .. } => "process_wait_failed",
            ProcessError::AlreadyExited { .. } => "process_already_exited",
            ProcessError::Cancelled { .. } => "process_reload_cancelled",
        }
    }
}

/// # Errors produced by a [`Worker`](crate::Worker).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// `kill()` requires a live child.
    #[error("worker is not live (status: {status})")]
    NotLive {
        /// Status observed when the call was made.
        status: WorkerStatus,
    },

    /// The child process failed (spawn, signal delivery or exit detection).
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::NotLive { .. } => "worker_not_live",
            WorkerError::Process(e) => e.as_label(),
        }
    }
}

/// # Errors produced by a [`TunnelSupervisor`](crate::TunnelSupervisor) and tunnel transports.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    /// The supervisor was already closed.
    #[error("tunnel supervisor is closed")]
    Closed,

    /// `start()` was called twice.
    #[error("tunnel supervisor already started")]
    AlreadyStarted,

    /// The tunnel URL cannot be used by the transport.
    #[error("invalid tunnel url {url}: {error}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        error: String,
    },

    /// The transport could not establish a connection.
    #[error("could not connect tunnel: {error}")]
    Connect {
        /// The underlying error message.
        error: String,
    },

    /// A reconnection attempt failed; the supervisor gave up.
    #[error("tunnel reconnection failed after {}: {error}", trigger.reason())]
    ReconnectionFailed {
        /// Event that provoked the failed attempt.
        trigger: ReconnectionTrigger,
        /// The connection error of the failed attempt.
        error: String,
    },
}

impl TunnelError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::TunnelError;
    ///
    /// assert_eq!(TunnelError::Closed.as_label(), "tunnel_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TunnelError::Closed => "tunnel_closed",
            TunnelError::AlreadyStarted => "tunnel_already_started",
            TunnelError::InvalidUrl { .. } => "tunnel_invalid_url",
            TunnelError::Connect { .. } => "tunnel_connect_failed",
            TunnelError::ReconnectionFailed { .. } => "tunnel_reconnection_failed",
        }
    }
}

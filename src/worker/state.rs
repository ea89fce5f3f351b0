//! # Worker lifecycle states.
//!
//! ```text
//!   Dead ──reload()──► Reloading ──spawned──► Live ──kill()──► Killing ──exit──► Dead{murdered: true}
//!     ▲                   │  ▲                 │ └──natural exit──────────────► Dead{murdered: false}
//!     │                   │  └─reload()────────┘ └──listen() error───────────► Errored
//!     │                   └──spawn failed──────────────────────────────────────► Errored
//! ```
//!
//! Legality is not enforced: any state may overwrite any other. The diagram shows
//! the transitions [`Worker`](crate::Worker) actually performs.

use std::fmt;
use std::sync::Arc;

use crate::error::ProcessError;
use crate::worker::child::ChildProcess;

/// Payload-free discriminant of [`WorkerState`], used to key listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    Errored,
    Dead,
    Killing,
    Reloading,
    Live,
}

impl WorkerStatus {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            WorkerStatus::Errored => "errored",
            WorkerStatus::Dead => "dead",
            WorkerStatus::Killing => "killing",
            WorkerStatus::Reloading => "reloading",
            WorkerStatus::Live => "live",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Current lifecycle state of a worker slot.
#[derive(Clone, Debug)]
pub enum WorkerState {
    /// Spawn failed, a signal could not be delivered, or exit detection failed.
    Errored { thrown: ProcessError },
    /// The child exited; `murdered` is `true` when the exit was caused by `kill()`.
    Dead { murdered: bool },
    /// A kill was requested; exit not yet observed.
    Killing,
    /// A new spawn is in flight; any previous child is being killed.
    Reloading,
    /// A child process is active and monitored.
    Live { child: Arc<ChildProcess> },
}

impl WorkerState {
    /// Discriminant of this state.
    pub fn status(&self) -> WorkerStatus {
        match self {
            WorkerState::Errored { .. } => WorkerStatus::Errored,
            WorkerState::Dead { .. } => WorkerStatus::Dead,
            WorkerState::Killing => WorkerStatus::Killing,
            WorkerState::Reloading => WorkerStatus::Reloading,
            WorkerState::Live { .. } => WorkerStatus::Live,
        }
    }

    #[inline]
    pub fn is(&self, status: WorkerStatus) -> bool {
        self.status() == status
    }
}

impl Default for WorkerState {
    /// A worker that never ran is dead, not murdered.
    fn default() -> Self {
        WorkerState::Dead { murdered: false }
    }
}

//! # Runtime events emitted by workers, child processes and tunnel supervisors.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker events**: state transitions and reload bookkeeping
//! - **Child events**: OS process milestones (spawned, kill requested, exited, error)
//! - **Tunnel events**: connection lifecycle of a [`TunnelSupervisor`](crate::TunnelSupervisor)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, source name,
//! process id, exit status and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ChildExited)
//!     .with_source("bot")
//!     .with_pid(4242)
//!     .with_exit_code(Some(0));
//!
//! assert_eq!(ev.kind, EventKind::ChildExited);
//! assert_eq!(ev.source.as_deref(), Some("bot"));
//! assert_eq!(ev.exit_code, Some(0));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Worker events ===
    /// Worker entered a new state.
    ///
    /// Sets:
    /// - `source`: worker name
    /// - `reason`: status label (`live`, `dead`, ...)
    WorkerStateChanged,

    /// `reload()` was called while another reload was in flight and was dropped.
    ///
    /// Sets:
    /// - `source`: worker name
    ReloadSkipped,

    /// Child died on its own while the worker was configured to hang on exit.
    ///
    /// Sets:
    /// - `source`: worker name
    WorkerExitedUnexpectedly,

    // === Child process events ===
    /// Child process was created by the OS.
    ///
    /// Sets:
    /// - `source`: worker name
    /// - `pid`: OS process id
    ChildSpawned,

    /// Termination signal is being sent to the child.
    ///
    /// Sets:
    /// - `source`: worker name
    /// - `pid`: OS process id
    ChildKillRequested,

    /// Child process terminated.
    ///
    /// Sets:
    /// - `source`: worker name
    /// - `pid`: OS process id
    /// - `exit_code` / `signal`: terminal status
    ChildExited,

    /// Child process could not be spawned, signalled or waited on.
    ///
    /// Sets:
    /// - `source`: worker name
    /// - `pid`: OS process id (when known)
    /// - `reason`: error message
    ChildError,

    // === Tunnel events ===
    /// A connection attempt following a transport error/close is starting.
    ///
    /// Never published for the initial connection.
    ///
    /// Sets:
    /// - `source`: tunnel id
    /// - `reason`: human-readable trigger
    TunnelReconnecting,

    /// Tunnel connection established.
    ///
    /// Sets:
    /// - `source`: tunnel id
    TunnelConnected,

    /// Connection attempt failed.
    ///
    /// Sets:
    /// - `source`: tunnel id
    /// - `reason`: error message
    TunnelConnectionFailed,

    /// Supervisor closed by its owner.
    ///
    /// Sets:
    /// - `source`: tunnel id
    TunnelClosed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker name, tunnel id or subscriber name.
    pub source: Option<Arc<str>>,
    /// OS process id.
    pub pid: Option<u32>,
    /// Exit code of a terminated child.
    pub exit_code: Option<i32>,
    /// Signal name that terminated a child.
    pub signal: Option<Arc<str>>,
    /// Human-readable reason (errors, status labels, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            source: None,
            pid: None,
            exit_code: None,
            signal: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a source name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches an OS process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Attaches a terminating signal name.
    #[inline]
    pub fn with_signal(mut self, signal: Option<&str>) -> Self {
        self.signal = signal.map(Arc::from);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

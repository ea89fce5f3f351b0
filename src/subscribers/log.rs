//! # LogWriter: tracing-backed event renderer
//!
//! A subscriber that renders incoming [`Event`]s through `tracing`, so the host
//! application decides where lifecycle logs go (install any `tracing` subscriber).
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG procvisor: child spawned source="bot" pid=4242
//! DEBUG procvisor: worker state changed source="bot" status="live"
//!  INFO procvisor: reconnecting tunnel source="6c1e..." reason="tunnel closed (code 1006)"
//!  WARN procvisor: tunnel connection failed source="6c1e..." reason="connection refused"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let source = e.source.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::WorkerStateChanged => {
                debug!(target: "procvisor", source, status = reason, "worker state changed");
            }
            EventKind::ReloadSkipped => {
                debug!(target: "procvisor", source, "reload already in progress");
            }
            EventKind::WorkerExitedUnexpectedly => {
                warn!(target: "procvisor", source, "worker exited unexpectedly");
            }
            EventKind::ChildSpawned => {
                debug!(target: "procvisor", source, pid = ?e.pid, "child spawned");
            }
            EventKind::ChildKillRequested => {
                debug!(target: "procvisor", source, pid = ?e.pid, "killing child");
            }
            EventKind::ChildExited => {
                debug!(
                    target: "procvisor",
                    source,
                    pid = ?e.pid,
                    exit_code = ?e.exit_code,
                    signal = ?e.signal,
                    "child exited"
                );
            }
            EventKind::ChildError => {
                error!(target: "procvisor", source, pid = ?e.pid, reason, "child error");
            }
            EventKind::TunnelReconnecting => {
                info!(target: "procvisor", source, reason, "reconnecting tunnel");
            }
            EventKind::TunnelConnected => {
                debug!(target: "procvisor", source, "tunnel connected");
            }
            EventKind::TunnelConnectionFailed => {
                warn!(target: "procvisor", source, reason, "tunnel connection failed");
            }
            EventKind::TunnelClosed => {
                debug!(target: "procvisor", source, "tunnel closed");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "procvisor", subscriber = source, reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                error!(target: "procvisor", subscriber = source, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

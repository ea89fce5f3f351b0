//! # procvisor
//!
//! **Procvisor** supervises the moving parts of a local development server: one
//! reloadable worker process and one reconnecting reverse tunnel.
//!
//! It provides primitives to spawn, kill and reload an OS child process behind an
//! explicit state machine, and to keep a tunnel connected with exactly one
//! reconnection attempt per transport failure.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   WorkerConfig                                   TunnelConfig + Connector
//!        │                                                   │
//!        ▼                                                   ▼
//! ┌───────────────────────────────┐            ┌───────────────────────────────┐
//! │ Worker                        │            │ TunnelSupervisor              │
//! │ - WorkerStateObserver         │            │ - current Tunnel              │
//! │   (state + listeners)         │            │ - watcher task per tunnel     │
//! │ - generation counter          │            │ - settled latch for wait()    │
//! └──────┬────────────────────────┘            └──────┬────────────────────────┘
//!        │ owns 0..1                                  │ Publishes:
//!        ▼                                            │ - TunnelReconnecting
//! ┌───────────────────────────────┐                   │ - TunnelConnected
//! │ ChildProcess                  │                   │ - TunnelConnectionFailed
//! │ - monitor task (wait / kill)  │                   │ - TunnelClosed
//! │ - watch latch (exit outcome)  │                   │
//! └──────┬────────────────────────┘                   │
//!        │ Publishes: ChildSpawned, ChildExited,      │
//!        │ WorkerStateChanged, ...                    │
//!        ▼                                            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼ Bus::attach
//!                            SubscriberSet (per-sub queues)
//!                          ┌─────────┼─────────┐
//!                          ▼         ▼         ▼
//!                      LogWriter   sub2      subN
//! ```
//!
//! ### Worker lifecycle
//! ```text
//!            reload()                 child exits
//!  Dead ───────────────► Reloading ──► Live ─────────────► Dead{murdered: false}
//!   ▲                        │          │ kill()
//!   │                        │ spawn    ▼
//!   │                        │ error   Killing ──exit──► Dead{murdered: true}
//!   │                        ▼
//!   └──── reload() ────── Errored
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Workers**       | Kill/reload/wait over one child process.                     | [`Worker`], [`WorkerState`]                 |
//! | **Observation**   | Per-status listeners with replay.                            | [`WorkerStateObserver`]                     |
//! | **Processes**     | Spawn with latched exit outcome.                             | [`ChildProcess`], [`ChildOutput`]           |
//! | **Tunnels**       | One reconnection per transport failure.                      | [`TunnelSupervisor`], [`Connector`]         |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom).       | [`Subscribe`], [`SubscriberSet`], [`Bus`]   |
//! | **Errors**        | Typed errors with stable labels.                             | [`ProcessError`], [`WorkerError`], [`TunnelError`] |
//! | **Configuration** | What to spawn and where to connect.                          | [`WorkerConfig`], [`TunnelConfig`]          |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], rendering events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use procvisor::{Bus, ExecTarget, Interpreter, SubscriberSet, Worker, WorkerConfig, WorkerProps};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Bus::default();
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn procvisor::Subscribe>> = vec![Arc::new(procvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn procvisor::Subscribe>> = Vec::new();
//!     let stop = CancellationToken::new();
//!     bus.attach(Arc::new(SubscriberSet::new(subs, bus.clone())), stop.clone());
//!
//!     let cfg = WorkerConfig::new("bot", ExecTarget::code(Interpreter::shell(), "sleep 1"));
//!     let worker = Worker::spawn(cfg, bus, WorkerProps::default()).await?;
//!
//!     worker.reload().await?;
//!     worker.wait().await?;
//!     stop.cancel();
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod role;
mod subscribers;
mod tunnel;
mod worker;

// ---- Public re-exports ----

pub use config::{
    DEFAULT_HELLO_INTERVAL, ExecTarget, Interpreter, StdioMode, TunnelConfig, WorkerConfig,
    WorkerProps,
};
pub use error::{ProcessError, TunnelError, WorkerError};
pub use events::{Bus, DEFAULT_BUS_CAPACITY, Event, EventKind};
pub use role::ProcessRole;
pub use subscribers::{Subscribe, SubscriberSet};
pub use tunnel::{
    Connection, Connector, ReconnectionTrigger, SupervisorEvent, TcpConnector, TransportEvent,
    Tunnel, TunnelSupervisor,
};
pub use worker::{
    ChildOutput, ChildProcess, Listener, ListenerId, Worker, WorkerState, WorkerStateObserver,
    WorkerStatus,
};

// Built-in `tracing` renderer for lifecycle events.
// Disable with: `--no-default-features`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

//! Worker process supervision.
//!
//! Internal modules:
//! - [`state`]: `WorkerState` / `WorkerStatus` data model;
//! - [`observer`]: state holder with per-status listeners and replay;
//! - [`child`]: wrapper around one spawned OS process with a latched exit outcome;
//! - [`worker`]: kill/reload/wait orchestration over the two above.

mod child;
mod observer;
mod state;
#[allow(clippy::module_inception)]
mod worker;

pub use child::{ChildOutput, ChildProcess};
pub use observer::{Listener, ListenerId, WorkerStateObserver};
pub use state::{WorkerState, WorkerStatus};
pub use worker::Worker;

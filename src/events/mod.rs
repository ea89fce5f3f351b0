//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to diagnostic events emitted by workers, child processes
//! and tunnel supervisors.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Worker`, `ChildProcess` monitors, `TunnelSupervisor`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Bus::attach` (fans out to a `SubscriberSet`) or any
//!   receiver obtained with `Bus::subscribe`.

mod bus;
mod event;

pub use bus::{Bus, DEFAULT_BUS_CAPACITY};
pub use event::{Event, EventKind};

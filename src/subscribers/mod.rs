//! # Event subscribers for the procvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`] for handling events broadcast through the
//! [`Bus`](crate::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Worker / ChildProcess / TunnelSupervisor ── publish(Event) ──► Bus
//!                                                                   │
//!                                                     Bus::attach(SubscriberSet)
//!                                                                   │
//!                                                   ┌───────────────┼───────────┐
//!                                                   ▼               ▼           ▼
//!                                               LogWriter        Metrics      Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;

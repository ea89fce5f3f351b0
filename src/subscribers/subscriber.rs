//! # Subscriber extension point.
//!
//! Implement [`Subscribe`] to react to worker, child-process and tunnel events
//! (render logs, count restarts, forward to a dashboard). Register subscribers
//! with a [`SubscriberSet`](crate::SubscriberSet) and connect the set with
//! [`Bus::attach`](crate::Bus::attach).
//!
//! Handlers run on the subscriber's own task, never on the publisher's, and a
//! panic inside a handler is reported as `SubscriberPanicked` instead of
//! tearing anything down.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use procvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct Restarts(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for Restarts {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ChildSpawned {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "restarts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of runtime events.
///
/// Handlers should not block the executor; a slow handler only backs up its own queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name reported in `SubscriberOverflow`/`SubscriberPanicked` events.
    ///
    /// Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue length before events are dropped for this subscriber (min 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

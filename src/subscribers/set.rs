//! # Fan-out of lifecycle events to subscribers.
//!
//! [`SubscriberSet`] hands every event to each registered [`Subscribe`] through its
//! own bounded queue and worker task, so a slow log sink never delays a worker
//! state transition or a tunnel reconnection.
//!
//! ```text
//! emit(event) ─┬─► [queue: log]     ─► task ─► LogWriter::on_event
//!              ├─► [queue: metrics] ─► task ─► Metrics::on_event
//!              └─► ...                  └─► panic → SubscriberPanicked on the bus
//! ```
//!
//! ## Rules
//! - `emit()` never waits: a full or closed queue drops the event for that
//!   subscriber, counts it, and publishes `SubscriberOverflow`.
//! - Each subscriber sees events in emission order; there is no ordering across subscribers.
//! - A panicking subscriber keeps receiving subsequent events.
//! - Panics on a `SubscriberPanicked` notice are swallowed, so a set attached to
//!   its own bus cannot feed itself.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Slot {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Subscribers with per-subscriber queues.
pub struct SubscriberSet {
    slots: Vec<Slot>,
    tasks: Vec<JoinHandle<()>>,
    bus: Bus,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drains `rx` into `sub`, reporting panics on `bus`.
///
/// A panic while handling a `SubscriberPanicked` notice is not reported again.
async fn run_subscriber(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            if ev.is_subscriber_panic() {
                continue;
            }
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
        }
    }
}

impl SubscriberSet {
    /// Starts one task per subscriber. Panics and overflows are reported on `bus`.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (slots, tasks) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let slot = Slot {
                    name: sub.name(),
                    tx,
                    dropped: AtomicU64::new(0),
                };
                (slot, tokio::spawn(run_subscriber(sub, rx, bus.clone())))
            })
            .unzip();
        Self { slots, tasks, bus }
    }

    /// Queues a copy of `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues a shared event for every subscriber.
    ///
    /// Dropping an overflow notice does not produce another one.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for slot in &self.slots {
            let reason = match slot.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            slot.dropped.fetch_add(1, Ordering::Relaxed);
            if event.kind != EventKind::SubscriberOverflow {
                self.bus.publish(Event::subscriber_overflow(slot.name, reason));
            }
        }
    }

    /// Number of events dropped for the subscriber called `name` (0 if unknown).
    pub fn dropped(&self, name: &str) -> u64 {
        self.slots
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.dropped.load(Ordering::Relaxed))
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Closes every queue and waits until already queued events are handled.
    pub async fn shutdown(self) {
        drop(self.slots);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

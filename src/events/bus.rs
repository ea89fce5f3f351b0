//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (workers, child monitors,
//! tunnel supervisors).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                  Consumer:
//!   Worker        ──┐
//!   ChildProcess  ──┼──────► Bus ───────► attach() listener ────► SubscriberSet
//!   TunnelSupervisor┘  (broadcast chan)    (until token cancelled)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::event::Event;
use crate::subscribers::SubscriberSet;

/// Default ring buffer size used by [`Bus::default`].
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel for runtime events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately (send clones internally).
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Forwards every subsequent event to `set` until `token` is cancelled.
    ///
    /// The set keeps a clone of the bus for its own reports, so the channel never
    /// closes while the set is alive; cancel `token` to stop forwarding. Once the
    /// returned task has finished it no longer holds `set`, and the caller's
    /// `Arc` can be unwrapped for [`SubscriberSet::shutdown`].
    ///
    /// Lagged receivers skip the missed events and keep forwarding.
    pub fn attach(&self, set: Arc<SubscriberSet>, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<EventKind>);

    #[async_trait]
    impl Subscribe for Forward {
        async fn on_event(&self, event: &Event) {
            let _ = self.0.send(event.kind);
        }
    }

    #[test]
    fn test_capacity_is_clamped() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TunnelClosed));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::TunnelClosed);
    }

    /// Counts every call and always panics.
    struct Faulty(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Faulty {
        async fn on_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
            panic!("faulty");
        }
    }

    #[tokio::test]
    async fn test_attach_forwards_to_set() {
        let bus = Bus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let set = Arc::new(SubscriberSet::new(vec![Arc::new(Forward(tx))], bus.clone()));
        let _listener = bus.attach(set, CancellationToken::new());

        bus.publish(Event::new(EventKind::ChildSpawned));
        assert_eq!(rx.recv().await, Some(EventKind::ChildSpawned));
    }

    #[tokio::test]
    async fn test_attached_panicking_subscriber_does_not_loop() {
        let bus = Bus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let set = Arc::new(SubscriberSet::new(
            vec![Arc::new(Faulty(calls.clone()))],
            bus.clone(),
        ));
        let _listener = bus.attach(set, CancellationToken::new());

        bus.publish(Event::new(EventKind::TunnelConnected));
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The event itself, then the single panic notice it produced.
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_forwarding_and_releases_set() {
        let bus = Bus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let set = Arc::new(SubscriberSet::new(vec![Arc::new(Forward(tx))], bus.clone()));
        let token = CancellationToken::new();
        let listener = bus.attach(Arc::clone(&set), token.clone());

        bus.publish(Event::new(EventKind::ChildSpawned));
        assert_eq!(rx.recv().await, Some(EventKind::ChildSpawned));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
        bus.publish(Event::new(EventKind::ChildExited));

        let Ok(set) = Arc::try_unwrap(set) else {
            panic!("listener still holds the set");
        };
        set.shutdown().await;
        assert_eq!(rx.recv().await, None);
    }
}

//! # Typed state holder with per-status listeners.
//!
//! [`WorkerStateObserver`] keeps the current [`WorkerState`] and notifies listeners
//! registered for the status being entered.
//!
//! ## Rules
//! - **Replay**: `on(status, h)` calls `h` before returning if the observer is already in `status`.
//! - **No dedup**: setting the same status twice fires its listeners twice.
//! - **Order**: listeners run synchronously, in registration order, on the setting thread.
//! - **Serialized transitions**: `set`/`transition`/`on` hold a transition lock while
//!   dispatching, so two transitions never interleave.
//!
//! Handlers may call [`get`](WorkerStateObserver::get) and
//! [`off`](WorkerStateObserver::off) but must not call `set`, `transition` or `on`
//! (the transition lock is not reentrant).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use procvisor::{WorkerState, WorkerStateObserver, WorkerStatus};
//!
//! let observer = WorkerStateObserver::new(WorkerState::Dead { murdered: false });
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let h = hits.clone();
//! observer.on(WorkerStatus::Dead, move |_| { h.fetch_add(1, Ordering::SeqCst); });
//! assert_eq!(hits.load(Ordering::SeqCst), 1); // replayed
//!
//! observer.set(WorkerState::Dead { murdered: true });
//! assert_eq!(hits.load(Ordering::SeqCst), 2);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::worker::state::{WorkerState, WorkerStatus};

/// Shared listener callback.
pub type Listener = Arc<dyn Fn(&WorkerState) + Send + Sync>;

/// Handle returned by [`WorkerStateObserver::on`], used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Cell {
    state: WorkerState,
    listeners: HashMap<WorkerStatus, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl Cell {
    fn listeners_for(&self, status: WorkerStatus) -> Vec<Listener> {
        self.listeners
            .get(&status)
            .map(|ls| ls.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

struct Shared {
    cell: Mutex<Cell>,
    transitions: Mutex<()>,
}

/// Current worker state plus per-status listeners.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct WorkerStateObserver {
    shared: Arc<Shared>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkerStateObserver {
    /// Creates an observer in `initial` state with no listeners.
    pub fn new(initial: WorkerState) -> Self {
        Self {
            shared: Arc::new(Shared {
                cell: Mutex::new(Cell {
                    state: initial,
                    listeners: HashMap::new(),
                    next_id: 0,
                }),
                transitions: Mutex::new(()),
            }),
        }
    }

    /// Returns a snapshot of the current state.
    pub fn get(&self) -> WorkerState {
        lock(&self.shared.cell).state.clone()
    }

    /// Returns the current status.
    pub fn status(&self) -> WorkerStatus {
        lock(&self.shared.cell).state.status()
    }

    /// Replaces the state unconditionally and notifies listeners of the new status.
    pub fn set(&self, state: WorkerState) {
        let _ = self.transition(|_| Some(state));
    }

    /// Atomically inspects the current state and optionally replaces it.
    ///
    /// `f` returns the next state, or `None` to leave the state untouched.
    /// Returns `Ok(previous)` when a transition happened, `Err(current)` otherwise.
    pub fn transition<F>(&self, f: F) -> Result<WorkerState, WorkerState>
    where
        F: FnOnce(&WorkerState) -> Option<WorkerState>,
    {
        let _serial = lock(&self.shared.transitions);
        let (prev, next, listeners) = {
            let mut cell = lock(&self.shared.cell);
            let Some(next) = f(&cell.state) else {
                return Err(cell.state.clone());
            };
            let prev = std::mem::replace(&mut cell.state, next.clone());
            let listeners = cell.listeners_for(next.status());
            (prev, next, listeners)
        };

        for listener in listeners {
            listener(&next);
        }
        Ok(prev)
    }

    /// Registers `handler` for `status`.
    ///
    /// If the observer is already in `status`, `handler` is invoked with the
    /// current state before this call returns.
    pub fn on<F>(&self, status: WorkerStatus, handler: F) -> ListenerId
    where
        F: Fn(&WorkerState) + Send + Sync + 'static,
    {
        self.register(status, Arc::new(handler), true)
    }

    /// Registers `handler` for future entries into `status` only (no replay).
    pub(crate) fn on_next<F>(&self, status: WorkerStatus, handler: F) -> ListenerId
    where
        F: Fn(&WorkerState) + Send + Sync + 'static,
    {
        self.register(status, Arc::new(handler), false)
    }

    fn register(&self, status: WorkerStatus, listener: Listener, replay: bool) -> ListenerId {
        let _serial = lock(&self.shared.transitions);
        let (id, replay) = {
            let mut cell = lock(&self.shared.cell);
            let id = ListenerId(cell.next_id);
            cell.next_id += 1;
            cell.listeners
                .entry(status)
                .or_default()
                .push((id, Arc::clone(&listener)));
            let replay = (replay && cell.state.is(status)).then(|| cell.state.clone());
            (id, replay)
        };

        if let Some(current) = replay {
            listener(&current);
        }
        id
    }

    /// Removes the registration `id` from `status`. Unknown ids are ignored.
    pub fn off(&self, status: WorkerStatus, id: ListenerId) {
        let mut cell = lock(&self.shared.cell);
        if let Some(ls) = cell.listeners.get_mut(&status) {
            if let Some(pos) = ls.iter().position(|(lid, _)| *lid == id) {
                ls.remove(pos);
            }
        }
    }

    /// Resolves the next time `status` is entered (immediately if already in it).
    ///
    /// The internal listener is removed on resolution or when the future is dropped.
    pub async fn wait_for(&self, status: WorkerStatus) -> WorkerState {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let _registration = self.on_scoped(status, move |state| {
            if let Some(tx) = lock(&tx).take() {
                let _ = tx.send(state.clone());
            }
        });

        match rx.await {
            Ok(state) => state,
            Err(_) => self.get(),
        }
    }

    /// Like [`on`](Self::on), but unregisters when the returned guard is dropped.
    pub(crate) fn on_scoped<F>(&self, status: WorkerStatus, handler: F) -> Registration<'_>
    where
        F: Fn(&WorkerState) + Send + Sync + 'static,
    {
        let id = self.on(status, handler);
        Registration {
            observer: self,
            status,
            id,
        }
    }

    /// Number of listeners registered for `status`.
    pub fn listener_count(&self, status: WorkerStatus) -> usize {
        lock(&self.shared.cell)
            .listeners
            .get(&status)
            .map_or(0, Vec::len)
    }
}

/// Unregisters a listener when dropped.
pub(crate) struct Registration<'a> {
    observer: &'a WorkerStateObserver,
    status: WorkerStatus,
    id: ListenerId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.observer.off(self.status, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dead() -> WorkerState {
        WorkerState::Dead { murdered: false }
    }

    fn counter(observer: &WorkerStateObserver, status: WorkerStatus) -> (Arc<AtomicUsize>, ListenerId) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = observer.on(status, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, id)
    }

    #[test]
    fn test_replay_on_subscribe() {
        let observer = WorkerStateObserver::new(dead());
        let (hits, _) = counter(&observer, WorkerStatus::Dead);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let (other, _) = counter(&observer, WorkerStatus::Live);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_on_next_skips_replay() {
        let observer = WorkerStateObserver::new(dead());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        observer.on_next(WorkerStatus::Dead, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        observer.set(WorkerState::Dead { murdered: true });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_status_fires_again() {
        let observer = WorkerStateObserver::new(WorkerState::Reloading);
        let (hits, _) = counter(&observer, WorkerStatus::Reloading);
        observer.set(WorkerState::Reloading);
        observer.set(WorkerState::Reloading);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let observer = WorkerStateObserver::new(dead());
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let o = order.clone();
            observer.on(WorkerStatus::Killing, move |_| o.lock().unwrap().push(n));
        }
        observer.set(WorkerState::Killing);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_off_removes_only_that_registration() {
        let observer = WorkerStateObserver::new(dead());
        let (a, id_a) = counter(&observer, WorkerStatus::Killing);
        let (b, _) = counter(&observer, WorkerStatus::Killing);

        observer.off(WorkerStatus::Killing, id_a);
        observer.set(WorkerState::Killing);

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(observer.listener_count(WorkerStatus::Killing), 1);
    }

    #[test]
    fn test_transition_refused_keeps_state() {
        let observer = WorkerStateObserver::new(WorkerState::Reloading);
        let res = observer.transition(|s| (!s.is(WorkerStatus::Reloading)).then_some(WorkerState::Killing));
        assert!(matches!(res, Err(WorkerState::Reloading)));
        assert_eq!(observer.status(), WorkerStatus::Reloading);
    }

    #[test]
    fn test_transition_returns_previous() {
        let observer = WorkerStateObserver::new(dead());
        let prev = observer.transition(|_| Some(WorkerState::Reloading)).unwrap();
        assert!(matches!(prev, WorkerState::Dead { murdered: false }));
        assert_eq!(observer.status(), WorkerStatus::Reloading);
    }

    #[test]
    fn test_handler_may_read_state() {
        let observer = WorkerStateObserver::new(dead());
        let seen = Arc::new(Mutex::new(None));
        let (o, s) = (observer.clone(), seen.clone());
        observer.on(WorkerStatus::Killing, move |_| {
            *s.lock().unwrap() = Some(o.status());
        });
        observer.set(WorkerState::Killing);
        assert_eq!(*seen.lock().unwrap(), Some(WorkerStatus::Killing));
    }

    #[tokio::test]
    async fn test_wait_for_resolves_immediately_when_already_there() {
        let observer = WorkerStateObserver::new(dead());
        let state = observer.wait_for(WorkerStatus::Dead).await;
        assert!(state.is(WorkerStatus::Dead));
        assert_eq!(observer.listener_count(WorkerStatus::Dead), 0);
    }

    #[tokio::test]
    async fn test_wait_for_resolves_on_next_entry() {
        let observer = WorkerStateObserver::new(dead());
        let o = observer.clone();
        let waiter = tokio::spawn(async move { o.wait_for(WorkerStatus::Killing).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        observer.set(WorkerState::Killing);

        let state = waiter.await.unwrap();
        assert!(state.is(WorkerStatus::Killing));
        assert_eq!(observer.listener_count(WorkerStatus::Killing), 0);
    }

    #[tokio::test]
    async fn test_dropped_wait_for_unregisters() {
        let observer = WorkerStateObserver::new(dead());
        let res = tokio::time::timeout(
            Duration::from_millis(10),
            observer.wait_for(WorkerStatus::Live),
        )
        .await;
        assert!(res.is_err());
        assert_eq!(observer.listener_count(WorkerStatus::Live), 0);
    }
}

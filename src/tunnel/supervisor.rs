//! # Reconnecting tunnel supervisor.
//!
//! [`TunnelSupervisor`] keeps one tunnel open through a [`Connector`]. When the live
//! tunnel reports an error or a close, exactly one reconnection attempt is made.
//!
//! ```text
//! start() ──► connect(Init) ──ok──► Connected ──► watcher
//!                                                   │ first TransportEvent
//!                                                   ▼
//!                                closed? ──yes──► ignore
//!                                   │no
//!                                   ▼
//!                  publish TunnelReconnecting ──► connect(trigger)
//!                                   ├─ ok  → Connected, new watcher
//!                                   └─ err → ConnectionFailed, wait() fails, stop
//! ```
//!
//! ## Rules
//! - The initial connection is never reported as a reconnection.
//! - A failed initial `start()` returns the error and does not settle `wait()`.
//! - Only the first transport event of each tunnel triggers an attempt.
//! - After a failed reconnection nothing is retried; backoff is the caller's business.
//! - `close()` is idempotent and settles `wait()` with `Ok(())`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, watch};

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::events::{Bus, Event, EventKind};
use crate::tunnel::transport::{Connection, Connector, Tunnel};
use crate::tunnel::trigger::{ReconnectionTrigger, TransportEvent};

const EVENT_CAPACITY: usize = 64;

/// Lifecycle notification delivered through [`TunnelSupervisor::subscribe`].
#[derive(Clone)]
pub enum SupervisorEvent {
    /// A tunnel was established (initially or after a reconnection).
    Connected { tunnel: Arc<dyn Tunnel> },
    /// A reconnection attempt failed; the supervisor stopped.
    ConnectionFailed {
        trigger: ReconnectionTrigger,
        error: TunnelError,
    },
    /// `close()` was called.
    ManuallyClosed,
}

impl fmt::Debug for SupervisorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorEvent::Connected { tunnel } => f
                .debug_struct("Connected")
                .field("tunnel_id", &tunnel.tunnel_id())
                .finish(),
            SupervisorEvent::ConnectionFailed { trigger, error } => f
                .debug_struct("ConnectionFailed")
                .field("trigger", trigger)
                .field("error", error)
                .finish(),
            SupervisorEvent::ManuallyClosed => f.write_str("ManuallyClosed"),
        }
    }
}

#[derive(Clone, Debug)]
enum Settled {
    Pending,
    Failed(TunnelError),
    Closed,
}

struct Inner {
    config: TunnelConfig,
    connector: Arc<dyn Connector>,
    bus: Bus,
    source: Arc<str>,
    started: AtomicBool,
    closed: AtomicBool,
    tunnel: Mutex<Option<Arc<dyn Tunnel>>>,
    events: broadcast::Sender<SupervisorEvent>,
    settled: watch::Sender<Settled>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a tunnel connected, reconnecting once per transport failure.
pub struct TunnelSupervisor {
    inner: Arc<Inner>,
}

impl TunnelSupervisor {
    /// Creates a supervisor; nothing is connected until [`start`](Self::start).
    pub fn new(config: TunnelConfig, connector: impl Connector, bus: Bus) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (settled, _) = watch::channel(Settled::Pending);
        let source: Arc<str> = Arc::from(config.tunnel_id.as_str());

        Self {
            inner: Arc::new(Inner {
                config,
                connector: Arc::new(connector),
                bus,
                source,
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                tunnel: Mutex::new(None),
                events,
                settled,
            }),
        }
    }

    /// Opens the initial tunnel.
    ///
    /// # Errors
    /// - [`TunnelError::Closed`] after `close()`;
    /// - [`TunnelError::AlreadyStarted`] on a second call;
    /// - the connector's error when the initial connection fails.
    pub async fn start(&self) -> Result<(), TunnelError> {
        if self.closed() {
            return Err(TunnelError::Closed);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(TunnelError::AlreadyStarted);
        }
        self.inner.connect(ReconnectionTrigger::Init).await
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Resolves when the supervisor stops.
    ///
    /// Returns `Ok(())` when closed by [`close`](Self::close), or the
    /// [`TunnelError::ReconnectionFailed`] of the first failed reconnection.
    /// A failure that happened before this call is still reported.
    ///
    /// # Errors
    /// [`TunnelError::Closed`] immediately if already closed.
    pub async fn wait(&self) -> Result<(), TunnelError> {
        if self.closed() {
            return Err(TunnelError::Closed);
        }
        let mut rx = self.inner.settled.subscribe();
        let settled = match rx.wait_for(|s| !matches!(s, Settled::Pending)).await {
            Ok(s) => s.clone(),
            Err(_) => Settled::Closed,
        };
        match settled {
            Settled::Failed(e) => Err(e),
            Settled::Pending | Settled::Closed => Ok(()),
        }
    }

    /// Closes the current tunnel and stops supervising. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tunnel = lock(&self.inner.tunnel).take();
        if let Some(tunnel) = tunnel {
            tunnel.close();
        }

        self.inner
            .bus
            .publish(Event::new(EventKind::TunnelClosed).with_source(Arc::clone(&self.inner.source)));
        let _ = self.inner.events.send(SupervisorEvent::ManuallyClosed);
        self.inner.settle(Settled::Closed);
    }

    /// Subscribes to lifecycle events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the currently tracked tunnel, if any.
    pub fn tunnel(&self) -> Option<Arc<dyn Tunnel>> {
        lock(&self.inner.tunnel).clone()
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tunnel = lock(&self.inner.tunnel).take();
        if let Some(tunnel) = tunnel {
            tunnel.close();
        }
    }
}

impl Inner {
    async fn connect(self: &Arc<Self>, trigger: ReconnectionTrigger) -> Result<(), TunnelError> {
        if !trigger.is_init() {
            self.bus.publish(
                Event::new(EventKind::TunnelReconnecting)
                    .with_source(Arc::clone(&self.source))
                    .with_reason(trigger.reason()),
            );
        }

        let Connection { tunnel, events } = match self.connector.connect(&self.config).await {
            Ok(conn) => conn,
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::TunnelConnectionFailed)
                        .with_source(Arc::clone(&self.source))
                        .with_reason(e.to_string()),
                );
                return Err(e);
            }
        };

        {
            let mut slot = lock(&self.tunnel);
            if self.closed.load(Ordering::SeqCst) {
                drop(slot);
                tunnel.close();
                return Err(TunnelError::Closed);
            }
            *slot = Some(Arc::clone(&tunnel));

            self.bus.publish(
                Event::new(EventKind::TunnelConnected).with_source(Arc::clone(&self.source)),
            );
            let _ = self.events.send(SupervisorEvent::Connected { tunnel });
        }

        self.watch(events);
        Ok(())
    }

    /// Waits for the first transport event of the current tunnel and reacts to it once.
    fn watch(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            // A dropped event stream means the transport will never report anything.
            let Some(ev) = events.recv().await else {
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            inner.reconnect(ReconnectionTrigger::from(ev)).await;
        });
    }

    async fn reconnect(self: Arc<Self>, trigger: ReconnectionTrigger) {
        let Err(e) = self.connect(trigger.clone()).await else {
            return;
        };
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        lock(&self.tunnel).take();
        let error = TunnelError::ReconnectionFailed {
            trigger: trigger.clone(),
            error: e.to_string(),
        };
        let _ = self.events.send(SupervisorEvent::ConnectionFailed {
            trigger,
            error: error.clone(),
        });
        self.settle(Settled::Failed(error));
    }

    /// First terminal outcome wins.
    fn settle(&self, outcome: Settled) {
        self.settled.send_if_modified(|s| {
            if matches!(s, Settled::Pending) {
                *s = outcome;
                true
            } else {
                false
            }
        });
    }
}

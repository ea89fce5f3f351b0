//! # Worker: one logical process slot with kill/reload/wait.
//!
//! A [`Worker`] is backed by zero or one [`ChildProcess`] at a time. `reload()` kills the
//! current child (if any) and spawns a replacement; the [`WorkerStateObserver`] publishes
//! every transition.
//!
//! ## Reload flow
//! ```text
//! reload()
//!   ├─► state == Reloading?  ──yes──► publish ReloadSkipped, return Ok (dropped, not queued)
//!   ├─► set Reloading, generation += 1
//!   ├─► previous == Live{child}? ──► child.kill().await  (dropped here → Errored{Cancelled})
//!   ├─► ChildProcess::spawn() ──err──► set Errored, return Err
//!   ├─► set Live{child}
//!   └─► spawn continuation: child.listen().await
//!           ├─ superseded (Reloading or newer generation) → no-op
//!           ├─ Err(e) → set Errored{e}
//!           └─ Ok(_)  → set Dead{murdered: state was Killing}
//! ```
//!
//! ## Rules
//! - At most one reload is in flight; overlapping calls return immediately.
//!   Callers that need their reload to take effect must re-check [`Worker::running`].
//! - No automatic retry: spawn failures propagate to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::config::{WorkerConfig, WorkerProps};
use crate::error::{ProcessError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::worker::child::{ChildOutput, ChildProcess};
use crate::worker::observer::WorkerStateObserver;
use crate::worker::state::{WorkerState, WorkerStatus};

const ALL_STATUSES: [WorkerStatus; 5] = [
    WorkerStatus::Errored,
    WorkerStatus::Dead,
    WorkerStatus::Killing,
    WorkerStatus::Reloading,
    WorkerStatus::Live,
];

/// Supervisor of at most one OS child process.
pub struct Worker {
    config: WorkerConfig,
    props: WorkerProps,
    name: Arc<str>,
    bus: Bus,
    state: WorkerStateObserver,
    generation: Arc<AtomicU64>,
}

impl Worker {
    /// Creates a worker in `Dead` state without spawning anything.
    ///
    /// Every state transition is published on `bus` as `WorkerStateChanged`.
    pub fn new(config: WorkerConfig, bus: Bus, props: WorkerProps) -> Arc<Self> {
        let name: Arc<str> = Arc::from(config.name.as_str());
        let state = WorkerStateObserver::new(WorkerState::default());

        for status in ALL_STATUSES {
            let bus = bus.clone();
            let name = Arc::clone(&name);
            state.on_next(status, move |s| {
                bus.publish(
                    Event::new(EventKind::WorkerStateChanged)
                        .with_source(Arc::clone(&name))
                        .with_reason(s.status().as_label()),
                );
            });
        }

        Arc::new(Self {
            config,
            props,
            name,
            bus,
            state,
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Creates a worker and performs the initial [`reload`](Self::reload).
    ///
    /// # Errors
    /// The spawn error of the initial child.
    pub async fn spawn(
        config: WorkerConfig,
        bus: Bus,
        props: WorkerProps,
    ) -> Result<Arc<Self>, WorkerError> {
        let worker = Self::new(config, bus, props);
        worker.reload().await?;
        Ok(worker)
    }

    /// True iff the current state is `Live`.
    pub fn running(&self) -> bool {
        self.state.status() == WorkerStatus::Live
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// The state observer, for callers that want their own listeners.
    pub fn observer(&self) -> &WorkerStateObserver {
        &self.state
    }

    /// Pid of the live child, if any.
    pub fn pid(&self) -> Option<u32> {
        match self.state.get() {
            WorkerState::Live { child } => Some(child.pid()),
            _ => None,
        }
    }

    /// Kills the live child and returns its terminal status.
    ///
    /// # Errors
    /// - [`WorkerError::NotLive`] unless the worker is `Live`.
    /// - [`WorkerError::Process`] if the signal could not be delivered.
    pub async fn kill(&self) -> Result<ChildOutput, WorkerError> {
        let prev = self
            .state
            .transition(|s| s.is(WorkerStatus::Live).then_some(WorkerState::Killing))
            .map_err(|current| WorkerError::NotLive {
                status: current.status(),
            })?;

        let WorkerState::Live { child } = prev else {
            return Err(WorkerError::NotLive {
                status: prev.status(),
            });
        };
        Ok(child.kill().await?)
    }

    /// Kills the current child (if live) and spawns a new one.
    ///
    /// Returns `Ok(())` without doing anything when another reload is in flight.
    ///
    /// Dropping the future while the previous child is being killed leaves the
    /// worker `Errored` with [`ProcessError::Cancelled`]; a later `reload()` or
    /// `kill()` works as usual from there.
    ///
    /// # Errors
    /// - spawn failure of the new child (state becomes `Errored`);
    /// - failure to kill the previous child.
    pub async fn reload(&self) -> Result<(), WorkerError> {
        let generation = self.generation.clone();
        let entered = self.state.transition(|s| {
            if s.is(WorkerStatus::Reloading) {
                return None;
            }
            generation.fetch_add(1, Ordering::SeqCst);
            Some(WorkerState::Reloading)
        });
        let prev = match entered {
            Ok(prev) => prev,
            Err(_) => {
                self.bus
                    .publish(Event::new(EventKind::ReloadSkipped).with_source(Arc::clone(&self.name)));
                return Ok(());
            }
        };
        let my_generation = self.generation.load(Ordering::SeqCst);
        let previous = match &prev {
            WorkerState::Live { child } => Some(child.pid()),
            _ => None,
        };
        let mut guard = ReloadGuard {
            worker: self,
            generation: my_generation,
            previous,
            armed: true,
        };

        if let WorkerState::Live { child } = prev {
            match child.kill().await {
                // Exited on its own before its continuation could record it.
                Ok(_) | Err(ProcessError::AlreadyExited { .. }) => {}
                Err(e) => {
                    guard.armed = false;
                    self.state.set(WorkerState::Errored { thrown: e.clone() });
                    return Err(e.into());
                }
            }
        }

        guard.armed = false;

        let child = match ChildProcess::spawn(&self.config, self.bus.clone()) {
            Ok(child) => Arc::new(child),
            Err(e) => {
                self.state.set(WorkerState::Errored { thrown: e.clone() });
                return Err(e.into());
            }
        };
        self.state.set(WorkerState::Live {
            child: Arc::clone(&child),
        });

        let state = self.state.clone();
        let generation = Arc::clone(&self.generation);
        tokio::spawn(async move {
            let outcome = child.listen().await;
            let _ = state.transition(|s| {
                let superseded = s.is(WorkerStatus::Reloading)
                    || generation.load(Ordering::SeqCst) != my_generation;
                if superseded {
                    return None;
                }
                Some(match &outcome {
                    Err(e) => WorkerState::Errored { thrown: e.clone() },
                    Ok(_) => WorkerState::Dead {
                        murdered: s.is(WorkerStatus::Killing),
                    },
                })
            });
        });
        Ok(())
    }

    /// Resolves when the worker dies, fails when it errors.
    ///
    /// With `hang_on_exit`, a natural (not murdered) death is only reported as
    /// `WorkerExitedUnexpectedly` and waiting continues.
    ///
    /// # Errors
    /// [`WorkerError::Process`] carrying the error of the `Errored` state.
    pub async fn wait(&self) -> Result<(), WorkerError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dead_tx = tx.clone();
        let _dead = self.state.on_scoped(WorkerStatus::Dead, move |s| {
            let _ = dead_tx.send(s.clone());
        });
        let _errored = self.state.on_scoped(WorkerStatus::Errored, move |s| {
            let _ = tx.send(s.clone());
        });

        loop {
            let Some(state) = rx.recv().await else {
                return Ok(());
            };
            match state {
                WorkerState::Errored { thrown } => return Err(WorkerError::Process(thrown)),
                WorkerState::Dead { murdered } if murdered || !self.props.hang_on_exit => {
                    return Ok(());
                }
                WorkerState::Dead { .. } => {
                    self.bus.publish(
                        Event::new(EventKind::WorkerExitedUnexpectedly)
                            .with_source(Arc::clone(&self.name)),
                    );
                }
                _ => {}
            }
        }
    }
}

/// Moves a worker from `Reloading` to `Errored { Cancelled }` when a reload
/// future is dropped before the replacement is spawned.
struct ReloadGuard<'a> {
    worker: &'a Worker,
    generation: u64,
    previous: Option<u32>,
    armed: bool,
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        let previous = self.previous;
        let current = &self.worker.generation;
        let _ = self.worker.state.transition(|s| {
            let ours = s.is(WorkerStatus::Reloading)
                && current.load(Ordering::SeqCst) == generation;
            ours.then_some(WorkerState::Errored {
                thrown: ProcessError::Cancelled { previous },
            })
        });
    }
}

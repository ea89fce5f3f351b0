#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use procvisor::{
    Bus, Event, EventKind, ExecTarget, Interpreter, ProcessError, StdioMode, SubscriberSet,
    Worker, WorkerConfig, WorkerError, WorkerProps, WorkerState, WorkerStatus,
};

const SETTLE: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn sh(name: &str, code: &str) -> WorkerConfig {
    WorkerConfig::new(name, ExecTarget::code(Interpreter::shell(), code)).with_stdio(StdioMode::Null)
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

/// Unique temp path for scripts whose first run behaves differently from later ones.
fn marker(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "procvisor-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

#[tokio::test]
async fn test_natural_exit_resolves_wait() {
    init_tracing();
    let bus = Bus::default();
    #[cfg(feature = "logging")]
    let _listener = bus.attach(
        Arc::new(SubscriberSet::new(
            vec![Arc::new(procvisor::LogWriter::new())],
            bus.clone(),
        )),
        tokio_util::sync::CancellationToken::new(),
    );

    let worker = Worker::spawn(sh("exit0", "exit 0"), bus, WorkerProps::default())
        .await
        .unwrap();

    timeout(SETTLE, worker.wait()).await.unwrap().unwrap();
    assert!(matches!(worker.state(), WorkerState::Dead { murdered: false }));
    assert!(!worker.running());
}

#[tokio::test]
async fn test_nonzero_exit_is_still_a_death() {
    let worker = Worker::spawn(sh("exit3", "exit 3"), Bus::default(), WorkerProps::default())
        .await
        .unwrap();

    timeout(SETTLE, worker.wait()).await.unwrap().unwrap();
    assert!(matches!(worker.state(), WorkerState::Dead { murdered: false }));
}

#[tokio::test]
async fn test_kill_marks_death_as_murder() {
    let bus = Bus::default();
    let mut rx = bus.subscribe();
    let worker = Worker::spawn(sh("sleeper", "exec sleep 30"), bus, WorkerProps::default())
        .await
        .unwrap();
    assert!(worker.running());
    let pid = worker.pid().unwrap();

    let out = timeout(SETTLE, worker.kill()).await.unwrap().unwrap();
    assert_eq!(out.signal.as_deref(), Some("SIGTERM"));
    assert_eq!(out.exit_code, None);

    timeout(SETTLE, worker.wait()).await.unwrap().unwrap();
    assert!(matches!(worker.state(), WorkerState::Dead { murdered: true }));

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::ChildKillRequested), 1);
    let exited = events
        .iter()
        .find(|e| e.kind == EventKind::ChildExited)
        .expect("ChildExited published");
    assert_eq!(exited.pid, Some(pid));
    assert_eq!(exited.signal.as_deref(), Some("SIGTERM"));
}

#[tokio::test]
async fn test_wait_resolves_when_killed_later() {
    let worker = Worker::spawn(sh("sleeper", "exec sleep 30"), Bus::default(), WorkerProps::default())
        .await
        .unwrap();

    let w = Arc::clone(&worker);
    let waiter = tokio::spawn(async move { w.wait().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    worker.kill().await.unwrap();
    timeout(SETTLE, waiter).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_kill_requires_live_worker() {
    let worker = Worker::new(sh("idle", "exit 0"), Bus::default(), WorkerProps::default());
    let err = worker.kill().await.unwrap_err();
    assert_eq!(
        err,
        WorkerError::NotLive {
            status: WorkerStatus::Dead
        }
    );
    assert_eq!(err.as_label(), "worker_not_live");
}

#[tokio::test]
async fn test_kill_on_errored_worker_fails() {
    let cfg = WorkerConfig::new("ghost", ExecTarget::file("/nonexistent/procvisor-bin"));
    let worker = Worker::new(cfg, Bus::default(), WorkerProps::default());
    worker.reload().await.unwrap_err();

    let err = worker.kill().await.unwrap_err();
    assert_eq!(
        err,
        WorkerError::NotLive {
            status: WorkerStatus::Errored
        }
    );
}

#[tokio::test]
async fn test_spawn_failure_errors_state_and_wait() {
    let cfg = WorkerConfig::new("ghost", ExecTarget::file("/nonexistent/procvisor-bin"));
    let err = Worker::spawn(cfg.clone(), Bus::default(), WorkerProps::default())
        .await
        .err()
        .unwrap();
    assert_eq!(err.as_label(), "process_spawn_failed");

    let worker = Worker::new(cfg, Bus::default(), WorkerProps::default());
    let _ = worker.reload().await;
    assert!(matches!(
        worker.state(),
        WorkerState::Errored {
            thrown: ProcessError::Spawn { .. }
        }
    ));

    let res = timeout(SETTLE, worker.wait()).await.unwrap();
    assert!(matches!(res, Err(WorkerError::Process(ProcessError::Spawn { .. }))));
}

#[tokio::test]
async fn test_reload_replaces_child() {
    let bus = Bus::default();
    let worker = Worker::spawn(sh("sleeper", "exec sleep 30"), bus, WorkerProps::default())
        .await
        .unwrap();
    let first = worker.pid().unwrap();

    worker.reload().await.unwrap();
    let second = worker.pid().unwrap();
    assert_ne!(first, second);

    // The first child's exit continuation has run by now and must not touch the new state.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(worker.running());
    assert_eq!(worker.pid(), Some(second));

    worker.kill().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_reload_leaves_worker_usable() {
    // First run ignores SIGTERM for a few seconds, later runs sleep until killed.
    let marker = marker("stubborn");
    let code = format!(
        "if [ -f '{m}' ]; then exec sleep 30; fi; touch '{m}'; trap '' TERM; \
         i=0; while [ $i -lt 100 ]; do sleep 0.05; i=$((i+1)); done",
        m = marker.display()
    );

    let worker = Worker::spawn(sh("stubborn", &code), Bus::default(), WorkerProps::default())
        .await
        .unwrap();
    let first = worker.pid().unwrap();

    let res = timeout(Duration::from_millis(200), worker.reload()).await;
    assert!(res.is_err(), "reload must still be waiting on the old child");
    match worker.state() {
        WorkerState::Errored {
            thrown: ProcessError::Cancelled { previous },
        } => assert_eq!(previous, Some(first)),
        other => panic!("unexpected state: {:?}", other.status()),
    }

    worker.reload().await.unwrap();
    assert!(worker.running());
    assert_ne!(worker.pid(), Some(first));
    worker.kill().await.unwrap();
    worker.observer().wait_for(WorkerStatus::Dead).await;
    assert!(matches!(worker.state(), WorkerState::Dead { murdered: true }));

    let _ = std::fs::remove_file(&marker);
}

#[tokio::test]
async fn test_overlapping_reload_is_dropped() {
    let bus = Bus::default();
    let worker = Worker::spawn(sh("sleeper", "exec sleep 30"), bus.clone(), WorkerProps::default())
        .await
        .unwrap();
    let mut rx = bus.subscribe();

    let (a, b) = tokio::join!(worker.reload(), worker.reload());
    a.unwrap();
    b.unwrap();

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::ChildSpawned), 1);
    assert_eq!(count(&events, EventKind::ReloadSkipped), 1);
    assert!(worker.running());

    worker.kill().await.unwrap();
}

#[tokio::test]
async fn test_reload_after_natural_exit() {
    let worker = Worker::spawn(sh("exit0", "exit 0"), Bus::default(), WorkerProps::default())
        .await
        .unwrap();
    worker.observer().wait_for(WorkerStatus::Dead).await;

    worker.reload().await.unwrap();
    timeout(SETTLE, worker.wait()).await.unwrap().unwrap();
    assert!(matches!(worker.state(), WorkerState::Dead { murdered: false }));
}

#[tokio::test]
async fn test_hang_on_exit_ignores_natural_death() {
    // First run exits with 1, later runs sleep until killed.
    let marker = marker("hang");
    let code = format!(
        "if [ -f '{m}' ]; then exec sleep 30; fi; touch '{m}'; exit 1",
        m = marker.display()
    );

    let bus = Bus::default();
    let mut rx = bus.subscribe();
    let props = WorkerProps { hang_on_exit: true };
    let worker = Worker::spawn(sh("flaky", &code), bus, props).await.unwrap();
    worker.observer().wait_for(WorkerStatus::Dead).await;

    let w = Arc::clone(&worker);
    let waiter = tokio::spawn(async move { w.wait().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished(), "natural death must not resolve wait");
    assert_eq!(count(&drain(&mut rx), EventKind::WorkerExitedUnexpectedly), 1);

    // A murder still resolves it.
    worker.reload().await.unwrap();
    worker.kill().await.unwrap();
    timeout(SETTLE, waiter).await.unwrap().unwrap().unwrap();

    let _ = std::fs::remove_file(&marker);
}

#[tokio::test]
async fn test_every_transition_is_published() {
    let bus = Bus::default();
    let mut rx = bus.subscribe();
    let worker = Worker::spawn(sh("sleeper", "exec sleep 30"), bus, WorkerProps::default())
        .await
        .unwrap();
    worker.kill().await.unwrap();
    worker.observer().wait_for(WorkerStatus::Dead).await;

    let statuses: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.kind == EventKind::WorkerStateChanged)
        .filter_map(|e| e.reason.map(|r| r.to_string()))
        .collect();
    assert_eq!(statuses, vec!["reloading", "live", "killing", "dead"]);
}

//! # Example: dev_loop
//!
//! A dev-server loop: one worker process that is reloaded on every (simulated)
//! source change and killed on exit.
//!
//! Demonstrates how to:
//! - Describe the child with [`WorkerConfig`] and an inline shell script.
//! - Attach [`LogWriter`] and a custom counting subscriber to the [`Bus`].
//! - Drive `reload()` / `kill()` and read the final [`ChildOutput`].
//! - Stop forwarding with a [`CancellationToken`] and flush the subscribers.
//!
//! ## Flow
//! ```text
//! Worker::spawn() ──► Reloading ──► Live(pid 1)
//!   change #1 ──► reload() ──► kill(pid 1) ──► Live(pid 2)
//!   change #2 ──► reload() ──► kill(pid 2) ──► Live(pid 3)
//!   ...
//!   kill() ──► Killing ──► Dead{murdered}
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example dev_loop
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use procvisor::{
    Bus, ChildOutput, Event, EventKind, ExecTarget, Interpreter, LogWriter, StdioMode, Subscribe,
    SubscriberSet, Worker, WorkerConfig, WorkerProps,
};
use tokio_util::sync::CancellationToken;

/// Counts spawned children and child exits.
#[derive(Default)]
struct Restarts {
    spawned: AtomicU64,
    exited: AtomicU64,
}

impl Restarts {
    fn print_stats(&self) {
        println!("\n📊 Worker Statistics:");
        println!(" ├─► Spawned: {}", self.spawned.load(Ordering::Relaxed));
        println!(" └─► Exited:  {}", self.exited.load(Ordering::Relaxed));
    }
}

#[async_trait::async_trait]
impl Subscribe for Restarts {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::ChildSpawned => {
                self.spawned.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::ChildExited => {
                self.exited.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "restarts"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 1. Bus plus subscribers
    let bus = Bus::default();
    let restarts = Arc::new(Restarts::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![
        Arc::new(LogWriter::new()),
        Arc::clone(&restarts) as Arc<dyn Subscribe>,
    ];
    let set = Arc::new(SubscriberSet::new(subs, bus.clone()));
    let stop = CancellationToken::new();
    let listener = bus.attach(Arc::clone(&set), stop.clone());

    // 2. The "dev server": prints its pid, then serves until killed
    let cfg = WorkerConfig::new(
        "dev-server",
        ExecTarget::code(Interpreter::shell(), "echo \"[server] up, pid $$\"; exec sleep 60"),
    )
    .with_env("PORT", "3000")
    .with_stdio(StdioMode::Inherit);

    let worker = Worker::spawn(cfg, bus, WorkerProps::default()).await?;
    println!("[dev] worker live, pid {:?}", worker.pid());

    // 3. Every source change restarts the server
    for change in 1..=3 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        println!("[dev] change #{change} detected, reloading");
        worker.reload().await?;
        println!("[dev] worker live, pid {:?}", worker.pid());
    }

    // 4. Ctrl-C in a real tool; here we just stop
    let ChildOutput { exit_code, signal } = worker.kill().await?;
    worker.wait().await?;
    println!("[dev] stopped (exit code {exit_code:?}, signal {signal:?})");

    // 5. Stop forwarding, let the subscribers drain
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();
    listener.await?;
    if let Ok(set) = Arc::try_unwrap(set) {
        set.shutdown().await;
    }

    restarts.print_stats();
    Ok(())
}

//! # Example: tunnel
//!
//! A [`TunnelSupervisor`] keeping a [`TcpConnector`] tunnel up against a toy
//! relay running in the same process.
//!
//! The relay drops the first connection after a moment, which triggers the one
//! reconnection attempt the supervisor makes per failure. The second connection
//! is kept until the demo closes the supervisor.
//!
//! ## Flow
//! ```text
//! start() ──► TUNNEL demo ──► relay (conn #1)
//!                               └─ relay hangs up ──► Close
//!             reconnect  ──► TUNNEL demo ──► relay (conn #2)
//!                               ├─ HELLO every 300ms
//!                               └─ close() ──► ManuallyClosed, wait() → Ok
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example tunnel
//! ```

use std::sync::Arc;
use std::time::Duration;

use procvisor::{
    Bus, LogWriter, SubscriberSet, SupervisorEvent, TcpConnector, TunnelConfig, TunnelSupervisor,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Prints every line a tunnel sends; hangs up after `keep` when given.
async fn serve(conn: u32, stream: TcpStream, keep: Option<Duration>) {
    let mut lines = BufReader::new(stream).lines();
    let read = async {
        while let Ok(Some(line)) = lines.next_line().await {
            println!("[relay] conn #{conn} <- {line}");
        }
    };
    match keep {
        Some(keep) => {
            let _ = tokio::time::timeout(keep, read).await;
            println!("[relay] conn #{conn} hanging up");
        }
        None => read.await,
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

    // 1. Toy relay: first connection lives 700ms, the rest until the peer leaves
    let relay = TcpListener::bind("127.0.0.1:0").await?;
    let port = relay.local_addr()?.port();
    tokio::spawn(async move {
        let mut conn = 0;
        while let Ok((stream, _)) = relay.accept().await {
            conn += 1;
            let keep = (conn == 1).then_some(Duration::from_millis(700));
            tokio::spawn(serve(conn, stream, keep));
        }
    });

    // 2. Lifecycle logs
    let bus = Bus::default();
    let stop = CancellationToken::new();
    let _listener = bus.attach(
        Arc::new(SubscriberSet::new(vec![Arc::new(LogWriter::new())], bus.clone())),
        stop.clone(),
    );

    // 3. Supervisor
    let cfg = TunnelConfig::new(&format!("ws://127.0.0.1:{port}"), "demo")?
        .with_hello_interval(Duration::from_millis(300));
    let sup = Arc::new(TunnelSupervisor::new(cfg, TcpConnector::new(), bus));
    let mut events = sup.subscribe();
    let waiter = {
        let sup = Arc::clone(&sup);
        tokio::spawn(async move { sup.wait().await })
    };

    sup.start().await?;

    // 4. Watch the lifecycle; close once the tunnel survived a relay restart
    let mut connects = 0;
    while let Ok(ev) = events.recv().await {
        match ev {
            SupervisorEvent::Connected { tunnel } => {
                connects += 1;
                println!("[demo] connected #{connects} ({})", tunnel.tunnel_id());
                if connects == 2 {
                    let sup = Arc::clone(&sup);
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        sup.close();
                    });
                }
            }
            SupervisorEvent::ConnectionFailed { trigger, error } => {
                println!("[demo] reconnection after {} failed: {error}", trigger.reason());
                break;
            }
            SupervisorEvent::ManuallyClosed => {
                println!("[demo] closed");
                break;
            }
        }
    }

    match waiter.await? {
        Ok(()) => println!("[demo] wait() resolved"),
        Err(e) => println!("[demo] wait() failed: {e}"),
    }
    stop.cancel();
    Ok(())
}

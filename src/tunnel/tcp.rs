//! # Line-oriented TCP tunnel transport.
//!
//! [`TcpConnector`] is the reference [`Connector`]: it dials the relay named by
//! the tunnel URL (`ws`/`http` default to port 80, `wss`/`https` to 443) and
//! speaks a minimal line protocol:
//!
//! ```text
//! client → relay: TUNNEL <tunnel-id>\n      (once, on connect)
//! client → relay: HELLO\n                   (every hello_interval, and on Tunnel::hello)
//! relay  → client: <anything>               (not interpreted)
//! ```
//!
//! ## Rules
//! - Read EOF reports `TransportEvent::Close`; read/write failures report `TransportEvent::Error`.
//! - Exactly one transport event is reported per connection, then the driver stops.
//! - `Tunnel::close` cancels the driver, which shuts the socket down and reports `Close`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::tunnel::transport::{Connection, Connector, Tunnel};
use crate::tunnel::trigger::TransportEvent;

/// Dials relays over plain TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &TunnelConfig) -> Result<Connection, TunnelError> {
        let invalid = |error: &str| TunnelError::InvalidUrl {
            url: config.url.to_string(),
            error: error.to_string(),
        };
        let host = config.url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = config
            .url
            .port_or_known_default()
            .or_else(|| default_port(config.url.scheme()))
            .ok_or_else(|| invalid("missing port"))?;

        let connect_err = |e: std::io::Error| TunnelError::Connect {
            error: format!("{host}:{port}: {e}"),
        };
        let mut stream = TcpStream::connect((host, port)).await.map_err(connect_err)?;
        stream
            .write_all(format!("TUNNEL {}\n", config.tunnel_id).as_bytes())
            .await
            .map_err(connect_err)?;

        let token = CancellationToken::new();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (hello_tx, hello_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(
            stream,
            config.hello_interval,
            token.clone(),
            hello_rx,
            events_tx,
        ));

        Ok(Connection {
            tunnel: Arc::new(TcpTunnel {
                id: config.tunnel_id.clone(),
                token,
                hello_tx,
            }),
            events,
        })
    }
}

/// `ws`/`wss` are not special schemes for `url`, so their defaults are filled in here.
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "ws" | "http" => Some(80),
        "wss" | "https" => Some(443),
        _ => None,
    }
}

struct TcpTunnel {
    id: String,
    token: CancellationToken,
    hello_tx: mpsc::UnboundedSender<()>,
}

impl Tunnel for TcpTunnel {
    fn tunnel_id(&self) -> &str {
        &self.id
    }

    fn hello(&self) {
        let _ = self.hello_tx.send(());
    }

    fn close(&self) {
        self.token.cancel();
    }
}

async fn send_hello(writer: &mut OwnedWriteHalf) -> Result<(), TransportEvent> {
    writer
        .write_all(b"HELLO\n")
        .await
        .map_err(|e| TransportEvent::Error {
            error: e.to_string(),
        })
}

/// Owns the socket until the first transport event, then reports it.
async fn drive(
    stream: TcpStream,
    hello_interval: Duration,
    token: CancellationToken,
    mut hello_rx: mpsc::UnboundedReceiver<()>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let period = hello_interval.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = [0u8; 1024];

    let event = loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = writer.shutdown().await;
                break TransportEvent::Close {
                    code: None,
                    reason: Some("closed locally".to_string()),
                };
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    break TransportEvent::Close {
                        code: None,
                        reason: Some("connection closed by relay".to_string()),
                    };
                }
                Ok(_) => {}
                Err(e) => break TransportEvent::Error { error: e.to_string() },
            },
            _ = ticker.tick() => {
                if let Err(ev) = send_hello(&mut writer).await {
                    break ev;
                }
            }
            Some(()) = hello_rx.recv() => {
                if let Err(ev) = send_hello(&mut writer).await {
                    break ev;
                }
            }
        }
    };
    let _ = events_tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn relay() -> (TcpListener, TunnelConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cfg = TunnelConfig::new(&format!("ws://127.0.0.1:{port}"), "t-1").unwrap();
        (listener, cfg)
    }

    #[tokio::test]
    async fn test_handshake_and_hello() {
        let (listener, cfg) = relay().await;
        let cfg = cfg.with_hello_interval(Duration::from_secs(3600));
        let conn = TcpConnector::new().connect(&cfg).await.unwrap();
        assert_eq!(conn.tunnel.tunnel_id(), "t-1");

        let (sock, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(sock).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("TUNNEL t-1"));

        conn.tunnel.hello();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("HELLO"));
    }

    #[tokio::test]
    async fn test_periodic_hello() {
        let (listener, cfg) = relay().await;
        let cfg = cfg.with_hello_interval(Duration::from_millis(20));
        let _conn = TcpConnector::new().connect(&cfg).await.unwrap();

        let (sock, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(sock).lines();
        lines.next_line().await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("HELLO"));
    }

    #[tokio::test]
    async fn test_relay_eof_reports_close() {
        let (listener, cfg) = relay().await;
        let mut conn = TcpConnector::new().connect(&cfg).await.unwrap();
        let (sock, _) = listener.accept().await.unwrap();
        drop(sock);

        let ev = conn.events.recv().await.unwrap();
        assert!(matches!(ev, TransportEvent::Close { .. }), "got {ev:?}");
    }

    #[tokio::test]
    async fn test_local_close_reports_close() {
        let (_listener, cfg) = relay().await;
        let mut conn = TcpConnector::new().connect(&cfg).await.unwrap();
        conn.tunnel.close();

        let ev = conn.events.recv().await.unwrap();
        assert_eq!(
            ev,
            TransportEvent::Close {
                code: None,
                reason: Some("closed locally".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_relay_fails() {
        let (listener, cfg) = relay().await;
        drop(listener);
        let err = TcpConnector::new().connect(&cfg).await.err().unwrap();
        assert_eq!(err.as_label(), "tunnel_connect_failed");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(default_port("wss"), Some(443));
        assert_eq!(default_port("ws"), Some(80));
        assert_eq!(default_port("ftp"), None);
    }
}

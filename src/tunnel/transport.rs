//! # Tunnel transport abstraction.
//!
//! A [`Connector`] opens tunnels; each successful connect yields a [`Connection`]:
//! the [`Tunnel`] handle plus a stream of [`TransportEvent`]s. The first event
//! received marks the end of that tunnel.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tokio::sync::mpsc;
//! use procvisor::{Connection, Connector, Tunnel, TunnelConfig, TunnelError};
//!
//! struct Loopback;
//!
//! impl Tunnel for Loopback {
//!     fn tunnel_id(&self) -> &str { "loopback" }
//!     fn hello(&self) {}
//!     fn close(&self) {}
//! }
//!
//! struct LoopbackConnector;
//!
//! #[async_trait]
//! impl Connector for LoopbackConnector {
//!     async fn connect(&self, _cfg: &TunnelConfig) -> Result<Connection, TunnelError> {
//!         let (_tx, events) = mpsc::unbounded_channel();
//!         Ok(Connection { tunnel: Arc::new(Loopback), events })
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::tunnel::trigger::TransportEvent;

/// Handle to one established tunnel.
pub trait Tunnel: Send + Sync + 'static {
    /// Identifier the relay routes traffic by.
    fn tunnel_id(&self) -> &str;

    /// Sends a keep-alive immediately.
    fn hello(&self);

    /// Closes the tunnel. Best effort; never fails.
    fn close(&self);
}

/// Result of a successful connect.
pub struct Connection {
    pub tunnel: Arc<dyn Tunnel>,
    /// Transport `error`/`close` notifications for `tunnel`.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens tunnels to a relay.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects using `config`.
    ///
    /// # Errors
    /// [`TunnelError::Connect`] or [`TunnelError::InvalidUrl`].
    async fn connect(&self, config: &TunnelConfig) -> Result<Connection, TunnelError>;
}

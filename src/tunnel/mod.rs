//! Reconnecting tunnel supervision.
//!
//! Internal modules:
//! - [`trigger`]: transport events and the reconnection triggers derived from them;
//! - [`transport`]: `Connector` / `Tunnel` seam to the tunnel client;
//! - [`tcp`]: line-oriented TCP transport;
//! - [`supervisor`]: one-reconnect-per-failure supervisor.

mod supervisor;
mod tcp;
mod transport;
mod trigger;

pub use supervisor::{SupervisorEvent, TunnelSupervisor};
pub use tcp::TcpConnector;
pub use transport::{Connection, Connector, Tunnel};
pub use trigger::{ReconnectionTrigger, TransportEvent};

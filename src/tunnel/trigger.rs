//! Transport events and the reconnection triggers derived from them.

use std::fmt;

/// Event reported by a live tunnel transport. Any of them ends the tunnel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport failed.
    Error { error: String },
    /// The transport was closed by either side.
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Causal event that provoked a connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconnectionTrigger {
    /// Initial connection; there was no previous tunnel.
    Init,
    /// The previous tunnel failed.
    Error { error: String },
    /// The previous tunnel was closed.
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

impl ReconnectionTrigger {
    /// Human-readable description of why a connection was attempted.
    ///
    /// ```
    /// use procvisor::ReconnectionTrigger;
    ///
    /// let t = ReconnectionTrigger::Close { code: Some(1006), reason: None };
    /// assert_eq!(t.reason(), "tunnel closed (code 1006)");
    /// ```
    pub fn reason(&self) -> String {
        match self {
            ReconnectionTrigger::Init => "initial connection".to_string(),
            ReconnectionTrigger::Error { error } => format!("tunnel error: {error}"),
            ReconnectionTrigger::Close { code, reason } => match (code, reason) {
                (Some(code), Some(reason)) => format!("tunnel closed (code {code}): {reason}"),
                (Some(code), None) => format!("tunnel closed (code {code})"),
                (None, Some(reason)) => format!("tunnel closed: {reason}"),
                (None, None) => "tunnel closed".to_string(),
            },
        }
    }

    #[inline]
    pub fn is_init(&self) -> bool {
        matches!(self, ReconnectionTrigger::Init)
    }
}

impl fmt::Display for ReconnectionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

impl From<TransportEvent> for ReconnectionTrigger {
    fn from(ev: TransportEvent) -> Self {
        match ev {
            TransportEvent::Error { error } => ReconnectionTrigger::Error { error },
            TransportEvent::Close { code, reason } => ReconnectionTrigger::Close { code, reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(ReconnectionTrigger::Init.reason(), "initial connection");
        assert_eq!(
            ReconnectionTrigger::Error {
                error: "reset".into()
            }
            .reason(),
            "tunnel error: reset"
        );
        assert_eq!(
            ReconnectionTrigger::Close {
                code: None,
                reason: Some("bye".into())
            }
            .reason(),
            "tunnel closed: bye"
        );
    }

    #[test]
    fn test_from_transport_event() {
        let t = ReconnectionTrigger::from(TransportEvent::Close {
            code: Some(1000),
            reason: None,
        });
        assert_eq!(
            t,
            ReconnectionTrigger::Close {
                code: Some(1000),
                reason: None
            }
        );
        assert!(!t.is_init());
    }
}

//! Events published by a [`Bridge`](super::Bridge) to its subscribers.

use serde_json::Value;

use super::presence::PeerStatus;

/// State of the bridge's own relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// `connect()` succeeded.
    Connected,
    /// `disconnect()` ran or the relay went away.
    Disconnected,
}

/// Notification delivered through `Bridge::subscribe()`.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The bridge connected or disconnected.
    Connection(ConnectionStatus),
    /// A peer's liveness changed.
    PeerStatus {
        /// Remote client id.
        id: String,
        /// New status.
        status: PeerStatus,
    },
    /// A legacy plain mirror payload arrived.
    Mirror {
        /// Sender's client id.
        source: String,
        /// The mirrored content.
        payload: Value,
    },
}

impl BridgeEvent {
    /// Event name as seen by listeners.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::PeerStatus { .. } => "peer:status",
            Self::Mirror { .. } => "mirror",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(
            BridgeEvent::Connection(ConnectionStatus::Connected).name(),
            "connection"
        );
        assert_eq!(
            BridgeEvent::PeerStatus {
                id: "main".into(),
                status: PeerStatus::Waiting
            }
            .name(),
            "peer:status"
        );
        assert_eq!(
            BridgeEvent::Mirror {
                source: "main".into(),
                payload: Value::Null
            }
            .name(),
            "mirror"
        );
    }
}

//! Unified event channel for the Hub event loop.
//!
//! Every endpoint producer (socket read loops, WebSocket connections,
//! in-process attachments) sends events through a single
//! `mpsc::UnboundedSender<HubEvent>`. [`Hub::run`](super::Hub::run) receives
//! them in arrival order, which is what gives per-sender ordering.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::EndpointId;

/// Event delivered to the Hub event loop.
#[derive(Debug)]
pub enum HubEvent {
    /// A new endpoint joined the relay.
    EndpointConnected {
        /// Unique endpoint identifier (e.g. `"socket:1a2b3"`).
        endpoint_id: EndpointId,
        /// Where the Hub writes messages destined for this endpoint.
        outbound: UnboundedSender<Value>,
    },

    /// An endpoint sent a message to be relayed.
    EndpointMessage {
        /// Sender endpoint (excluded from fan-out).
        endpoint_id: EndpointId,
        /// Raw message, relayed verbatim.
        msg: Value,
    },

    /// An endpoint went away (EOF, decode error, or handle dropped).
    EndpointDisconnected {
        /// Endpoint that left.
        endpoint_id: EndpointId,
    },

    /// Stop the event loop.
    Shutdown,
}

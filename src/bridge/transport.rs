//! Relay transport abstraction consumed by the [`Bridge`](super::Bridge).
//!
//! A transport knows how to open one duplex connection to a Hub. The Bridge
//! never constructs sockets itself; it asks its [`RelayTransport`] for a
//! [`RelayLink`] on `connect()` and drops the link on `disconnect()`.
//!
//! ```text
//! RelayTransport (trait)
//!     │
//!     ├── LocalTransport   in-process HubHandle
//!     ├── SocketTransport  Unix socket, length-prefixed JSON frames
//!     └── WsTransport      WebSocket text frames
//! ```

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::error::BridgeError;
use crate::hub::{HubHandle, LocalEndpoint};
use crate::timer::ScopedTask;

/// Sending half of a relay connection.
pub trait RelaySender: Send + Sync + std::fmt::Debug {
    /// Hand one message to the relay.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Transport` once the connection is closed.
    fn send(&self, msg: Value) -> Result<(), BridgeError>;
}

impl RelaySender for UnboundedSender<Value> {
    fn send(&self, msg: Value) -> Result<(), BridgeError> {
        UnboundedSender::send(self, msg)
            .map_err(|_| BridgeError::Transport("relay connection closed".to_string()))
    }
}

impl RelaySender for LocalEndpoint {
    fn send(&self, msg: Value) -> Result<(), BridgeError> {
        if LocalEndpoint::send(self, msg) {
            Ok(())
        } else {
            Err(BridgeError::Transport("hub stopped".to_string()))
        }
    }
}

/// One open relay connection.
///
/// Dropping the link closes it: the sender is dropped and the reader task,
/// if any, is aborted.
#[derive(Debug)]
pub struct RelayLink {
    sender: Box<dyn RelaySender>,
    inbound: UnboundedReceiver<Value>,
    reader: Option<ScopedTask>,
}

impl RelayLink {
    /// Assemble a link from its parts.
    ///
    /// `reader` is the task feeding `inbound`, aborted with the link.
    pub fn new(
        sender: Box<dyn RelaySender>,
        inbound: UnboundedReceiver<Value>,
        reader: Option<ScopedTask>,
    ) -> Self {
        Self {
            sender,
            inbound,
            reader,
        }
    }

    /// Split into sender, inbound stream and reader task.
    pub fn into_parts(
        self,
    ) -> (
        Box<dyn RelaySender>,
        UnboundedReceiver<Value>,
        Option<ScopedTask>,
    ) {
        (self.sender, self.inbound, self.reader)
    }
}

/// Opens relay connections.
#[async_trait]
pub trait RelayTransport: Send + Sync + std::fmt::Debug {
    /// Open a new connection to the Hub.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Transport` if the Hub cannot be reached.
    async fn open(&self) -> Result<RelayLink, BridgeError>;
}

#[async_trait]
impl RelayTransport for Box<dyn RelayTransport> {
    async fn open(&self) -> Result<RelayLink, BridgeError> {
        (**self).open().await
    }
}

/// Transport to a Hub running in the same process.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    hub: HubHandle,
}

impl LocalTransport {
    /// Create a transport attaching to `hub`.
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl RelayTransport for LocalTransport {
    async fn open(&self) -> Result<RelayLink, BridgeError> {
        let (endpoint, inbound) = self
            .hub
            .attach()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        log::debug!("[Bridge] Attached local endpoint {}", endpoint.endpoint_id());
        Ok(RelayLink::new(Box::new(endpoint), inbound, None))
    }
}

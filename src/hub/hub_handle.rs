//! Hub handle for attaching endpoints and controlling the event loop.
//!
//! `HubHandle` wraps the Hub's event sender. It is `Clone + Send + Sync`, so
//! the socket server, the WebSocket server and in-process bridges can all
//! hold one.
//!
//! # Example
//!
//! ```ignore
//! let (hub, task) = HubHandle::spawn();
//! let (endpoint, mut inbound) = hub.attach()?;
//! endpoint.send(serde_json::json!({"hello": "world"}));
//! // ... inbound.recv().await yields messages from other endpoints
//! drop(endpoint); // reports EndpointDisconnected
//! hub.shutdown();
//! task.await?;
//! ```

use anyhow::{anyhow, Result};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::events::HubEvent;
use super::{generate_endpoint_id, EndpointId, Hub};

/// Handle for communicating with a running Hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    event_tx: UnboundedSender<HubEvent>,
}

impl HubHandle {
    /// Wrap an existing event sender.
    pub fn new(event_tx: UnboundedSender<HubEvent>) -> Self {
        Self { event_tx }
    }

    /// Start a fresh [`Hub`] on the current runtime.
    ///
    /// Returns the handle and the event loop's task.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Hub::new().run(event_rx));
        (Self::new(event_tx), task)
    }

    /// Register an in-process endpoint.
    ///
    /// Returns the sending half (which reports a disconnect when dropped) and
    /// the stream of messages relayed from other endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the Hub event loop has stopped.
    pub fn attach(&self) -> Result<(LocalEndpoint, UnboundedReceiver<Value>)> {
        let endpoint_id = generate_endpoint_id("local");
        let (outbound, inbound) = mpsc::unbounded_channel();
        self.event_tx
            .send(HubEvent::EndpointConnected {
                endpoint_id: endpoint_id.clone(),
                outbound,
            })
            .map_err(|_| anyhow!("Hub event loop is not running"))?;

        let endpoint = LocalEndpoint {
            endpoint_id,
            hub_tx: self.event_tx.clone(),
        };
        Ok((endpoint, inbound))
    }

    /// Ask the event loop to stop. Every endpoint's inbound stream closes.
    pub fn shutdown(&self) {
        if self.event_tx.send(HubEvent::Shutdown).is_err() {
            log::debug!("[Hub] Shutdown requested but event loop already stopped");
        }
    }

    /// Returns `true` while the event loop is still receiving.
    pub fn is_running(&self) -> bool {
        !self.event_tx.is_closed()
    }

    /// Clone of the raw event sender, for transport servers.
    pub fn event_sender(&self) -> UnboundedSender<HubEvent> {
        self.event_tx.clone()
    }
}

/// Sending half of an in-process endpoint.
///
/// Dropping it reports [`HubEvent::EndpointDisconnected`].
#[derive(Debug)]
pub struct LocalEndpoint {
    endpoint_id: EndpointId,
    hub_tx: UnboundedSender<HubEvent>,
}

impl LocalEndpoint {
    /// Hand a message to the Hub for relay.
    ///
    /// Returns `false` if the Hub has stopped.
    pub fn send(&self, msg: Value) -> bool {
        self.hub_tx
            .send(HubEvent::EndpointMessage {
                endpoint_id: self.endpoint_id.clone(),
                msg,
            })
            .is_ok()
    }

    /// Endpoint identifier assigned at attach time.
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        let _ = self.hub_tx.send(HubEvent::EndpointDisconnected {
            endpoint_id: self.endpoint_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_attached_endpoints_exchange_messages() {
        let (hub, task) = HubHandle::spawn();
        let (a, mut a_rx) = hub.attach().unwrap();
        let (b, mut b_rx) = hub.attach().unwrap();

        assert!(a.send(json!({"from": "a"})));
        assert_eq!(b_rx.recv().await.unwrap(), json!({"from": "a"}));

        assert!(b.send(json!({"from": "b"})));
        assert_eq!(a_rx.recv().await.unwrap(), json!({"from": "b"}));

        hub.shutdown();
        task.await.unwrap();
        assert!(!hub.is_running());
        assert!(a_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_endpoint_stops_receiving() {
        let (hub, _task) = HubHandle::spawn();
        let (a, _a_rx) = hub.attach().unwrap();
        let (b, mut b_rx) = hub.attach().unwrap();
        let (_c, mut c_rx) = hub.attach().unwrap();
        drop(b);

        a.send(json!(1));
        assert_eq!(c_rx.recv().await.unwrap(), json!(1));
        // b's outbound was dropped by the hub on disconnect.
        assert!(b_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_attach_fails_after_shutdown() {
        let (hub, task) = HubHandle::spawn();
        hub.shutdown();
        task.await.unwrap();
        assert!(hub.attach().is_err());
    }
}

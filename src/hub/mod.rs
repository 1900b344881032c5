//! Hub - the broadcast relay between endpoints.
//!
//! The Hub owns the set of connected endpoints and nothing else. Every
//! message an endpoint sends is forwarded, unmodified, to every *other*
//! endpoint in registration order. The Hub never inspects message shape;
//! validation is the bridge's job.
//!
//! # Architecture
//!
//! ```text
//! SocketServer ─┐
//! WsServer ─────┼── HubEvent ──► Hub::run ──► endpoint outbound channels
//! HubHandle ────┘   (one mpsc)    (relay)
//! ```
//!
//! All endpoint-set mutation happens inside [`Hub::run`], so no locking is
//! needed around the endpoint list.

pub mod events;
pub mod hub_handle;

use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub use events::HubEvent;
pub use hub_handle::{HubHandle, LocalEndpoint};

/// Identifier of one relay connection as seen by the Hub.
pub type EndpointId = String;

/// A registered endpoint.
#[derive(Debug)]
struct Endpoint {
    id: EndpointId,
    outbound: UnboundedSender<Value>,
}

/// Broadcast relay state.
#[derive(Debug, Default)]
pub struct Hub {
    /// Connected endpoints in registration order.
    endpoints: Vec<Endpoint>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint.
    ///
    /// Re-registering an existing id replaces its outbound channel in place.
    pub fn on_connect(&mut self, endpoint_id: EndpointId, outbound: UnboundedSender<Value>) {
        if let Some(existing) = self.endpoints.iter_mut().find(|e| e.id == endpoint_id) {
            log::warn!("[Hub] Endpoint {} re-registered", endpoint_id);
            existing.outbound = outbound;
            return;
        }
        log::info!("[Hub] Endpoint connected: {}", endpoint_id);
        self.endpoints.push(Endpoint {
            id: endpoint_id,
            outbound,
        });
    }

    /// Relay `msg` from `from` to every other endpoint.
    ///
    /// Returns the number of endpoints the message was handed to. Endpoints
    /// whose channel has already closed are skipped silently; they are
    /// removed when their disconnect event arrives.
    pub fn on_message(&mut self, from: &str, msg: &Value) -> usize {
        let mut delivered = 0;
        for endpoint in self.endpoints.iter().filter(|e| e.id != from) {
            if endpoint.outbound.send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                log::debug!("[Hub] Dropped message for closed endpoint {}", endpoint.id);
            }
        }
        log::trace!("[Hub] Relayed message from {} to {} endpoint(s)", from, delivered);
        delivered
    }

    /// Remove an endpoint. Returns `false` if it was not registered.
    pub fn on_disconnect(&mut self, endpoint_id: &str) -> bool {
        let before = self.endpoints.len();
        self.endpoints.retain(|e| e.id != endpoint_id);
        let removed = self.endpoints.len() != before;
        if removed {
            log::info!("[Hub] Endpoint disconnected: {}", endpoint_id);
        }
        removed
    }

    /// Number of connected endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Connected endpoint ids in registration order.
    pub fn endpoint_ids(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.id.as_str()).collect()
    }

    /// Apply one event. Returns `false` when the loop should stop.
    pub fn handle_event(&mut self, event: HubEvent) -> bool {
        match event {
            HubEvent::EndpointConnected {
                endpoint_id,
                outbound,
            } => self.on_connect(endpoint_id, outbound),
            HubEvent::EndpointMessage { endpoint_id, msg } => {
                self.on_message(&endpoint_id, &msg);
            }
            HubEvent::EndpointDisconnected { endpoint_id } => {
                self.on_disconnect(&endpoint_id);
            }
            HubEvent::Shutdown => return false,
        }
        true
    }

    /// Run the event loop until [`HubEvent::Shutdown`] or until every sender
    /// is gone.
    ///
    /// Dropping the hub on exit closes every endpoint's outbound channel.
    pub async fn run(mut self, mut events: UnboundedReceiver<HubEvent>) {
        log::info!("[Hub] Event loop starting");
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        log::info!(
            "[Hub] Event loop exiting with {} endpoint(s) attached",
            self.endpoint_count()
        );
    }
}

/// Generate a unique endpoint ID using a monotonic counter + random suffix.
pub(crate) fn generate_endpoint_id(transport: &str) -> EndpointId {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand: u16 = rand::random();
    format!("{transport}:{seq:x}{rand:04x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn endpoint(hub: &mut Hub, id: &str) -> UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.on_connect(id.to_string(), tx);
        rx
    }

    #[test]
    fn test_relay_skips_sender() {
        let mut hub = Hub::new();
        let mut a = endpoint(&mut hub, "a");
        let mut b = endpoint(&mut hub, "b");
        let mut c = endpoint(&mut hub, "c");

        let delivered = hub.on_message("a", &json!({"n": 1}));

        assert_eq!(delivered, 2);
        assert!(a.try_recv().is_err(), "sender must not receive its own message");
        assert_eq!(b.try_recv().unwrap(), json!({"n": 1}));
        assert_eq!(c.try_recv().unwrap(), json!({"n": 1}));
        assert!(b.try_recv().is_err(), "exactly one copy per endpoint");
        assert!(c.try_recv().is_err(), "exactly one copy per endpoint");
    }

    #[test]
    fn test_relays_malformed_data_verbatim() {
        let mut hub = Hub::new();
        let _a = endpoint(&mut hub, "a");
        let mut b = endpoint(&mut hub, "b");

        hub.on_message("a", &json!("not an envelope"));
        assert_eq!(b.try_recv().unwrap(), json!("not an envelope"));
    }

    #[test]
    fn test_disconnected_endpoint_no_longer_receives() {
        let mut hub = Hub::new();
        let _a = endpoint(&mut hub, "a");
        let mut b = endpoint(&mut hub, "b");

        assert!(hub.on_disconnect("b"));
        assert!(!hub.on_disconnect("b"));
        assert_eq!(hub.on_message("a", &json!(1)), 0);
        // Sender dropped by the hub: channel is closed and empty.
        assert!(matches!(
            b.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_closed_receiver_is_dropped_silently() {
        let mut hub = Hub::new();
        let _a = endpoint(&mut hub, "a");
        let b = endpoint(&mut hub, "b");
        let mut c = endpoint(&mut hub, "c");
        drop(b);

        assert_eq!(hub.on_message("a", &json!("x")), 1);
        assert_eq!(c.try_recv().unwrap(), json!("x"));
        assert_eq!(hub.endpoint_count(), 3);
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut hub = Hub::new();
        let _x = endpoint(&mut hub, "x");
        let _y = endpoint(&mut hub, "y");
        let _z = endpoint(&mut hub, "z");
        hub.on_disconnect("y");
        let _w = endpoint(&mut hub, "w");
        assert_eq!(hub.endpoint_ids(), vec!["x", "z", "w"]);
    }

    #[test]
    fn test_shutdown_event_stops_loop() {
        let mut hub = Hub::new();
        assert!(hub.handle_event(HubEvent::EndpointDisconnected {
            endpoint_id: "nobody".into()
        }));
        assert!(!hub.handle_event(HubEvent::Shutdown));
    }

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = generate_endpoint_id("socket");
        let b = generate_endpoint_id("socket");
        assert!(a.starts_with("socket:"), "Expected 'socket:' prefix, got: {a}");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_run_relays_in_order() {
        let (hub_tx, hub_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Hub::new().run(hub_rx));

        let (a_tx, _a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        hub_tx
            .send(HubEvent::EndpointConnected { endpoint_id: "a".into(), outbound: a_tx })
            .unwrap();
        hub_tx
            .send(HubEvent::EndpointConnected { endpoint_id: "b".into(), outbound: b_tx })
            .unwrap();
        for n in 0..5 {
            hub_tx
                .send(HubEvent::EndpointMessage { endpoint_id: "a".into(), msg: json!(n) })
                .unwrap();
        }
        hub_tx.send(HubEvent::Shutdown).unwrap();
        task.await.unwrap();

        let mut received = Vec::new();
        while let Some(v) = b_rx.recv().await {
            received.push(v);
        }
        assert_eq!(received, (0..5).map(|n| json!(n)).collect::<Vec<_>>());
    }
}

//! Bridge: one client's connection to the relay.
//!
//! A `Bridge` owns a client identity, a handler registry, and, while
//! connected, a [`Session`] holding everything that lives only as long as
//! the relay connection: the sender half of the link, pending requests,
//! peer presence, timers and the handler dispatcher.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────── Session ─────────────────────┐
//!  relay inbound ─┼─► driver task ◄── SessionEvent ◄── timers        │
//!                 │        │               ▲          (heartbeat,    │
//!                 │        │               │           sweep,        │
//!                 │        ▼               │           demotion,     │
//!                 │   presence / pending   │           timeouts)     │
//!                 │        │               │                         │
//!                 │        └─► dispatcher ─┘ HandlerReply            │
//!                 │            task (handlers, arrival order)        │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! The driver is the only task that mutates session state in response to
//! the network or timers. Every event it handles is checked against the
//! session epoch, so anything queued by a previous session is dropped.
//! Actions are queued to the dispatcher task in the order they arrive, and
//! handlers never run under the session lock.
//! `disconnect()` takes the session out synchronously; dropping it aborts
//! the driver, the reader, all timers and every running handler.

pub mod error;
pub mod events;
pub mod handlers;
pub mod pending;
pub mod presence;
pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;

use crate::constants::{
    DEFAULT_REQUEST_TIMEOUT, EVENT_CHANNEL_CAPACITY, HEARTBEAT_INTERVAL, PEER_DEMOTE_AFTER,
    PEER_STALE_AFTER, PRESENCE_PING, PRESENCE_SWEEP_INTERVAL,
};
use crate::envelope::{Body, Envelope, ReplyPayload};
use crate::timer::{self, ScopedTask};

pub use error::BridgeError;
pub use events::{BridgeEvent, ConnectionStatus};
pub use handlers::{handler_fn, ActionMessage, Handler, HandlerError, HandlerId, HandlerResult};
pub use presence::{PeerSnapshot, PeerStatus};
pub use transport::{LocalTransport, RelayLink, RelaySender, RelayTransport};

use handlers::{Dispatcher, HandlerRegistry};
use pending::{PendingRequest, PendingRequests};
use presence::Presence;

/// Timing knobs for one bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Period of outgoing `presence:ping` notifications.
    pub heartbeat_interval: Duration,
    /// Period of the peer liveness sweep.
    pub sweep_interval: Duration,
    /// Silence after which a connected peer is marked disconnected.
    pub stale_after: Duration,
    /// Time a disconnected peer waits before being demoted to waiting.
    pub demote_after: Duration,
    /// Default window for `send_request`.
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            sweep_interval: PRESENCE_SWEEP_INTERVAL,
            stale_after: PEER_STALE_AFTER,
            demote_after: PEER_DEMOTE_AFTER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Work items serialized through the session driver.
#[derive(Debug, Clone)]
enum SessionEvent {
    Inbound(Value),
    HeartbeatTick,
    SweepTick,
    Demote { peer: String, generation: u64 },
    RequestTimeout { id: String },
    HandlerReply { id: String, reply: ReplyPayload },
    LinkClosed,
}

/// An inbound action and the handlers registered for it on arrival.
type QueuedAction = (Vec<Arc<dyn Handler>>, ActionMessage);

/// State that exists only while connected.
struct Session {
    epoch: u64,
    sender: Box<dyn RelaySender>,
    events: UnboundedSender<SessionEvent>,
    actions: UnboundedSender<QueuedAction>,
    pending: PendingRequests,
    presence: Presence,
    _heartbeat: ScopedTask,
    _sweep: ScopedTask,
    _dispatcher: ScopedTask,
    _reader: Option<ScopedTask>,
    _driver: Option<ScopedTask>,
}

impl Session {
    fn send(&self, envelope: &Envelope) -> Result<(), BridgeError> {
        self.sender.send(envelope.to_value())
    }
}

struct Inner {
    client_id: String,
    config: BridgeConfig,
    transport: Arc<dyn RelayTransport>,
    handlers: Mutex<HandlerRegistry>,
    session: Mutex<Option<Session>>,
    /// Serializes `connect()` calls across the transport's await point.
    lifecycle: tokio::sync::Mutex<()>,
    events: broadcast::Sender<BridgeEvent>,
    next_request: AtomicU64,
    next_epoch: AtomicU64,
}

/// A client attached to the relay.
///
/// Cheap to clone; clones share the same connection and handlers.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("client_id", &self.inner.client_id)
            .field("connected", &self.is_connected())
            .field("transport", &self.inner.transport)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Create a disconnected bridge with default timings.
    pub fn new<T>(client_id: impl Into<String>, transport: T) -> Self
    where
        T: RelayTransport + 'static,
    {
        Self::with_config(client_id, transport, BridgeConfig::default())
    }

    /// Create a disconnected bridge with a random UUID client id.
    pub fn with_generated_id<T>(transport: T) -> Self
    where
        T: RelayTransport + 'static,
    {
        Self::new(uuid::Uuid::new_v4().to_string(), transport)
    }

    /// Create a disconnected bridge with explicit timings.
    pub fn with_config<T>(client_id: impl Into<String>, transport: T, config: BridgeConfig) -> Self
    where
        T: RelayTransport + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                client_id: client_id.into(),
                config,
                transport: Arc::new(transport),
                handlers: Mutex::new(HandlerRegistry::new()),
                session: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
                events,
                next_request: AtomicU64::new(1),
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    /// This bridge's identity on the wire.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Timings in effect.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Returns `true` while a session is open.
    pub fn is_connected(&self) -> bool {
        self.inner.session().is_some()
    }

    /// Subscribe to connection, presence and mirror events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    /// Open the relay connection and start presence.
    ///
    /// No-op if already connected. Emits `Connection(Connected)` and sends
    /// the first heartbeat immediately.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Transport` if the relay cannot be reached.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let link = self.inner.transport.open().await?;
        let (sender, inbound, reader) = link.into_parts();
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        let config = &self.inner.config;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let mut session = Session {
            epoch,
            sender,
            events: events_tx.clone(),
            actions: actions_tx,
            pending: PendingRequests::new(),
            presence: Presence::new(config.stale_after),
            _heartbeat: timer::every(
                config.heartbeat_interval,
                events_tx.clone(),
                SessionEvent::HeartbeatTick,
            ),
            _sweep: timer::every(config.sweep_interval, events_tx.clone(), SessionEvent::SweepTick),
            _dispatcher: ScopedTask::spawn(run_handlers(actions_rx, events_tx)),
            _reader: reader,
            _driver: None,
        };

        {
            let mut guard = self.inner.session();
            // Spawned under the lock so the driver never observes a missing session.
            session._driver = Some(ScopedTask::spawn(drive(
                Arc::downgrade(&self.inner),
                epoch,
                inbound,
                events_rx,
            )));
            *guard = Some(session);
        }

        log::info!(
            "[Bridge] {} connected (session {})",
            self.inner.client_id,
            epoch
        );
        self.inner.emit(BridgeEvent::Connection(ConnectionStatus::Connected));

        if let Some(session) = self.inner.session().as_ref() {
            self.inner.send_heartbeat(session);
        }
        Ok(())
    }

    /// Close the relay connection.
    ///
    /// Stops every timer, fails all pending requests with
    /// `BridgeError::Disconnected`, forgets all peers and emits
    /// `Connection(Disconnected)`. No-op if already disconnected.
    pub fn disconnect(&self) {
        let session = self.inner.session().take();
        if let Some(session) = session {
            self.inner.finish_session(session);
        }
    }

    /// Send an action.
    ///
    /// With `expect_reply`, the envelope carries a fresh correlation id
    /// which is returned. The reply is not tracked; use
    /// [`send_request`](Self::send_request) to await it.
    ///
    /// # Errors
    ///
    /// `NotConnected` when disconnected, `Transport` if the link is closed.
    pub fn send(
        &self,
        action: &str,
        payload: Value,
        expect_reply: bool,
    ) -> Result<Option<String>, BridgeError> {
        let guard = self.inner.session();
        let session = guard.as_ref().ok_or(BridgeError::NotConnected)?;

        let id = expect_reply.then(|| self.inner.next_correlation_id());
        let envelope = match &id {
            Some(id) => Envelope::request(&self.inner.client_id, action, id.clone(), payload),
            None => Envelope::notification(&self.inner.client_id, action, payload),
        };
        session.send(&envelope)?;
        Ok(id)
    }

    /// Fire-and-forget notification.
    ///
    /// # Errors
    ///
    /// `NotConnected` when disconnected, `Transport` if the link is closed.
    pub fn send_notification(&self, action: &str, payload: Value) -> Result<(), BridgeError> {
        self.send(action, payload, false).map(|_| ())
    }

    /// Send a request and wait for its reply, using the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`send_request_with_timeout`](Self::send_request_with_timeout).
    pub async fn send_request(
        &self,
        action: &str,
        payload: Value,
    ) -> Result<ReplyPayload, BridgeError> {
        self.send_request_with_timeout(action, payload, self.inner.config.request_timeout)
            .await
    }

    /// Send a request and wait up to `timeout` for the first matching reply.
    ///
    /// A reply carrying `{"error": ..}` still resolves `Ok`; inspect the
    /// returned [`ReplyPayload`].
    ///
    /// # Errors
    ///
    /// - `NotConnected` when disconnected
    /// - `Timeout` when no reply arrives in time
    /// - `Disconnected` when the bridge disconnects first
    /// - `Transport` if the link is closed
    pub async fn send_request_with_timeout(
        &self,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<ReplyPayload, BridgeError> {
        let reply_rx = {
            let mut guard = self.inner.session();
            let session = guard.as_mut().ok_or(BridgeError::NotConnected)?;

            let id = self.inner.next_correlation_id();
            let (reply_tx, reply_rx) = oneshot::channel();
            let timeout_timer = timer::after(
                timeout,
                session.events.clone(),
                SessionEvent::RequestTimeout { id: id.clone() },
            );
            session
                .pending
                .insert(id.clone(), PendingRequest::new(reply_tx, timeout_timer));

            let envelope = Envelope::request(&self.inner.client_id, action, id.clone(), payload);
            if let Err(e) = session.send(&envelope) {
                session.pending.take(&id);
                return Err(e);
            }
            log::debug!("[Bridge] Request {} '{}' sent", id, action);
            reply_rx
        };

        reply_rx.await.unwrap_or(Err(BridgeError::Disconnected))
    }

    /// Register `handler` for `action` (`*` for every action).
    pub fn on(&self, action: &str, handler: Arc<dyn Handler>) -> HandlerId {
        self.inner.handlers().on(action, handler)
    }

    /// Remove one handler, or all handlers for `action` when `handler` is
    /// `None`. Returns how many were removed.
    pub fn off(&self, action: &str, handler: Option<HandlerId>) -> usize {
        self.inner.handlers().off(action, handler)
    }

    /// Known peers, ordered by id. Empty while disconnected.
    pub fn peers(&self) -> Vec<PeerSnapshot> {
        self.inner
            .session()
            .as_ref()
            .map(|s| s.presence.snapshot())
            .unwrap_or_default()
    }

    /// Status of one peer.
    pub fn peer_status(&self, id: &str) -> Option<PeerStatus> {
        self.inner
            .session()
            .as_ref()
            .and_then(|s| s.presence.status(id))
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner
            .session()
            .as_ref()
            .map_or(0, |s| s.pending.len())
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BridgeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn next_correlation_id(&self) -> String {
        let n = self.next_request.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.client_id, n)
    }

    fn send_heartbeat(&self, session: &Session) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let ping = Envelope::notification(&self.client_id, PRESENCE_PING, Value::from(now_ms));
        if let Err(e) = session.send(&ping) {
            log::warn!("[Bridge] Heartbeat not sent: {e}");
        }
    }

    /// Tear down a session that has already been taken out of `self.session`.
    fn finish_session(&self, mut session: Session) {
        let pending = session.pending.drain();
        session.presence.clear();
        let epoch = session.epoch;
        drop(session);

        let failed = pending.len();
        for request in pending {
            request.fail(BridgeError::Disconnected);
        }

        log::info!(
            "[Bridge] {} disconnected (session {}, {} pending request(s) failed)",
            self.client_id,
            epoch,
            failed
        );
        self.emit(BridgeEvent::Connection(ConnectionStatus::Disconnected));
    }

    /// Handle one driver event. Returns `false` when the driver should stop.
    fn on_session_event(&self, epoch: u64, event: SessionEvent) -> bool {
        let mut guard = self.session();
        let Some(session) = guard.as_mut().filter(|s| s.epoch == epoch) else {
            return false;
        };

        match event {
            SessionEvent::Inbound(value) => self.on_inbound(session, value),
            SessionEvent::HeartbeatTick => self.send_heartbeat(session),
            SessionEvent::SweepTick => {
                for (peer, generation) in session.presence.sweep(Instant::now()) {
                    log::info!("[Bridge] Peer {} went silent", peer);
                    let demotion = timer::after(
                        self.config.demote_after,
                        session.events.clone(),
                        SessionEvent::Demote {
                            peer: peer.clone(),
                            generation,
                        },
                    );
                    session.presence.arm_demotion(&peer, generation, demotion);
                    self.emit(BridgeEvent::PeerStatus {
                        id: peer,
                        status: PeerStatus::Disconnected,
                    });
                }
            }
            SessionEvent::Demote { peer, generation } => {
                if session.presence.demote(&peer, generation) {
                    log::debug!("[Bridge] Peer {} now waiting", peer);
                    self.emit(BridgeEvent::PeerStatus {
                        id: peer,
                        status: PeerStatus::Waiting,
                    });
                }
            }
            SessionEvent::RequestTimeout { id } => {
                if let Some(request) = session.pending.take(&id) {
                    log::warn!("[Bridge] Request {} timed out", id);
                    request.fail(BridgeError::Timeout);
                }
            }
            SessionEvent::HandlerReply { id, reply } => {
                let envelope = Envelope::reply(&self.client_id, id, &reply);
                if let Err(e) = session.send(&envelope) {
                    log::warn!("[Bridge] Reply not sent: {e}");
                }
            }
            SessionEvent::LinkClosed => {
                log::warn!("[Bridge] {} relay connection closed", self.client_id);
                let session = guard.take();
                drop(guard);
                if let Some(session) = session {
                    self.finish_session(session);
                }
                return false;
            }
        }
        true
    }

    fn on_inbound(&self, session: &mut Session, value: Value) {
        let envelope = match Envelope::from_value(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::trace!("[Bridge] Ignoring relayed value: {e}");
                return;
            }
        };
        if envelope.source == self.client_id {
            return;
        }

        if envelope.action() == Some(PRESENCE_PING) {
            if let Some(status) = session
                .presence
                .observe_heartbeat(&envelope.source, Instant::now())
            {
                log::info!("[Bridge] Peer {} {}", envelope.source, status);
                self.emit(BridgeEvent::PeerStatus {
                    id: envelope.source,
                    status,
                });
            }
            return;
        }

        let source = envelope.source;
        match envelope.body {
            Body::Notification { action, payload } => self.dispatch(
                session,
                ActionMessage {
                    source,
                    action,
                    payload,
                    id: None,
                },
            ),
            Body::Request {
                action,
                id,
                payload,
            } => self.dispatch(
                session,
                ActionMessage {
                    source,
                    action,
                    payload,
                    id: Some(id),
                },
            ),
            Body::Reply { reply_to, payload } => {
                // Replies to other bridges' requests are relayed to us too.
                if let Some(request) = session.pending.take(&reply_to) {
                    request.resolve(ReplyPayload::from_wire(payload));
                }
            }
            Body::Legacy { payload } => self.emit(BridgeEvent::Mirror { source, payload }),
        }
    }

    fn dispatch(&self, session: &mut Session, message: ActionMessage) {
        let handlers = self.handlers().handlers_for(&message.action);

        if handlers.is_empty() {
            match message.id {
                Some(id) => {
                    log::debug!("[Bridge] No handler for request '{}'", message.action);
                    let reply = ReplyPayload::Error(BridgeError::NoHandler.to_string());
                    if let Err(e) = session.send(&Envelope::reply(&self.client_id, id, &reply)) {
                        log::warn!("[Bridge] Reply not sent: {e}");
                    }
                }
                None => log::trace!("[Bridge] No handler for '{}'", message.action),
            }
            return;
        }

        if session.actions.send((handlers, message)).is_err() {
            log::warn!("[Bridge] Handler dispatcher stopped, dropping action");
        }
    }
}

/// Session dispatcher: starts handlers in arrival order and forwards the
/// replies they settle to the driver.
async fn run_handlers(
    mut actions: UnboundedReceiver<QueuedAction>,
    events: UnboundedSender<SessionEvent>,
) {
    let mut dispatcher = Dispatcher::new();
    loop {
        let reply = tokio::select! {
            action = actions.recv() => match action {
                Some((handlers, message)) => dispatcher.start(handlers, message),
                None => break,
            },
            reply = dispatcher.next_reply(), if !dispatcher.is_idle() => reply,
        };
        if let Some((id, reply)) = reply {
            if events.send(SessionEvent::HandlerReply { id, reply }).is_err() {
                break;
            }
        }
    }
}

/// Session driver: serializes relay traffic and timer ticks.
async fn drive(
    inner: Weak<Inner>,
    epoch: u64,
    mut inbound: UnboundedReceiver<Value>,
    mut events: UnboundedReceiver<SessionEvent>,
) {
    loop {
        let event = tokio::select! {
            msg = inbound.recv() => match msg {
                Some(value) => SessionEvent::Inbound(value),
                None => SessionEvent::LinkClosed,
            },
            Some(event) = events.recv() => event,
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.on_session_event(epoch, event) {
            break;
        }
    }
    log::debug!("[Bridge] Driver for session {} stopped", epoch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubHandle;
    use serde_json::json;

    async fn recv_value(rx: &mut UnboundedReceiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_immediate_heartbeat() {
        let (hub, _task) = HubHandle::spawn();
        let (_observer, mut observed) = hub.attach().unwrap();
        let bridge = Bridge::new("main", LocalTransport::new(hub.clone()));

        bridge.connect().await.unwrap();
        let ping = recv_value(&mut observed).await;
        assert_eq!(ping["kind"], "mirror");
        assert_eq!(ping["source"], "main");
        assert_eq!(ping["action"], PRESENCE_PING);
        assert!(ping["payload"].is_i64());
    }

    #[tokio::test(start_paused = true)]
    async fn test_correlation_ids_are_prefixed_and_increasing() {
        let (hub, _task) = HubHandle::spawn();
        let (_observer, mut observed) = hub.attach().unwrap();
        let bridge = Bridge::new("main", LocalTransport::new(hub.clone()));
        bridge.connect().await.unwrap();
        let _ping = recv_value(&mut observed).await;

        assert_eq!(bridge.send("a", Value::Null, true).unwrap().as_deref(), Some("main-1"));
        assert_eq!(bridge.send("b", Value::Null, false).unwrap(), None);
        assert_eq!(bridge.send("c", json!(1), true).unwrap().as_deref(), Some("main-2"));

        let first = recv_value(&mut observed).await;
        assert_eq!(first["id"], "main-1");
        let second = recv_value(&mut observed).await;
        assert!(second.get("id").is_none());
        assert!(second.get("payload").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_own_and_foreign_traffic() {
        let (hub, _task) = HubHandle::spawn();
        let (intruder, _rx) = hub.attach().unwrap();
        let bridge = Bridge::new("main", LocalTransport::new(hub.clone()));
        bridge.connect().await.unwrap();

        intruder.send(json!({"type": "terminal", "data": "ls"}));
        intruder.send(json!("plain text"));
        intruder.send(json!({"kind": "mirror", "source": "main", "action": "presence:ping"}));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(bridge.is_connected());
        assert!(bridge.peers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_payload_emits_mirror_event() {
        let (hub, _task) = HubHandle::spawn();
        let (peer, _rx) = hub.attach().unwrap();
        let bridge = Bridge::new("main", LocalTransport::new(hub.clone()));
        let mut events = bridge.subscribe();
        bridge.connect().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            BridgeEvent::Connection(ConnectionStatus::Connected)
        );

        peer.send(Envelope::legacy("sub", "hello").to_value());
        assert_eq!(
            events.recv().await.unwrap(),
            BridgeEvent::Mirror {
                source: "sub".into(),
                payload: json!("hello"),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hub_shutdown_tears_down_session() {
        let (hub, _task) = HubHandle::spawn();
        let bridge = Bridge::new("main", LocalTransport::new(hub.clone()));
        let mut events = bridge.subscribe();
        bridge.connect().await.unwrap();
        let _connected = events.recv().await.unwrap();

        let request = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.send_request("slow", Value::Null).await })
        };
        while bridge.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
        hub.shutdown();

        assert_eq!(
            events.recv().await.unwrap(),
            BridgeEvent::Connection(ConnectionStatus::Disconnected)
        );
        assert!(!bridge.is_connected());
        assert_eq!(request.await.unwrap(), Err(BridgeError::Disconnected));
    }

    #[tokio::test]
    async fn test_default_config_matches_constants() {
        let config = BridgeConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1000));
        assert_eq!(config.sweep_interval, Duration::from_millis(500));
        assert_eq!(config.stale_after, Duration::from_millis(1500));
        assert_eq!(config.demote_after, Duration::from_millis(1500));
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
    }
}

//! MirrorBridge - a broadcast relay and the clients that talk over it.
//!
//! Several independent clients (editor windows, browser tabs, CLI sessions)
//! attach to one relay and exchange JSON envelopes: fire-and-forget
//! notifications, correlated request/reply pairs, and presence heartbeats.
//!
//! # Architecture
//!
//! - **Hub** - relays every message to every endpoint except its sender
//! - **Bridge** - one client's connection: handlers, requests, presence
//! - **Transports** - in-process, Unix socket and WebSocket links to a Hub
//! - **ContentMirror** - a shared text document built on a Bridge
//!
//! # Modules
//!
//! - [`envelope`] - wire format and validation
//! - [`hub`] - relay event loop
//! - [`bridge`] - client connection, handler registry, presence
//! - [`socket`] / [`ws`] - relay transports
//! - [`mirror`] - shared text content
//! - [`config`] - configuration loading/saving

pub mod bridge;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod hub;
pub mod mirror;
pub mod socket;
pub mod timer;
pub mod ws;

// Re-export commonly used types
pub use bridge::{
    handler_fn, ActionMessage, Bridge, BridgeConfig, BridgeError, BridgeEvent, ConnectionStatus,
    Handler, HandlerError, HandlerId, LocalTransport, PeerSnapshot, PeerStatus, RelayTransport,
};
pub use config::Config;
pub use envelope::{Envelope, ReplyPayload};
pub use hub::{Hub, HubHandle};
pub use mirror::ContentMirror;
pub use socket::{SocketServer, SocketTransport};
pub use ws::{WsServer, WsTransport};

//! Unix domain socket relay transport.
//!
//! Lets bridges in other processes share one Hub. Each socket connection is
//! a Hub endpoint, exactly like an in-process [`LocalEndpoint`](crate::hub::LocalEndpoint).
//!
//! # Architecture
//!
//! ```text
//! Hub Process                          Client Process (mirrorbridge client)
//! ┌──────────────────┐                ┌──────────────────┐
//! │ SocketServer     │                │ SocketTransport  │
//! │  UnixListener    │◄──────────────►│  UnixStream      │
//! │  endpoint_conn   │  frames over   │  reader / writer │
//! │  per connection  │  Unix socket   │  tasks           │
//! └────────┬─────────┘                └────────┬─────────┘
//!          │ HubEvent                          │ RelayLink
//!          ▼                                   ▼
//!       Hub event loop                       Bridge
//! ```
//!
//! # Wire Protocol
//!
//! Length-prefixed frames: `[u32 LE length][u8 type][payload]`
//!
//! See [`framing`] for frame types and codec.

pub mod client;
pub(crate) mod endpoint_conn;
pub mod framing;
pub mod server;

pub use client::SocketTransport;
pub use server::SocketServer;

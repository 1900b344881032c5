//! Application-wide constants for mirrorbridge.
//!
//! This module centralizes protocol timings and wire markers so the hub,
//! the bridge and the CLI agree on them. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **Wire**: envelope markers and reserved action names
//! - **Presence**: heartbeat, sweep and decay timings
//! - **Requests**: request/reply timeouts
//! - **Transport**: socket names and channel capacities

use std::time::Duration;

// ============================================================================
// Wire
// ============================================================================

/// Marker carried in the `kind` field of every bridge envelope.
///
/// Distinguishes bridge traffic from anything else sharing the relay.
pub const ENVELOPE_KIND: &str = "mirror";

/// Reserved action used for presence heartbeats.
pub const PRESENCE_PING: &str = "presence:ping";

/// Handler registry key that receives every inbound action.
pub const WILDCARD_ACTION: &str = "*";

// ============================================================================
// Presence
// ============================================================================

/// How often a connected bridge announces itself.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// How often a bridge checks its peers for staleness.
pub const PRESENCE_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Silence after which a connected peer is considered disconnected.
///
/// Strictly greater-than: a peer seen exactly this long ago is still connected.
pub const PEER_STALE_AFTER: Duration = Duration::from_millis(1500);

/// Delay between a peer going `disconnected` and being demoted to `waiting`.
pub const PEER_DEMOTE_AFTER: Duration = Duration::from_millis(1500);

// ============================================================================
// Requests
// ============================================================================

/// Default window for `send_request` before it fails with a timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

// ============================================================================
// Transport
// ============================================================================

/// File name of the hub's Unix socket inside the config directory.
pub const DEFAULT_SOCKET_NAME: &str = "mirrorbridge.sock";

/// Capacity of each bridge's event broadcast channel.
///
/// Slow subscribers that fall further behind than this see `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Read buffer size for socket connections.
pub const SOCKET_READ_BUFFER: usize = 64 * 1024;

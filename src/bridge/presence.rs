//! Peer liveness state machine.
//!
//! ```text
//!   (none) ──heartbeat──► connected ──sweep: silent > stale_after──► disconnected
//!                            ▲                                          │
//!                            │                               demotion timer fires
//!                            │                                          ▼
//!                            └──────────── heartbeat ─────────────── waiting
//!                            (also from disconnected, cancelling the demotion)
//! ```
//!
//! This module is pure bookkeeping: callers pass `now` explicitly and own
//! the scheduling. The bridge driver arms demotion timers through
//! [`Presence::arm_demotion`] and feeds their ticks back through
//! [`Presence::demote`]. Each peer carries a generation counter so a
//! demotion tick that was already queued when a heartbeat arrived can never
//! demote the peer again.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::timer::ScopedTask;

/// Liveness of a remote client as observed by this bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    /// Heartbeats are arriving.
    Connected,
    /// Heartbeats stopped recently.
    Disconnected,
    /// Heartbeats have been absent for a while.
    Waiting,
}

impl std::fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Waiting => write!(f, "waiting"),
        }
    }
}

/// Point-in-time view of a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    /// Remote client id.
    pub id: String,
    /// Current status.
    pub status: PeerStatus,
    /// When the last heartbeat arrived.
    pub last_seen: Instant,
}

#[derive(Debug)]
struct Peer {
    last_seen: Instant,
    status: PeerStatus,
    generation: u64,
    /// Present only while `Disconnected` and awaiting demotion.
    reset_timer: Option<ScopedTask>,
}

/// Peers known to one bridge session.
#[derive(Debug)]
pub struct Presence {
    peers: BTreeMap<String, Peer>,
    stale_after: Duration,
}

impl Presence {
    /// Create an empty table; peers silent for longer than `stale_after`
    /// are swept to `Disconnected`.
    pub fn new(stale_after: Duration) -> Self {
        Self {
            peers: BTreeMap::new(),
            stale_after,
        }
    }

    /// Record a heartbeat from `id`.
    ///
    /// Returns `Some(Connected)` when the peer is new or was not connected,
    /// i.e. when a status event should be emitted. Any pending demotion is
    /// cancelled.
    pub fn observe_heartbeat(&mut self, id: &str, now: Instant) -> Option<PeerStatus> {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.last_seen = now;
            peer.reset_timer = None;
            if peer.status == PeerStatus::Connected {
                return None;
            }
            peer.status = PeerStatus::Connected;
            peer.generation += 1;
        } else {
            self.peers.insert(
                id.to_string(),
                Peer {
                    last_seen: now,
                    status: PeerStatus::Connected,
                    generation: 0,
                    reset_timer: None,
                },
            );
        }
        Some(PeerStatus::Connected)
    }

    /// Move every connected peer silent for longer than `stale_after` to
    /// `Disconnected`.
    ///
    /// Returns `(peer id, generation)` for each transition; the caller arms
    /// a demotion timer carrying that generation.
    pub fn sweep(&mut self, now: Instant) -> Vec<(String, u64)> {
        let mut stale = Vec::new();
        for (id, peer) in &mut self.peers {
            if peer.status == PeerStatus::Connected
                && now.saturating_duration_since(peer.last_seen) > self.stale_after
            {
                peer.status = PeerStatus::Disconnected;
                peer.generation += 1;
                stale.push((id.clone(), peer.generation));
            }
        }
        stale
    }

    /// Attach the demotion timer for a peer that just went `Disconnected`.
    ///
    /// Ignored if the peer has moved on since `generation`.
    pub fn arm_demotion(&mut self, id: &str, generation: u64, timer: ScopedTask) {
        if let Some(peer) = self.peers.get_mut(id) {
            if peer.generation == generation && peer.status == PeerStatus::Disconnected {
                peer.reset_timer = Some(timer);
            }
        }
    }

    /// Demotion timer fired: `Disconnected` → `Waiting`.
    ///
    /// Returns `true` if the transition happened.
    pub fn demote(&mut self, id: &str, generation: u64) -> bool {
        match self.peers.get_mut(id) {
            Some(peer)
                if peer.generation == generation && peer.status == PeerStatus::Disconnected =>
            {
                peer.status = PeerStatus::Waiting;
                peer.reset_timer = None;
                true
            }
            _ => false,
        }
    }

    /// Status of one peer.
    pub fn status(&self, id: &str) -> Option<PeerStatus> {
        self.peers.get(id).map(|p| p.status)
    }

    /// Returns `true` if a demotion timer is armed for `id`.
    pub fn has_pending_demotion(&self, id: &str) -> bool {
        self.peers
            .get(id)
            .is_some_and(|p| p.reset_timer.is_some())
    }

    /// All peers, ordered by id.
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        self.peers
            .iter()
            .map(|(id, peer)| PeerSnapshot {
                id: id.clone(),
                status: peer.status,
                last_seen: peer.last_seen,
            })
            .collect()
    }

    /// Forget every peer, cancelling their demotion timers.
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no peer has been seen.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

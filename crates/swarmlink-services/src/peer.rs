//! Peer records — one remote participant per resource, and its state.
//!
//! ```text
//! Discovered ──► Connecting ──► Connected ──► Closed
//!      │              │              │
//!      └──────────────┴──────────────┴──────► Closed | Failed
//! ```
//!
//! `Closed` and `Failed` are terminal. A record in a terminal state is
//! removed from its [`PeerSet`] straight away, so a set only ever holds
//! live records.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;

use swarmlink_core::{PeerId, Topic};

use crate::transport::PeerTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Advertisement selected, nothing sent yet.
    Discovered,
    /// Transport handshake in progress.
    Connecting,
    /// Open and handed to the transfer engine.
    Connected,
    Closed,
    Failed,
}

impl PeerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PeerState::Closed | PeerState::Failed)
    }

    pub fn can_transition_to(self, next: PeerState) -> bool {
        use PeerState::*;
        match (self, next) {
            (Discovered, Connecting) => true,
            (Connecting, Connected) => true,
            (from, Closed | Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::Discovered => "discovered",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Closed => "closed",
            PeerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Who started the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We answered a remote advertisement.
    Outbound,
    /// A remote party answered our offer.
    Inbound,
}

/// Tracked state for one remote participant of one resource.
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub direction: Direction,
    state: PeerState,
    /// Distinguishes successive connections to the same peer, so a stale
    /// completion cannot remove a newer record.
    pub attempt: u64,
    /// Present from the moment the transport exists.
    pub transport: Option<Arc<dyn PeerTransport>>,
    /// When the current state was entered.
    pub since: Instant,
}

impl PeerRecord {
    pub fn new(peer_id: PeerId, direction: Direction, attempt: u64) -> Self {
        Self {
            peer_id,
            direction,
            state: PeerState::Discovered,
            attempt,
            transport: None,
            since: Instant::now(),
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Move to `next`, logging the change. Illegal moves are refused.
    ///
    /// With `verbose` set every transition is logged at info level,
    /// otherwise at trace.
    pub fn transition(&mut self, next: PeerState, topic: &Topic, verbose: bool) -> bool {
        let prev = self.state;
        if !prev.can_transition_to(next) {
            tracing::warn!(
                topic = %topic,
                peer = self.peer_id.short(),
                from = %prev,
                to = %next,
                "refusing illegal peer transition"
            );
            return false;
        }
        self.state = next;
        self.since = Instant::now();
        if verbose {
            tracing::info!(
                topic = %topic,
                peer = self.peer_id.short(),
                direction = ?self.direction,
                from = %prev,
                to = %next,
                "peer transition"
            );
        } else {
            tracing::trace!(
                topic = %topic,
                peer = self.peer_id.short(),
                from = %prev,
                to = %next,
                "peer transition"
            );
        }
        true
    }
}

impl fmt::Debug for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerRecord")
            .field("peer_id", &self.peer_id)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}

/// Live peers of one resource, keyed by identity.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every live record, whatever its state. This is what the cap counts.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn connected(&self) -> usize {
        self.count(PeerState::Connected)
    }

    /// Records still negotiating (discovered or connecting).
    pub fn pending(&self) -> usize {
        self.count(PeerState::Discovered) + self.count(PeerState::Connecting)
    }

    fn count(&self, state: PeerState) -> usize {
        self.peers.values().filter(|r| r.state == state).count()
    }

    /// Insert a record. Returns false (and drops it) if the peer is present.
    pub fn insert(&mut self, record: PeerRecord) -> bool {
        if self.peers.contains_key(&record.peer_id) {
            return false;
        }
        self.peers.insert(record.peer_id.clone(), record);
        true
    }

    /// Look up the record for `peer` only if it belongs to `attempt`.
    pub fn get_attempt_mut(&mut self, peer: &PeerId, attempt: u64) -> Option<&mut PeerRecord> {
        self.peers.get_mut(peer).filter(|r| r.attempt == attempt)
    }

    /// Remove the record for `peer` only if it belongs to `attempt`.
    pub fn remove_attempt(&mut self, peer: &PeerId, attempt: u64) -> Option<PeerRecord> {
        if self.peers.get(peer)?.attempt != attempt {
            return None;
        }
        self.peers.remove(peer)
    }

    /// Take every record out of the set.
    pub fn drain(&mut self) -> Vec<PeerRecord> {
        self.peers.drain().map(|(_, r)| r).collect()
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }
}

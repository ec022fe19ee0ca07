//! Peer connector — drives one connection attempt from handshake to close.
//!
//! Outbound attempts start from a discovered advertisement; inbound ones
//! from a remote party answering our offer. Both end up in [`drive`],
//! which waits for the first transport event, promotes the record on
//! `Open`, and then watches the link until it goes away.

use std::sync::Arc;

use swarmlink_core::PeerId;

use crate::context::Shared;
use crate::peer::{Direction, PeerState};
use crate::registry::{Admission, Resource};
use crate::signaling::{Advertisement, InboundAnswer};
use crate::transport::{Connection, ConnectionEvent, PeerTransport};

pub(crate) fn spawn_outbound(
    shared: Arc<Shared>,
    resource: Arc<Resource>,
    ad: Advertisement,
    attempt: u64,
) {
    tokio::spawn(async move {
        outbound(&shared, &resource, ad, attempt).await;
    });
}

async fn outbound(shared: &Shared, resource: &Resource, ad: Advertisement, attempt: u64) {
    let topic = resource.topic();
    let peer = ad.peer_id.clone();

    {
        let mut state = resource.lock();
        if state.torn_down {
            return;
        }
        match state.peers.get_attempt_mut(&peer, attempt) {
            Some(record) => {
                record.transition(PeerState::Connecting, topic, shared.verbose());
            }
            None => return,
        }
    }

    let connection = match shared.signaling.answer(&ad, &shared.config.transport).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(topic = %topic, peer = peer.short(), error = %e, "connection attempt failed");
            finish(shared, resource, &peer, attempt, PeerState::Failed);
            return;
        }
    };

    // teardown closes whatever transport the record holds
    let attached = {
        let mut state = resource.lock();
        if state.torn_down {
            false
        } else if let Some(record) = state.peers.get_attempt_mut(&peer, attempt) {
            record.transport = Some(connection.transport.clone());
            true
        } else {
            false
        }
    };
    if !attached {
        connection.reject("attempt abandoned").await;
        return;
    }

    drive(shared, resource, peer, attempt, connection).await;
}

/// Handle a remote party answering one of our offers.
pub(crate) async fn accept_inbound(shared: Arc<Shared>, answer: InboundAnswer) {
    let InboundAnswer {
        topic,
        offer_id,
        remote,
        connection,
    } = answer;

    let Some(resource) = shared.registry.get(&topic) else {
        tracing::debug!(topic = %topic, peer = remote.short(), "answer for unknown resource");
        connection.reject("unknown resource").await;
        return;
    };
    shared.offers.consume(&topic, &offer_id).await;

    if remote == shared.own_id {
        connection.reject("own offer").await;
        return;
    }

    let attempt = shared.next_attempt();
    let admission = {
        let mut state = resource.lock();
        let admission = state.admit(&remote, Direction::Inbound, attempt, shared.max_peers());
        if admission == Admission::Admitted {
            if let Some(record) = state.peers.get_attempt_mut(&remote, attempt) {
                record.transition(PeerState::Connecting, &topic, shared.verbose());
                record.transport = Some(connection.transport.clone());
            }
        }
        admission
    };

    if admission != Admission::Admitted {
        tracing::debug!(topic = %topic, peer = remote.short(), reason = admission.reason(), "refusing inbound answer");
        connection.reject(admission.reason()).await;
        return;
    }

    tracing::debug!(topic = %topic, peer = remote.short(), offer = %offer_id, "inbound answer accepted");
    drive(&shared, &resource, remote, attempt, connection).await;
}

enum Promotion {
    Connected,
    Discard(&'static str),
}

/// Wait for the link to open, hand it to the engine, then watch it close.
pub(crate) async fn drive(
    shared: &Shared,
    resource: &Resource,
    peer: PeerId,
    attempt: u64,
    connection: Connection,
) {
    let topic = resource.topic();
    let Connection {
        transport,
        mut events,
    } = connection;

    match events.recv().await {
        Some(ConnectionEvent::Open) => {}
        Some(ConnectionEvent::Error(reason)) => {
            tracing::warn!(topic = %topic, peer = peer.short(), reason = %reason, "connection failed");
            finish(shared, resource, &peer, attempt, PeerState::Failed);
            close_quietly(&*transport, &peer).await;
            return;
        }
        Some(ConnectionEvent::Close) | None => {
            tracing::debug!(topic = %topic, peer = peer.short(), "closed before opening");
            finish(shared, resource, &peer, attempt, PeerState::Closed);
            return;
        }
    }

    let promotion = {
        let mut state = resource.lock();
        let max = shared.max_peers();
        if state.torn_down {
            Promotion::Discard("resource torn down")
        } else if state.peers.connected() >= max {
            if let Some(mut record) = state.peers.remove_attempt(&peer, attempt) {
                record.transition(PeerState::Closed, topic, shared.verbose());
            }
            Promotion::Discard("peer cap reached")
        } else {
            match state.peers.get_attempt_mut(&peer, attempt) {
                Some(record) => {
                    record.transition(PeerState::Connected, topic, shared.verbose());
                    record.transport = Some(transport.clone());
                    Promotion::Connected
                }
                None => Promotion::Discard("record gone"),
            }
        }
    };

    if let Promotion::Discard(reason) = promotion {
        tracing::debug!(topic = %topic, peer = peer.short(), reason, "discarding opened link");
        close_quietly(&*transport, &peer).await;
        return;
    }

    shared.engine.add_peer(topic, &peer, transport.clone());
    tracing::info!(topic = %topic, peer = peer.short(), "peer connected");

    let terminal = loop {
        match events.recv().await {
            Some(ConnectionEvent::Open) => continue,
            Some(ConnectionEvent::Close) | None => break PeerState::Closed,
            Some(ConnectionEvent::Error(reason)) => {
                tracing::warn!(topic = %topic, peer = peer.short(), reason = %reason, "connection error");
                break PeerState::Failed;
            }
        }
    };
    finish(shared, resource, &peer, attempt, terminal);
    if terminal == PeerState::Failed {
        close_quietly(&*transport, &peer).await;
    }
    tracing::debug!(topic = %topic, peer = peer.short(), state = %terminal, "peer gone");
}

/// Move the attempt's record to a terminal state and drop it.
///
/// After teardown the records are already gone and closed, so nothing
/// happens.
fn finish(shared: &Shared, resource: &Resource, peer: &PeerId, attempt: u64, terminal: PeerState) {
    let mut state = resource.lock();
    if state.torn_down {
        return;
    }
    if let Some(mut record) = state.peers.remove_attempt(peer, attempt) {
        record.transition(terminal, resource.topic(), shared.verbose());
    }
}

async fn close_quietly(transport: &dyn PeerTransport, peer: &PeerId) {
    if let Err(e) = transport.close().await {
        tracing::debug!(peer = peer.short(), error = %e, "close after failure");
    }
}

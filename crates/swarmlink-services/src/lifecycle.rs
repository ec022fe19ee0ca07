//! Resource teardown.
//!
//! Order matters: the timer goes first so no pass can start new work,
//! then peers, then offers, then the filter, and the registry entry last.
//! Every step logs its own failures and carries on.

use std::sync::Arc;

use crate::context::Shared;
use crate::peer::PeerState;
use crate::registry::Resource;

/// Release everything the resource holds. Returns false if another caller
/// already claimed the cleanup.
pub(crate) async fn teardown(shared: &Shared, resource: &Arc<Resource>) -> bool {
    if !resource.claim_cleanup() {
        tracing::debug!(topic = %resource.topic(), "teardown already claimed");
        return false;
    }
    let topic = resource.topic();

    if let Some(timer) = resource.take_timer() {
        timer.cancel().await;
    }

    let records = {
        let mut state = resource.lock();
        state.torn_down = true;
        state.peers.drain()
    };
    let mut closed = 0;
    for mut record in records {
        if let Some(transport) = record.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::warn!(
                    topic = %topic,
                    peer = record.peer_id.short(),
                    error = %e,
                    "failed to close peer"
                );
            }
        }
        record.transition(PeerState::Closed, topic, shared.verbose());
        closed += 1;
    }

    let cancelled = shared.offers.cancel(topic).await;

    resource.lock().filter = None;

    if !shared.registry.unregister(resource) {
        tracing::debug!(topic = %topic, "registry entry already replaced");
    }

    tracing::info!(topic = %topic, peers = closed, offers = cancelled, "resource removed");
    true
}

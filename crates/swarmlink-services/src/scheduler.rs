//! Discovery scheduler — the periodic refresh pass for one resource.
//!
//! Each registered resource owns one timer task. A pass tops up our own
//! offers, asks the signaling service for advertisements it has not seen
//! (the resource's dedup filter travels with the query), and hands every
//! fresh one to the connector without waiting on it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::connector;
use crate::context::Shared;
use crate::peer::Direction;
use crate::registry::{Admission, Resource};

/// The running refresh task of one resource.
pub struct RefreshTimer {
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    pub fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the task and wait until it is gone. A pass in progress is
    /// dropped at its next await point.
    pub async fn cancel(self) {
        self.handle.abort();
        match self.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::warn!(error = %e, "refresh timer task failed"),
        }
    }
}

/// Keeps the live-timer count honest however the task ends.
struct LiveTimer(Arc<AtomicUsize>);

impl LiveTimer {
    fn start(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count.clone())
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Start the refresh task: one pass straight away, then one per interval.
pub(crate) fn spawn(shared: Arc<Shared>, resource: Arc<Resource>) -> RefreshTimer {
    let period = shared.config.discovery.refresh_interval();
    let live = LiveTimer::start(&shared.live_timers);

    let handle = tokio::spawn(async move {
        let _live = live;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            run_pass(&shared, &resource).await;
        }
    });

    RefreshTimer { handle }
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Already at the peer cap; nothing was queried.
    AtCapacity,
    /// The resource was torn down under us.
    Stopped,
    /// The discovery query failed; the next tick retries.
    QueryFailed,
    /// Query answered; `started` connection attempts handed off.
    Completed { started: usize },
}

pub(crate) async fn run_pass(shared: &Arc<Shared>, resource: &Arc<Resource>) -> PassOutcome {
    let topic = resource.topic();
    let max = shared.max_peers();

    let (remaining, seen) = {
        let state = resource.lock();
        let Some(filter) = state.filter.as_ref().filter(|_| !state.torn_down) else {
            return PassOutcome::Stopped;
        };
        let remaining = max.saturating_sub(state.peers.len());
        if remaining == 0 {
            tracing::debug!(topic = %topic, max, "peer cap reached, skipping discovery");
            return PassOutcome::AtCapacity;
        }
        (remaining, filter.serialize())
    };

    let discovery = &shared.config.discovery;
    if let Err(e) = shared
        .offers
        .ensure_offer(topic, discovery.offer_ttl(), discovery.offer_pool_size)
        .await
    {
        tracing::warn!(topic = %topic, error = %e, "failed to refresh offers");
    }

    let ads = match shared
        .signaling
        .discover(std::slice::from_ref(topic), remaining, &seen)
        .await
    {
        Ok(ads) => ads,
        Err(e) => {
            tracing::warn!(topic = %topic, error = %e, "discovery query failed");
            return PassOutcome::QueryFailed;
        }
    };
    tracing::debug!(topic = %topic, found = ads.len(), remaining, "discovery pass");

    let mut selected = Vec::new();
    {
        let mut state = resource.lock();
        for ad in ads {
            if ad.peer_id == shared.own_id {
                continue;
            }
            let attempt = shared.next_attempt();
            match state.admit(&ad.peer_id, Direction::Outbound, attempt, max) {
                Admission::Admitted => selected.push((ad, attempt)),
                Admission::AlreadySeen => {
                    tracing::trace!(topic = %topic, peer = ad.peer_id.short(), "already seen");
                }
                Admission::AtCapacity => break,
                Admission::TornDown => return PassOutcome::Stopped,
            }
        }
    }

    let started = selected.len();
    for (ad, attempt) in selected {
        connector::spawn_outbound(shared.clone(), resource.clone(), ad, attempt);
    }
    PassOutcome::Completed { started }
}

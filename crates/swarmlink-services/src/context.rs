//! State shared by the manager, its listener tasks, and every per-resource
//! timer and connection task.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use swarmlink_core::{FilterFactory, PeerId, RendezvousConfig};

use crate::engine::TransferEngine;
use crate::offer_pool::OfferPool;
use crate::registry::ResourceRegistry;
use crate::signaling::SignalingClient;

pub(crate) struct Shared {
    pub config: RendezvousConfig,
    /// Our identity at the signaling service.
    pub own_id: PeerId,
    pub signaling: Arc<dyn SignalingClient>,
    pub engine: Arc<dyn TransferEngine>,
    pub offers: OfferPool,
    pub registry: ResourceRegistry,
    pub filters: FilterFactory,
    next_attempt: AtomicU64,
    /// Refresh timer tasks currently alive (decremented when the task is dropped).
    pub live_timers: Arc<AtomicUsize>,
}

impl Shared {
    pub fn new(
        config: RendezvousConfig,
        own_id: PeerId,
        signaling: Arc<dyn SignalingClient>,
        engine: Arc<dyn TransferEngine>,
        filters: FilterFactory,
    ) -> Self {
        Self {
            config,
            own_id,
            offers: OfferPool::new(signaling.clone()),
            signaling,
            engine,
            registry: ResourceRegistry::new(),
            filters,
            next_attempt: AtomicU64::new(1),
            live_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_peers(&self) -> usize {
        self.config.discovery.max_peers_per_resource
    }

    pub fn verbose(&self) -> bool {
        self.config.debug
    }

    /// Fresh id for a connection attempt.
    pub fn next_attempt(&self) -> u64 {
        self.next_attempt.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) fn test_shared(
    config: RendezvousConfig,
) -> (
    Arc<Shared>,
    Arc<crate::testing::MockSignaling>,
    Arc<crate::testing::MockEngine>,
) {
    let signaling = crate::testing::MockSignaling::new();
    let engine = crate::testing::MockEngine::new();
    let shared = Arc::new(Shared::new(
        config,
        PeerId::new("self"),
        signaling.clone(),
        engine.clone(),
        Arc::new(|| -> Box<dyn swarmlink_core::DedupFilter> { Box::new(swarmlink_core::ExactFilter::new()) }),
    ));
    (shared, signaling, engine)
}

/// A registered resource with no refresh timer, so tests drive passes by hand.
#[cfg(test)]
pub(crate) fn detached_resource(
    shared: &Arc<Shared>,
    topic: &str,
) -> Arc<crate::registry::Resource> {
    let topic = swarmlink_core::Topic::new(topic);
    let mut filter = (shared.filters)();
    filter.add(shared.own_id.as_bytes());
    let resource = Arc::new(crate::registry::Resource::new(topic.clone(), filter));
    shared.offers.open(&topic);
    shared
        .registry
        .register_with(&topic, || resource.clone())
        .expect("topic already registered");
    resource
}

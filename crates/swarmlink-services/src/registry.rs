//! Resource registry — one entry per active topic.
//!
//! Each entry owns everything the topic needs while it is active: the
//! peer set, the dedup filter, and the refresh timer. Offers live in the
//! shared [`OfferPool`](crate::offer_pool::OfferPool) under the same topic.
//!
//! Per-resource state sits behind its own lock; nothing locks across
//! resources, and no lock is held over an `.await`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use swarmlink_core::{DedupFilter, PeerId, Topic};

use crate::context::Shared;
use crate::lifecycle;
use crate::peer::{Direction, PeerRecord, PeerSet};
use crate::scheduler::{self, RefreshTimer};

/// Outcome of offering a peer to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Admitted,
    /// In the filter or already in the peer set.
    AlreadySeen,
    AtCapacity,
    TornDown,
}

impl Admission {
    pub fn reason(self) -> &'static str {
        match self {
            Admission::Admitted => "admitted",
            Admission::AlreadySeen => "already seen",
            Admission::AtCapacity => "peer cap reached",
            Admission::TornDown => "resource torn down",
        }
    }
}

/// Mutable per-resource state.
pub(crate) struct ResourceState {
    pub peers: PeerSet,
    /// Dropped at teardown.
    pub filter: Option<Box<dyn DedupFilter>>,
    /// Set at the start of peer closing; completions check it and back off.
    pub torn_down: bool,
}

impl ResourceState {
    /// Reserve a slot for `peer` and record it in the filter.
    ///
    /// Outbound candidates are refused if the filter has seen them. Inbound
    /// ones were initiated by the remote side, so only the peer set counts.
    pub fn admit(
        &mut self,
        peer: &PeerId,
        direction: Direction,
        attempt: u64,
        max_peers: usize,
    ) -> Admission {
        if self.torn_down {
            return Admission::TornDown;
        }
        let Some(filter) = self.filter.as_mut() else {
            return Admission::TornDown;
        };
        if self.peers.contains(peer) {
            return Admission::AlreadySeen;
        }
        if direction == Direction::Outbound && filter.test(peer.as_bytes()) {
            return Admission::AlreadySeen;
        }
        if self.peers.len() >= max_peers {
            return Admission::AtCapacity;
        }
        filter.add(peer.as_bytes());
        self.peers
            .insert(PeerRecord::new(peer.clone(), direction, attempt));
        Admission::Admitted
    }
}

pub struct Resource {
    topic: Topic,
    state: Mutex<ResourceState>,
    timer: Mutex<Option<RefreshTimer>>,
    cleanup_claimed: AtomicBool,
}

impl Resource {
    pub(crate) fn new(topic: Topic, filter: Box<dyn DedupFilter>) -> Self {
        Self {
            topic,
            state: Mutex::new(ResourceState {
                peers: PeerSet::new(),
                filter: Some(filter),
                torn_down: false,
            }),
            timer: Mutex::new(None),
            cleanup_claimed: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ResourceState> {
        self.state.lock()
    }

    /// Connected peers.
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.connected()
    }

    /// Peers still negotiating.
    pub fn pending_count(&self) -> usize {
        self.state.lock().peers.pending()
    }

    /// Every live record; what the peer cap is measured against.
    pub fn live_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.state.lock().torn_down
    }

    pub(crate) fn set_timer(&self, timer: RefreshTimer) {
        *self.timer.lock() = Some(timer);
    }

    pub(crate) fn take_timer(&self) -> Option<RefreshTimer> {
        self.timer.lock().take()
    }

    pub fn has_live_timer(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|t| t.is_live())
    }

    /// First caller wins; everyone after gets false.
    pub(crate) fn claim_cleanup(&self) -> bool {
        !self.cleanup_claimed.swap(true, Ordering::AcqRel)
    }
}

/// Topic → resource map, shared by every task.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: DashMap<Topic, Arc<Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the resource built by `build` unless the topic is tracked.
    ///
    /// `build` runs while the entry is held, so whatever it attaches (the
    /// timer) is in place before any other task can see the resource.
    pub(crate) fn register_with(
        &self,
        topic: &Topic,
        build: impl FnOnce() -> Arc<Resource>,
    ) -> Option<Arc<Resource>> {
        match self.resources.entry(topic.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let resource = build();
                slot.insert(resource.clone());
                Some(resource)
            }
        }
    }

    pub fn get(&self, topic: &Topic) -> Option<Arc<Resource>> {
        self.resources.get(topic).map(|r| r.value().clone())
    }

    /// Remove the entry, but only if it still holds this exact resource.
    pub(crate) fn unregister(&self, resource: &Arc<Resource>) -> bool {
        self.resources
            .remove_if(resource.topic(), |_, current| Arc::ptr_eq(current, resource))
            .is_some()
    }

    /// Connected peers for a topic, or `None` if it is not tracked.
    pub fn peer_count(&self, topic: &Topic) -> Option<usize> {
        self.get(topic).map(|r| r.peer_count())
    }

    /// Tracked topics, sorted.
    pub fn list(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.resources.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn snapshot(&self) -> Vec<Arc<Resource>> {
        let mut resources: Vec<Arc<Resource>> =
            self.resources.iter().map(|e| e.value().clone()).collect();
        resources.sort_by(|a, b| a.topic().cmp(b.topic()));
        resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

// ── Registration side effects ─────────────────────────────────────────────────

impl Shared {
    /// Start tracking a topic: filter, offer slot, refresh timer.
    ///
    /// Returns false if the topic was already tracked. Must be called from
    /// within a tokio runtime.
    pub(crate) fn add_resource(self: &Arc<Self>, topic: Topic) -> bool {
        let registered = self.registry.register_with(&topic, || {
            let mut filter = (self.filters)();
            // our own advertisements come back from discovery too
            filter.add(self.own_id.as_bytes());
            let resource = Arc::new(Resource::new(topic.clone(), filter));
            self.offers.open(&topic);
            resource.set_timer(scheduler::spawn(self.clone(), resource.clone()));
            resource
        });

        if registered.is_some() {
            tracing::info!(topic = %topic, "resource registered");
            true
        } else {
            tracing::debug!(topic = %topic, "resource already tracked");
            false
        }
    }

    /// Tear a topic down. Unknown topics and repeat calls are no-ops.
    pub(crate) async fn remove_resource(&self, topic: &Topic) -> bool {
        let Some(resource) = self.registry.get(topic) else {
            tracing::debug!(topic = %topic, "remove for unknown resource");
            return false;
        };
        lifecycle::teardown(self, &resource).await
    }
}

//! Offer pool — our own outstanding advertisements, per topic.
//!
//! Each registered topic gets a slot holding a small pool of offers so
//! several remote parties can answer concurrently. Offers expire after
//! their TTL; a slot is only refilled once every offer in it has expired
//! or been answered.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use swarmlink_core::{OfferId, Topic};

use crate::signaling::{SignalingClient, SignalingError};

/// One of our published offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferHandle {
    pub id: OfferId,
    pub topic: Topic,
    pub expires_at: Instant,
}

impl OfferHandle {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("offer pool for {0} is closed")]
    Closed(Topic),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

#[derive(Default)]
struct OfferSlot {
    offers: Vec<OfferHandle>,
    /// Set by `cancel`; a closed slot never creates offers again.
    closed: bool,
}

/// Tracks and refreshes offers for every registered topic.
pub struct OfferPool {
    signaling: Arc<dyn SignalingClient>,
    /// Slots are held across the create-offers round trip, hence the async lock.
    slots: DashMap<Topic, Arc<Mutex<OfferSlot>>>,
}

impl OfferPool {
    pub fn new(signaling: Arc<dyn SignalingClient>) -> Self {
        Self {
            signaling,
            slots: DashMap::new(),
        }
    }

    /// Start tracking offers for a topic. No-op if already open.
    pub fn open(&self, topic: &Topic) {
        self.slots.entry(topic.clone()).or_default();
    }

    /// Return the topic's unexpired offers, publishing `pool_size` fresh
    /// ones through the signaling service if none are left.
    pub async fn ensure_offer(
        &self,
        topic: &Topic,
        ttl: Duration,
        pool_size: usize,
    ) -> Result<Vec<OfferHandle>, OfferError> {
        let slot = self
            .slots
            .get(topic)
            .map(|s| s.value().clone())
            .ok_or_else(|| OfferError::Closed(topic.clone()))?;
        let mut slot = slot.lock().await;
        if slot.closed {
            return Err(OfferError::Closed(topic.clone()));
        }

        let now = Instant::now();
        let before = slot.offers.len();
        slot.offers.retain(|o| !o.is_expired(now));
        if slot.offers.len() != before {
            tracing::debug!(topic = %topic, expired = before - slot.offers.len(), "dropped expired offers");
        }

        if !slot.offers.is_empty() || pool_size == 0 {
            return Ok(slot.offers.clone());
        }

        let ids = self.signaling.create_offers(topic, ttl, pool_size).await?;
        let expires_at = Instant::now() + ttl;
        tracing::debug!(topic = %topic, count = ids.len(), ttl_ms = ttl.as_millis() as u64, "offers published");
        slot.offers.extend(ids.into_iter().map(|id| OfferHandle {
            id,
            topic: topic.clone(),
            expires_at,
        }));
        Ok(slot.offers.clone())
    }

    /// Forget an offer a remote party has answered; it cannot be answered twice.
    pub async fn consume(&self, topic: &Topic, offer: &OfferId) {
        let Some(slot) = self.slots.get(topic).map(|s| s.value().clone()) else {
            return;
        };
        slot.lock().await.offers.retain(|o| &o.id != offer);
    }

    /// Cancel and forget every offer for a topic, closing its slot.
    ///
    /// Individual cancellation failures are logged and skipped. Returns
    /// the number of offers successfully cancelled.
    pub async fn cancel(&self, topic: &Topic) -> usize {
        let Some((_, slot)) = self.slots.remove(topic) else {
            return 0;
        };
        // waits out any in-flight ensure_offer for this topic
        let mut slot = slot.lock().await;
        slot.closed = true;

        let mut cancelled = 0;
        for offer in slot.offers.drain(..) {
            match self.signaling.cancel_offer(&offer.id).await {
                Ok(()) => cancelled += 1,
                Err(e) => tracing::warn!(
                    topic = %topic,
                    offer = %offer.id,
                    error = %e,
                    "failed to cancel offer"
                ),
            }
        }
        cancelled
    }

    /// Offers currently tracked for a topic, expired ones included.
    pub async fn tracked(&self, topic: &Topic) -> usize {
        match self.slots.get(topic).map(|s| s.value().clone()) {
            Some(slot) => slot.lock().await.offers.len(),
            None => 0,
        }
    }

    pub fn is_open(&self, topic: &Topic) -> bool {
        self.slots.contains_key(topic)
    }
}

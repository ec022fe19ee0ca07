//! Signaling service capability — offers, discovery, and answers.
//!
//! The wire protocol (websocket tracker, HTTP rendezvous, ...) is the
//! client's business. This trait is the whole surface the core uses.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use swarmlink_core::{Credential, OfferId, PeerId, Topic, TransportConfig};

use crate::transport::Connection;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("not registered with signaling service")]
    NotRegistered,
    #[error("signaling request failed: {0}")]
    Request(String),
    #[error("offer {0} not found")]
    UnknownOffer(OfferId),
    #[error("signaling request timed out")]
    Timeout,
    #[error("signaling connection lost")]
    Disconnected,
}

/// A remote participant's published offer, as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub offer_id: OfferId,
    /// Identity of the participant that published it.
    pub peer_id: PeerId,
    pub topics: Vec<Topic>,
    /// Opaque session description consumed by the transport layer.
    pub description: String,
}

/// A remote party answered one of our offers.
pub struct InboundAnswer {
    pub topic: Topic,
    pub offer_id: OfferId,
    pub remote: PeerId,
    pub connection: Connection,
}

/// Result of registering with the signaling service.
pub struct Registration {
    /// Reused if one was presented, otherwise freshly issued.
    pub credential: Credential,
    /// Answers to our offers, for the lifetime of the registration.
    pub answers: mpsc::UnboundedReceiver<InboundAnswer>,
}

#[async_trait]
pub trait SignalingClient: Send + Sync + 'static {
    /// Connect and authenticate. `None` asks the service for a new identity.
    async fn register(&self, credential: Option<Credential>) -> Result<Registration, SignalingError>;

    /// Publish `count` offers tagged with `topic`, each living for `ttl`.
    async fn create_offers(
        &self,
        topic: &Topic,
        ttl: Duration,
        count: usize,
    ) -> Result<Vec<OfferId>, SignalingError>;

    async fn cancel_offer(&self, offer: &OfferId) -> Result<(), SignalingError>;

    /// Remote offers tagged with any of `topics`, at most `limit` of them.
    ///
    /// `exclude` is a serialized dedup filter (see
    /// [`swarmlink_core::restore_filter`]); offers whose publisher tests
    /// positive in it are skipped before `limit` applies. Empty means no
    /// exclusion.
    async fn discover(
        &self,
        topics: &[Topic],
        limit: usize,
        exclude: &[u8],
    ) -> Result<Vec<Advertisement>, SignalingError>;

    /// Answer a remote offer. Returns once the handshake has been started;
    /// the connection's event stream reports how it ends.
    async fn answer(
        &self,
        ad: &Advertisement,
        transport: &TransportConfig,
    ) -> Result<Connection, SignalingError>;
}

//! Transport capability — a connected link to one remote peer.
//!
//! The concrete transport (WebRTC data channel, QUIC stream, ...) lives
//! outside this crate. swarmlink only needs to close it, hand it to the
//! transfer engine, and watch its lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use swarmlink_core::PeerId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport already closed")]
    Closed,
    #[error("transport failed: {0}")]
    Failed(String),
}

/// Lifecycle signals emitted by a transport after the handshake starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Link is usable; the only point at which the engine receives it.
    Open,
    /// Orderly shutdown by either side.
    Close,
    /// Link failed; carries a human-readable reason.
    Error(String),
}

/// A transport-ready handle usable by the transfer engine.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// The remote participant on the other end.
    fn remote(&self) -> &PeerId;

    async fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Close the link. Implementations should emit `ConnectionEvent::Close`.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A transport plus its event stream. A dropped stream counts as closed.
pub struct Connection {
    pub transport: Arc<dyn PeerTransport>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Connection {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Self {
        Self { transport, events }
    }

    /// Best-effort close for links that will never be used.
    pub(crate) async fn reject(self, reason: &'static str) {
        let remote = self.transport.remote().clone();
        if let Err(e) = self.transport.close().await {
            tracing::debug!(peer = remote.short(), reason, error = %e, "close of rejected link failed");
        } else {
            tracing::debug!(peer = remote.short(), reason, "rejected link closed");
        }
    }
}

//! Transfer engine capability.
//!
//! The bulk-transfer client announces which resources it is working on and
//! accepts connected peers for them. Everything else about it is opaque.

use std::sync::Arc;

use tokio::sync::mpsc;

use swarmlink_core::{PeerId, Topic};

use crate::transport::PeerTransport;

/// Resource lifecycle notifications from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Added(Topic),
    Removed(Topic),
}

pub trait TransferEngine: Send + Sync + 'static {
    /// Stream of resource added/removed notifications.
    ///
    /// Called once, after the manager registers with the signaling service.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ResourceEvent>;

    /// Inject a connected peer into the resource's peer pool.
    fn add_peer(&self, topic: &Topic, peer: &PeerId, transport: Arc<dyn PeerTransport>);
}

//! swarmlink-services — per-resource peer discovery and connection lifecycle.
//! Built on the identifiers and filters in swarmlink-core.

mod connector;
mod context;
mod lifecycle;

pub mod engine;
pub mod manager;
pub mod offer_pool;
pub mod peer;
pub mod registry;
pub mod scheduler;
pub mod signaling;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{ResourceEvent, TransferEngine};
pub use manager::{RendezvousManager, ResourceStats, Stats};
pub use offer_pool::{OfferError, OfferHandle, OfferPool};
pub use peer::{Direction, PeerRecord, PeerState};
pub use scheduler::PassOutcome;
pub use signaling::{Advertisement, InboundAnswer, Registration, SignalingClient, SignalingError};
pub use transport::{Connection, ConnectionEvent, PeerTransport, TransportError};

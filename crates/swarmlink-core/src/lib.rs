//! swarmlink-core — identifiers, configuration, and dedup filters.
//! The stateful discovery logic lives in swarmlink-services.

pub mod config;
pub mod dedup;
pub mod logging;
pub mod types;

pub use config::{ConfigError, RendezvousConfig, TransportConfig};
pub use dedup::{bloom_factory, restore_filter, BloomFilter, DedupFilter, ExactFilter, FilterFactory};
pub use types::{Credential, CredentialError, OfferId, PeerId, Topic};

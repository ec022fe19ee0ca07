//! Configuration for the rendezvous manager.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SWARMLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/swarmlink/config.toml
//!   3. ~/.config/swarmlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Production signaling endpoint.
pub const DEFAULT_SERVER_ADDRESS: &str = "wss://signal.swarmlink.dev";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    pub server: ServerConfig,
    pub discovery: DiscoveryConfig,
    pub dedup: DedupConfig,
    pub transport: TransportConfig,
    pub identity: IdentityConfig,
    /// Log every peer state transition at info level.
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Rendezvous service endpoint.
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Upper bound on live peers per resource.
    pub max_peers_per_resource: usize,
    /// Period of the per-resource refresh timer.
    pub refresh_interval_ms: u64,
    /// Lifetime of each published offer.
    pub offer_ttl_ms: u64,
    /// Offers kept outstanding per resource.
    pub offer_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Identities a per-resource Bloom filter is sized for.
    pub expected_items: usize,
    /// Target false-positive rate at `expected_items`.
    pub false_positive_rate: f64,
}

/// Passed untouched to the signaling client when answering offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ice_servers: Vec<String>,
    pub trickle: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Where the rendezvous credential is kept between runs. Unset = memory only.
    pub credential_path: Option<PathBuf>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            discovery: DiscoveryConfig::default(),
            dedup: DedupConfig::default(),
            transport: TransportConfig::default(),
            identity: IdentityConfig::default(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDRESS.to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_peers_per_resource: 50,
            refresh_interval_ms: 30_000,
            offer_ttl_ms: 60_000,
            offer_pool_size: 3,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            expected_items: 1000,
            false_positive_rate: 0.01,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:global.stun.twilio.com:3478".to_string(),
            ],
            trickle: true,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            credential_path: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn refresh_interval(&self) -> Duration {
        // interval() panics on a zero period
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn offer_ttl(&self) -> Duration {
        Duration::from_millis(self.offer_ttl_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("swarmlink")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RendezvousConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RendezvousConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SWARMLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RendezvousConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SWARMLINK_* overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SWARMLINK_SERVER__ADDRESS") {
            self.server.address = v;
        }
        if let Some(n) = lookup("SWARMLINK_DISCOVERY__MAX_PEERS").and_then(|v| v.parse().ok()) {
            self.discovery.max_peers_per_resource = n;
        }
        if let Some(ms) = lookup("SWARMLINK_DISCOVERY__REFRESH_INTERVAL_MS").and_then(|v| v.parse().ok())
        {
            self.discovery.refresh_interval_ms = ms;
        }
        if let Some(ms) = lookup("SWARMLINK_DISCOVERY__OFFER_TTL_MS").and_then(|v| v.parse().ok()) {
            self.discovery.offer_ttl_ms = ms;
        }
        if let Some(n) = lookup("SWARMLINK_DISCOVERY__OFFER_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.discovery.offer_pool_size = n;
        }
        if let Some(n) = lookup("SWARMLINK_DEDUP__EXPECTED_ITEMS").and_then(|v| v.parse().ok()) {
            self.dedup.expected_items = n;
        }
        if let Some(p) = lookup("SWARMLINK_DEDUP__FALSE_POSITIVE_RATE").and_then(|v| v.parse().ok()) {
            self.dedup.false_positive_rate = p;
        }
        // comma-separated; blank entries dropped
        if let Some(v) = lookup("SWARMLINK_TRANSPORT__ICE_SERVERS") {
            self.transport.ice_servers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("SWARMLINK_TRANSPORT__TRICKLE") {
            self.transport.trickle = v == "true" || v == "1";
        }
        if let Some(v) = lookup("SWARMLINK_IDENTITY__CREDENTIAL_PATH") {
            self.identity.credential_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SWARMLINK_DEBUG") {
            self.debug = v == "true" || v == "1";
        }
    }
}

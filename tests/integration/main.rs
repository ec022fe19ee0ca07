//! swarmlink integration test harness.
//!
//! Every test drives a full `RendezvousManager` against the in-memory
//! signaling service and transfer engine from `swarmlink_services::testing`.
//! Time is paused in most tests so refresh ticks happen on demand:
//!
//!   cargo test --test integration
//!
//! Tests share nothing; each one starts its own node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use swarmlink_core::{RendezvousConfig, Topic};
use swarmlink_services::testing::{MockEngine, MockSignaling};
use swarmlink_services::RendezvousManager;

mod config;
mod inbound;
mod invariants;
mod scenarios;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Refresh interval used by every test config.
pub const REFRESH: Duration = Duration::from_secs(30);

/// A manager wired to its in-memory collaborators.
pub struct Node {
    pub manager: RendezvousManager,
    pub signaling: Arc<MockSignaling>,
    pub engine: Arc<MockEngine>,
}

impl Node {
    pub async fn start(config: RendezvousConfig) -> Self {
        swarmlink_core::logging::init(config.debug);
        let signaling = MockSignaling::new();
        let engine = MockEngine::new();
        let manager = RendezvousManager::start(config, signaling.clone(), engine.clone(), None).await;
        Self {
            manager,
            signaling,
            engine,
        }
    }

    /// Announce a resource through the engine and wait until it is tracked.
    pub async fn add(&self, topic: &str) -> Result<()> {
        self.engine.add_resource(topic);
        let t = Topic::new(topic);
        wait_for(&format!("{topic} registered"), || {
            self.manager.list_resources().contains(&t)
        })
        .await
    }

    /// Withdraw a resource through the engine and wait until it is gone.
    pub async fn remove(&self, topic: &str) -> Result<()> {
        self.engine.remove_resource(topic);
        let t = Topic::new(topic);
        wait_for(&format!("{topic} removed"), || {
            !self.manager.list_resources().contains(&t)
        })
        .await
    }
}

/// Config with the given peer cap and the standard refresh interval.
pub fn config(max_peers: usize) -> RendezvousConfig {
    let mut config = RendezvousConfig::default();
    config.discovery.max_peers_per_resource = max_peers;
    config.discovery.refresh_interval_ms = REFRESH.as_millis() as u64;
    config
}

/// Poll `cond` every 10ms for up to two seconds.
pub async fn wait_for(what: &str, cond: impl Fn() -> bool) -> Result<()> {
    for _ in 0..200 {
        if cond() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("timed out waiting for: {what}")
}

/// Let every runnable task make progress.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Move time past the next refresh tick and let the pass run.
pub async fn next_tick() {
    tokio::time::sleep(REFRESH).await;
    settle().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// A fresh node registers and reports itself in stats.
#[tokio::test(start_paused = true)]
async fn test_node_starts_and_registers() -> Result<()> {
    let node = Node::start(config(5)).await;
    assert!(node.manager.is_active());
    assert_eq!(node.signaling.registrations().len(), 1);

    let stats = node.manager.stats().await;
    assert_eq!(stats.own_id.as_ref(), node.manager.own_id());
    assert_eq!(stats.server_address, "wss://signal.swarmlink.dev");
    assert_eq!(stats.active_resources, 0);
    assert_eq!(stats.active_timers, 0);

    node.manager.destroy().await;
    Ok(())
}

/// Stats serialize to the documented JSON shape.
#[tokio::test(start_paused = true)]
async fn test_stats_json_shape() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.add("t1").await?;
    settle().await;

    let json = serde_json::to_value(node.manager.stats().await)?;
    assert_eq!(json["active_resources"], 1);
    assert_eq!(json["active_timers"], 1);
    assert_eq!(json["resources"][0]["resource_id"], "t1");
    assert_eq!(json["resources"][0]["offers"], 3);
    assert!(json["own_id"].is_string());

    node.manager.destroy().await;
    Ok(())
}

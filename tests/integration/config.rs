use anyhow::Result;

use swarmlink_core::RendezvousConfig;
use swarmlink_services::testing::ad;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Config-driven behaviour
// ══════════════════════════════════════════════════════════════════════════════

/// Settings from a TOML file reach the running node: cap, pool size,
/// server address, and the Bloom filter sizing.
#[tokio::test(start_paused = true)]
async fn test_toml_config_drives_node() -> Result<()> {
    let config = RendezvousConfig::from_toml(
        r#"
        debug = true

        [server]
        address = "ws://127.0.0.1:9000"

        [discovery]
        max_peers_per_resource = 1
        refresh_interval_ms = 30000
        offer_pool_size = 1

        [dedup]
        expected_items = 16
        false_positive_rate = 0.001
        "#,
    )?;
    let node = Node::start(config).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1"), ad("b", "t1")]);
    node.add("t1").await?;
    settle().await;

    let stats = node.manager.stats().await;
    assert_eq!(stats.server_address, "ws://127.0.0.1:9000");
    assert_eq!(stats.resources[0].peer_count, 1);
    assert_eq!(stats.resources[0].offers, 1);
    assert_eq!(node.signaling.answered().len(), 1);

    node.manager.destroy().await;
    Ok(())
}

/// Each discovery query asks only for the capacity that is left.
#[tokio::test(start_paused = true)]
async fn test_query_limit_follows_capacity() -> Result<()> {
    let node = Node::start(config(4)).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1")]);
    node.add("t1").await?;
    settle().await;
    next_tick().await;

    let limits: Vec<usize> = node
        .signaling
        .discover_calls()
        .iter()
        .map(|(_, limit)| *limit)
        .collect();
    assert_eq!(limits, vec![4, 3]);

    node.manager.destroy().await;
    Ok(())
}

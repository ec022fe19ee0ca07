use anyhow::Result;

use swarmlink_core::{OfferId, PeerId, RendezvousConfig};
use swarmlink_services::testing::{MockEngine, MockSignaling};
use swarmlink_services::{ConnectionEvent, RendezvousManager};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Answers to our own offers
// ══════════════════════════════════════════════════════════════════════════════

/// A remote party answering our offer becomes a connected peer, and the
/// answered offer is replaced on the next pass.
#[tokio::test(start_paused = true)]
async fn test_inbound_answer_connects() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.add("t1").await?;
    settle().await;

    let offers = node.signaling.created_offers();
    assert_eq!(offers.len(), 3);
    let (_, offer) = &offers[0];

    node.signaling
        .inject_answer("t1", offer, "remote", true)
        .expect("registered");
    settle().await;

    assert_eq!(node.manager.peer_count("t1"), 1);
    assert_eq!(node.engine.peers_for("t1"), vec![PeerId::new("remote")]);
    assert_eq!(node.manager.stats().await.resources[0].offers, 2);

    node.manager.destroy().await;
    Ok(())
}

/// An inbound link that closes before opening leaves nothing behind.
#[tokio::test(start_paused = true)]
async fn test_inbound_closed_before_open() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.add("t1").await?;
    settle().await;

    let transport = node
        .signaling
        .inject_answer("t1", &OfferId::new("own-0"), "remote", false)
        .expect("registered");
    settle().await;
    assert_eq!(node.manager.stats().await.resources[0].connecting, 1);

    transport.emit(ConnectionEvent::Close);
    settle().await;
    let stats = node.manager.stats().await;
    assert_eq!(stats.resources[0].connecting, 0);
    assert_eq!(stats.resources[0].peer_count, 0);
    assert_eq!(node.engine.injected(), 0);

    node.manager.destroy().await;
    Ok(())
}

/// Answers for topics we do not track are closed straight away.
#[tokio::test(start_paused = true)]
async fn test_inbound_for_unknown_topic_closed() -> Result<()> {
    let node = Node::start(config(5)).await;

    let transport = node
        .signaling
        .inject_answer("nobody", &OfferId::new("own-0"), "remote", true)
        .expect("registered");
    settle().await;

    assert_eq!(transport.close_calls(), 1);
    assert_eq!(node.engine.injected(), 0);

    node.manager.destroy().await;
    Ok(())
}

/// The same remote reaching us twice keeps one link.
#[tokio::test(start_paused = true)]
async fn test_inbound_duplicate_refused() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.add("t1").await?;
    settle().await;

    let first = node
        .signaling
        .inject_answer("t1", &OfferId::new("own-0"), "remote", true)
        .expect("registered");
    settle().await;
    let second = node
        .signaling
        .inject_answer("t1", &OfferId::new("own-1"), "remote", true)
        .expect("registered");
    settle().await;

    assert_eq!(first.close_calls(), 0);
    assert_eq!(second.close_calls(), 1);
    assert_eq!(node.manager.peer_count("t1"), 1);

    node.manager.destroy().await;
    Ok(())
}

/// Without a registration there are no listeners and nothing to tear down.
#[tokio::test(start_paused = true)]
async fn test_register_failure_is_inert() -> Result<()> {
    let signaling = MockSignaling::new();
    signaling.set_fail_register(true);
    let engine = MockEngine::new();
    let manager = RendezvousManager::start(
        RendezvousConfig::default(),
        signaling.clone(),
        engine.clone(),
        None,
    )
    .await;

    assert!(!manager.is_active());
    assert!(manager.credential().is_none());

    engine.add_resource("t1");
    settle().await;
    assert!(manager.list_resources().is_empty());
    assert!(signaling.created_offers().is_empty());

    let stats = manager.stats().await;
    assert_eq!(stats.active_resources, 0);
    assert_eq!(stats.own_id, None);

    manager.destroy().await;
    Ok(())
}

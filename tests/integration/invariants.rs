use anyhow::Result;

use swarmlink_core::{OfferId, PeerId};
use swarmlink_services::testing::ad;
use swarmlink_services::ConnectionEvent;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Invariants
// ══════════════════════════════════════════════════════════════════════════════

/// Live timers always match registered resources, whatever the order of
/// add and remove notifications.
#[tokio::test(start_paused = true)]
async fn test_timers_track_resources() -> Result<()> {
    let node = Node::start(config(5)).await;
    let steps: &[(bool, &str)] = &[
        (true, "a"),
        (true, "b"),
        (true, "a"),
        (false, "a"),
        (false, "missing"),
        (true, "c"),
        (false, "b"),
        (true, "a"),
        (false, "c"),
        (false, "c"),
        (false, "a"),
    ];

    for (add, topic) in steps {
        if *add {
            node.engine.add_resource(topic);
        } else {
            node.engine.remove_resource(topic);
        }
        settle().await;
        let stats = node.manager.stats().await;
        assert_eq!(
            stats.active_timers,
            node.manager.list_resources().len(),
            "after {} {topic}",
            if *add { "add" } else { "remove" }
        );
    }
    assert!(node.manager.list_resources().is_empty());

    node.manager.destroy().await;
    Ok(())
}

/// Concurrent inbound completions never push a resource past its cap.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cap_holds_under_concurrent_answers() -> Result<()> {
    const CAP: usize = 3;
    let node = Node::start(config(CAP)).await;
    node.manager.add_resource("t1");

    let mut transports = Vec::new();
    for i in 0..20 {
        let offer = OfferId::new(format!("own-{i}"));
        let remote = format!("remote-{i}");
        if let Some(t) = node.signaling.inject_answer("t1", &offer, &remote, true) {
            transports.push(t);
        }
        assert!(node.manager.peer_count("t1") <= CAP);
    }
    assert_eq!(transports.len(), 20);

    wait_for("answers handled", || {
        transports.iter().filter(|t| t.close_calls() > 0).count() == 20 - CAP
    })
    .await?;

    assert_eq!(node.manager.peer_count("t1"), CAP);
    assert_eq!(node.engine.peers_for("t1").len(), CAP);

    node.manager.destroy().await;
    Ok(())
}

/// Removing twice closes each peer and cancels each offer exactly once.
#[tokio::test(start_paused = true)]
async fn test_double_remove_cleans_up_once() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1"), ad("b", "t1")]);
    node.add("t1").await?;
    settle().await;
    assert_eq!(node.manager.peer_count("t1"), 2);

    assert!(node.manager.remove_resource("t1").await);
    assert!(!node.manager.remove_resource("t1").await);
    settle().await;

    for peer in ["a", "b"] {
        assert_eq!(node.signaling.transports_for(peer)[0].close_calls(), 1);
    }
    assert_eq!(node.signaling.cancel_attempts().len(), 3);
    assert_eq!(node.manager.stats().await.active_timers, 0);

    node.manager.destroy().await;
    Ok(())
}

/// A peer seen once is not dialled again on later passes, even after its
/// link went away.
#[tokio::test(start_paused = true)]
async fn test_dedup_spans_passes() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1")]);
    node.add("t1").await?;
    settle().await;
    assert_eq!(node.manager.peer_count("t1"), 1);

    node.signaling.transports_for("a")[0].emit(ConnectionEvent::Close);
    settle().await;
    assert_eq!(node.manager.peer_count("t1"), 0);

    next_tick().await;
    next_tick().await;
    assert_eq!(node.signaling.answered(), vec![PeerId::new("a")]);
    assert_eq!(node.signaling.discover_calls().len(), 3);

    node.manager.destroy().await;
    Ok(())
}

/// Our own advertisement is never answered.
#[tokio::test(start_paused = true)]
async fn test_own_advertisement_ignored() -> Result<()> {
    let node = Node::start(config(5)).await;
    let own = node.manager.own_id().cloned().unwrap();
    node.signaling
        .set_ads("t1", vec![ad(own.as_str(), "t1"), ad("a", "t1")]);
    node.add("t1").await?;
    settle().await;

    assert_eq!(node.signaling.answered(), vec![PeerId::new("a")]);
    node.manager.destroy().await;
    Ok(())
}

/// Destroy tears down every resource and is safe to repeat.
#[tokio::test(start_paused = true)]
async fn test_destroy_releases_all_resources() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1")]);
    node.add("t1").await?;
    node.add("t2").await?;
    settle().await;

    node.manager.destroy().await;
    node.manager.destroy().await;

    assert!(!node.manager.is_active());
    assert!(node.manager.list_resources().is_empty());
    assert_eq!(node.manager.stats().await.active_timers, 0);
    assert_eq!(node.signaling.transports_for("a")[0].close_calls(), 1);
    assert_eq!(node.signaling.cancel_attempts().len(), 6);

    // events after destroy are not acted on
    node.engine.add_resource("t3");
    settle().await;
    assert!(node.manager.list_resources().is_empty());
    Ok(())
}

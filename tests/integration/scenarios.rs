use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;

use swarmlink_core::PeerId;
use swarmlink_services::testing::{ad, AnswerPlan};
use swarmlink_services::PassOutcome;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Discovery scenarios
// ══════════════════════════════════════════════════════════════════════════════

/// Three advertisements under a cap of two: only two attempts start. When
/// both fail, the third is tried on the next pass.
#[tokio::test(start_paused = true)]
async fn test_cap_defers_third_candidate_after_failures() -> Result<()> {
    let node = Node::start(config(2)).await;
    node.signaling
        .set_ads("t1", vec![ad("a", "t1"), ad("b", "t1"), ad("c", "t1")]);
    node.signaling.set_plan("a", AnswerPlan::Reject);
    node.signaling.set_plan("b", AnswerPlan::Reject);

    node.add("t1").await?;
    settle().await;
    assert_eq!(
        node.signaling.answered(),
        vec![PeerId::new("a"), PeerId::new("b")]
    );

    next_tick().await;
    let answered = node.signaling.answered();
    assert_eq!(answered.len(), 3);
    assert_eq!(answered[2], PeerId::new("c"));
    assert_eq!(node.manager.peer_count("t1"), 1);
    assert_eq!(node.engine.peers_for("t1"), vec![PeerId::new("c")]);

    node.manager.destroy().await;
    Ok(())
}

/// With room for one peer and a service that returns one advertisement per
/// query, each failed candidate makes way for the next on the following pass.
#[tokio::test(start_paused = true)]
async fn test_failed_candidates_do_not_block_later_ones() -> Result<()> {
    let node = Node::start(config(1)).await;
    node.signaling
        .set_ads("t1", vec![ad("a", "t1"), ad("b", "t1"), ad("c", "t1")]);
    node.signaling.set_plan("a", AnswerPlan::Reject);
    node.signaling.set_plan("b", AnswerPlan::Reject);

    node.add("t1").await?;
    settle().await;
    assert_eq!(node.signaling.answered(), vec![PeerId::new("a")]);

    next_tick().await;
    next_tick().await;
    assert_eq!(
        node.signaling.answered(),
        vec![PeerId::new("a"), PeerId::new("b"), PeerId::new("c")]
    );
    assert_eq!(node.engine.peers_for("t1"), vec![PeerId::new("c")]);
    assert!(node.signaling.discover_calls().iter().all(|(_, limit)| *limit == 1));

    node.manager.destroy().await;
    Ok(())
}

/// Same setup, but both attempts succeed: the third is never tried.
#[tokio::test(start_paused = true)]
async fn test_cap_skips_third_candidate_after_success() -> Result<()> {
    let node = Node::start(config(2)).await;
    node.signaling
        .set_ads("t1", vec![ad("a", "t1"), ad("b", "t1"), ad("c", "t1")]);

    node.add("t1").await?;
    settle().await;
    assert_eq!(node.manager.peer_count("t1"), 2);

    next_tick().await;
    next_tick().await;
    assert_eq!(node.signaling.answered().len(), 2);
    assert!(!node.signaling.answered().contains(&PeerId::new("c")));
    // full resource never queries again
    assert_eq!(node.signaling.discover_calls().len(), 1);

    node.manager.destroy().await;
    Ok(())
}

/// A manual pass on a full resource skips the query and changes nothing.
#[tokio::test(start_paused = true)]
async fn test_manual_discover_at_capacity() -> Result<()> {
    let node = Node::start(config(2)).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1"), ad("b", "t1")]);
    node.add("t1").await?;
    settle().await;
    assert_eq!(node.manager.peer_count("t1"), 2);
    let queries = node.signaling.discover_calls().len();

    let outcome = node.manager.discover_peers("t1").await;
    assert_eq!(outcome, Some(PassOutcome::AtCapacity));
    assert_eq!(node.signaling.discover_calls().len(), queries);

    let stats = node.manager.stats().await;
    assert_eq!(stats.resources[0].peer_count, 2);

    node.manager.destroy().await;
    Ok(())
}

/// Manual discovery for a topic that is not tracked is a no-op.
#[tokio::test(start_paused = true)]
async fn test_manual_discover_unknown_topic() -> Result<()> {
    let node = Node::start(config(2)).await;
    assert_eq!(node.manager.discover_peers("ghost").await, None);
    assert!(node.signaling.discover_calls().is_empty());
    node.manager.destroy().await;
    Ok(())
}

/// Removing a resource while an attempt is in flight: the late result is
/// closed and discarded.
#[tokio::test(start_paused = true)]
async fn test_remove_during_inflight_attempt() -> Result<()> {
    let node = Node::start(config(5)).await;
    let gate = Arc::new(Notify::new());
    node.signaling.set_ads("t1", vec![ad("a", "t1")]);
    node.signaling.set_plan("a", AnswerPlan::Gated(gate.clone()));

    node.add("t1").await?;
    settle().await;
    assert_eq!(node.signaling.answered(), vec![PeerId::new("a")]);

    node.remove("t1").await?;
    gate.notify_one();
    settle().await;

    let transports = node.signaling.transports_for("a");
    assert_eq!(transports.len(), 1);
    assert!(transports[0].is_closed());
    assert_eq!(node.engine.injected(), 0);
    assert_eq!(node.manager.peer_count("t1"), 0);

    let stats = node.manager.stats().await;
    assert!(stats.resources.iter().all(|r| r.resource_id.as_str() != "t1"));
    assert_eq!(stats.active_timers, 0);

    node.manager.destroy().await;
    Ok(())
}

/// Identity survives resource churn.
#[tokio::test(start_paused = true)]
async fn test_credential_independent_of_resources() -> Result<()> {
    let node = Node::start(config(5)).await;
    let before = node.manager.credential().cloned();
    assert!(before.is_some());

    node.add("t1").await?;
    settle().await;
    node.remove("t1").await?;

    assert_eq!(node.manager.credential().cloned(), before);
    node.manager.destroy().await;
    Ok(())
}

/// A failing query leaves the timer running and the next tick retries.
#[tokio::test(start_paused = true)]
async fn test_query_failure_retried_next_tick() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1")]);
    node.signaling.fail_next_discovers(1);

    node.add("t1").await?;
    settle().await;
    assert_eq!(node.signaling.discover_calls().len(), 1);
    assert_eq!(node.manager.peer_count("t1"), 0);
    assert_eq!(node.manager.stats().await.active_timers, 1);

    next_tick().await;
    assert_eq!(node.signaling.discover_calls().len(), 2);
    assert_eq!(node.manager.peer_count("t1"), 1);

    node.manager.destroy().await;
    Ok(())
}

/// A peer whose link errors is dropped from the set.
#[tokio::test(start_paused = true)]
async fn test_error_event_drops_peer() -> Result<()> {
    let node = Node::start(config(5)).await;
    node.signaling.set_ads("t1", vec![ad("a", "t1"), ad("b", "t1")]);
    node.signaling.set_plan("a", AnswerPlan::ErrorEvent);

    node.add("t1").await?;
    settle().await;

    assert_eq!(node.manager.peer_count("t1"), 1);
    assert_eq!(node.engine.peers_for("t1"), vec![PeerId::new("b")]);
    let stats = node.manager.stats().await;
    assert_eq!(stats.resources[0].connecting, 0);

    node.manager.destroy().await;
    Ok(())
}

//! End-to-End Mesh Scenarios
//!
//! Full-node tests over the in-memory mesh: direct sends, multi-hop relay,
//! duplicate suppression, TTL exhaustion, retry timelines, and fingerprint
//! verification. Each test runs on a paused tokio clock so the retry
//! backoff (t+1 s, t+3 s, t+7 s) is exact and the suite completes in
//! milliseconds of real time.

use std::time::Duration;

use lantern_core::{MessageDirection, MessageStatus, PeerId};
use lantern_harness::{exchange_keys, inject_bytes, MeshRouter, TestNode};

/// Budget for events that must arrive
const WAIT: Duration = Duration::from_secs(30);
/// Budget for events that must not arrive
const QUIET: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ----------------------------------------------------------------------------
// Scenario A: Two-Node Direct Send
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn two_node_direct_send() {
    init_tracing();
    let router = MeshRouter::new();
    let mut node1 = TestNode::spawn_with_identity(&router, "node-1", [0x01; 32])
        .await
        .unwrap();
    let mut node2 = TestNode::spawn_with_identity(&router, "node-2", [0x02; 32])
        .await
        .unwrap();

    router.link(&node1.name, &node2.name).await;
    exchange_keys(&node1, &node2).await.unwrap();

    let sent = node1
        .engine
        .send_message(node2.name.clone(), "hi")
        .await
        .unwrap();
    assert_eq!(sent.text, "hi");
    assert_eq!(sent.direction, MessageDirection::Sent);
    assert_eq!(sent.status, Some(MessageStatus::Delivered));

    // node 1 observes the pending -> delivered settlement
    let (id, status) = node1.next_status(WAIT).await.unwrap();
    assert_eq!(id, sent.id);
    assert_eq!(status, MessageStatus::Delivered);

    // node 2 emits exactly one receive event
    let received = node2.next_received(WAIT).await.unwrap();
    assert_eq!(received.text, "hi");
    assert_eq!(received.direction, MessageDirection::Received);
    assert_eq!(received.peer_id, node1.name);
    assert_eq!(received.id, sent.id);
    assert!(node2.next_received(QUIET).await.is_none());

    // history on both ends
    let history = node1.engine.messages(node2.name.clone()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, Some(MessageStatus::Delivered));

    let history = node2.engine.messages(node1.name.clone()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].direction, MessageDirection::Received);

    let stats = node2.engine.stats().await.unwrap();
    assert_eq!(stats.messages_received, 1);
}

// ----------------------------------------------------------------------------
// Scenario B: Relay Through a Middle Node
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn relay_through_middle_node() {
    init_tracing();
    let router = MeshRouter::new();
    let mut a = TestNode::spawn(&router, "node-a").await.unwrap();
    let b = TestNode::spawn(&router, "node-b").await.unwrap();
    let mut c = TestNode::spawn(&router, "node-c").await.unwrap();

    // a <-> b <-> c, no direct a <-> c radio path
    router.link(&a.name, &b.name).await;
    router.link(&b.name, &c.name).await;
    // a and c know each other's keys; b knows neither
    exchange_keys(&a, &c).await.unwrap();

    let sent = a
        .engine
        .send_message(c.name.clone(), "relay please")
        .await
        .unwrap();
    assert_eq!(sent.status, Some(MessageStatus::Delivered));

    let received = c.next_received(WAIT).await.unwrap();
    assert_eq!(received.text, "relay please");
    // attribution by sender id, not by the inbound transport address
    assert_eq!(received.peer_id, a.name);

    // the middle node forwarded without reading
    let stats = b.engine.stats().await.unwrap();
    assert_eq!(stats.messages_received, 0);
    assert_eq!(stats.decrypt_failures, 1);
    assert_eq!(stats.envelopes_relayed, 1);

    // nothing flowed back toward the sender
    assert!(a.next_received(QUIET).await.is_none());
    assert_eq!(a.engine.stats().await.unwrap().duplicates_dropped, 0);
}

// ----------------------------------------------------------------------------
// Scenario C: Duplicate Suppression in a Triangle
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_suppression_in_triangle() {
    init_tracing();
    let router = MeshRouter::new();
    let a = TestNode::spawn(&router, "node-a").await.unwrap();
    let b = TestNode::spawn(&router, "node-b").await.unwrap();
    let mut c = TestNode::spawn(&router, "node-c").await.unwrap();

    router.link(&a.name, &b.name).await;
    router.link(&a.name, &c.name).await;
    router.link(&b.name, &c.name).await;
    exchange_keys(&a, &c).await.unwrap();

    a.engine
        .send_message(c.name.clone(), "broadcast")
        .await
        .unwrap();

    // c gets the direct copy and the copy relayed through b; it delivers
    // exactly once, whichever arrives first
    let received = c.next_received(WAIT).await.unwrap();
    assert_eq!(received.text, "broadcast");
    assert!(c.next_received(QUIET).await.is_none());

    let stats = c.engine.stats().await.unwrap();
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.duplicates_dropped, 1);

    // b saw the original and c's relayed copy; one of them was suppressed
    let stats = b.engine.stats().await.unwrap();
    assert_eq!(stats.envelopes_relayed, 1);
    assert_eq!(stats.duplicates_dropped, 1);
}

// ----------------------------------------------------------------------------
// Scenario D: TTL Exhaustion on a 12-Node Chain
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn ttl_exhaustion_on_long_chain() {
    init_tracing();
    let router = MeshRouter::new();
    let names = [
        "node-a", "node-b", "node-c", "node-d", "node-e", "node-f", "node-g", "node-h", "node-i",
        "node-j", "node-k", "node-l",
    ];

    let mut nodes = Vec::new();
    for name in names {
        nodes.push(TestNode::spawn(&router, name).await.unwrap());
    }
    for pair in (0..nodes.len() - 1).map(|i| (i, i + 1)) {
        router.link(&nodes[pair.0].name, &nodes[pair.1].name).await;
    }
    let (first, rest) = nodes.split_first_mut().unwrap();
    let last = rest.last_mut().unwrap();
    exchange_keys(first, last).await.unwrap();

    let last_name = nodes.last().unwrap().name.clone();
    nodes[0]
        .engine
        .send_message(last_name, "end of the line")
        .await
        .unwrap();

    // ttl 10 leaves node-a; ten relays spend it exactly at node-l
    let received = nodes.last_mut().unwrap().next_received(WAIT).await.unwrap();
    assert_eq!(received.text, "end of the line");

    // the terminal node delivered but had no budget left to relay
    let stats = nodes.last().unwrap().engine.stats().await.unwrap();
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.envelopes_relayed, 0);

    // every intermediate node relayed exactly once and delivered nothing
    for node in &nodes[1..nodes.len() - 1] {
        let stats = node.engine.stats().await.unwrap();
        assert_eq!(stats.envelopes_relayed, 1, "node {}", node.name);
        assert_eq!(stats.messages_received, 0, "node {}", node.name);
    }
}

// ----------------------------------------------------------------------------
// Scenario E: Retry Timeline Over a Flapping Link
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn retry_until_transient_failure_clears() {
    init_tracing();
    let router = MeshRouter::new();
    let mut a = TestNode::spawn(&router, "node-a").await.unwrap();
    let mut b = TestNode::spawn(&router, "node-b").await.unwrap();

    router.link(&a.name, &b.name).await;
    exchange_keys(&a, &b).await.unwrap();

    // initial flood and the first two retries fail; the third retry lands
    router.fail_next_sends(&a.name, &b.name, 3);

    let sent = a
        .engine
        .send_message(b.name.clone(), "eventually")
        .await
        .unwrap();
    assert_eq!(sent.status, Some(MessageStatus::Pending));

    let (id, status) = a.next_status(WAIT).await.unwrap();
    assert_eq!(id, sent.id);
    assert_eq!(status, MessageStatus::Delivered);

    let received = b.next_received(WAIT).await.unwrap();
    assert_eq!(received.text, "eventually");

    // history caught up with the settlement
    let history = a.engine.messages(b.name.clone()).await.unwrap();
    assert_eq!(history[0].status, Some(MessageStatus::Delivered));
}

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_marks_failed() {
    init_tracing();
    let router = MeshRouter::new();
    let mut a = TestNode::spawn(&router, "node-a").await.unwrap();
    let mut b = TestNode::spawn(&router, "node-b").await.unwrap();

    router.link(&a.name, &b.name).await;
    exchange_keys(&a, &b).await.unwrap();

    // initial flood plus all three retries fail
    router.fail_next_sends(&a.name, &b.name, 4);

    let sent = a
        .engine
        .send_message(b.name.clone(), "never arrives")
        .await
        .unwrap();
    assert_eq!(sent.status, Some(MessageStatus::Pending));

    let (id, status) = a.next_status(WAIT).await.unwrap();
    assert_eq!(id, sent.id);
    assert_eq!(status, MessageStatus::Failed);

    assert!(b.next_received(QUIET).await.is_none());
    let history = a.engine.messages(b.name.clone()).await.unwrap();
    assert_eq!(history[0].status, Some(MessageStatus::Failed));
}

// ----------------------------------------------------------------------------
// Scenario F: Fingerprint Defeats a Key-Substitution MITM
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fingerprint_verification_defeats_mitm() {
    init_tracing();
    let router = MeshRouter::new();
    let a = TestNode::spawn(&router, "node-a").await.unwrap();
    let b = TestNode::spawn(&router, "node-b").await.unwrap();
    let mallory = TestNode::spawn(&router, "node-m").await.unwrap();

    // mallory completed the key exchange impersonating b: the entry a
    // holds under b's address carries mallory's key
    a.engine
        .bind_peer_key(b.name.clone(), mallory.public_key)
        .await
        .unwrap();

    // a scans b's true QR fingerprint out-of-band; it cannot match
    let verified = a
        .engine
        .verify_peer(b.name.clone(), b.fingerprint.clone())
        .await
        .unwrap();
    assert!(!verified);

    let peers = a.engine.peers().await.unwrap();
    let entry = peers.iter().find(|p| p.peer_id == b.name).unwrap();
    assert!(!entry.verified);

    // once the genuine key replaces the planted one, the same scan passes
    a.engine
        .bind_peer_key(b.name.clone(), b.public_key)
        .await
        .unwrap();
    let verified = a
        .engine
        .verify_peer(b.name.clone(), b.fingerprint.clone())
        .await
        .unwrap();
    assert!(verified);

    let peers = a.engine.peers().await.unwrap();
    let entry = peers.iter().find(|p| p.peer_id == b.name).unwrap();
    assert!(entry.verified);
}

// ----------------------------------------------------------------------------
// Adversarial Input and API Validation
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn malformed_bytes_never_disturb_the_engine() {
    init_tracing();
    let router = MeshRouter::new();
    let a = TestNode::spawn(&router, "node-a").await.unwrap();
    let mut b = TestNode::spawn(&router, "node-b").await.unwrap();

    router.link(&a.name, &b.name).await;
    exchange_keys(&a, &b).await.unwrap();

    inject_bytes(&b.transport, a.name.clone(), b"definitely not an envelope".to_vec()).await;
    inject_bytes(&b.transport, a.name.clone(), vec![]).await;
    inject_bytes(&b.transport, a.name.clone(), vec![0xff; 512]).await;

    assert!(b.next_received(QUIET).await.is_none());
    let stats = b.engine.stats().await.unwrap();
    assert_eq!(stats.decode_failures, 3);
    assert_eq!(stats.messages_received, 0);

    // the engine still works afterwards
    a.engine
        .send_message(b.name.clone(), "still alive")
        .await
        .unwrap();
    assert_eq!(b.next_received(WAIT).await.unwrap().text, "still alive");
}

#[tokio::test(start_paused = true)]
async fn send_validation_is_synchronous() {
    init_tracing();
    let router = MeshRouter::new();
    let a = TestNode::spawn(&router, "node-a").await.unwrap();
    let b = TestNode::spawn(&router, "node-b").await.unwrap();

    use lantern_core::SendError;

    // text validation runs before peer resolution
    let err = a
        .engine
        .send_message(b.name.clone(), "")
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::EmptyMessage));

    let err = a
        .engine
        .send_message(PeerId::new("node-z"), "anyone there?")
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::UnknownPeer(_)));

    router.link(&a.name, &b.name).await;
    // give the engines a moment to absorb the connection events
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = a
        .engine
        .send_message(b.name.clone(), "x".repeat(501))
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::TooLong { length: 501, .. }));

    let err = a
        .engine
        .send_message(b.name.clone(), "no keys yet")
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::NoSharedSecret(_)));
}

// ----------------------------------------------------------------------------
// Peer Directory Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_keeps_the_peer_record() {
    init_tracing();
    let router = MeshRouter::new();
    let a = TestNode::spawn(&router, "node-a").await.unwrap();
    let b = TestNode::spawn(&router, "node-b").await.unwrap();

    router.link(&a.name, &b.name).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peers = a.engine.peers().await.unwrap();
    assert!(peers.iter().any(|p| p.peer_id == b.name && p.connected));

    router.unlink(&a.name, &b.name).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peers = a.engine.peers().await.unwrap();
    assert!(peers.iter().any(|p| p.peer_id == b.name && !p.connected));

    // removal is an explicit user decision
    a.engine.remove_peer(b.name.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let peers = a.engine.peers().await.unwrap();
    assert!(!peers.iter().any(|p| p.peer_id == b.name));
}

#[tokio::test(start_paused = true)]
async fn shutdown_snapshots_the_duplicate_cache() {
    init_tracing();
    let router = MeshRouter::new();
    let mut a = TestNode::spawn(&router, "node-a").await.unwrap();
    let mut b = TestNode::spawn(&router, "node-b").await.unwrap();

    router.link(&a.name, &b.name).await;
    exchange_keys(&a, &b).await.unwrap();

    let sent = a
        .engine
        .send_message(b.name.clone(), "before restart")
        .await
        .unwrap();
    assert!(b.next_received(WAIT).await.is_some());
    // drain a's settlement event before shutting down
    assert!(a.next_status(WAIT).await.is_some());

    b.engine.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = b.storage.load_duplicate_cache().unwrap();
    assert!(snapshot.iter().any(|(id, _)| *id == sent.id));
}

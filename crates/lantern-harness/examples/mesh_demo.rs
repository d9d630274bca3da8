//! Three-Node Mesh Demo
//!
//! Spins up three Lantern nodes on the in-memory mesh, links them in a
//! line, and sends a message that must hop through the middle node.
//!
//! Run with: `cargo run -p lantern-harness --example mesh_demo`

use std::time::Duration;

use lantern_harness::{exchange_keys, MeshRouter, TestNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    println!("Lantern mesh demo: alice <-> relay <-> bob");

    let router = MeshRouter::new();
    let alice = TestNode::spawn(&router, "alice").await?;
    let relay = TestNode::spawn(&router, "relay").await?;
    let mut bob = TestNode::spawn(&router, "bob").await?;

    // alice and bob are out of radio range of each other
    router.link(&alice.name, &relay.name).await;
    router.link(&relay.name, &bob.name).await;

    // key exchange between the endpoints only; the relay can't read a thing
    exchange_keys(&alice, &bob).await?;
    println!("alice fingerprint: {}", alice.fingerprint);
    println!("bob   fingerprint: {}", bob.fingerprint);

    let sent = alice
        .engine
        .send_message(bob.name.clone(), "meet at the north shelter")
        .await?;
    println!("alice sent {} ({:?})", sent.id, sent.status);

    let received = bob
        .next_received(Duration::from_secs(5))
        .await
        .expect("message should arrive through the relay");
    println!("bob received from {}: {:?}", received.peer_id, received.text);

    let stats = relay.engine.stats().await?;
    println!(
        "relay forwarded {} envelope(s), decrypted {}",
        stats.envelopes_relayed, stats.messages_received
    );

    Ok(())
}

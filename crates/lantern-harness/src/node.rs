//! Test node wiring
//!
//! A [`TestNode`] is one complete Lantern node -- storage, engine task, and
//! mock transport -- registered on a shared [`MeshRouter`]. Scenario tests
//! spawn a handful of these, link them, and drive messages through.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::timeout;

use lantern_core::crypto::Identity;
use lantern_core::{
    EngineConfig, KeyValueStorage, MemoryKeyValueStore, Message, MessageId, MessageStatus, PeerId,
    Storage,
};
use lantern_engine::{spawn_engine, EngineEvent, EngineEventReceiver, EngineHandle};

use crate::mock::MockTransport;
use crate::router::MeshRouter;

// ----------------------------------------------------------------------------
// Test Node
// ----------------------------------------------------------------------------

/// One complete node on the test mesh
pub struct TestNode {
    pub name: PeerId,
    pub engine: EngineHandle,
    pub events: EngineEventReceiver,
    pub storage: Arc<dyn Storage>,
    pub transport: Arc<MockTransport>,
    pub public_key: [u8; 32],
    pub fingerprint: String,
}

impl TestNode {
    /// Spawn a node with a freshly generated identity
    pub async fn spawn(router: &MeshRouter, name: &str) -> anyhow::Result<Self> {
        Self::spawn_inner(router, name, None, EngineConfig::default()).await
    }

    /// Spawn a node with a fixed identity private key, for deterministic
    /// scenarios
    pub async fn spawn_with_identity(
        router: &MeshRouter,
        name: &str,
        private_key: [u8; 32],
    ) -> anyhow::Result<Self> {
        Self::spawn_inner(router, name, Some(private_key), EngineConfig::default()).await
    }

    /// Spawn with a custom engine configuration
    pub async fn spawn_with_config(
        router: &MeshRouter,
        name: &str,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        Self::spawn_inner(router, name, None, config).await
    }

    async fn spawn_inner(
        router: &MeshRouter,
        name: &str,
        private_key: Option<[u8; 32]>,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        let name = PeerId::new(name);
        let storage: Arc<dyn Storage> = Arc::new(KeyValueStorage::new(MemoryKeyValueStore::new()));

        if let Some(private_key) = private_key {
            let identity = Identity::from_private_bytes(private_key);
            storage
                .store_identity(&identity.public_key_bytes(), &private_key)
                .context("seeding fixed identity")?;
        }

        let transport = Arc::new(MockTransport::new(router.clone(), name.clone()));
        let (engine, events) = spawn_engine(config, transport.clone(), storage.clone())
            .context("spawning engine")?;

        let identity = engine
            .local_identity()
            .await
            .context("reading local identity")?;

        Ok(Self {
            name,
            engine,
            events,
            storage,
            transport,
            public_key: identity.public_key,
            fingerprint: identity.fingerprint,
        })
    }

    /// Wait for the next engine event, bounded by `within`
    pub async fn next_event(&mut self, within: Duration) -> Option<EngineEvent> {
        timeout(within, self.events.recv()).await.ok().flatten()
    }

    /// Wait for the next received message, skipping status events
    pub async fn next_received(&mut self, within: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match timeout(remaining, self.events.recv()).await {
                Ok(Some(EngineEvent::MessageReceived(message))) => return Some(message),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Wait for the next status settlement, skipping received messages
    pub async fn next_status(&mut self, within: Duration) -> Option<(MessageId, MessageStatus)> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match timeout(remaining, self.events.recv()).await {
                Ok(Some(EngineEvent::MessageStatus { id, status })) => return Some((id, status)),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
    }
}

/// Exchange identity public keys between two nodes, as the in-band key
/// exchange would
pub async fn exchange_keys(a: &TestNode, b: &TestNode) -> anyhow::Result<()> {
    a.engine
        .bind_peer_key(b.name.clone(), b.public_key)
        .await?;
    b.engine
        .bind_peer_key(a.name.clone(), a.public_key)
        .await?;
    Ok(())
}

//! Mock transport backed by the mesh router
//!
//! Implements the engine's [`Transport`] contract without hardware: writes
//! go through the router's link table and arrive as whole-envelope events
//! on the destination node.

use std::sync::Mutex;

use lantern_core::{PeerId, Transport, TransportError, TransportEvent, TransportEventSender};

use crate::router::MeshRouter;

/// A node's view of the mesh
pub struct MockTransport {
    peer_id: PeerId,
    router: MeshRouter,
    events: Mutex<Option<TransportEventSender>>,
}

impl MockTransport {
    pub fn new(router: MeshRouter, peer_id: PeerId) -> Self {
        Self {
            peer_id,
            router,
            events: Mutex::new(None),
        }
    }

    /// The address this transport answers to
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn attach_events(&self, events: TransportEventSender) {
        self.router.register(self.peer_id.clone(), events.clone());
        *self.events.lock().expect("events mutex") = Some(events);
    }

    async fn start_scan(&self) -> Result<(), TransportError> {
        self.router.announce_neighbors(&self.peer_id).await;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn connect(&self, peer_id: &PeerId) -> Result<(), TransportError> {
        self.router.link(&self.peer_id, peer_id).await;
        Ok(())
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), TransportError> {
        self.router.unlink(&self.peer_id, peer_id).await;
        Ok(())
    }

    async fn send(&self, peer_id: &PeerId, bytes: &[u8]) -> Result<(), TransportError> {
        self.router.deliver(&self.peer_id, peer_id, bytes).await
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.router.neighbors(&self.peer_id)
    }
}

/// Deliver raw bytes to a node's engine as though `from` had written them.
/// Used to poke malformed input at a live engine.
pub async fn inject_bytes(transport: &MockTransport, from: PeerId, bytes: Vec<u8>) {
    let sender = transport
        .events
        .lock()
        .expect("events mutex")
        .clone();
    if let Some(sender) = sender {
        let _ = sender.send(TransportEvent::Bytes { peer_id: from, bytes }).await;
    }
}

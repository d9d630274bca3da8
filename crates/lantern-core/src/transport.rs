//! Transport interface
//!
//! The narrow contract the engine requires from a BLE library. Concrete
//! implementations live outside this crate; tests use the in-memory mesh
//! from the harness crate.
//!
//! The engine is agnostic to radio framing: one `send` on the source node
//! corresponds to one [`TransportEvent::Bytes`] on the destination, and
//! envelopes arrive whole.

use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Inbound callbacks from the transport, delivered over the event channel
/// attached at startup
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A peer was seen while scanning
    Discovered { peer_id: PeerId, rssi: Option<i8> },
    /// Transport-level connection liveness changed
    StateChanged { peer_id: PeerId, connected: bool },
    /// A whole envelope arrived from a peer
    Bytes { peer_id: PeerId, bytes: Vec<u8> },
}

/// Sender half handed to the transport via [`Transport::attach_events`]
pub type TransportEventSender = mpsc::Sender<TransportEvent>;

/// Receiver half consumed by the engine task
pub type TransportEventReceiver = mpsc::Receiver<TransportEvent>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Capability set the engine consumes from a transport implementation.
///
/// `start_scan` and `stop_scan` are idempotent. `send` writes raw envelope
/// bytes to the peer's RX endpoint with no acknowledgment; delivery
/// confirmation is the mesh's problem, not the transport's. The engine
/// bounds `connect` with its own timeout.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Attach the event channel the transport reports through.
    ///
    /// Called once by the engine before any other method.
    fn attach_events(&self, events: TransportEventSender);

    async fn start_scan(&self) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    async fn connect(&self, peer_id: &PeerId) -> Result<(), TransportError>;

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), TransportError>;

    /// Write one whole envelope to a peer
    async fn send(&self, peer_id: &PeerId, bytes: &[u8]) -> Result<(), TransportError>;

    /// Peers with a live connection right now
    fn connected_peers(&self) -> Vec<PeerId>;
}

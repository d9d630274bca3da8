//! Application-facing engine handle
//!
//! A cloneable handle speaking to the engine task over its command inbox.
//! Every access to engine state goes through this channel, which is what
//! serializes user operations against transport callbacks and timers.

use tokio::sync::{mpsc, oneshot};

use lantern_core::{
    LanternError, Message, PeerId, PeerSnapshot, SendError, SenderId, TransportError,
    TransportEvent, TransportEventSender,
};

use crate::state::EngineStats;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Commands consumed by the engine task
#[derive(Debug)]
pub(crate) enum EngineCommand {
    SendMessage {
        recipient: PeerId,
        text: String,
        reply: oneshot::Sender<Result<Message, SendError>>,
    },
    BindPeerKey {
        peer_id: PeerId,
        public_key: [u8; 32],
    },
    VerifyPeer {
        peer_id: PeerId,
        scanned: String,
        reply: oneshot::Sender<bool>,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerSnapshot>>,
    },
    Messages {
        peer_id: PeerId,
        reply: oneshot::Sender<Vec<Message>>,
    },
    LocalIdentity {
        reply: oneshot::Sender<LocalIdentity>,
    },
    Connect {
        peer_id: PeerId,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Disconnect {
        peer_id: PeerId,
    },
    RemovePeer {
        peer_id: PeerId,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
    Shutdown,
}

/// Public identity material of the local node, as shown in its QR code
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub public_key: [u8; 32],
    pub fingerprint: String,
    pub sender_id: SenderId,
}

// ----------------------------------------------------------------------------
// Engine Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to a running engine task
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    transport_events: TransportEventSender,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<EngineCommand>,
        transport_events: TransportEventSender,
    ) -> Self {
        Self {
            commands,
            transport_events,
        }
    }

    async fn request<T>(
        &self,
        command: EngineCommand,
        reply: oneshot::Receiver<T>,
    ) -> Result<T, LanternError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LanternError::ChannelClosed("engine commands"))?;
        reply
            .await
            .map_err(|_| LanternError::ChannelClosed("engine reply"))
    }

    /// Encrypt, persist, and flood a message toward a peer.
    ///
    /// Returns the stored record; its status is `Delivered` when at least
    /// one transport write succeeded, `Pending` while the retry queue still
    /// works on it.
    pub async fn send_message(
        &self,
        recipient: PeerId,
        text: impl Into<String>,
    ) -> Result<Message, SendError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::SendMessage {
                recipient,
                text: text.into(),
                reply: tx,
            })
            .await
            .map_err(|_| SendError::EngineClosed)?;
        rx.await.map_err(|_| SendError::EngineClosed)?
    }

    /// Transport hook: feed raw inbound bytes into the receive path
    pub async fn ingest_bytes(&self, peer_id: PeerId, bytes: Vec<u8>) {
        let _ = self
            .transport_events
            .send(TransportEvent::Bytes { peer_id, bytes })
            .await;
    }

    /// Bind a peer's identity public key received in-band; runs key
    /// agreement and unlocks sending to that peer
    pub async fn bind_peer_key(
        &self,
        peer_id: PeerId,
        public_key: [u8; 32],
    ) -> Result<(), LanternError> {
        self.commands
            .send(EngineCommand::BindPeerKey {
                peer_id,
                public_key,
            })
            .await
            .map_err(|_| LanternError::ChannelClosed("engine commands"))
    }

    /// Compare an out-of-band scanned fingerprint against a peer's bound
    /// key; a match marks the peer verified and persists the decision
    pub async fn verify_peer(
        &self,
        peer_id: PeerId,
        scanned: impl Into<String>,
    ) -> Result<bool, LanternError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            EngineCommand::VerifyPeer {
                peer_id,
                scanned: scanned.into(),
                reply: tx,
            },
            rx,
        )
        .await
    }

    /// Snapshot of the peer directory
    pub async fn peers(&self) -> Result<Vec<PeerSnapshot>, LanternError> {
        let (tx, rx) = oneshot::channel();
        self.request(EngineCommand::Peers { reply: tx }, rx).await
    }

    /// Conversation history with a peer
    pub async fn messages(&self, peer_id: PeerId) -> Result<Vec<Message>, LanternError> {
        let (tx, rx) = oneshot::channel();
        self.request(EngineCommand::Messages { peer_id, reply: tx }, rx)
            .await
    }

    /// Public identity material of the local node
    pub async fn local_identity(&self) -> Result<LocalIdentity, LanternError> {
        let (tx, rx) = oneshot::channel();
        self.request(EngineCommand::LocalIdentity { reply: tx }, rx)
            .await
    }

    /// Connect to a peer, bounded by the configured timeout
    pub async fn connect(&self, peer_id: PeerId) -> Result<(), LanternError> {
        let (tx, rx) = oneshot::channel();
        self.request(EngineCommand::Connect { peer_id, reply: tx }, rx)
            .await?
            .map_err(LanternError::Transport)
    }

    /// Disconnect from a peer; the record stays in the directory
    pub async fn disconnect(&self, peer_id: PeerId) -> Result<(), LanternError> {
        self.commands
            .send(EngineCommand::Disconnect { peer_id })
            .await
            .map_err(|_| LanternError::ChannelClosed("engine commands"))
    }

    /// Forget a peer entirely (explicit user command)
    pub async fn remove_peer(&self, peer_id: PeerId) -> Result<(), LanternError> {
        self.commands
            .send(EngineCommand::RemovePeer { peer_id })
            .await
            .map_err(|_| LanternError::ChannelClosed("engine commands"))
    }

    /// Engine counters
    pub async fn stats(&self) -> Result<EngineStats, LanternError> {
        let (tx, rx) = oneshot::channel();
        self.request(EngineCommand::Stats { reply: tx }, rx).await
    }

    /// Stop the engine task; the duplicate cache is snapshotted to storage
    pub async fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown).await;
    }
}

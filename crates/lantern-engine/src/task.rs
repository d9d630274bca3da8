//! The engine task
//!
//! One task owns all engine state. Commands from the application, events
//! from the transport, and the internal timer all funnel through its
//! `select!` loop, so access to the peer table, the duplicate cache, and
//! the retry queue is strictly ordered without any lock being held across
//! transport I/O or event emission.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use lantern_core::crypto::Identity;
use lantern_core::dedup::DuplicateCache;
use lantern_core::{
    EngineConfig, LanternError, Message, MessageEnvelope, MessageId, MessageStatus, PeerId,
    PeerTable, SendError, Storage, Transport, TransportError, TransportEvent, wire,
};

use crate::events::{EngineEvent, EngineEventReceiver, EngineEventSender};
use crate::handle::{EngineCommand, EngineHandle, LocalIdentity};
use crate::retry::RetryQueue;
use crate::state::{EngineState, InboundAction};

// ----------------------------------------------------------------------------
// Spawning
// ----------------------------------------------------------------------------

/// Start the engine: load or create the identity, restore the duplicate
/// cache, attach the transport, and spawn the engine task.
///
/// Returns the application handle and the event stream.
pub fn spawn_engine(
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
) -> Result<(EngineHandle, EngineEventReceiver), LanternError> {
    let identity = Identity::load_or_generate(storage.as_ref())?;
    info!(fingerprint = %identity.fingerprint_hex(), "local identity ready");

    let mut dedup = DuplicateCache::new();
    match storage.load_duplicate_cache() {
        Ok(entries) => dedup.restore(entries),
        Err(err) => warn!(error = %err, "failed to restore duplicate cache"),
    }

    let (command_tx, command_rx) = mpsc::channel(64);
    let (transport_tx, transport_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);

    transport.attach_events(transport_tx.clone());

    let retries = RetryQueue::new(config.retry_base, config.max_retries);
    let state = EngineState::new(config, identity, PeerTable::new(storage.clone()), dedup);

    let task = EngineTask {
        state,
        retries,
        transport,
        storage,
        commands: command_rx,
        transport_events: transport_rx,
        events: event_tx,
        ticks: 0,
    };
    tokio::spawn(task.run());

    Ok((EngineHandle::new(command_tx, transport_tx), event_rx))
}

// ----------------------------------------------------------------------------
// Engine Task
// ----------------------------------------------------------------------------

struct EngineTask {
    state: EngineState,
    retries: RetryQueue,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
    commands: mpsc::Receiver<EngineCommand>,
    transport_events: mpsc::Receiver<TransportEvent>,
    events: EngineEventSender,
    ticks: u64,
}

impl EngineTask {
    async fn run(mut self) {
        info!("engine task starting");
        if let Err(err) = self.transport.start_scan().await {
            debug!(error = %err, "initial scan request failed");
        }

        let mut tick = tokio::time::interval(self.state.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.reset();

        let mut transport_open = true;
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = self.transport_events.recv(), if transport_open => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => transport_open = false,
                },
                _ = tick.tick() => self.handle_tick().await,
            }
        }

        if let Err(err) = self
            .storage
            .store_duplicate_cache(&self.state.dedup.snapshot())
        {
            warn!(error = %err, "failed to snapshot duplicate cache");
        }
        info!("engine task stopped");
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SendMessage {
                recipient,
                text,
                reply,
            } => {
                let result = self.handle_send(recipient, text).await;
                let _ = reply.send(result);
            }
            EngineCommand::BindPeerKey {
                peer_id,
                public_key,
            } => {
                let EngineState {
                    peers,
                    identity,
                    clock,
                    ..
                } = &mut self.state;
                peers.bind_public_key(&peer_id, public_key, identity, clock);
            }
            EngineCommand::VerifyPeer {
                peer_id,
                scanned,
                reply,
            } => {
                let _ = reply.send(self.state.verify_peer(&peer_id, &scanned));
            }
            EngineCommand::Peers { reply } => {
                let _ = reply.send(self.state.peers.snapshot());
            }
            EngineCommand::Messages { peer_id, reply } => {
                let messages = self.storage.load_messages(&peer_id).unwrap_or_else(|err| {
                    warn!(peer = %peer_id, error = %err, "failed to load history");
                    Vec::new()
                });
                let _ = reply.send(messages);
            }
            EngineCommand::LocalIdentity { reply } => {
                let _ = reply.send(LocalIdentity {
                    public_key: self.state.identity.public_key_bytes(),
                    fingerprint: self.state.identity.fingerprint_hex(),
                    sender_id: self.state.identity.sender_id(),
                });
            }
            EngineCommand::Connect { peer_id, reply } => {
                let result = self.handle_connect(&peer_id).await;
                let _ = reply.send(result);
            }
            EngineCommand::Disconnect { peer_id } => {
                if let Err(err) = self.transport.disconnect(&peer_id).await {
                    debug!(peer = %peer_id, error = %err, "disconnect failed");
                }
            }
            EngineCommand::RemovePeer { peer_id } => {
                self.state.peers.remove(&peer_id);
            }
            EngineCommand::Stats { reply } => {
                let _ = reply.send(self.state.stats.clone());
            }
            EngineCommand::Shutdown => unreachable!("handled in the select loop"),
        }
    }

    /// Send path: compose, persist as pending, flood to every connected
    /// peer. One successful write marks the record delivered; total failure
    /// hands the envelope to the retry queue.
    async fn handle_send(
        &mut self,
        recipient: PeerId,
        text: String,
    ) -> Result<Message, SendError> {
        let (envelope, mut message) = self.state.compose_outbound(&recipient, &text)?;
        let bytes = wire::encode(&envelope)?;

        // storage failures on the send path are the caller's problem
        self.storage.store_message(&message)?;

        let (delivered, failed) = self.flood(&bytes, None).await;
        if delivered > 0 {
            message.status = Some(MessageStatus::Delivered);
            self.settle_status(&recipient, message.id, MessageStatus::Delivered);
            self.state.stats.messages_sent += 1;
        } else {
            debug!(id = %message.id.short(), failed, "flood reached no peers, queueing retry");
            self.retries
                .enqueue(message.id, recipient, bytes, Instant::now());
            self.state.stats.send_failures += 1;
        }
        Ok(message)
    }

    async fn handle_connect(&mut self, peer_id: &PeerId) -> Result<(), TransportError> {
        match tokio::time::timeout(
            self.state.config.connect_timeout,
            self.transport.connect(peer_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let EngineState { peers, clock, .. } = &mut self.state;
                peers.set_connected(peer_id, false, clock);
                Err(TransportError::ConnectTimeout(peer_id.clone()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Transport Events
    // ------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Discovered { peer_id, rssi } => {
                let EngineState { peers, clock, .. } = &mut self.state;
                peers.upsert_discovered(peer_id, rssi, clock);
            }
            TransportEvent::StateChanged { peer_id, connected } => {
                trace!(peer = %peer_id, connected, "connection state changed");
                let EngineState { peers, clock, .. } = &mut self.state;
                peers.set_connected(&peer_id, connected, clock);
            }
            TransportEvent::Bytes { peer_id, bytes } => {
                self.handle_inbound(peer_id, bytes).await;
            }
        }
    }

    /// Receive path. The decrypted message is persisted before the receive
    /// event is emitted; relaying happens after and never touches storage.
    async fn handle_inbound(&mut self, from: PeerId, bytes: Vec<u8>) {
        match self.state.process_inbound(&from, &bytes) {
            InboundAction::Drop => {}
            InboundAction::Deliver { message, relay } => {
                if let Err(err) = self.storage.store_message(&message) {
                    // in-memory state has already advanced; history is
                    // best-effort on the receive path
                    warn!(id = %message.id.short(), error = %err,
                        "failed to persist received message");
                }
                self.emit(EngineEvent::MessageReceived(message));
                if let Some(envelope) = relay {
                    self.relay(envelope, &from).await;
                }
            }
            InboundAction::RelayOnly { relay } => {
                self.relay(relay, &from).await;
            }
        }
    }

    /// Relay procedure: forward the already-decremented envelope to every
    /// connected peer except the one it came from.
    async fn relay(&mut self, envelope: MessageEnvelope, inbound: &PeerId) {
        let bytes = match wire::encode(&envelope) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(id = %envelope.message_id.short(), error = %err,
                    "relay envelope failed to encode");
                return;
            }
        };
        let (delivered, failed) = self.flood(&bytes, Some(inbound)).await;
        self.state.stats.envelopes_relayed += 1;
        debug!(
            id = %envelope.message_id.short(),
            ttl = envelope.ttl.value(),
            delivered,
            failed,
            "relayed envelope"
        );
    }

    /// Write the envelope to every connected peer, skipping `exclude`.
    /// Per-peer writes are awaited independently; one failure never aborts
    /// the rest of the flood.
    async fn flood(&self, bytes: &[u8], exclude: Option<&PeerId>) -> (usize, usize) {
        let mut delivered = 0;
        let mut failed = 0;
        for peer in self.transport.connected_peers() {
            if exclude == Some(&peer) {
                continue;
            }
            match self.transport.send(&peer, bytes).await {
                Ok(()) => {
                    trace!(peer = %peer, "envelope written");
                    delivered += 1;
                }
                Err(err) => {
                    trace!(peer = %peer, error = %err, "envelope write failed");
                    failed += 1;
                }
            }
        }
        (delivered, failed)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One-second housekeeping: duplicate-cache sweep, scan cadence, and
    /// due retries.
    async fn handle_tick(&mut self) {
        self.ticks += 1;
        self.state.dedup.prune();

        if self.ticks % self.state.config.scan_interval_ticks() == 0 {
            if let Err(err) = self.transport.start_scan().await {
                debug!(error = %err, "scan request failed");
            }
        }

        let now = Instant::now();
        for entry in self.retries.take_due(now) {
            self.state.stats.retries_attempted += 1;
            let message_id = entry.message_id;
            let peer_id = entry.peer_id.clone();

            let (delivered, _) = self.flood(&entry.envelope_bytes, None).await;
            if delivered > 0 {
                self.state.stats.messages_sent += 1;
                self.settle_status(&peer_id, message_id, MessageStatus::Delivered);
            } else if !self.retries.reschedule(entry, Instant::now()) {
                debug!(id = %message_id.short(), "retries exhausted");
                self.settle_status(&peer_id, message_id, MessageStatus::Failed);
            }
        }
    }

    // ------------------------------------------------------------------
    // Status Updates and Events
    // ------------------------------------------------------------------

    /// Record the one allowed status mutation of a sent message and tell
    /// the application.
    fn settle_status(&mut self, peer_id: &PeerId, id: MessageId, status: MessageStatus) {
        if let Err(err) = self.storage.update_message_status(peer_id, id, status) {
            warn!(id = %id.short(), error = %err, "failed to persist status update");
        }
        self.emit(EngineEvent::MessageStatus { id, status });
    }

    /// Fire-and-forget event emission. A slow consumer loses events rather
    /// than stalling the engine.
    fn emit(&self, event: EngineEvent) {
        if let Err(err) = self.events.try_send(event) {
            warn!(error = %err, "event channel full, dropping engine event");
        }
    }
}

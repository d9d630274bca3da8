//! Engine events toward the application
//!
//! The engine reports state changes over a channel rather than calling back
//! into application code: emission is fire-and-forget, and the consumer can
//! never re-enter engine state except through the public handle.

use lantern_core::{Message, MessageId, MessageStatus};
use tokio::sync::mpsc;

/// State changes the application observes
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A message was decrypted, persisted, and added to its conversation
    MessageReceived(Message),
    /// A sent message settled as delivered or failed
    MessageStatus {
        id: MessageId,
        status: MessageStatus,
    },
}

/// Receiver half returned from [`spawn_engine`](crate::spawn_engine)
pub type EngineEventReceiver = mpsc::Receiver<EngineEvent>;

pub(crate) type EngineEventSender = mpsc::Sender<EngineEvent>;

//! Lantern message engine
//!
//! The orchestration layer on top of `lantern-core`: a single engine task
//! owns the peer table, the duplicate cache, and the retry queue, and
//! drives the send path, the receive path, and flood relay over whatever
//! [`Transport`](lantern_core::Transport) it is given.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lantern_core::{EngineConfig, KeyValueStorage, MemoryKeyValueStore, PeerId};
//! use lantern_engine::{spawn_engine, EngineEvent};
//!
//! # async fn run(transport: Arc<dyn lantern_core::Transport>) -> lantern_core::Result<()> {
//! let storage = Arc::new(KeyValueStorage::new(MemoryKeyValueStore::new()));
//! let (engine, mut events) = spawn_engine(EngineConfig::default(), transport, storage)?;
//!
//! // key exchange completes out-of-band or via the application protocol
//! engine.bind_peer_key(PeerId::new("aa:bb:cc"), [0u8; 32]).await?;
//! let message = engine.send_message(PeerId::new("aa:bb:cc"), "hello").await?;
//! println!("sent {} as {:?}", message.id, message.status);
//!
//! while let Some(event) = events.recv().await {
//!     if let EngineEvent::MessageReceived(message) = event {
//!         println!("{}: {}", message.peer_id, message.text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod handle;
pub mod retry;
pub mod state;
pub mod task;

pub use events::{EngineEvent, EngineEventReceiver};
pub use handle::{EngineHandle, LocalIdentity};
pub use state::EngineStats;
pub use task::spawn_engine;

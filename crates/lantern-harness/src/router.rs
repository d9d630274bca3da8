//! In-memory mesh router
//!
//! Stands in for the radio layer in tests: a table of registered nodes and
//! undirected links between them. Bytes written by one node's transport are
//! delivered whole to the linked node's event channel, matching the
//! one-send-one-callback framing assumption of the real transport.
//!
//! Failure injection is directed and counted, so a test can script "the
//! next three writes from A to B fail" and watch the retry queue work.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::trace;

use lantern_core::{PeerId, TransportError, TransportEvent, TransportEventSender};

// ----------------------------------------------------------------------------
// Router
// ----------------------------------------------------------------------------

#[derive(Default)]
struct RouterInner {
    nodes: HashMap<PeerId, TransportEventSender>,
    links: HashSet<(PeerId, PeerId)>,
    /// Directed (from, to) -> writes still to fail
    scripted_failures: HashMap<(PeerId, PeerId), u32>,
}

/// Shared registry of nodes and links
#[derive(Clone, Default)]
pub struct MeshRouter {
    inner: Arc<Mutex<RouterInner>>,
}

fn link_key(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl MeshRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node's transport event channel
    pub(crate) fn register(&self, peer_id: PeerId, events: TransportEventSender) {
        let mut inner = self.inner.lock().expect("router mutex");
        inner.nodes.insert(peer_id, events);
    }

    /// Link two nodes and tell both engines about the new connection
    pub async fn link(&self, a: &PeerId, b: &PeerId) {
        let (sender_a, sender_b) = {
            let mut inner = self.inner.lock().expect("router mutex");
            inner.links.insert(link_key(a, b));
            (inner.nodes.get(a).cloned(), inner.nodes.get(b).cloned())
        };
        if let Some(sender) = sender_a {
            let _ = sender
                .send(TransportEvent::Discovered {
                    peer_id: b.clone(),
                    rssi: Some(-50),
                })
                .await;
            let _ = sender
                .send(TransportEvent::StateChanged {
                    peer_id: b.clone(),
                    connected: true,
                })
                .await;
        }
        if let Some(sender) = sender_b {
            let _ = sender
                .send(TransportEvent::Discovered {
                    peer_id: a.clone(),
                    rssi: Some(-50),
                })
                .await;
            let _ = sender
                .send(TransportEvent::StateChanged {
                    peer_id: a.clone(),
                    connected: true,
                })
                .await;
        }
    }

    /// Tear a link down and tell both engines
    pub async fn unlink(&self, a: &PeerId, b: &PeerId) {
        let (sender_a, sender_b) = {
            let mut inner = self.inner.lock().expect("router mutex");
            inner.links.remove(&link_key(a, b));
            (inner.nodes.get(a).cloned(), inner.nodes.get(b).cloned())
        };
        if let Some(sender) = sender_a {
            let _ = sender
                .send(TransportEvent::StateChanged {
                    peer_id: b.clone(),
                    connected: false,
                })
                .await;
        }
        if let Some(sender) = sender_b {
            let _ = sender
                .send(TransportEvent::StateChanged {
                    peer_id: a.clone(),
                    connected: false,
                })
                .await;
        }
    }

    /// Make the next `count` writes from `from` to `to` fail
    pub fn fail_next_sends(&self, from: &PeerId, to: &PeerId, count: u32) {
        let mut inner = self.inner.lock().expect("router mutex");
        inner
            .scripted_failures
            .insert((from.clone(), to.clone()), count);
    }

    /// Nodes currently linked to `peer_id`
    pub fn neighbors(&self, peer_id: &PeerId) -> Vec<PeerId> {
        let inner = self.inner.lock().expect("router mutex");
        let mut neighbors: Vec<PeerId> = inner
            .links
            .iter()
            .filter_map(|(a, b)| {
                if a == peer_id {
                    Some(b.clone())
                } else if b == peer_id {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect();
        neighbors.sort();
        neighbors
    }

    /// Deliver one envelope across a link
    pub(crate) async fn deliver(
        &self,
        from: &PeerId,
        to: &PeerId,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let sender = {
            let mut inner = self.inner.lock().expect("router mutex");
            if !inner.links.contains(&link_key(from, to)) {
                return Err(TransportError::NotConnected(to.clone()));
            }
            if let Some(remaining) = inner
                .scripted_failures
                .get_mut(&(from.clone(), to.clone()))
            {
                if *remaining > 0 {
                    *remaining -= 1;
                    trace!(%from, %to, remaining, "scripted send failure");
                    return Err(TransportError::SendFailed {
                        peer_id: to.clone(),
                        reason: "scripted failure".to_string(),
                    });
                }
            }
            inner
                .nodes
                .get(to)
                .cloned()
                .ok_or_else(|| TransportError::NotConnected(to.clone()))?
        };

        sender
            .send(TransportEvent::Bytes {
                peer_id: from.clone(),
                bytes: bytes.to_vec(),
            })
            .await
            .map_err(|_| TransportError::SendFailed {
                peer_id: to.clone(),
                reason: "receiver gone".to_string(),
            })
    }

    /// Re-announce every neighbor of `peer_id`, as a scan would
    pub(crate) async fn announce_neighbors(&self, peer_id: &PeerId) {
        let sender = {
            let inner = self.inner.lock().expect("router mutex");
            inner.nodes.get(peer_id).cloned()
        };
        let Some(sender) = sender else { return };
        for neighbor in self.neighbors(peer_id) {
            let _ = sender
                .send(TransportEvent::Discovered {
                    peer_id: neighbor,
                    rssi: Some(-50),
                })
                .await;
        }
    }
}

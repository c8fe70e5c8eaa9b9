//! In-process loopback transport simulating a shared nearby radio.
//!
//! A [`LoopbackHub`] stands in for the physical medium: every
//! [`LoopbackTransport`] endpoint created from the same hub is "in range" of
//! the others. Addressed frames go to one endpoint, broadcasts to all
//! others, and tearing an endpoint down surfaces
//! [`TransportEvent::PeerLost`] to the rest — which is exactly the signal the
//! session layer turns into a `Dropped` leave.
//!
//! # Example
//!
//! ```rust,no_run
//! use nearby_session::transports::LoopbackHub;
//!
//! let hub = LoopbackHub::new();
//! let device_a = hub.endpoint("A");
//! let device_b = hub.endpoint("B");
//! // Pass each endpoint to its own NearbySession::start.
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::NearbyError;
use crate::protocol::ConnectionStatus;
use crate::transport::{NearbyTransport, TransportEvent};

type PeerMap = HashMap<String, mpsc::UnboundedSender<TransportEvent>>;

/// The shared medium connecting loopback endpoints.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    peers: Arc<Mutex<PeerMap>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connected endpoint addressed by `open_id`.
    ///
    /// An endpoint created with an `open_id` already in use replaces the
    /// previous registration, which then stops receiving frames.
    pub fn endpoint(&self, open_id: impl Into<String>) -> LoopbackTransport {
        let open_id = open_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(open_id.clone(), tx);
        LoopbackTransport {
            open_id,
            peers: Arc::clone(&self.peers),
            rx,
            detached: false,
        }
    }

    /// Simulate `open_id` abruptly going out of range: the endpoint sees a
    /// disconnect, everyone else sees [`TransportEvent::PeerLost`].
    pub fn drop_peer(&self, open_id: &str) {
        let mut peers = self.lock();
        if let Some(tx) = peers.remove(open_id) {
            let _ = tx.send(TransportEvent::Connectivity {
                status: ConnectionStatus::Disconnected,
                reason: "out of range".to_string(),
            });
        }
        for tx in peers.values() {
            let _ = tx.send(TransportEvent::PeerLost {
                peer: open_id.to_string(),
            });
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PeerMap> {
        // A poisoned medium is still a medium.
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LoopbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHub")
            .field("peers", &self.lock().len())
            .finish()
    }
}

/// One device's endpoint on a [`LoopbackHub`].
pub struct LoopbackTransport {
    open_id: String,
    peers: Arc<Mutex<PeerMap>>,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    detached: bool,
}

impl LoopbackTransport {
    fn lock(&self) -> std::sync::MutexGuard<'_, PeerMap> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deregister from the hub and tell the remaining peers we are gone.
    fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        let mut peers = self.lock();
        peers.remove(&self.open_id);
        for tx in peers.values() {
            let _ = tx.send(TransportEvent::PeerLost {
                peer: self.open_id.clone(),
            });
        }
        debug!(open_id = %self.open_id, "loopback endpoint detached");
    }
}

#[async_trait]
impl NearbyTransport for LoopbackTransport {
    async fn send_to(&mut self, peer: &str, frame: String) -> Result<(), NearbyError> {
        if self.detached {
            return Err(NearbyError::TransportClosed);
        }
        let tx = self
            .lock()
            .get(peer)
            .cloned()
            .ok_or_else(|| NearbyError::TransportSend(format!("peer unreachable: {peer}")))?;
        tx.send(TransportEvent::Frame {
            from: self.open_id.clone(),
            payload: frame,
        })
        .map_err(|_| NearbyError::TransportSend(format!("peer unreachable: {peer}")))
    }

    async fn broadcast(&mut self, frame: String) -> Result<(), NearbyError> {
        if self.detached {
            return Err(NearbyError::TransportClosed);
        }
        for (peer, tx) in self.lock().iter() {
            if peer != &self.open_id {
                let _ = tx.send(TransportEvent::Frame {
                    from: self.open_id.clone(),
                    payload: frame.clone(),
                });
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<TransportEvent, NearbyError>> {
        // `mpsc::Receiver::recv` is cancel-safe, as the trait requires.
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), NearbyError> {
        self.detach();
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.detach();
    }
}

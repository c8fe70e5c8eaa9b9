//! Transport abstraction over the physical nearby channel.
//!
//! The [`NearbyTransport`] trait is the boundary to the short-range radio
//! adapter (Bluetooth, Wi-Fi Direct, or anything equivalent). The session
//! layer consumes only this seam: addressed frame delivery, a broadcast lane
//! for discovery adverts, and connectivity notifications. Peers are addressed
//! by their `openId`, which doubles as the transport addressing key.
//!
//! # Connection setup
//!
//! Pairing and radio bring-up are intentionally NOT part of this trait —
//! adapters differ too much in how a nearby link is established. Construct a
//! connected transport externally, then pass it to
//! [`NearbySession::start`](crate::session::NearbySession::start).
//!
//! # Implementing a custom transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use nearby_session::error::NearbyError;
//! use nearby_session::transport::{NearbyTransport, TransportEvent};
//!
//! struct MyAdapter { /* ... */ }
//!
//! #[async_trait]
//! impl NearbyTransport for MyAdapter {
//!     async fn send_to(&mut self, peer: &str, frame: String) -> Result<(), NearbyError> {
//!         // Deliver one JSON frame to the named peer
//!         todo!()
//!     }
//!
//!     async fn broadcast(&mut self, frame: String) -> Result<(), NearbyError> {
//!         // Advertise one JSON frame to every nearby device
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<TransportEvent, NearbyError>> {
//!         // Next inbound frame or connectivity change;
//!         // None when the adapter has shut down
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), NearbyError> {
//!         // Tear the radio link down
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::NearbyError;
use crate::protocol::ConnectionStatus;

/// Something the adapter surfaced to the session layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One complete JSON frame from a nearby peer (addressed or broadcast).
    Frame { from: String, payload: String },
    /// The adapter confirmed a previously reachable peer is gone. The session
    /// layer turns this into a `Dropped` leave or a room dismissal.
    PeerLost { peer: String },
    /// The local radio link itself changed state.
    Connectivity {
        status: ConnectionStatus,
        reason: String,
    },
}

/// A frame-oriented nearby channel between this device and its peers.
///
/// Implementors shuttle serialized JSON strings. Each call to
/// [`send_to`](NearbyTransport::send_to) transmits one complete frame to one
/// peer; [`broadcast`](NearbyTransport::broadcast) advertises one frame to
/// every device in radio range (used only for room discovery).
///
/// # Object safety
///
/// The trait is object-safe, so `Box<dyn NearbyTransport>` works for dynamic
/// dispatch. `NearbySession::start` accepts `impl NearbyTransport`
/// (monomorphized) for the common case.
///
/// # Cancel safety
///
/// [`recv`](NearbyTransport::recv) **MUST** be cancel-safe because it runs
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling
/// it again must not lose frames. Channel-based implementations (wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait NearbyTransport: Send + 'static {
    /// Send one JSON frame to the peer addressed by `peer` (an `openId`).
    ///
    /// # Errors
    ///
    /// Returns [`NearbyError::TransportSend`] if the frame could not be
    /// handed to the peer (link broken, peer out of range).
    async fn send_to(&mut self, peer: &str, frame: String) -> Result<(), NearbyError>;

    /// Advertise one JSON frame to every nearby device.
    ///
    /// Best-effort: devices out of range simply miss the advert and pick up a
    /// later one.
    ///
    /// # Errors
    ///
    /// Returns [`NearbyError::TransportSend`] if the local radio refused the
    /// frame.
    async fn broadcast(&mut self, frame: String) -> Result<(), NearbyError>;

    /// Receive the next transport event.
    ///
    /// Returns:
    /// - `Some(Ok(event))` — a frame or connectivity change
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the adapter shut down cleanly
    ///
    /// # Cancel safety
    ///
    /// This method **MUST** be cancel-safe (see [trait docs](NearbyTransport)).
    async fn recv(&mut self) -> Option<Result<TransportEvent, NearbyError>>;

    /// Close the nearby link gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown handshake fails. Implementations
    /// should still release radio resources when it does.
    async fn close(&mut self) -> Result<(), NearbyError>;
}

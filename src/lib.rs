//! # Nearby Session
//!
//! Transport-agnostic session layer for short-range peer-to-peer multiplayer.
//!
//! A handful of physically close devices discover each other's rooms, join
//! one, negotiate readiness, and exchange application payloads relayed in a
//! star through the room owner — no server, no internet. The crate speaks
//! JSON frames over any adapter that can deliver them (Bluetooth, Wi-Fi
//! Direct, an in-process loopback for tests).
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`NearbyTransport`] trait for any
//!   short-range adapter
//! - **Event-driven** — register one handler per event kind on the
//!   [`NearbySession`] handle; completions and notifications all arrive on a
//!   single callback context
//! - **Owner-authoritative** — the room owner holds the authoritative room
//!   state; members keep converging mirrors fed by broadcast notifications
//! - **Loopback built-in** — the default `transport-loopback` feature
//!   provides an in-process hub simulating a shared radio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nearby_session::protocol::PlayerAction;
//! use nearby_session::session::{CreateRoomParams, NearbySession, SessionConfig};
//! use nearby_session::transports::LoopbackHub;
//! use nearby_session::EventKind;
//!
//! # fn main() -> Result<(), nearby_session::NearbyError> {
//! # let rt = tokio::runtime::Runtime::new().map_err(|e| nearby_session::NearbyError::TransportReceive(e.to_string()))?;
//! # rt.block_on(async {
//! let hub = LoopbackHub::new();
//! let session = NearbySession::start(hub.endpoint("alice"), SessionConfig::new())?;
//!
//! session.on(EventKind::CreateRoom, |event| {
//!     println!("room created: {event:?}");
//! });
//!
//! session.init("alice")?;
//! session.create_room(CreateRoomParams::new("Room1", 2, 4))?;
//! session.update_player(PlayerAction::Ready)?;
//! # Ok(())
//! # })
//! # }
//! ```

pub mod dispatcher;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod protocol;
pub(crate) mod relay;
pub mod room;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use error::NearbyError;
pub use error_codes::ErrorCode;
pub use event::{EventKind, SessionEvent};
pub use protocol::{Player, Room, RoomSummary};
pub use session::{CreateRoomParams, NearbySession, SessionConfig};
pub use transport::{NearbyTransport, TransportEvent};

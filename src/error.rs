//! Error types for the nearby session layer.

use thiserror::Error;

/// Errors that can occur when using the nearby session manager.
///
/// These are the *inline* failures: purely local problems detected before any
/// transport interaction (malformed arguments, lifecycle misuse, dead
/// transport). Everything that depends on room or peer state is reported
/// asynchronously as a `(code, reason)` pair on the operation's completion
/// event instead — see [`crate::error_codes::ErrorCode`].
#[derive(Debug, Error)]
pub enum NearbyError {
    /// Failed to send a frame through the nearby transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the nearby transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The nearby transport was closed unexpectedly.
    #[error("transport closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a wire frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session has not been initialized with `init` yet, or was destroyed.
    #[error("session not initialized")]
    NotInitialized,

    /// `init` was called while the session is already active.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// A second live session manager was requested for this process.
    #[error("a nearby session manager already exists in this process")]
    ManagerExists,

    /// Attempted an operation that requires a live session loop, but it has
    /// shut down (transport closed or `shutdown` called).
    #[error("not connected to the nearby transport")]
    NotConnected,

    /// A room name failed charset or length validation.
    #[error("invalid room name: {0:?}")]
    InvalidRoomName(String),

    /// A room id failed charset or length validation.
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),

    /// Player capacity bounds were outside `[1, 6]` or min exceeded max.
    #[error("invalid player capacity: min={min}, max={max}")]
    InvalidCapacity { min: u8, max: u8 },

    /// A relayed message exceeded the per-message character limit.
    #[error("message of {0} characters exceeds the relay payload limit")]
    PayloadTooLarge(usize),

    /// Serialized custom properties exceeded the wire limit.
    #[error("custom properties serialize to {0} characters, over the wire limit")]
    PropertiesTooLarge(usize),

    /// `send_to_player` named more recipients than a room can hold.
    #[error("too many recipients: {0}")]
    TooManyRecipients(usize),
}

/// A specialized [`Result`] type for nearby session operations.
pub type Result<T> = std::result::Result<T, NearbyError>;

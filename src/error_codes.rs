//! Structured error codes for nearby session completion and notification events.
//!
//! Every completion event carries a `(code, reason)` pair. Success is
//! [`CODE_OK`] (`0`) with an empty reason; failures use one of the
//! [`ErrorCode`] variants below, which serialize as `SCREAMING_SNAKE_CASE`
//! strings on the wire and expose a stable numeric code for hosts that key on
//! integers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric result code reported on successful completions.
pub const CODE_OK: i32 = 0;

/// Structured error codes carried by failed completions, wire-level
/// rejections, and the `Error` event.
///
/// Codes are grouped by taxonomy: validation (`10xx`), session/room state
/// (`20xx`), authority (`30xx`), lookup (`40xx`), transport (`50xx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    InvalidRoomName,
    InvalidRoomId,
    InvalidCapacity,
    PayloadTooLarge,
    PropertiesTooLarge,
    TooManyRecipients,

    // State errors
    NotInitialized,
    AlreadyInitialized,
    AlreadyInRoom,
    RoomInGame,
    RoomNotInGame,
    InvalidState,
    NotAllPlayersReady,
    AlreadyMember,
    RoomFull,

    // Authority errors
    NotOwner,

    // Lookup errors
    RoomNotFound,
    NotMember,
    PlayerNotFound,

    // Transport errors
    NotConnected,
    PeerUnreachable,
    SendFailed,
}

impl ErrorCode {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidRoomName => 1001,
            Self::InvalidRoomId => 1002,
            Self::InvalidCapacity => 1003,
            Self::PayloadTooLarge => 1004,
            Self::PropertiesTooLarge => 1005,
            Self::TooManyRecipients => 1006,

            Self::NotInitialized => 2001,
            Self::AlreadyInitialized => 2002,
            Self::AlreadyInRoom => 2003,
            Self::RoomInGame => 2004,
            Self::RoomNotInGame => 2005,
            Self::InvalidState => 2006,
            Self::NotAllPlayersReady => 2007,
            Self::AlreadyMember => 2008,
            Self::RoomFull => 2009,

            Self::NotOwner => 3001,

            Self::RoomNotFound => 4001,
            Self::NotMember => 4002,
            Self::PlayerNotFound => 4003,

            Self::NotConnected => 5001,
            Self::PeerUnreachable => 5002,
            Self::SendFailed => 5003,
        }
    }

    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidRoomName => {
                "The room name is invalid. Names are limited to 12 characters: digits, letters, underscores, and CJK."
            }
            Self::InvalidRoomId => {
                "The room id is invalid. Room ids are 1 to 5 characters: digits, letters, and underscores."
            }
            Self::InvalidCapacity => {
                "The player capacity is invalid. Both bounds must lie in [1, 6] with min not exceeding max."
            }
            Self::PayloadTooLarge => {
                "The message exceeds the 3000-character relay limit. Send a smaller message."
            }
            Self::PropertiesTooLarge => {
                "The custom properties exceed the 300-character serialized limit."
            }
            Self::TooManyRecipients => {
                "Too many recipients were named. A room holds at most 6 players."
            }

            Self::NotInitialized => {
                "The session has not been initialized. Call init before any room operation."
            }
            Self::AlreadyInitialized => {
                "The session is already active. init may only be called once."
            }
            Self::AlreadyInRoom => {
                "This device already belongs to a room. Leave it before creating or joining another."
            }
            Self::RoomInGame => {
                "The room is in game. Wait for the round to end before this operation."
            }
            Self::RoomNotInGame => {
                "The room is idle. This operation is only valid while a game is running."
            }
            Self::InvalidState => {
                "The room or player is in the wrong state for the requested transition."
            }
            Self::NotAllPlayersReady => {
                "The game cannot start until every player in the room is ready."
            }
            Self::AlreadyMember => {
                "The requesting player is already a member of this room."
            }
            Self::RoomFull => {
                "The room has reached its maximum player capacity."
            }

            Self::NotOwner => {
                "Only the room owner may perform this operation."
            }

            Self::RoomNotFound => {
                "The requested room is not known to this device. It may have been dismissed or is out of range."
            }
            Self::NotMember => {
                "This device is not a member of the named room."
            }
            Self::PlayerNotFound => {
                "The named player is not a member of this room."
            }

            Self::NotConnected => {
                "The nearby transport is not connected."
            }
            Self::PeerUnreachable => {
                "The peer became unreachable before the operation completed."
            }
            Self::SendFailed => {
                "The transport failed to hand the frame to the peer."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RoomNotFound).unwrap();
        assert_eq!(json, "\"ROOM_NOT_FOUND\"");
        let back: ErrorCode = serde_json::from_str("\"NOT_ALL_PLAYERS_READY\"").unwrap();
        assert_eq!(back, ErrorCode::NotAllPlayersReady);
    }

    #[test]
    fn numeric_codes_are_grouped_by_taxonomy() {
        assert_eq!(ErrorCode::InvalidRoomName.code(), 1001);
        assert!(ErrorCode::PayloadTooLarge.code() / 1000 == 1);
        assert!(ErrorCode::NotAllPlayersReady.code() / 1000 == 2);
        assert!(ErrorCode::NotOwner.code() / 1000 == 3);
        assert!(ErrorCode::RoomNotFound.code() / 1000 == 4);
        assert!(ErrorCode::PeerUnreachable.code() / 1000 == 5);
        assert_ne!(ErrorCode::RoomFull.code(), CODE_OK);
    }

    #[test]
    fn descriptions_are_nonempty() {
        for code in [
            ErrorCode::InvalidRoomName,
            ErrorCode::RoomFull,
            ErrorCode::NotOwner,
            ErrorCode::NotMember,
            ErrorCode::SendFailed,
        ] {
            assert!(!code.description().is_empty());
        }
    }
}

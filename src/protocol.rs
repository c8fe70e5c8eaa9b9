//! Wire types for the nearby session protocol.
//!
//! Every frame exchanged between nearby devices is one [`WireMessage`]
//! serialized to JSON text. Status enums serialize as their platform numeric
//! values (`u8`) so that mirrored room snapshots are bit-compatible across
//! devices regardless of crate version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error_codes::ErrorCode;

// ── Limits ──────────────────────────────────────────────────────────

/// Maximum length of a room name, in characters.
pub const MAX_ROOM_NAME_LEN: usize = 12;

/// Maximum length of a room id, in characters.
pub const MAX_ROOM_ID_LEN: usize = 5;

/// Maximum number of players a room can hold (the owner included).
pub const MAX_PLAYERS: u8 = 6;

/// Maximum length of a relayed application message, in characters.
pub const MAX_MESSAGE_LEN: usize = 3000;

/// Maximum serialized length of custom properties, in characters.
pub const MAX_PROPERTIES_WIRE_LEN: usize = 300;

// ── Enums ───────────────────────────────────────────────────────────

/// Room visibility for nearby discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RoomType {
    /// Included in nearby discovery broadcasts.
    #[default]
    Public = 1,
    /// Never advertised; joinable by a room id shared out of band.
    Private = 2,
}

/// Room lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RoomStatus {
    /// Waiting in the lobby; readiness may be toggled.
    #[default]
    Idle = 1,
    /// A round is running; every member is in game.
    InGame = 2,
}

/// Per-player readiness status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerStatus {
    #[default]
    NotReady = 1,
    Ready = 2,
    /// Reached only as a side effect of the owner starting the game.
    InGame = 3,
}

/// Owner-only room transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RoomAction {
    Start = 1,
    End = 2,
}

/// Readiness transitions any member may request for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerAction {
    Ready = 1,
    CancelReady = 2,
}

/// Distinguishes explicit departures from transport-inferred ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LeaveType {
    /// The player called `leave_room`.
    Active = 1,
    /// The transport reported the peer unreachable.
    Dropped = 2,
}

/// Binary transport connectivity as reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ConnectionStatus {
    Disconnected = 0,
    Connected = 1,
}

macro_rules! numeric_enum {
    ($ty:ty { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl From<$ty> for u8 {
            fn from(v: $ty) -> u8 {
                v as u8
            }
        }

        impl TryFrom<u8> for $ty {
            type Error = String;

            fn try_from(v: u8) -> Result<Self, Self::Error> {
                match v {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!(
                        "invalid {} value: {other}",
                        stringify!($ty)
                    )),
                }
            }
        }

        impl $ty {
            /// Platform numeric value of this variant.
            pub fn code(self) -> u8 {
                self as u8
            }
        }
    };
}

numeric_enum!(RoomType { Public = 1, Private = 2 });
numeric_enum!(RoomStatus { Idle = 1, InGame = 2 });
numeric_enum!(PlayerStatus { NotReady = 1, Ready = 2, InGame = 3 });
numeric_enum!(RoomAction { Start = 1, End = 2 });
numeric_enum!(PlayerAction { Ready = 1, CancelReady = 2 });
numeric_enum!(LeaveType { Active = 1, Dropped = 2 });
numeric_enum!(ConnectionStatus { Disconnected = 0, Connected = 1 });

// ── Field validation ────────────────────────────────────────────────

/// CJK Unified Ideographs block accepted in room names.
fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

/// Room names: 1..=12 characters, each a digit, ASCII letter, underscore, or
/// CJK ideograph.
pub fn room_name_is_valid(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_ROOM_NAME_LEN).contains(&len)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || is_cjk(c))
}

/// Room ids: 1..=5 characters, each a digit, ASCII letter, or underscore.
pub fn room_id_is_valid(id: &str) -> bool {
    let len = id.chars().count();
    (1..=MAX_ROOM_ID_LEN).contains(&len)
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Capacity bounds: both in `[1, 6]`, min not exceeding max.
pub fn capacity_is_valid(min: u8, max: u8) -> bool {
    (1..=MAX_PLAYERS).contains(&min) && (1..=MAX_PLAYERS).contains(&max) && min <= max
}

// ── Custom properties ───────────────────────────────────────────────

/// Typed key/value custom properties for rooms and players.
///
/// Internally an ordered string map; the opaque-string representation of the
/// source platform exists only at the wire edge, where the serialized form is
/// capped at [`MAX_PROPERTIES_WIRE_LEN`] characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(pub BTreeMap<String, String>);

impl Properties {
    /// Empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Length of the serialized wire form, in characters.
    ///
    /// A `BTreeMap` of strings always serializes, so the fallback is never
    /// taken in practice.
    pub fn wire_len(&self) -> usize {
        serde_json::to_string(&self.0)
            .map(|s| s.chars().count())
            .unwrap_or(usize::MAX)
    }

    /// Check the serialized form against [`MAX_PROPERTIES_WIRE_LEN`].
    pub fn validate(&self) -> Result<(), ErrorCode> {
        if self.wire_len() <= MAX_PROPERTIES_WIRE_LEN {
            Ok(())
        } else {
            Err(ErrorCode::PropertiesTooLarge)
        }
    }
}

// ── Snapshots ───────────────────────────────────────────────────────

/// A player as seen by every member of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Stable per-device identifier; also the transport addressing key.
    pub open_id: String,
    /// Back-reference to the owning room.
    pub room_id: String,
    pub status: PlayerStatus,
    #[serde(default)]
    pub custom_properties: Properties,
}

/// Full room snapshot.
///
/// The owner's copy is authoritative; member copies are mirrors kept current
/// by broadcast notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub room_name: String,
    pub min_player_num: u8,
    pub max_player_num: u8,
    pub room_type: RoomType,
    /// Immutable for the room's lifetime.
    pub owner_id: String,
    pub status: RoomStatus,
    #[serde(default)]
    pub custom_properties: Properties,
    /// Members in join order; the owner is always present.
    pub players: Vec<Player>,
}

/// The discovery summary broadcast for a joinable public room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub room_name: String,
    pub min_player_num: u8,
    pub max_player_num: u8,
}

// ── Frames ──────────────────────────────────────────────────────────

/// One frame on the nearby wire.
///
/// Requests flow member → owner, notifications owner → members, and adverts
/// owner → broadcast. JSON-tagged the same way on every device, so a single
/// enum covers both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WireMessage {
    /// Periodic discovery advertisement for a joinable public room.
    RoomAdvert {
        /// Owner open id, used by joiners to address the `JoinRequest`.
        owner: String,
        summary: RoomSummary,
    },
    /// The room stopped being joinable (full, in game, or dismissed).
    RoomAdvertStop { room_id: String },

    /// Member → owner: ask to join.
    JoinRequest { room_id: String, open_id: String },
    /// Owner → joiner: accepted, with the full snapshot (boxed to keep the
    /// enum small).
    JoinAccepted { room: Box<Room> },
    /// Owner → joiner: rejected; no state changed anywhere.
    JoinRejected {
        room_id: String,
        code: ErrorCode,
        reason: String,
    },
    /// Owner → all members (joiner included): a player was admitted.
    JoinNotify { room_id: String, open_id: String },

    /// Member → owner: explicit leave.
    LeaveRequest { room_id: String, open_id: String },
    /// Owner → remaining members: a player left.
    LeaveNotify {
        room_id: String,
        open_id: String,
        leave_type: LeaveType,
    },
    /// Owner → former members: the room is gone.
    DismissNotify { room_id: String, open_id: String },

    /// Member → owner: readiness transition request.
    UpdatePlayerRequest {
        room_id: String,
        open_id: String,
        action: PlayerAction,
    },
    /// Owner → requester: the transition was refused (stale mirror race).
    UpdateRejected {
        room_id: String,
        code: ErrorCode,
        reason: String,
    },
    /// Owner → all members: a player's status changed.
    UpdatePlayerNotify {
        room_id: String,
        open_id: String,
        status: PlayerStatus,
    },
    /// Owner → all members: the room's status changed.
    UpdateRoomNotify {
        room_id: String,
        open_id: String,
        status: RoomStatus,
    },

    /// Member → owner: relayed application payload.
    ToMaster {
        room_id: String,
        open_id: String,
        message: String,
    },
    /// Owner → named member: relayed application payload.
    FromMaster {
        room_id: String,
        open_id: String,
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn room_name_charset() {
        assert!(room_name_is_valid("Room_1"));
        assert!(room_name_is_valid("我的房间"));
        assert!(!room_name_is_valid(""));
        assert!(!room_name_is_valid("has space"));
        assert!(!room_name_is_valid("thirteen_chars"));
        assert!(!room_name_is_valid("emoji🎮"));
    }

    #[test]
    fn room_id_charset() {
        assert!(room_id_is_valid("R1"));
        assert!(room_id_is_valid("a_b_c"));
        assert!(!room_id_is_valid(""));
        assert!(!room_id_is_valid("toolong"));
        assert!(!room_id_is_valid("no-da"));
    }

    #[test]
    fn capacity_bounds() {
        assert!(capacity_is_valid(1, 6));
        assert!(capacity_is_valid(2, 2));
        assert!(!capacity_is_valid(0, 4));
        assert!(!capacity_is_valid(3, 2));
        assert!(!capacity_is_valid(2, 7));
    }

    #[test]
    fn properties_wire_cap() {
        let small = Properties::new().with("mode", "coop");
        assert!(small.validate().is_ok());

        let big = Properties::new().with("blob", "x".repeat(400));
        assert_eq!(big.validate(), Err(ErrorCode::PropertiesTooLarge));
    }

    #[test]
    fn status_enums_serialize_as_numbers() {
        assert_eq!(serde_json::to_string(&RoomType::Private).unwrap(), "2");
        assert_eq!(serde_json::to_string(&PlayerStatus::InGame).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Disconnected).unwrap(),
            "0"
        );
        let status: PlayerStatus = serde_json::from_str("2").unwrap();
        assert_eq!(status, PlayerStatus::Ready);
        assert!(serde_json::from_str::<RoomStatus>("9").is_err());
    }
}

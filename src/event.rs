//! Typed events delivered through the session's event dispatcher.
//!
//! Each [`SessionEvent`] variant corresponds to exactly one subscription slot
//! in the [`EventDispatcher`](crate::dispatcher::EventDispatcher), addressed
//! by its [`EventKind`]. Completion events carry a `(code, reason)` pair
//! (`code == 0` on success); notification events carry the fields the
//! initiating device broadcast.

use crate::error_codes::{ErrorCode, CODE_OK};
use crate::protocol::{ConnectionStatus, LeaveType, PlayerStatus, Room, RoomStatus, RoomSummary};

/// Addressing key for subscription slots: one per notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Init,
    Destroy,
    CreateRoom,
    GetRoom,
    JoinRoom,
    LeaveRoom,
    SendToMaster,
    SendToPlayer,
    UpdatePlayer,
    UpdateRoom,
    Error,
    NearbyRoomList,
    JoinRoomNotify,
    LeaveRoomNotify,
    DismissRoomNotify,
    UpdatePlayerNotify,
    UpdateRoomNotify,
    ReceiveFromPlayer,
    ReceiveFromMaster,
    ConnectionChanged,
}

/// An event delivered to the handler registered for its [`EventKind`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// `init` completed.
    Init { code: i32, reason: String },
    /// `destroy` completed (always success).
    Destroy { code: i32, reason: String },
    /// `create_room` completed; `room` is the snapshot on success.
    CreateRoom {
        room: Option<Room>,
        code: i32,
        reason: String,
    },
    /// `get_room` completed; `room` is the local snapshot on success.
    GetRoom {
        room: Option<Room>,
        code: i32,
        reason: String,
    },
    /// `join_room` completed.
    JoinRoom {
        room_id: String,
        code: i32,
        reason: String,
    },
    /// `leave_room` completed.
    LeaveRoom {
        room_id: String,
        code: i32,
        reason: String,
    },
    /// Self-echo: the `send_to_master` send attempt finished.
    SendToMaster {
        room_id: String,
        code: i32,
        reason: String,
    },
    /// Self-echo: the `send_to_player` send attempt finished.
    SendToPlayer {
        room_id: String,
        code: i32,
        reason: String,
    },
    /// `update_player` completed.
    UpdatePlayer {
        room_id: String,
        code: i32,
        reason: String,
    },
    /// `update_room` completed.
    UpdateRoom {
        room_id: String,
        code: i32,
        reason: String,
    },
    /// Out-of-band failure (owner-side rejection, transport fault).
    Error { code: i32, reason: String },
    /// The set of discoverable nearby public rooms changed.
    NearbyRoomList { rooms: Vec<RoomSummary> },
    /// A player was admitted to the current room.
    JoinRoomNotify { room_id: String, open_id: String },
    /// A player left the current room.
    LeaveRoomNotify {
        room_id: String,
        open_id: String,
        leave_type: LeaveType,
    },
    /// The current room was dismissed by its owner.
    DismissRoomNotify { room_id: String, open_id: String },
    /// A member's readiness status changed.
    UpdatePlayerNotify {
        room_id: String,
        open_id: String,
        status: PlayerStatus,
    },
    /// The room's status changed.
    UpdateRoomNotify {
        room_id: String,
        open_id: String,
        status: RoomStatus,
    },
    /// Owner only: a member's relayed payload arrived.
    ReceiveFromPlayer {
        room_id: String,
        open_id: String,
        message: String,
    },
    /// Member only: the owner's relayed payload arrived.
    ReceiveFromMaster {
        room_id: String,
        open_id: String,
        message: String,
    },
    /// Transport connectivity changed.
    ConnectionChanged {
        status: ConnectionStatus,
        reason: String,
    },
}

impl SessionEvent {
    /// The subscription slot this event is delivered to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Init { .. } => EventKind::Init,
            Self::Destroy { .. } => EventKind::Destroy,
            Self::CreateRoom { .. } => EventKind::CreateRoom,
            Self::GetRoom { .. } => EventKind::GetRoom,
            Self::JoinRoom { .. } => EventKind::JoinRoom,
            Self::LeaveRoom { .. } => EventKind::LeaveRoom,
            Self::SendToMaster { .. } => EventKind::SendToMaster,
            Self::SendToPlayer { .. } => EventKind::SendToPlayer,
            Self::UpdatePlayer { .. } => EventKind::UpdatePlayer,
            Self::UpdateRoom { .. } => EventKind::UpdateRoom,
            Self::Error { .. } => EventKind::Error,
            Self::NearbyRoomList { .. } => EventKind::NearbyRoomList,
            Self::JoinRoomNotify { .. } => EventKind::JoinRoomNotify,
            Self::LeaveRoomNotify { .. } => EventKind::LeaveRoomNotify,
            Self::DismissRoomNotify { .. } => EventKind::DismissRoomNotify,
            Self::UpdatePlayerNotify { .. } => EventKind::UpdatePlayerNotify,
            Self::UpdateRoomNotify { .. } => EventKind::UpdateRoomNotify,
            Self::ReceiveFromPlayer { .. } => EventKind::ReceiveFromPlayer,
            Self::ReceiveFromMaster { .. } => EventKind::ReceiveFromMaster,
            Self::ConnectionChanged { .. } => EventKind::ConnectionChanged,
        }
    }
}

/// Build a success `(code, reason)` pair.
pub(crate) fn ok() -> (i32, String) {
    (CODE_OK, String::new())
}

/// Build a failure `(code, reason)` pair from an [`ErrorCode`].
pub(crate) fn fail(code: ErrorCode) -> (i32, String) {
    (code.code(), code.description().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let ev = SessionEvent::JoinRoomNotify {
            room_id: "R1".into(),
            open_id: "B".into(),
        };
        assert_eq!(ev.kind(), EventKind::JoinRoomNotify);

        let (code, reason) = fail(ErrorCode::RoomFull);
        let ev = SessionEvent::JoinRoom {
            room_id: "R1".into(),
            code,
            reason,
        };
        assert_eq!(ev.kind(), EventKind::JoinRoom);
    }

    #[test]
    fn ok_pair_is_zero_with_empty_reason() {
        let (code, reason) = ok();
        assert_eq!(code, CODE_OK);
        assert!(reason.is_empty());
    }
}

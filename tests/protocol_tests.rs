#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the nearby session protocol.
//!
//! Verifies the JSON frame envelope (`type`/`data` tagging), the numeric
//! encoding of the status enums, and the `ErrorCode` SCREAMING_SNAKE_CASE
//! encoding carried inside rejection frames.

use nearby_session::error_codes::ErrorCode;
use nearby_session::protocol::{
    LeaveType, PlayerAction, PlayerStatus, Properties, Room, RoomStatus, RoomSummary, RoomType,
    WireMessage,
};

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

fn sample_room() -> Room {
    let mut room = Room::create(
        "Ab3_z",
        "我的Room_1",
        2,
        4,
        RoomType::Public,
        Properties::new().with("mode", "coop"),
        "owner-device",
    )
    .expect("valid room");
    room.admit("guest-device").expect("seat available");
    room
}

// ════════════════════════════════════════════════════════════════════
// Frame envelope
// ════════════════════════════════════════════════════════════════════

#[test]
fn frames_use_tagged_envelope() {
    let frame = WireMessage::JoinRequest {
        room_id: "Ab3_z".into(),
        open_id: "guest-device".into(),
    };
    let json = serde_json::to_value(&frame).expect("serialize");
    assert_eq!(json["type"], "JoinRequest");
    assert_eq!(json["data"]["room_id"], "Ab3_z");
    assert_eq!(json["data"]["open_id"], "guest-device");
}

#[test]
fn room_advert_round_trip() {
    let frame = WireMessage::RoomAdvert {
        owner: "owner-device".into(),
        summary: RoomSummary {
            room_id: "Ab3_z".into(),
            room_name: "Room1".into(),
            min_player_num: 2,
            max_player_num: 4,
        },
    };
    match round_trip(&frame) {
        WireMessage::RoomAdvert { owner, summary } => {
            assert_eq!(owner, "owner-device");
            assert_eq!(summary.room_id, "Ab3_z");
            assert_eq!(summary.max_player_num, 4);
        }
        other => panic!("expected RoomAdvert, got {other:?}"),
    }
}

#[test]
fn join_accepted_carries_the_full_snapshot() {
    let room = sample_room();
    let frame = WireMessage::JoinAccepted {
        room: Box::new(room.clone()),
    };
    match round_trip(&frame) {
        WireMessage::JoinAccepted { room: got } => {
            assert_eq!(*got, room);
            assert_eq!(got.players.len(), 2);
            assert_eq!(got.players[0].open_id, "owner-device");
        }
        other => panic!("expected JoinAccepted, got {other:?}"),
    }
}

#[test]
fn join_rejected_carries_a_screaming_snake_code() {
    let frame = WireMessage::JoinRejected {
        room_id: "Ab3_z".into(),
        code: ErrorCode::RoomFull,
        reason: ErrorCode::RoomFull.description().to_string(),
    };
    let json = serde_json::to_value(&frame).expect("serialize");
    assert_eq!(json["data"]["code"], "ROOM_FULL");

    match round_trip(&frame) {
        WireMessage::JoinRejected { code, .. } => assert_eq!(code, ErrorCode::RoomFull),
        other => panic!("expected JoinRejected, got {other:?}"),
    }
}

#[test]
fn leave_notify_round_trip_preserves_leave_type() {
    let frame = WireMessage::LeaveNotify {
        room_id: "Ab3_z".into(),
        open_id: "guest-device".into(),
        leave_type: LeaveType::Dropped,
    };
    match round_trip(&frame) {
        WireMessage::LeaveNotify { leave_type, .. } => {
            assert_eq!(leave_type, LeaveType::Dropped);
        }
        other => panic!("expected LeaveNotify, got {other:?}"),
    }
}

#[test]
fn update_player_request_round_trip() {
    let frame = WireMessage::UpdatePlayerRequest {
        room_id: "Ab3_z".into(),
        open_id: "guest-device".into(),
        action: PlayerAction::CancelReady,
    };
    match round_trip(&frame) {
        WireMessage::UpdatePlayerRequest { action, .. } => {
            assert_eq!(action, PlayerAction::CancelReady);
        }
        other => panic!("expected UpdatePlayerRequest, got {other:?}"),
    }
}

#[test]
fn relay_frames_round_trip() {
    let frame = WireMessage::ToMaster {
        room_id: "Ab3_z".into(),
        open_id: "guest-device".into(),
        message: "{\"move\":\"e4\"}".into(),
    };
    match round_trip(&frame) {
        WireMessage::ToMaster { message, .. } => assert_eq!(message, "{\"move\":\"e4\"}"),
        other => panic!("expected ToMaster, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Numeric enum encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn status_enums_serialize_as_numbers() {
    assert_eq!(
        serde_json::to_value(RoomStatus::InGame).expect("serialize"),
        serde_json::json!(2)
    );
    assert_eq!(
        serde_json::to_value(PlayerStatus::Ready).expect("serialize"),
        serde_json::json!(2)
    );
    assert_eq!(
        serde_json::to_value(LeaveType::Dropped).expect("serialize"),
        serde_json::json!(2)
    );
    assert_eq!(
        serde_json::to_value(RoomType::Private).expect("serialize"),
        serde_json::json!(2)
    );
}

#[test]
fn unknown_numeric_codes_are_rejected() {
    assert!(serde_json::from_value::<PlayerStatus>(serde_json::json!(9)).is_err());
    assert!(serde_json::from_value::<RoomType>(serde_json::json!(0)).is_err());
}

// ════════════════════════════════════════════════════════════════════
// Snapshot fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn room_snapshot_json_shape() {
    let room = sample_room();
    let json = serde_json::to_value(&room).expect("serialize");

    assert_eq!(json["room_id"], "Ab3_z");
    assert_eq!(json["room_type"], 1);
    assert_eq!(json["status"], 1);
    assert_eq!(json["owner_id"], "owner-device");
    assert_eq!(json["custom_properties"]["mode"], "coop");
    assert_eq!(json["players"][1]["open_id"], "guest-device");
    assert_eq!(json["players"][1]["status"], 1);
}

#[test]
fn room_snapshot_round_trip() {
    let room = sample_room();
    assert_eq!(round_trip(&room), room);
}

#[test]
fn player_missing_properties_defaults_to_empty() {
    let json = serde_json::json!({
        "open_id": "guest-device",
        "room_id": "Ab3_z",
        "status": 1
    });
    let player: nearby_session::protocol::Player =
        serde_json::from_value(json).expect("deserialize");
    assert!(player.custom_properties.0.is_empty());
}

//! Star-topology message routing through the room owner.
//!
//! These are pure planning functions: they turn a send request plus the local
//! room state into the set of `(peer, frame)` deliveries the session loop
//! must hand to the transport, without touching the transport themselves.
//! Per-sender ordering falls out of the architecture — every frame a device
//! sends flows through its single session loop in invocation order.

use crate::error_codes::ErrorCode;
use crate::protocol::{Room, WireMessage, MAX_MESSAGE_LEN, MAX_PLAYERS};

/// One frame addressed to one peer.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub peer: String,
    pub frame: WireMessage,
}

/// Routing decision for `send_to_master`.
#[derive(Debug)]
pub(crate) enum ToMasterPlan {
    /// The caller is the owner; deliver the payload locally.
    Local,
    /// Forward one frame to the owner.
    Forward(Delivery),
}

fn check_len(message: &str) -> Result<(), ErrorCode> {
    if message.chars().count() > MAX_MESSAGE_LEN {
        Err(ErrorCode::PayloadTooLarge)
    } else {
        Ok(())
    }
}

/// Plan a member's `send_to_master` call against the local room state.
pub(crate) fn plan_to_master(
    room: &Room,
    sender: &str,
    message: &str,
) -> Result<ToMasterPlan, ErrorCode> {
    check_len(message)?;
    if !room.is_member(sender) {
        return Err(ErrorCode::NotMember);
    }
    if room.is_owner(sender) {
        return Ok(ToMasterPlan::Local);
    }
    Ok(ToMasterPlan::Forward(Delivery {
        peer: room.owner_id.clone(),
        frame: WireMessage::ToMaster {
            room_id: room.room_id.clone(),
            open_id: sender.to_string(),
            message: message.to_string(),
        },
    }))
}

/// Plan the owner's `send_to_player` call.
///
/// `recipients = None` broadcasts to every member except the owner. Named
/// recipients are deduplicated; unknown open ids and the owner's own id are
/// skipped rather than failing the whole call.
pub(crate) fn plan_from_master(
    room: &Room,
    sender: &str,
    message: &str,
    recipients: Option<&[String]>,
) -> Result<Vec<Delivery>, ErrorCode> {
    if !room.is_owner(sender) {
        return Err(ErrorCode::NotOwner);
    }
    check_len(message)?;

    let targets: Vec<String> = match recipients {
        None => room.peers_of(sender),
        Some(named) => {
            if named.len() > usize::from(MAX_PLAYERS) {
                return Err(ErrorCode::TooManyRecipients);
            }
            let mut seen = Vec::new();
            for open_id in named {
                if open_id != sender && room.is_member(open_id) && !seen.contains(open_id) {
                    seen.push(open_id.clone());
                }
            }
            seen
        }
    };

    Ok(targets
        .into_iter()
        .map(|peer| Delivery {
            frame: WireMessage::FromMaster {
                room_id: room.room_id.clone(),
                open_id: sender.to_string(),
                message: message.to_string(),
            },
            peer,
        })
        .collect())
}

/// Fan a notification frame out to every member except `exclude`.
pub(crate) fn fan_out(room: &Room, exclude: &str, frame: &WireMessage) -> Vec<Delivery> {
    room.peers_of(exclude)
        .into_iter()
        .map(|peer| Delivery {
            peer,
            frame: frame.clone(),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::protocol::{Properties, RoomType};

    fn room() -> Room {
        let mut room = Room::create(
            "R1",
            "Room1",
            1,
            4,
            RoomType::Public,
            Properties::new(),
            "A",
        )
        .unwrap();
        room.admit("B").unwrap();
        room.admit("C").unwrap();
        room
    }

    #[test]
    fn to_master_forwards_to_the_owner() {
        let room = room();
        match plan_to_master(&room, "B", "hi").unwrap() {
            ToMasterPlan::Forward(delivery) => {
                assert_eq!(delivery.peer, "A");
                assert!(matches!(
                    delivery.frame,
                    WireMessage::ToMaster { ref open_id, ref message, .. }
                        if open_id == "B" && message == "hi"
                ));
            }
            other => panic!("expected Forward, got {other:?}"),
        }
    }

    #[test]
    fn to_master_from_the_owner_stays_local() {
        let room = room();
        assert!(matches!(
            plan_to_master(&room, "A", "hi").unwrap(),
            ToMasterPlan::Local
        ));
    }

    #[test]
    fn to_master_rejects_oversized_and_foreign_senders() {
        let room = room();
        let big = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert_eq!(
            plan_to_master(&room, "B", &big).unwrap_err(),
            ErrorCode::PayloadTooLarge
        );
        // Boundary: exactly the limit passes.
        let max = "x".repeat(MAX_MESSAGE_LEN);
        assert!(plan_to_master(&room, "B", &max).is_ok());
        assert_eq!(
            plan_to_master(&room, "Z", "hi").unwrap_err(),
            ErrorCode::NotMember
        );
    }

    #[test]
    fn from_master_broadcast_excludes_the_owner() {
        let room = room();
        let plan = plan_from_master(&room, "A", "hi", None).unwrap();
        let peers: Vec<&str> = plan.iter().map(|d| d.peer.as_str()).collect();
        assert_eq!(peers, ["B", "C"]);
    }

    #[test]
    fn from_master_named_recipients_are_filtered_and_deduped() {
        let room = room();
        let named = vec![
            "B".to_string(),
            "B".to_string(),
            "A".to_string(),
            "ghost".to_string(),
        ];
        let plan = plan_from_master(&room, "A", "hi", Some(&named)).unwrap();
        let peers: Vec<&str> = plan.iter().map(|d| d.peer.as_str()).collect();
        assert_eq!(peers, ["B"]);
    }

    #[test]
    fn from_master_rejects_non_owner_and_recipient_overflow() {
        let room = room();
        assert_eq!(
            plan_from_master(&room, "B", "hi", None).unwrap_err(),
            ErrorCode::NotOwner
        );
        let too_many: Vec<String> = (0..7).map(|i| format!("p{i}")).collect();
        assert_eq!(
            plan_from_master(&room, "A", "hi", Some(&too_many)).unwrap_err(),
            ErrorCode::TooManyRecipients
        );
    }

    #[test]
    fn fan_out_reaches_every_other_member() {
        let room = room();
        let frame = WireMessage::JoinNotify {
            room_id: "R1".into(),
            open_id: "C".into(),
        };
        let plan = fan_out(&room, "A", &frame);
        let peers: Vec<&str> = plan.iter().map(|d| d.peer.as_str()).collect();
        assert_eq!(peers, ["B", "C"]);
    }
}

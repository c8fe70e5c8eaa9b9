//! Room and player state machine.
//!
//! All mutating operations live here and return `Result<_, ErrorCode>` so the
//! owner's session loop and wire-level rejections share one set of checks.
//! The session loop holds the authoritative copy on the owning device;
//! members hold mirrors that replay the same transitions from broadcast
//! notifications.

use crate::error_codes::ErrorCode;
use crate::protocol::{
    capacity_is_valid, room_id_is_valid, room_name_is_valid, Player, PlayerAction, PlayerStatus,
    Properties, Room, RoomStatus, RoomSummary, RoomType,
};

impl Room {
    /// Build a new room with `owner_id` as its sole, not-ready member.
    ///
    /// Validates the name charset/length, the capacity bounds, the generated
    /// room id, and the serialized size of the custom properties.
    pub fn create(
        room_id: impl Into<String>,
        room_name: impl Into<String>,
        min_player_num: u8,
        max_player_num: u8,
        room_type: RoomType,
        custom_properties: Properties,
        owner_id: impl Into<String>,
    ) -> Result<Self, ErrorCode> {
        let room_id = room_id.into();
        let room_name = room_name.into();
        let owner_id = owner_id.into();

        if !room_name_is_valid(&room_name) {
            return Err(ErrorCode::InvalidRoomName);
        }
        if !room_id_is_valid(&room_id) {
            return Err(ErrorCode::InvalidRoomId);
        }
        if !capacity_is_valid(min_player_num, max_player_num) {
            return Err(ErrorCode::InvalidCapacity);
        }
        custom_properties.validate()?;

        let owner = Player {
            open_id: owner_id.clone(),
            room_id: room_id.clone(),
            status: PlayerStatus::NotReady,
            custom_properties: Properties::new(),
        };

        Ok(Self {
            room_id,
            room_name,
            min_player_num,
            max_player_num,
            room_type,
            owner_id,
            status: RoomStatus::Idle,
            custom_properties,
            players: vec![owner],
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn is_member(&self, open_id: &str) -> bool {
        self.players.iter().any(|p| p.open_id == open_id)
    }

    pub fn is_owner(&self, open_id: &str) -> bool {
        self.owner_id == open_id
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.max_player_num)
    }

    /// Whether this room should appear in nearby discovery broadcasts.
    pub fn is_joinable(&self) -> bool {
        self.room_type == RoomType::Public && self.status == RoomStatus::Idle && !self.is_full()
    }

    pub fn player(&self, open_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.open_id == open_id)
    }

    fn player_mut(&mut self, open_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.open_id == open_id)
    }

    /// Open ids of every member except `open_id`, in join order.
    pub fn peers_of(&self, open_id: &str) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| p.open_id != open_id)
            .map(|p| p.open_id.clone())
            .collect()
    }

    /// The discovery summary broadcast for this room.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            room_name: self.room_name.clone(),
            min_player_num: self.min_player_num,
            max_player_num: self.max_player_num,
        }
    }

    // ── Membership transitions ──────────────────────────────────────

    /// Admit a joining player (status NotReady). Owner-side `joinRoom`
    /// validation: the room must be idle, below capacity, and the requester
    /// must not already be a member.
    pub fn admit(&mut self, open_id: impl Into<String>) -> Result<&Player, ErrorCode> {
        let open_id = open_id.into();
        if self.status != RoomStatus::Idle {
            return Err(ErrorCode::RoomInGame);
        }
        if self.is_full() {
            return Err(ErrorCode::RoomFull);
        }
        if self.is_member(&open_id) {
            return Err(ErrorCode::AlreadyMember);
        }
        self.players.push(Player {
            open_id,
            room_id: self.room_id.clone(),
            status: PlayerStatus::NotReady,
            custom_properties: Properties::new(),
        });
        // Just pushed, so the last element exists.
        self.players.last().ok_or(ErrorCode::PlayerNotFound)
    }

    /// Remove a non-owner member. Removing the owner is not a removal but a
    /// dismissal of the whole room, which the session layer handles.
    pub fn remove_member(&mut self, open_id: &str) -> Result<Player, ErrorCode> {
        if self.is_owner(open_id) {
            return Err(ErrorCode::InvalidState);
        }
        let index = self
            .players
            .iter()
            .position(|p| p.open_id == open_id)
            .ok_or(ErrorCode::NotMember)?;
        Ok(self.players.remove(index))
    }

    // ── Readiness transitions ───────────────────────────────────────

    /// Apply a readiness action for one member. Rejected while the room is in
    /// game; otherwise both directions are always legal (re-applying the
    /// current state is a harmless no-op).
    pub fn apply_player_action(
        &mut self,
        open_id: &str,
        action: PlayerAction,
    ) -> Result<PlayerStatus, ErrorCode> {
        if self.status != RoomStatus::Idle {
            return Err(ErrorCode::InvalidState);
        }
        let player = self.player_mut(open_id).ok_or(ErrorCode::PlayerNotFound)?;
        player.status = match action {
            PlayerAction::Ready => PlayerStatus::Ready,
            PlayerAction::CancelReady => PlayerStatus::NotReady,
        };
        Ok(player.status)
    }

    /// Owner action: start the game. Requires an idle room with every member
    /// ready; moves the room and every member to InGame.
    pub fn start_game(&mut self) -> Result<(), ErrorCode> {
        if self.status != RoomStatus::Idle {
            return Err(ErrorCode::InvalidState);
        }
        if !self
            .players
            .iter()
            .all(|p| p.status == PlayerStatus::Ready)
        {
            return Err(ErrorCode::NotAllPlayersReady);
        }
        self.status = RoomStatus::InGame;
        for player in &mut self.players {
            player.status = PlayerStatus::InGame;
        }
        Ok(())
    }

    /// Owner action: end the game. Requires an in-game room; moves the room
    /// back to Idle and resets every member to NotReady, so readiness is
    /// renegotiated before the next round.
    pub fn end_game(&mut self) -> Result<(), ErrorCode> {
        if self.status != RoomStatus::InGame {
            return Err(ErrorCode::InvalidState);
        }
        self.status = RoomStatus::Idle;
        for player in &mut self.players {
            player.status = PlayerStatus::NotReady;
        }
        Ok(())
    }

    // ── Mirror replay ───────────────────────────────────────────────

    /// Replay a room-status notification on a member mirror.
    pub fn apply_room_status(&mut self, status: RoomStatus) {
        self.status = status;
        let player_status = match status {
            RoomStatus::InGame => PlayerStatus::InGame,
            RoomStatus::Idle => PlayerStatus::NotReady,
        };
        for player in &mut self.players {
            player.status = player_status;
        }
    }

    /// Replay a player-status notification on a member mirror. Unknown
    /// players are admitted lazily so a mirror that missed a join notify
    /// converges instead of diverging.
    pub fn apply_player_status(&mut self, open_id: &str, status: PlayerStatus) {
        if let Some(player) = self.player_mut(open_id) {
            player.status = status;
        } else {
            self.players.push(Player {
                open_id: open_id.to_string(),
                room_id: self.room_id.clone(),
                status,
                custom_properties: Properties::new(),
            });
        }
    }

    /// Replay a join notification on a member mirror (idempotent).
    pub fn apply_join(&mut self, open_id: &str) {
        if !self.is_member(open_id) {
            self.players.push(Player {
                open_id: open_id.to_string(),
                room_id: self.room_id.clone(),
                status: PlayerStatus::NotReady,
                custom_properties: Properties::new(),
            });
        }
    }

    /// Replay a leave notification on a member mirror (idempotent).
    pub fn apply_leave(&mut self, open_id: &str) {
        self.players.retain(|p| p.open_id != open_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room::create(
            "R1",
            "Room1",
            2,
            4,
            RoomType::Public,
            Properties::new(),
            "A",
        )
        .unwrap()
    }

    fn assert_invariants(room: &Room) {
        assert!(!room.players.is_empty());
        assert!(room.players.len() <= usize::from(room.max_player_num));
        let owners = room
            .players
            .iter()
            .filter(|p| p.open_id == room.owner_id)
            .count();
        assert_eq!(owners, 1, "exactly one member must be the owner");
        match room.status {
            RoomStatus::InGame => assert!(room
                .players
                .iter()
                .all(|p| p.status == PlayerStatus::InGame)),
            RoomStatus::Idle => assert!(room
                .players
                .iter()
                .all(|p| p.status != PlayerStatus::InGame)),
        }
    }

    #[test]
    fn create_validates_inputs() {
        assert_eq!(
            Room::create("R1", "", 2, 4, RoomType::Public, Properties::new(), "A").unwrap_err(),
            ErrorCode::InvalidRoomName
        );
        assert_eq!(
            Room::create("R1", "x", 0, 4, RoomType::Public, Properties::new(), "A").unwrap_err(),
            ErrorCode::InvalidCapacity
        );
        assert_eq!(
            Room::create("R1", "x", 3, 2, RoomType::Public, Properties::new(), "A").unwrap_err(),
            ErrorCode::InvalidCapacity
        );
        assert_eq!(
            Room::create("bad-id", "x", 1, 2, RoomType::Public, Properties::new(), "A")
                .unwrap_err(),
            ErrorCode::InvalidRoomId
        );
        let props = Properties::new().with("blob", "x".repeat(400));
        assert_eq!(
            Room::create("R1", "x", 1, 2, RoomType::Public, props, "A").unwrap_err(),
            ErrorCode::PropertiesTooLarge
        );
    }

    #[test]
    fn creator_is_sole_not_ready_member() {
        let room = room();
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.players[0].open_id, "A");
        assert_eq!(room.players[0].status, PlayerStatus::NotReady);
        assert_eq!(room.status, RoomStatus::Idle);
        assert_invariants(&room);
    }

    #[test]
    fn admit_enforces_capacity_state_and_uniqueness() {
        let mut room = room();
        room.admit("B").unwrap();
        assert_eq!(room.admit("B").unwrap_err(), ErrorCode::AlreadyMember);

        room.admit("C").unwrap();
        room.admit("D").unwrap();
        assert_eq!(room.admit("E").unwrap_err(), ErrorCode::RoomFull);
        assert_invariants(&room);

        let mut in_game = room.clone();
        in_game.remove_member("D").unwrap();
        for id in ["A", "B", "C"] {
            in_game.apply_player_action(id, PlayerAction::Ready).unwrap();
        }
        in_game.start_game().unwrap();
        assert_eq!(in_game.admit("E").unwrap_err(), ErrorCode::RoomInGame);
    }

    #[test]
    fn remove_member_rejects_owner() {
        let mut room = room();
        room.admit("B").unwrap();
        assert_eq!(room.remove_member("A").unwrap_err(), ErrorCode::InvalidState);
        assert_eq!(room.remove_member("Z").unwrap_err(), ErrorCode::NotMember);
        let removed = room.remove_member("B").unwrap();
        assert_eq!(removed.open_id, "B");
        assert_invariants(&room);
    }

    #[test]
    fn readiness_toggles_both_ways_while_idle() {
        let mut room = room();
        room.admit("B").unwrap();
        assert_eq!(
            room.apply_player_action("B", PlayerAction::Ready).unwrap(),
            PlayerStatus::Ready
        );
        assert_eq!(
            room.apply_player_action("B", PlayerAction::CancelReady)
                .unwrap(),
            PlayerStatus::NotReady
        );
        assert_eq!(
            room.apply_player_action("Z", PlayerAction::Ready)
                .unwrap_err(),
            ErrorCode::PlayerNotFound
        );
    }

    #[test]
    fn start_requires_every_player_ready() {
        let mut room = room();
        room.admit("B").unwrap();
        room.apply_player_action("B", PlayerAction::Ready).unwrap();
        assert_eq!(room.start_game().unwrap_err(), ErrorCode::NotAllPlayersReady);

        room.apply_player_action("A", PlayerAction::Ready).unwrap();
        room.start_game().unwrap();
        assert_eq!(room.status, RoomStatus::InGame);
        assert_invariants(&room);

        // No readiness changes mid-game.
        assert_eq!(
            room.apply_player_action("B", PlayerAction::CancelReady)
                .unwrap_err(),
            ErrorCode::InvalidState
        );
        // And no double start.
        assert_eq!(room.start_game().unwrap_err(), ErrorCode::InvalidState);
    }

    #[test]
    fn end_game_resets_readiness() {
        let mut room = room();
        room.admit("B").unwrap();
        assert_eq!(room.end_game().unwrap_err(), ErrorCode::InvalidState);

        room.apply_player_action("A", PlayerAction::Ready).unwrap();
        room.apply_player_action("B", PlayerAction::Ready).unwrap();
        room.start_game().unwrap();
        room.end_game().unwrap();

        assert_eq!(room.status, RoomStatus::Idle);
        assert!(room
            .players
            .iter()
            .all(|p| p.status == PlayerStatus::NotReady));
        assert_invariants(&room);
    }

    #[test]
    fn joinable_tracks_type_status_and_capacity() {
        let mut room = room();
        assert!(room.is_joinable());

        room.admit("B").unwrap();
        room.admit("C").unwrap();
        room.admit("D").unwrap();
        assert!(!room.is_joinable(), "full room is not joinable");

        let private = Room::create(
            "R2",
            "Hidden",
            1,
            4,
            RoomType::Private,
            Properties::new(),
            "A",
        )
        .unwrap();
        assert!(!private.is_joinable());
    }

    #[test]
    fn mirror_replay_converges() {
        let mut mirror = room();
        mirror.apply_join("B");
        mirror.apply_join("B");
        assert_eq!(mirror.players.len(), 2);

        mirror.apply_player_status("B", PlayerStatus::Ready);
        assert_eq!(mirror.player("B").unwrap().status, PlayerStatus::Ready);

        // A status notify for a player the mirror never saw still lands.
        mirror.apply_player_status("C", PlayerStatus::Ready);
        assert!(mirror.is_member("C"));

        mirror.apply_room_status(RoomStatus::InGame);
        assert_invariants(&mirror);
        mirror.apply_room_status(RoomStatus::Idle);
        assert_invariants(&mirror);

        mirror.apply_leave("B");
        assert!(!mirror.is_member("B"));
    }
}

//! Room registry and connection-to-room routing.

use std::collections::HashMap;

use rand::distr::Alphanumeric;
use rand::Rng as _;
use tracing::info;

use crate::constants::MAX_PLAYERS;
use crate::engine::{RoomSession, RoomSettings};
use crate::error::RoomError;
use crate::rng::Rng;
use crate::server_utils::{normalize_room_id, ROOM_ID_LEN};
use crate::types::{Difficulty, GameMode, Outbound, Phase, RoomSummary};

/// What a connection left behind when it departed its room.
#[derive(Debug)]
pub struct Departure {
    pub room_id: String,
    /// The roster emptied and the room is gone.
    pub destroyed: bool,
    pub outbound: Vec<Outbound>,
}

pub struct RoomDirectory {
    rooms: HashMap<String, RoomSession>,
    room_by_connection: HashMap<String, String>,
    max_rooms: usize,
    default_duration_ms: u64,
    next_seq: u64,
}

impl RoomDirectory {
    pub fn new(max_rooms: usize, default_duration_ms: u64) -> Self {
        Self {
            rooms: HashMap::new(),
            room_by_connection: HashMap::new(),
            max_rooms,
            default_duration_ms,
            next_seq: 1,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_of(&self, conn_id: &str) -> Option<&str> {
        self.room_by_connection.get(conn_id).map(String::as_str)
    }

    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut RoomSession> {
        self.rooms.get_mut(room_id)
    }

    pub fn session_for_mut(&mut self, conn_id: &str) -> Option<&mut RoomSession> {
        let room_id = self.room_by_connection.get(conn_id)?;
        self.rooms.get_mut(room_id)
    }

    pub fn drain_room(&mut self, room_id: &str) -> Vec<Outbound> {
        self.rooms
            .get_mut(room_id)
            .map(RoomSession::drain_outbox)
            .unwrap_or_default()
    }

    /// Rooms in creation order.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<&RoomSession> = self.rooms.values().collect();
        rooms.sort_by_key(|room| room.created_seq());
        rooms.into_iter().map(RoomSession::summary).collect()
    }

    /// Quick match: the oldest waiting room with space, else a fresh default room.
    pub fn join(&mut self, conn_id: &str, name: Option<&str>) -> Result<String, RoomError> {
        self.ensure_unassigned(conn_id)?;
        let open = self
            .rooms
            .values()
            .filter(|room| room.phase() == Phase::Waiting && room.player_count() < MAX_PLAYERS)
            .min_by_key(|room| room.created_seq())
            .map(|room| room.id.clone());
        match open {
            Some(room_id) => self.join_room(conn_id, name, &room_id),
            None => {
                let settings = RoomSettings::new(
                    GameMode::Survival,
                    Difficulty::Medium,
                    self.default_duration_ms,
                );
                self.create_room(conn_id, name, settings)
            }
        }
    }

    pub fn create_room(
        &mut self,
        conn_id: &str,
        name: Option<&str>,
        settings: RoomSettings,
    ) -> Result<String, RoomError> {
        self.ensure_unassigned(conn_id)?;
        if self.rooms.len() >= self.max_rooms {
            return Err(RoomError::TooManyRooms);
        }
        let room_id = self.fresh_room_id();
        let seq = self.next_seq;
        self.next_seq += 1;
        let session = RoomSession::new(
            room_id.clone(),
            seq,
            settings,
            Box::new(Rng::new(rand::random())),
        );
        info!(
            room_id = %room_id,
            mode = ?settings.mode,
            difficulty = ?settings.difficulty,
            duration_ms = settings.duration_ms,
            "room created"
        );
        self.rooms.insert(room_id.clone(), session);

        if let Err(err) = self.add_to_room(conn_id, name, &room_id) {
            self.destroy_room(&room_id);
            return Err(err);
        }
        Ok(room_id)
    }

    pub fn join_room(
        &mut self,
        conn_id: &str,
        name: Option<&str>,
        room_id: &str,
    ) -> Result<String, RoomError> {
        self.ensure_unassigned(conn_id)?;
        let room_id = normalize_room_id(room_id).ok_or(RoomError::RoomNotFound)?;
        self.add_to_room(conn_id, name, &room_id)?;
        Ok(room_id)
    }

    pub fn leave(&mut self, conn_id: &str) -> Option<Departure> {
        let room_id = self.room_by_connection.remove(conn_id)?;
        let room = self.rooms.get_mut(&room_id)?;
        room.remove_player(conn_id);
        let outbound = room.drain_outbox();
        let destroyed = room.is_empty();
        if destroyed {
            self.destroy_room(&room_id);
        }
        Some(Departure {
            room_id,
            destroyed,
            outbound,
        })
    }

    fn add_to_room(
        &mut self,
        conn_id: &str,
        name: Option<&str>,
        room_id: &str,
    ) -> Result<(), RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        room.add_player(conn_id, name)?;
        self.room_by_connection
            .insert(conn_id.to_string(), room_id.to_string());
        Ok(())
    }

    fn ensure_unassigned(&self, conn_id: &str) -> Result<(), RoomError> {
        if self.room_by_connection.contains_key(conn_id) {
            return Err(RoomError::AlreadyInRoom);
        }
        Ok(())
    }

    fn destroy_room(&mut self, room_id: &str) {
        if let Some(mut room) = self.rooms.remove(room_id) {
            room.teardown();
            self.room_by_connection.retain(|_, id| id != room_id);
            info!(room_id, "room destroyed");
        }
    }

    fn fresh_room_id(&self) -> String {
        loop {
            let candidate: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(ROOM_ID_LEN)
                .map(|byte| char::from(byte).to_ascii_lowercase())
                .collect();
            if !self.rooms.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_GAME_DURATION_MS;
    use crate::types::ServerEvent;

    fn directory() -> RoomDirectory {
        RoomDirectory::new(4, DEFAULT_GAME_DURATION_MS)
    }

    #[test]
    fn quick_join_fills_one_room_before_opening_another() {
        let mut rooms = directory();
        let first = rooms.join("c0", Some("A")).expect("join");
        for idx in 1..MAX_PLAYERS {
            let room_id = rooms.join(&format!("c{idx}"), None).expect("join");
            assert_eq!(room_id, first);
        }
        assert_eq!(
            rooms.room_mut(&first).map(|room| room.phase()),
            Some(Phase::Instructions)
        );
        let second = rooms.join("c9", None).expect("join");
        assert_ne!(second, first);
        assert_eq!(rooms.room_count(), 2);
    }

    #[test]
    fn room_ids_are_short_lowercase_alphanumeric() {
        let mut rooms = directory();
        let room_id = rooms.join("c0", None).expect("join");
        assert_eq!(room_id.len(), ROOM_ID_LEN);
        assert!(room_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(normalize_room_id(&room_id.to_uppercase()), Some(room_id));
    }

    #[test]
    fn a_connection_belongs_to_one_room() {
        let mut rooms = directory();
        rooms.join("c0", None).expect("join");
        assert_eq!(rooms.join("c0", None), Err(RoomError::AlreadyInRoom));
        assert_eq!(
            rooms.create_room("c0", None, RoomSettings::default()),
            Err(RoomError::AlreadyInRoom)
        );
    }

    #[test]
    fn join_room_reports_missing_and_full_rooms() {
        let mut rooms = directory();
        assert_eq!(
            rooms.join_room("c0", None, "zzzzzzzz"),
            Err(RoomError::RoomNotFound)
        );
        let room_id = rooms
            .create_room("c0", None, RoomSettings::default())
            .expect("create");
        for idx in 1..MAX_PLAYERS {
            rooms
                .join_room(&format!("c{idx}"), None, &room_id)
                .expect("join");
        }
        assert_eq!(
            rooms.join_room("late", None, &room_id),
            Err(RoomError::RoomFull)
        );
        assert_eq!(rooms.room_of("late"), None);
    }

    #[test]
    fn room_cap_is_enforced() {
        let mut rooms = RoomDirectory::new(1, DEFAULT_GAME_DURATION_MS);
        rooms
            .create_room("c0", None, RoomSettings::default())
            .expect("create");
        assert_eq!(
            rooms.create_room("c1", None, RoomSettings::default()),
            Err(RoomError::TooManyRooms)
        );
    }

    #[test]
    fn last_leaver_destroys_the_room() {
        let mut rooms = directory();
        let room_id = rooms.join("c0", None).expect("join");
        rooms.join("c1", None).expect("join");
        rooms.drain_room(&room_id);

        let departure = rooms.leave("c0").expect("member");
        assert!(!departure.destroyed);
        assert!(departure
            .outbound
            .iter()
            .any(|out| matches!(out.event, ServerEvent::PlayerLeft { .. })));

        let departure = rooms.leave("c1").expect("member");
        assert!(departure.destroyed);
        assert_eq!(rooms.room_count(), 0);
        assert!(rooms.leave("c1").is_none());
    }

    #[test]
    fn listing_follows_creation_order() {
        let mut rooms = directory();
        let mut created = Vec::new();
        for idx in 0..3 {
            let settings = RoomSettings::new(GameMode::Competitive, Difficulty::Easy, 60_000);
            created.push(
                rooms
                    .create_room(&format!("c{idx}"), None, settings)
                    .expect("create"),
            );
        }
        let listed: Vec<String> = rooms
            .list_rooms()
            .into_iter()
            .map(|summary| summary.room_id)
            .collect();
        assert_eq!(listed, created);
    }
}

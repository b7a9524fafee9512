//! Guests and rooms live outside the reservation store. The desk only reads
//! them: to validate references and to label rows.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{GuestId, RoomId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Default rate shown on free grid cells.
    #[serde(with = "rust_decimal::serde::float")]
    pub nightly_rate: Decimal,
    /// Grouping key for paging the grid.
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait GuestDirectory: Send + Sync {
    async fn guest(&self, id: GuestId) -> Option<Guest>;
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn room(&self, id: RoomId) -> Option<Room>;

    /// Every room, ordered by id.
    async fn rooms(&self) -> Vec<Room>;
}

#[derive(Debug, Default, Deserialize)]
struct Seed {
    #[serde(default)]
    rooms: Vec<Room>,
    #[serde(default)]
    guests: Vec<Guest>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("reading directory file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing directory file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Both directories backed by concurrent maps.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    rooms: DashMap<RoomId, Room>,
    guests: DashMap<GuestId, Guest>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "rooms": [...], "guests": [...] }`.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let seed: Seed = serde_json::from_str(json)?;
        let directory = Self::new();
        for room in seed.rooms {
            directory.upsert_room(room);
        }
        for guest in seed.guests {
            directory.upsert_guest(guest);
        }
        Ok(directory)
    }

    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn upsert_room(&self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    pub fn upsert_guest(&self, guest: Guest) {
        self.guests.insert(guest.id, guest);
    }

    pub fn remove_guest(&self, id: GuestId) -> Option<Guest> {
        self.guests.remove(&id).map(|(_, g)| g)
    }

    pub fn remove_room(&self, id: RoomId) -> Option<Room> {
        self.rooms.remove(&id).map(|(_, r)| r)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn guest_count(&self) -> usize {
        self.guests.len()
    }
}

#[async_trait]
impl GuestDirectory for InMemoryDirectory {
    async fn guest(&self, id: GuestId) -> Option<Guest> {
        self.guests.get(&id).map(|g| g.value().clone())
    }
}

#[async_trait]
impl RoomDirectory for InMemoryDirectory {
    async fn room(&self, id: RoomId) -> Option<Room> {
        self.rooms.get(&id).map(|r| r.value().clone())
    }

    async fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }
}

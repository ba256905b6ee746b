//! Room Persistence
//!
//! Rooms are persisted as whole snapshots behind the `RoomStore` get/put
//! interface, so protocol code never knows which backend it runs on.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        RoomStore                         │
//! │  ┌────────────────────┐      ┌────────────────────────┐  │
//! │  │  MemoryRoomStore   │      │     FileRoomStore      │  │
//! │  │  (tests, dev)      │      │  <data>/<room>.json    │  │
//! │  └────────────────────┘      └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Both backends go through the same JSON encoding, and decoding a room
//! re-verifies its hash chain: a tampered snapshot fails to load.

pub mod file;
pub mod memory;

use crate::game::state::{Room, RoomId};

pub use file::FileRoomStore;
pub use memory::MemoryRoomStore;

/// Errors from a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Snapshot exists but does not decode to a valid room.
    #[error("room {room} is corrupted: {reason}")]
    Corrupted {
        /// Room whose snapshot failed.
        room: RoomId,
        /// Decoder message.
        reason: String,
    },

    /// A lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Get/put storage of room snapshots.
pub trait RoomStore: Send + Sync {
    /// Load a room. `Ok(None)` when it was never saved.
    fn load(&self, id: &RoomId) -> Result<Option<Room>, StoreError>;

    /// Persist a room, replacing any previous snapshot in one step.
    fn save(&self, room: &Room) -> Result<(), StoreError>;
}

/// Encode a room snapshot.
pub(crate) fn encode(room: &Room) -> Result<String, StoreError> {
    serde_json::to_string_pretty(room).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Decode and check a room snapshot.
pub(crate) fn decode(id: &RoomId, raw: &str) -> Result<Room, StoreError> {
    let room: Room = serde_json::from_str(raw).map_err(|e| StoreError::Corrupted {
        room: id.clone(),
        reason: e.to_string(),
    })?;
    if &room.id != id {
        return Err(StoreError::Corrupted {
            room: id.clone(),
            reason: format!("snapshot belongs to room {}", room.id),
        });
    }
    Ok(room)
}

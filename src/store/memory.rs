//! In-memory room store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{decode, encode, RoomStore, StoreError};
use crate::game::state::{Room, RoomId};

/// Serialized snapshots kept in memory. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: RwLock<BTreeMap<RoomId, String>>,
}

impl MemoryRoomStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether nothing has been saved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the raw snapshot of a room.
    pub fn put_raw(&self, id: RoomId, raw: String) -> Result<(), StoreError> {
        self.rooms.write().map_err(|_| StoreError::Poisoned)?.insert(id, raw);
        Ok(())
    }

    /// Raw snapshot of a room.
    pub fn get_raw(&self, id: &RoomId) -> Result<Option<String>, StoreError> {
        Ok(self.rooms.read().map_err(|_| StoreError::Poisoned)?.get(id).cloned())
    }
}

impl RoomStore for MemoryRoomStore {
    fn load(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        match self.get_raw(id)? {
            Some(raw) => decode(id, &raw).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, room: &Room) -> Result<(), StoreError> {
        let raw = encode(room)?;
        self.put_raw(room.id.clone(), raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerId;

    fn room_with_game() -> Room {
        let mut room = Room::new(RoomId::parse("mem").unwrap(), 1);
        room.join(PlayerId::parse("a").unwrap(), None, 1).unwrap();
        room.join(PlayerId::parse("b").unwrap(), None, 2).unwrap();
        room
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = MemoryRoomStore::new();
        let id = RoomId::parse("mem").unwrap();
        assert!(store.load(&id).unwrap().is_none());

        let room = room_with_game();
        store.save(&room).unwrap();
        let loaded = store.load(&id).unwrap().unwrap();
        assert_eq!(loaded.hash_chain.tip(), room.hash_chain.tip());
        assert_eq!(loaded.players, room.players);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_tampered_snapshot_rejected() {
        let store = MemoryRoomStore::new();
        let room = room_with_game();
        store.save(&room).unwrap();

        let raw = store.get_raw(&room.id).unwrap().unwrap();
        let tampered = raw.replacen("\"firstPlayer\": \"a\"", "\"firstPlayer\": \"b\"", 1);
        assert_ne!(raw, tampered);
        store.put_raw(room.id.clone(), tampered).unwrap();

        assert!(matches!(store.load(&room.id), Err(StoreError::Corrupted { .. })));
    }
}

//! Durable room store: one pretty-printed JSON file per room.
//!
//! Writes use the write-sync-rename pattern, so a crash mid-write leaves
//! the previous snapshot in place.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{decode, encode, RoomStore, StoreError};
use crate::game::state::{Room, RoomId};

/// Room snapshots under a data directory.
#[derive(Debug, Clone)]
pub struct FileRoomStore {
    base_path: PathBuf,
}

impl FileRoomStore {
    /// Open (and create if missing) a data directory.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Data directory.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Snapshot path of a room. Room ids are restricted to
    /// `[A-Za-z0-9_-]`, so they are safe file names.
    fn room_path(&self, id: &RoomId) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

impl RoomStore for FileRoomStore {
    fn load(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        let raw = match fs::read_to_string(self.room_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode(id, &raw).map(Some)
    }

    fn save(&self, room: &Room) -> Result<(), StoreError> {
        let payload = encode(room)?;
        let path = self.room_path(&room.id);
        self.atomic_write(&path, payload.as_bytes())?;
        debug!(room = %room.id, events = room.hash_chain.len(), "room persisted");
        Ok(())
    }
}

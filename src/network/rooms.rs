//! Room Registry
//!
//! Maps room ids to running actors. A room is loaded from the store (or
//! created empty) the first time a connection asks for it, and its actor
//! then lives for the rest of the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::core::clock::Clock;
use crate::game::config::ProtocolConfig;
use crate::game::state::{Room, RoomId};
use crate::network::actor::{spawn_room_actor, RoomError, RoomHandle};
use crate::store::RoomStore;

/// Registry of live room actors.
pub struct RoomManager {
    /// Running actors by room.
    rooms: RwLock<BTreeMap<RoomId, RoomHandle>>,
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
    config: Arc<ProtocolConfig>,
}

impl RoomManager {
    /// Create an empty registry.
    pub fn new(store: Arc<dyn RoomStore>, clock: Arc<dyn Clock>, config: ProtocolConfig) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            store,
            clock,
            config: Arc::new(config),
        }
    }

    /// Protocol constants shared by every room.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Handle for a running room.
    pub async fn get(&self, id: &RoomId) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(id).filter(|h| !h.is_closed()).cloned()
    }

    /// Handle for a room, loading or creating it on first use.
    pub async fn open(&self, id: &RoomId) -> Result<RoomHandle, RoomError> {
        if let Some(handle) = self.get(id).await {
            return Ok(handle);
        }

        // Loaded outside the registry lock so other rooms stay reachable.
        let room = match self.load(id).await? {
            Some(room) => {
                info!(room = %id, events = room.hash_chain.len(), "room restored");
                room
            }
            None => {
                info!(room = %id, "room created");
                Room::new(id.clone(), self.clock.now_ms())
            }
        };

        let mut rooms = self.rooms.write().await;
        // Another connection may have opened it while we loaded.
        if let Some(handle) = rooms.get(id).filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }

        let handle = spawn_room_actor(
            room,
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            Arc::clone(&self.config),
        );
        rooms.insert(id.clone(), handle.clone());
        Ok(handle)
    }

    /// Open a room under a fresh id.
    pub async fn create(&self) -> Result<RoomHandle, RoomError> {
        let raw = format!("room-{}", uuid::Uuid::new_v4().simple());
        let id = RoomId::try_from(raw).map_err(|e| RoomError::Load(e.to_string()))?;
        self.open(&id).await
    }

    /// Number of running rooms.
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    async fn load(&self, id: &RoomId) -> Result<Option<Room>, RoomError> {
        let store = Arc::clone(&self.store);
        let id = id.clone();
        tokio::task::spawn_blocking(move || store.load(&id))
            .await
            .map_err(|e| RoomError::Load(e.to_string()))?
            .map_err(|e| RoomError::Load(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::game::state::PlayerId;
    use crate::game::turn::TurnAction;
    use crate::store::{MemoryRoomStore, StoreError};
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn manager(store: Arc<MemoryRoomStore>) -> RoomManager {
        RoomManager::new(store, Arc::new(ManualClock::new(5_000)), ProtocolConfig::default())
    }

    /// Blocks loads of one room until released.
    struct GatedStore {
        inner: MemoryRoomStore,
        gated: RoomId,
        entered: Arc<Notify>,
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl RoomStore for GatedStore {
        fn load(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
            if id == &self.gated {
                self.entered.notify_one();
                let _ = self.release.lock().unwrap().recv();
            }
            self.inner.load(id)
        }

        fn save(&self, room: &Room) -> Result<(), StoreError> {
            self.inner.save(room)
        }
    }

    #[tokio::test]
    async fn test_open_returns_same_actor() {
        let rooms = manager(Arc::new(MemoryRoomStore::new()));
        let id = RoomId::parse("lobby").unwrap();

        let a = rooms.open(&id).await.unwrap();
        let b = rooms.open(&id).await.unwrap();
        a.act(PlayerId::parse("alice").unwrap(), TurnAction::Join { perspective: None })
            .await
            .unwrap();

        assert_eq!(b.get_state().await.unwrap().players.len(), 1);
        assert_eq!(rooms.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_open_restores_persisted_room() {
        let store = Arc::new(MemoryRoomStore::new());
        let id = RoomId::parse("lobby").unwrap();

        let first = manager(store.clone());
        let handle = first.open(&id).await.unwrap();
        for p in ["alice", "bob"] {
            handle
                .act(PlayerId::parse(p).unwrap(), TurnAction::Join { perspective: None })
                .await
                .unwrap();
        }
        let tip = handle.get_state().await.unwrap().chain_tip;

        // A second registry over the same store stands in for a restart.
        let second = manager(store);
        let view = second.open(&id).await.unwrap().get_state().await.unwrap();
        assert_eq!(view.players.len(), 2);
        assert_eq!(view.chain_tip, tip);
    }

    #[tokio::test]
    async fn test_corrupted_room_fails_to_open() {
        let store = Arc::new(MemoryRoomStore::new());
        let id = RoomId::parse("broken").unwrap();
        store.put_raw(id.clone(), "{\"not\": \"a room\"}".into()).unwrap();

        let rooms = manager(store);
        assert!(matches!(rooms.open(&id).await, Err(RoomError::Load(_))));
        assert!(rooms.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_create_uses_fresh_ids() {
        let rooms = manager(Arc::new(MemoryRoomStore::new()));
        let a = rooms.create().await.unwrap();
        let b = rooms.create().await.unwrap();

        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().starts_with("room-"));
        assert_eq!(rooms.room_count().await, 2);
    }

    #[tokio::test]
    async fn test_slow_load_does_not_block_other_rooms() {
        let slow = RoomId::parse("slow").unwrap();
        let entered = Arc::new(Notify::new());
        let (release, gate) = std_mpsc::channel();
        let store = GatedStore {
            inner: MemoryRoomStore::new(),
            gated: slow.clone(),
            entered: Arc::clone(&entered),
            release: Mutex::new(gate),
        };
        let rooms = Arc::new(RoomManager::new(
            Arc::new(store),
            Arc::new(ManualClock::new(5_000)),
            ProtocolConfig::default(),
        ));

        let pending = {
            let rooms = Arc::clone(&rooms);
            let slow = slow.clone();
            tokio::spawn(async move { rooms.open(&slow).await })
        };
        entered.notified().await;

        let other = RoomId::parse("other").unwrap();
        let handle = tokio::time::timeout(Duration::from_secs(2), rooms.open(&other))
            .await
            .expect("open blocked behind a slow load")
            .unwrap();
        assert_eq!(handle.id(), &other);
        assert!(rooms.get(&other).await.is_some());

        release.send(()).unwrap();
        let slow_handle = pending.await.unwrap().unwrap();
        assert_eq!(slow_handle.id(), &slow);
        assert_eq!(rooms.room_count().await, 2);
    }
}

// ABOUTME: In-process RoomStore used by tests and ephemeral deployments
// ABOUTME: Supports injected failures and latency to exercise the persistence bridge

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{StorageError, StorageResult};
use crate::store::RoomStore;
use crate::types::PersistedRoom;

#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, PersistedRoom>>,
    failing_saves: AtomicUsize,
    save_calls: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail with `Unavailable`
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Delay every load and save by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Number of save attempts, failed ones included
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, room_id: &str) -> Option<PersistedRoom> {
        self.rooms.lock().ok()?.get(room_id).cloned()
    }

    async fn delay(&self) {
        let latency = self.latency.lock().ok().and_then(|guard| *guard);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn with_rooms<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, PersistedRoom>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|_| StorageError::Unavailable("room map poisoned".to_string()))?;
        f(&mut rooms)
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn load(&self, room_id: &str) -> StorageResult<Option<PersistedRoom>> {
        self.delay().await;
        self.with_rooms(|rooms| Ok(rooms.get(room_id).cloned()))
    }

    async fn save(&self, room: &PersistedRoom) -> StorageResult<()> {
        self.delay().await;
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }

        self.with_rooms(|rooms| {
            if let Some(existing) = rooms.get(&room.room_id) {
                if existing.version > room.version {
                    return Err(StorageError::Stale {
                        room_id: room.room_id.clone(),
                        stored: existing.version,
                        attempted: room.version,
                    });
                }
            }
            rooms.insert(room.room_id.clone(), room.clone());
            Ok(())
        })
    }

    async fn create(&self, room: &PersistedRoom) -> StorageResult<()> {
        self.delay().await;
        self.with_rooms(|rooms| {
            if rooms.contains_key(&room.room_id) {
                return Err(StorageError::Duplicate(room.room_id.clone()));
            }
            rooms.insert(room.room_id.clone(), room.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryRoomStore::new();
        let room = PersistedRoom::new("r", "", "python");
        store.fail_next_saves(2);

        assert!(store.save(&room).await.is_err());
        assert!(store.save(&room).await.is_err());
        assert!(store.save(&room).await.is_ok());
        assert_eq!(store.save_calls(), 3);
        assert!(store.get("r").is_some());
    }

    #[tokio::test]
    async fn test_stale_save_refused() {
        let store = MemoryRoomStore::new();
        let mut room = PersistedRoom::new("r", "new", "python");
        room.version = 2;
        store.save(&room).await.unwrap();

        room.content = "old".to_string();
        room.version = 1;
        let err = store.save(&room).await.unwrap_err();
        assert!(matches!(err, StorageError::Stale { stored: 2, attempted: 1, .. }));

        assert_eq!(store.get("r").unwrap().content, "new");
    }
}

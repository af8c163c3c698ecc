// ABOUTME: Key-value contract for durable room state
// ABOUTME: Implemented by the SQLite store and the in-memory store

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::PersistedRoom;

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Fetch the saved state for a room, if any
    async fn load(&self, room_id: &str) -> StorageResult<Option<PersistedRoom>>;

    /// Insert or update a room. A write carrying an older version than the
    /// stored one is refused with `Stale` and leaves storage unchanged.
    async fn save(&self, room: &PersistedRoom) -> StorageResult<()>;

    /// Insert a new room, failing with `Duplicate` if the id is taken
    async fn create(&self, room: &PersistedRoom) -> StorageResult<()>;
}

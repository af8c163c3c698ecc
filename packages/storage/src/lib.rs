// ABOUTME: Data layer and persistence for Pairroom rooms
// ABOUTME: RoomStore implementations plus the fire-and-forget bridge used by room actors

pub mod bridge;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

pub use bridge::PersistenceBridge;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryRoomStore;
pub use sqlite::SqliteRoomStore;
pub use store::RoomStore;
pub use types::{generate_room_id, PersistedRoom, DEFAULT_LANGUAGE, WELCOME_CONTENT};

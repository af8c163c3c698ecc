// ABOUTME: Integration tests for the persistence bridge backed by a real SQLite file
// ABOUTME: Verifies snapshots survive a restart and REST-created rooms load through the bridge

use pairroom_storage::{
    generate_room_id, PersistedRoom, PersistenceBridge, RoomStore, SqliteRoomStore,
    DEFAULT_LANGUAGE, WELCOME_CONTENT,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

async fn open(url: &str) -> Arc<SqliteRoomStore> {
    Arc::new(SqliteRoomStore::connect(url).await.unwrap())
}

#[tokio::test]
async fn test_snapshots_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("pairroom.db").display());

    let store = open(&url).await;
    let bridge = PersistenceBridge::spawn(store.clone(), Duration::from_secs(1));
    let mut room = PersistedRoom::new("room-a", "print('hi')", "python");
    room.version = 7;
    bridge.save(room);
    assert!(bridge.flush(Duration::from_secs(2)).await);
    store.close().await;

    let store = open(&url).await;
    let bridge = PersistenceBridge::spawn(store, Duration::from_secs(1));
    let loaded = bridge.load("room-a").await.unwrap().unwrap();
    assert_eq!(loaded.content, "print('hi')");
    assert_eq!(loaded.version, 7);
}

#[tokio::test]
async fn test_created_room_is_visible_through_bridge() {
    let store = open("sqlite::memory:").await;
    let bridge = PersistenceBridge::spawn(store.clone(), Duration::from_secs(1));

    let room_id = generate_room_id();
    store
        .create(&PersistedRoom::new(&room_id, WELCOME_CONTENT, DEFAULT_LANGUAGE))
        .await
        .unwrap();

    let loaded = bridge.load(&room_id).await.unwrap().unwrap();
    assert_eq!(loaded.content, WELCOME_CONTENT);
    assert_eq!(loaded.version, 0);
    assert_eq!(bridge.load("missing").await.unwrap(), None);
}

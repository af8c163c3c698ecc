// ABOUTME: SQLite-backed RoomStore using sqlx
// ABOUTME: Handles connection setup, pragmas, migrations, and versioned upserts

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::RoomStore;
use crate::types::PersistedRoom;

#[derive(Clone)]
pub struct SqliteRoomStore {
    pool: SqlitePool,
}

impl SqliteRoomStore {
    /// Wrap an existing pool. Migrations must already have been applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `database_url` and run migrations
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            if let Some(parent) = file_path(database_url).and_then(|p| p.parent()) {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        debug!("Connecting to database: {}", database_url);

        // An in-memory database lives only as long as its connection
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(30))
                .connect_with(options)
                .await?
        };

        if !in_memory {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
        }

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;

        info!("Database connection established");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StorageError::Migration)?;

        debug!("Database migrations completed");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_room(row: &SqliteRow) -> StorageResult<PersistedRoom> {
        Ok(PersistedRoom {
            room_id: row.try_get("room_id")?,
            content: row.try_get("content")?,
            language: row.try_get("language")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn file_path(database_url: &str) -> Option<&std::path::Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    Some(std::path::Path::new(path))
}

#[async_trait]
impl RoomStore for SqliteRoomStore {
    async fn load(&self, room_id: &str) -> StorageResult<Option<PersistedRoom>> {
        let row = sqlx::query(
            "SELECT room_id, content, language, version, created_at, updated_at
             FROM rooms WHERE room_id = ?",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_room).transpose()
    }

    async fn save(&self, room: &PersistedRoom) -> StorageResult<()> {
        let result = sqlx::query(
            "INSERT INTO rooms (room_id, content, language, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(room_id) DO UPDATE SET
                content = excluded.content,
                language = excluded.language,
                version = excluded.version,
                updated_at = excluded.updated_at
             WHERE excluded.version >= rooms.version",
        )
        .bind(&room.room_id)
        .bind(&room.content)
        .bind(&room.language)
        .bind(room.version)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let stored: Option<i64> = sqlx::query_scalar("SELECT version FROM rooms WHERE room_id = ?")
                .bind(&room.room_id)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(stored) = stored {
                return Err(StorageError::Stale {
                    room_id: room.room_id.clone(),
                    stored,
                    attempted: room.version,
                });
            }
        }

        debug!(room_id = %room.room_id, version = room.version, "Saved room");
        Ok(())
    }

    async fn create(&self, room: &PersistedRoom) -> StorageResult<()> {
        let result = sqlx::query(
            "INSERT INTO rooms (room_id, content, language, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(room_id) DO NOTHING",
        )
        .bind(&room.room_id)
        .bind(&room.content)
        .bind(&room.language)
        .bind(room.version)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Duplicate(room.room_id.clone()));
        }

        info!(room_id = %room.room_id, language = %room.language, "Created room");
        Ok(())
    }
}

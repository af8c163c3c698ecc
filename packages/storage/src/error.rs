use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Room already exists: {0}")]
    Duplicate(String),
    #[error("Room {room_id} is stored at version {stored}, write carried version {attempted}")]
    Stale {
        room_id: String,
        stored: i64,
        attempted: i64,
    },
    #[error("Timed out after {0} ms")]
    Timeout(u64),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

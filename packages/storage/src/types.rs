use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "python";

/// Seed content for rooms created through the REST API
pub const WELCOME_CONTENT: &str = "# Welcome! Start coding here...\n";

const ROOM_ID_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Durable view of a room: room-id -> {content, language, version, updated_at}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRoom {
    pub room_id: String,
    pub content: String,
    pub language: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedRoom {
    /// A fresh room at version 0
    pub fn new(room_id: impl Into<String>, content: impl Into<String>, language: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            room_id: room_id.into(),
            content: content.into(),
            language: language.into(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Short, URL-safe room identifier
pub fn generate_room_id() -> String {
    nanoid::nanoid!(8, &ROOM_ID_ALPHABET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_ids_are_short_and_lowercase() {
        let id = generate_room_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(generate_room_id(), id);
    }

    #[test]
    fn test_new_room_starts_at_version_zero() {
        let room = PersistedRoom::new("r1", WELCOME_CONTENT, DEFAULT_LANGUAGE);
        assert_eq!(room.version, 0);
        assert_eq!(room.created_at, room.updated_at);
    }
}

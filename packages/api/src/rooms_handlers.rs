// ABOUTME: HTTP handlers for room creation and lookup
// ABOUTME: Live rooms answer from their actor; others from persisted state

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use pairroom_rooms::RoomView;
use pairroom_storage::{
    generate_room_id, PersistedRoom, RoomStore, StorageError, DEFAULT_LANGUAGE, WELCOME_CONTENT,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::ws_handlers::validate_room_id;
use crate::AppState;

const MAX_ID_ATTEMPTS: usize = 5;
const MAX_LANGUAGE_LEN: usize = 32;

#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomRequest {
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub room_id: String,
    pub language: String,
    pub code: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active_users: usize,
}

impl From<RoomView> for RoomResponse {
    fn from(view: RoomView) -> Self {
        Self {
            room_id: view.room_id,
            language: view.language,
            code: view.content,
            version: view.version,
            created_at: view.created_at,
            updated_at: view.updated_at,
            active_users: view.active_users,
        }
    }
}

impl From<PersistedRoom> for RoomResponse {
    fn from(saved: PersistedRoom) -> Self {
        Self {
            room_id: saved.room_id,
            language: saved.language,
            code: saved.content,
            version: u64::try_from(saved.version).unwrap_or(0),
            created_at: saved.created_at,
            updated_at: saved.updated_at,
            active_users: 0,
        }
    }
}

/// Create a room seeded with the welcome text. The body is optional.
///
/// POST /api/rooms
pub async fn create_room(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateRoomResponse>), AppError> {
    let request: CreateRoomRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateRoomRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::Validation(e.to_string()))?
    };

    let language = request
        .language
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    if language.len() > MAX_LANGUAGE_LEN {
        return Err(AppError::Validation(format!(
            "language must be at most {} characters",
            MAX_LANGUAGE_LEN
        )));
    }

    let store = state.rooms.bridge().store();
    for _ in 0..MAX_ID_ATTEMPTS {
        let room = PersistedRoom::new(generate_room_id(), WELCOME_CONTENT, language.clone());
        match store.create(&room).await {
            Ok(()) => {
                info!(room_id = %room.room_id, language = %room.language, "Room created via API");
                return Ok((
                    StatusCode::CREATED,
                    Json(CreateRoomResponse {
                        room_id: room.room_id,
                        message: "Room created successfully".to_string(),
                    }),
                ));
            }
            Err(StorageError::Duplicate(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(anyhow::anyhow!(
        "could not find a free room id after {} attempts",
        MAX_ID_ATTEMPTS
    )))
}

/// Look up a room
///
/// GET /api/rooms/{room_id}
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, AppError> {
    validate_room_id(&room_id)?;

    if let Some(view) = state.rooms.inspect(&room_id).await {
        return Ok(Json(view.into()));
    }

    match state.rooms.bridge().load(&room_id).await? {
        Some(saved) => Ok(Json(saved.into())),
        None => Err(AppError::NotFound(room_id)),
    }
}

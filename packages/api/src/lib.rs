// ABOUTME: HTTP API layer for Pairroom providing REST endpoints, the room WebSocket, and routing
// ABOUTME: Integration layer over the rooms, sandbox, and storage packages

use axum::{
    routing::{get, post},
    Router,
};
use pairroom_rooms::{FrameLimits, RoomStateStore};

pub mod error;
pub mod execute_handlers;
pub mod health;
pub mod rooms_handlers;
pub mod ws_handlers;

pub use error::AppError;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomStateStore,
    pub frame_limits: FrameLimits,
}

impl AppState {
    pub fn new(rooms: RoomStateStore, frame_limits: FrameLimits) -> Self {
        Self {
            rooms,
            frame_limits,
        }
    }
}

/// Creates the application router. Middleware (CORS, tracing) is layered on by the binary.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/rooms", post(rooms_handlers::create_room))
        .route("/api/rooms/{room_id}", get(rooms_handlers::get_room))
        .route("/api/execute", post(execute_handlers::execute_code))
        .route("/ws/{room_id}", get(ws_handlers::room_socket))
        .with_state(state)
}

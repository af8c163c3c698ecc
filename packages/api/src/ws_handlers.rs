// ABOUTME: Connection gateway for /ws/{room_id}
// ABOUTME: Frames room traffic over WebSockets and turns transport faults into leaves

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use pairroom_rooms::{
    ClientMessage, FrameLimits, ProtocolError, RoomEvent, RoomHandle, RoomStateStore,
    ServerMessage,
};
use std::fmt::Display;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

const MAX_ROOM_ID_LEN: usize = 64;

/// Room ids are opaque but must be safe to log and put in a URL
pub fn validate_room_id(room_id: &str) -> Result<(), AppError> {
    if room_id.is_empty() || room_id.len() > MAX_ROOM_ID_LEN {
        return Err(AppError::Validation(format!(
            "room id must be 1-{} characters",
            MAX_ROOM_ID_LEN
        )));
    }
    if !room_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::Validation(
            "room id may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(())
}

/// Upgrade to a WebSocket and attach it to the room
///
/// GET /ws/{room_id}
pub async fn room_socket(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    validate_room_id(&room_id)?;

    Ok(ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        serve_connection(state.rooms, state.frame_limits, room_id, sink, stream).await;
    }))
}

/// Drive one connection until the client goes away. Any way the connection
/// ends, the room sees exactly one leave for it.
pub async fn serve_connection<S, R, E>(
    rooms: RoomStateStore,
    limits: FrameLimits,
    room_id: String,
    mut sink: S,
    mut stream: R,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let connection_id = Uuid::new_v4().to_string();
    let (outbox, mut inbox) = pairroom_rooms::outbox();
    let handle = rooms.join(&room_id, connection_id.clone(), outbox);

    info!(room_id = %room_id, connection_id = %connection_id, "Connection opened");

    loop {
        tokio::select! {
            outbound = inbox.recv() => match outbound {
                Some(message) => {
                    if let Err(e) = send(&mut sink, &message).await {
                        debug!(connection_id = %connection_id, error = %e, "Failed to write to connection");
                        break;
                    }
                }
                None => {
                    debug!(connection_id = %connection_id, "Room released the connection");
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    forward_frame(&handle, &connection_id, &limits, text.as_str());
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(connection_id = %connection_id, error = %ProtocolError::BinaryFrame, "Dropping malformed message");
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection_id = %connection_id, "Client closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id = %connection_id, error = %e, "Transport error");
                    break;
                }
            },
        }
    }

    handle.submit(RoomEvent::Leave {
        connection_id: connection_id.clone(),
    });
    info!(room_id = %room_id, connection_id = %connection_id, "Connection closed");
}

async fn send<S>(sink: &mut S, message: &ServerMessage) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = message.to_json().map_err(|e| e.to_string())?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Validate one inbound frame and hand it to the room
fn forward_frame(handle: &RoomHandle, connection_id: &str, limits: &FrameLimits, text: &str) {
    let message = match ClientMessage::parse(text, limits) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection_id = %connection_id, error = %e, "Dropping malformed message");
            return;
        }
    };

    let connection_id = connection_id.to_string();
    let event = match message {
        ClientMessage::Edit { content } => RoomEvent::Edit {
            connection_id,
            content,
        },
        ClientMessage::LanguageChange { language } => RoomEvent::LanguageChange {
            connection_id,
            language,
        },
        ClientMessage::CursorMove { cursor_position } => RoomEvent::CursorMove {
            connection_id,
            cursor_position,
        },
        ClientMessage::Run { code, language } => RoomEvent::Run {
            connection_id,
            code,
            language,
        },
    };

    if !handle.submit(event) {
        warn!(room_id = %handle.room_id(), "Room is no longer accepting events");
    }
}

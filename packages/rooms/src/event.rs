// ABOUTME: Events flowing into a room actor and broadcasts flowing out of it
// ABOUTME: Inbound events are queued in arrival order; broadcasts are tagged with the room version

use pairroom_sandbox::ExecutionResult;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::ServerMessage;
use crate::room::RoomView;

pub type ConnectionId = String;

/// Messages a connection may have queued before it counts as stalled
pub const OUTBOX_CAPACITY: usize = 256;

/// Outbound half of a connection. The room holds the sender; the gateway
/// drains the receiver onto the socket.
pub type Outbox = mpsc::Sender<ServerMessage>;

pub fn outbox() -> (Outbox, mpsc::Receiver<ServerMessage>) {
    mpsc::channel(OUTBOX_CAPACITY)
}

/// Everything a room actor can be asked to process
#[derive(Debug)]
pub enum RoomEvent {
    Join {
        connection_id: ConnectionId,
        outbox: Outbox,
    },
    Leave {
        connection_id: ConnectionId,
    },
    Edit {
        connection_id: ConnectionId,
        content: String,
    },
    LanguageChange {
        connection_id: ConnectionId,
        language: String,
    },
    /// Relayed to the other members; never changes the room
    CursorMove {
        connection_id: ConnectionId,
        cursor_position: u64,
    },
    Run {
        connection_id: ConnectionId,
        code: String,
        language: String,
    },
    ExecutionFinished {
        requested_by: ConnectionId,
        result: ExecutionResult,
    },
    Inspect {
        reply: oneshot::Sender<RoomView>,
    },
}

/// State changes a room emits to every member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastEvent {
    BufferChanged {
        content: String,
        language: String,
        version: u64,
        from: ConnectionId,
    },
    LanguageChanged {
        language: String,
        version: u64,
        from: ConnectionId,
    },
    UserJoined {
        count: usize,
        version: u64,
    },
    UserLeft {
        count: usize,
        version: u64,
    },
    ExecutionCompleted {
        result: ExecutionResult,
        requested_by: ConnectionId,
        version: u64,
    },
}

impl BroadcastEvent {
    pub fn version(&self) -> u64 {
        match self {
            BroadcastEvent::BufferChanged { version, .. }
            | BroadcastEvent::LanguageChanged { version, .. }
            | BroadcastEvent::UserJoined { version, .. }
            | BroadcastEvent::UserLeft { version, .. }
            | BroadcastEvent::ExecutionCompleted { version, .. } => *version,
        }
    }
}

impl From<BroadcastEvent> for ServerMessage {
    fn from(event: BroadcastEvent) -> Self {
        match event {
            BroadcastEvent::BufferChanged {
                content,
                language,
                version,
                from,
            } => ServerMessage::BufferChanged {
                content,
                language,
                version,
                from,
            },
            BroadcastEvent::LanguageChanged {
                language,
                version,
                from,
            } => ServerMessage::LanguageChanged {
                language,
                version,
                from,
            },
            BroadcastEvent::UserJoined { count, version } => {
                ServerMessage::UserJoined { count, version }
            }
            BroadcastEvent::UserLeft { count, version } => ServerMessage::UserLeft { count, version },
            BroadcastEvent::ExecutionCompleted {
                result,
                requested_by,
                version,
            } => ServerMessage::ExecutionResult {
                success: result.success,
                stdout: result.stdout,
                stderr: result.stderr,
                duration_ms: result.duration_ms,
                timed_out: result.timed_out,
                truncated: result.truncated,
                requested_by: Some(requested_by),
                version,
            },
        }
    }
}

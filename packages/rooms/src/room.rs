// ABOUTME: In-memory state of one room and the pure transitions applied to it
// ABOUTME: Owned exclusively by that room's actor

use chrono::{DateTime, Utc};
use pairroom_sandbox::ExecutionResult;
use pairroom_storage::{PersistedRoom, DEFAULT_LANGUAGE};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::event::{BroadcastEvent, ConnectionId, Outbox};
use crate::protocol::ServerMessage;

/// Read-only copy of a room's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub room_id: String,
    pub language: String,
    pub content: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active_users: usize,
}

#[derive(Debug)]
pub struct Room {
    id: String,
    language: String,
    content: String,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    members: HashMap<ConnectionId, Outbox>,
    /// Members whose outbox filled up since the last `take_lagging`
    lagging: Vec<ConnectionId>,
}

impl Room {
    /// An empty room that has never been saved
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            content: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            members: HashMap::new(),
            lagging: Vec::new(),
        }
    }

    pub fn from_persisted(saved: PersistedRoom) -> Self {
        Self {
            id: saved.room_id,
            language: saved.language,
            content: saved.content,
            version: u64::try_from(saved.version).unwrap_or(0),
            created_at: saved.created_at,
            updated_at: saved.updated_at,
            members: HashMap::new(),
            lagging: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_member(&self, connection_id: &str) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Full-state snapshot for a newly joined connection
    pub fn sync_message(&self) -> ServerMessage {
        ServerMessage::Sync {
            content: self.content.clone(),
            language: self.language.clone(),
            version: self.version,
        }
    }

    /// Register a connection. Re-joining with a known id replaces its outbox.
    pub fn join(&mut self, connection_id: ConnectionId, outbox: Outbox) -> BroadcastEvent {
        self.members.insert(connection_id, outbox);
        BroadcastEvent::UserJoined {
            count: self.members.len(),
            version: self.version,
        }
    }

    /// Remove a connection. Returns None when it was not a member.
    pub fn leave(&mut self, connection_id: &str) -> Option<BroadcastEvent> {
        self.members.remove(connection_id)?;
        Some(BroadcastEvent::UserLeft {
            count: self.members.len(),
            version: self.version,
        })
    }

    /// Last write wins: the submitted text replaces the buffer wholesale
    pub fn apply_edit(&mut self, from: ConnectionId, content: String) -> BroadcastEvent {
        self.content = content;
        self.bump();
        BroadcastEvent::BufferChanged {
            content: self.content.clone(),
            language: self.language.clone(),
            version: self.version,
            from,
        }
    }

    pub fn change_language(&mut self, from: ConnectionId, language: String) -> BroadcastEvent {
        self.language = language;
        self.bump();
        BroadcastEvent::LanguageChanged {
            language: self.language.clone(),
            version: self.version,
            from,
        }
    }

    /// Execution results do not mutate the buffer and leave the version as is
    pub fn complete_execution(
        &self,
        requested_by: ConnectionId,
        result: ExecutionResult,
    ) -> BroadcastEvent {
        BroadcastEvent::ExecutionCompleted {
            result,
            requested_by,
            version: self.version,
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Deliver to every member
    pub fn broadcast(&mut self, message: &ServerMessage) {
        self.deliver(message, None);
    }

    /// Deliver to every member except `from`
    pub fn broadcast_except(&mut self, from: &str, message: &ServerMessage) {
        self.deliver(message, Some(from));
    }

    pub fn send_to(&mut self, connection_id: &str, message: ServerMessage) {
        if let Some(outbox) = self.members.get(connection_id) {
            let outcome = outbox.try_send(message);
            self.record(connection_id, outcome);
        }
    }

    /// Members that stopped draining their outbox. The owner is expected to
    /// remove them.
    pub fn take_lagging(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.lagging)
    }

    fn deliver(&mut self, message: &ServerMessage, skip: Option<&str>) {
        let mut outcomes = Vec::new();
        for (connection_id, outbox) in &self.members {
            if skip == Some(connection_id.as_str()) {
                continue;
            }
            if let Err(e) = outbox.try_send(message.clone()) {
                outcomes.push((connection_id.clone(), e));
            }
        }
        for (connection_id, e) in outcomes {
            self.record(&connection_id, Err(e));
        }
    }

    /// A closed outbox belongs to a connection whose leave is already
    /// queued, so only a full one needs action.
    fn record(&mut self, connection_id: &str, outcome: Result<(), TrySendError<ServerMessage>>) {
        match outcome {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(room_id = %self.id, connection_id = %connection_id, "Connection outbox is full");
                if !self.lagging.iter().any(|id| id == connection_id) {
                    self.lagging.push(connection_id.to_string());
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!(room_id = %self.id, connection_id = %connection_id, "Dropping message for closed connection");
            }
        }
    }

    pub fn snapshot(&self) -> PersistedRoom {
        PersistedRoom {
            room_id: self.id.clone(),
            content: self.content.clone(),
            language: self.language.clone(),
            version: i64::try_from(self.version).unwrap_or(i64::MAX),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            room_id: self.id.clone(),
            language: self.language.clone(),
            content: self.content.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            active_users: self.members.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn outbox() -> (Outbox, mpsc::Receiver<ServerMessage>) {
        crate::event::outbox()
    }

    #[test]
    fn test_new_room_is_empty_python_at_version_zero() {
        let room = Room::new("r1");
        assert_eq!(
            room.sync_message(),
            ServerMessage::Sync {
                content: String::new(),
                language: "python".to_string(),
                version: 0
            }
        );
        assert!(room.is_empty());
    }

    #[test]
    fn test_edits_are_last_write_wins() {
        let mut room = Room::new("r1");
        let edits = ["a", "ab", "x", "final"];
        for edit in edits {
            room.apply_edit("c1".to_string(), edit.to_string());
        }
        assert_eq!(room.content(), "final");
        assert_eq!(room.version(), edits.len() as u64);
    }

    #[test]
    fn test_language_change_bumps_version() {
        let mut room = Room::new("r1");
        let event = room.change_language("c1".to_string(), "javascript".to_string());
        assert_eq!(event.version(), 1);
        assert_eq!(room.language(), "javascript");

        let event = room.apply_edit("c1".to_string(), "1".to_string());
        assert_eq!(
            event,
            BroadcastEvent::BufferChanged {
                content: "1".to_string(),
                language: "javascript".to_string(),
                version: 2,
                from: "c1".to_string()
            }
        );
    }

    #[test]
    fn test_membership_counts_and_duplicate_leave() {
        let mut room = Room::new("r1");
        let (a, _ra) = outbox();
        let (b, _rb) = outbox();

        assert_eq!(
            room.join("a".to_string(), a),
            BroadcastEvent::UserJoined { count: 1, version: 0 }
        );
        assert_eq!(
            room.join("b".to_string(), b),
            BroadcastEvent::UserJoined { count: 2, version: 0 }
        );
        assert_eq!(
            room.leave("a"),
            Some(BroadcastEvent::UserLeft { count: 1, version: 0 })
        );
        assert_eq!(room.leave("a"), None);
        assert_eq!(room.member_count(), 1);
        assert_eq!(
            room.leave("b"),
            Some(BroadcastEvent::UserLeft { count: 0, version: 0 })
        );
        assert_eq!(room.leave("b"), None);
        assert!(room.is_empty());
    }

    #[test]
    fn test_membership_does_not_change_version() {
        let mut room = Room::new("r1");
        let (a, _ra) = outbox();
        room.apply_edit("x".to_string(), "1".to_string());
        room.join("a".to_string(), a);
        room.leave("a");
        assert_eq!(room.version(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_member() {
        let mut room = Room::new("r1");
        let (a, mut ra) = outbox();
        let (b, mut rb) = outbox();
        room.join("a".to_string(), a);
        room.join("b".to_string(), b);

        let message: ServerMessage = room.apply_edit("a".to_string(), "hi".to_string()).into();
        room.broadcast(&message);

        assert_eq!(ra.try_recv().unwrap(), message);
        assert_eq!(rb.try_recv().unwrap(), message);
    }

    #[test]
    fn test_send_to_targets_one_member() {
        let mut room = Room::new("r1");
        let (a, mut ra) = outbox();
        let (b, mut rb) = outbox();
        room.join("a".to_string(), a);
        room.join("b".to_string(), b);

        room.send_to("a", ServerMessage::error("oops", "only for a"));
        assert!(matches!(ra.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let mut room = Room::new("r1");
        let (a, mut ra) = outbox();
        let (b, mut rb) = outbox();
        room.join("a".to_string(), a);
        room.join("b".to_string(), b);

        let message = ServerMessage::CursorMove {
            cursor_position: 4,
            from: "a".to_string(),
            version: 0,
        };
        room.broadcast_except("a", &message);

        assert!(ra.try_recv().is_err());
        assert_eq!(rb.try_recv().unwrap(), message);
    }

    #[test]
    fn test_full_outbox_marks_member_lagging() {
        let mut room = Room::new("r1");
        let (slow, _slow_rx) = mpsc::channel(1);
        let (a, _ra) = outbox();
        room.join("slow".to_string(), slow);
        room.join("a".to_string(), a);

        room.broadcast(&ServerMessage::UserJoined { count: 2, version: 0 });
        assert!(room.take_lagging().is_empty());

        room.broadcast(&ServerMessage::UserJoined { count: 2, version: 0 });
        room.send_to("slow", ServerMessage::error("oops", "again"));
        assert_eq!(room.take_lagging(), vec!["slow".to_string()]);
        assert!(room.take_lagging().is_empty());
    }

    #[test]
    fn test_closed_outbox_is_not_lagging() {
        let mut room = Room::new("r1");
        let (a, ra) = outbox();
        room.join("a".to_string(), a);
        drop(ra);

        room.broadcast(&ServerMessage::UserJoined { count: 1, version: 0 });
        assert!(room.take_lagging().is_empty());
    }

    #[test]
    fn test_persisted_round_trip() {
        let mut room = Room::new("r1");
        room.apply_edit("a".to_string(), "print(1)".to_string());
        room.change_language("a".to_string(), "python3".to_string());

        let restored = Room::from_persisted(room.snapshot());
        assert_eq!(restored.content(), "print(1)");
        assert_eq!(restored.language(), "python3");
        assert_eq!(restored.version(), 2);
        assert_eq!(restored.id(), "r1");
    }
}

// ABOUTME: Per-room actor that owns a room's state and serializes every event for it
// ABOUTME: Dispatches executions off the event loop and tears itself down when the room empties

use pairroom_sandbox::{CodeExecutor, ExecutionRequest, ExecutionResult};
use pairroom_storage::PersistenceBridge;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::event::{ConnectionId, RoomEvent};
use crate::protocol::{ServerMessage, EXECUTION_IN_PROGRESS, UNSUPPORTED_LANGUAGE};
use crate::room::Room;
use crate::store::StoreInner;

/// Cheap, cloneable address of a running room actor
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: String,
    generation: u64,
    sender: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Queue an event for the room. Never blocks. Returns false once the
    /// actor has torn down, in which case the event is discarded.
    pub fn submit(&self, event: RoomEvent) -> bool {
        self.try_submit(event).is_ok()
    }

    pub(crate) fn try_submit(&self, event: RoomEvent) -> Result<(), RoomEvent> {
        self.sender.send(event).map_err(|e| e.0)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

pub(crate) struct RoomActor {
    room_id: String,
    generation: u64,
    receiver: mpsc::UnboundedReceiver<RoomEvent>,
    sender: mpsc::WeakUnboundedSender<RoomEvent>,
    store: Weak<StoreInner>,
    bridge: Arc<PersistenceBridge>,
    executor: Arc<dyn CodeExecutor>,
    running: Option<ConnectionId>,
}

impl RoomActor {
    pub(crate) fn spawn(
        room_id: &str,
        generation: u64,
        store: Weak<StoreInner>,
        bridge: Arc<PersistenceBridge>,
        executor: Arc<dyn CodeExecutor>,
    ) -> RoomHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = RoomActor {
            room_id: room_id.to_string(),
            generation,
            receiver,
            sender: sender.downgrade(),
            store,
            bridge,
            executor,
            running: None,
        };
        tokio::spawn(actor.run());

        RoomHandle {
            room_id: room_id.to_string(),
            generation,
            sender,
        }
    }

    async fn run(mut self) {
        let mut room = self.load().await;
        info!(
            room_id = %self.room_id,
            version = room.version(),
            generation = self.generation,
            "Room actor started"
        );

        while let Some(event) = self.receiver.recv().await {
            self.handle(&mut room, event);
            self.evict_lagging(&mut room);
            if room.is_empty() && self.try_teardown(&room) {
                break;
            }
        }

        debug!(room_id = %self.room_id, generation = self.generation, "Room actor stopped");
    }

    /// Saved state if there is any, otherwise an empty room. A failed or
    /// slow load never keeps the joining connection waiting past the
    /// bridge's load timeout.
    async fn load(&self) -> Room {
        match self.bridge.load(&self.room_id).await {
            Ok(Some(saved)) => Room::from_persisted(saved),
            Ok(None) => Room::new(&self.room_id),
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Failed to load saved room, starting empty");
                Room::new(&self.room_id)
            }
        }
    }

    fn handle(&mut self, room: &mut Room, event: RoomEvent) {
        match event {
            RoomEvent::Join {
                connection_id,
                outbox,
            } => {
                let joined = room.join(connection_id.clone(), outbox);
                room.send_to(&connection_id, room.sync_message());
                room.broadcast(&ServerMessage::from(joined));
                info!(
                    room_id = %self.room_id,
                    connection_id = %connection_id,
                    count = room.member_count(),
                    "Connection joined room"
                );
            }
            RoomEvent::Leave { connection_id } => match room.leave(&connection_id) {
                Some(left) => {
                    room.broadcast(&ServerMessage::from(left));
                    info!(
                        room_id = %self.room_id,
                        connection_id = %connection_id,
                        count = room.member_count(),
                        "Connection left room"
                    );
                }
                None => {
                    debug!(room_id = %self.room_id, connection_id = %connection_id, "Ignoring leave for unknown connection");
                }
            },
            RoomEvent::Edit {
                connection_id,
                content,
            } => {
                if !self.accepts_from(room, &connection_id) {
                    return;
                }
                let changed = room.apply_edit(connection_id, content);
                room.broadcast(&ServerMessage::from(changed));
                self.bridge.save(room.snapshot());
            }
            RoomEvent::LanguageChange {
                connection_id,
                language,
            } => {
                if !self.accepts_from(room, &connection_id) {
                    return;
                }
                let changed = room.change_language(connection_id, language);
                room.broadcast(&ServerMessage::from(changed));
                self.bridge.save(room.snapshot());
            }
            RoomEvent::CursorMove {
                connection_id,
                cursor_position,
            } => {
                if !self.accepts_from(room, &connection_id) {
                    return;
                }
                let moved = ServerMessage::CursorMove {
                    cursor_position,
                    version: room.version(),
                    from: connection_id.clone(),
                };
                room.broadcast_except(&connection_id, &moved);
            }
            RoomEvent::Run {
                connection_id,
                code,
                language,
            } => {
                if self.accepts_from(room, &connection_id) {
                    self.dispatch_run(room, connection_id, code, language);
                }
            }
            RoomEvent::ExecutionFinished {
                requested_by,
                result,
            } => {
                self.running = None;
                info!(
                    room_id = %self.room_id,
                    requested_by = %requested_by,
                    success = result.success,
                    timed_out = result.timed_out,
                    "Broadcasting execution result"
                );
                let completed = room.complete_execution(requested_by, result);
                room.broadcast(&ServerMessage::from(completed));
            }
            RoomEvent::Inspect { reply } => {
                let _ = reply.send(room.view());
            }
        }
    }

    /// Disconnect members that stopped reading. Dropping their outbox ends
    /// the gateway's connection, whose leave is then ignored as a duplicate.
    fn evict_lagging(&self, room: &mut Room) {
        loop {
            let lagging = room.take_lagging();
            if lagging.is_empty() {
                return;
            }
            for connection_id in lagging {
                if let Some(left) = room.leave(&connection_id) {
                    warn!(
                        room_id = %self.room_id,
                        connection_id = %connection_id,
                        count = room.member_count(),
                        "Disconnecting connection that stopped reading"
                    );
                    room.broadcast(&ServerMessage::from(left));
                }
            }
        }
    }

    fn accepts_from(&self, room: &Room, connection_id: &str) -> bool {
        if room.is_member(connection_id) {
            return true;
        }
        warn!(room_id = %self.room_id, connection_id = %connection_id, "Dropping event from connection that is not in the room");
        false
    }

    /// Hand the run to the executor as a detached task. Its result comes
    /// back through the room's own queue. One run per room at a time;
    /// a second request while one is outstanding is rejected.
    fn dispatch_run(
        &mut self,
        room: &mut Room,
        connection_id: ConnectionId,
        code: String,
        language: String,
    ) {
        if !self.executor.supports(&language) {
            room.send_to(
                &connection_id,
                ServerMessage::error(
                    UNSUPPORTED_LANGUAGE,
                    format!("Language '{}' cannot be executed", language),
                ),
            );
            return;
        }

        if let Some(running_for) = &self.running {
            debug!(
                room_id = %self.room_id,
                connection_id = %connection_id,
                running_for = %running_for,
                "Rejecting run while another execution is in flight"
            );
            room.send_to(
                &connection_id,
                ServerMessage::error(
                    EXECUTION_IN_PROGRESS,
                    "An execution is already running in this room",
                ),
            );
            return;
        }

        let Some(sender) = self.sender.upgrade() else {
            return;
        };

        self.running = Some(connection_id.clone());
        let executor = self.executor.clone();
        let request = ExecutionRequest::new(code, language).requested_by(connection_id.clone());
        let room_id = self.room_id.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            // A panicking executor still has to release the room's run slot
            let execution = tokio::spawn(async move { executor.execute(&request).await });
            let result = match execution.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => ExecutionResult::failed(e.to_string(), started.elapsed()),
                Err(e) => {
                    error!(room_id = %room_id, error = %e, "Execution task failed");
                    ExecutionResult::failed("Execution failed unexpectedly", started.elapsed())
                }
            };
            if sender
                .send(RoomEvent::ExecutionFinished {
                    requested_by: connection_id,
                    result,
                })
                .is_err()
            {
                debug!(room_id = %room_id, "Room closed before execution finished, discarding result");
            }
        });
    }

    /// Remove this actor from the store if nothing is waiting in its queue.
    /// Joins are queued under the store lock, so an empty queue observed
    /// under that lock means no join can be lost.
    fn try_teardown(&self, room: &Room) -> bool {
        self.bridge.save(room.snapshot());

        let Some(store) = self.store.upgrade() else {
            return true;
        };

        let removed = store.prune(&self.room_id, self.generation, &self.receiver);
        if removed {
            info!(room_id = %self.room_id, version = room.version(), "Room is empty, tearing down");
        }
        removed
    }
}

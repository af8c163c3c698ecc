// ABOUTME: Table of active rooms keyed by room id
// ABOUTME: Creates exactly one actor per room on first join and prunes actors on teardown

use pairroom_sandbox::CodeExecutor;
use pairroom_storage::PersistenceBridge;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::actor::{RoomActor, RoomHandle};
use crate::event::{ConnectionId, Outbox, RoomEvent};
use crate::room::RoomView;

#[derive(Clone)]
pub struct RoomStateStore {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    rooms: Mutex<HashMap<String, RoomHandle>>,
    generations: AtomicU64,
    bridge: Arc<PersistenceBridge>,
    executor: Arc<dyn CodeExecutor>,
}

impl RoomStateStore {
    pub fn new(bridge: Arc<PersistenceBridge>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                rooms: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                bridge,
                executor,
            }),
        }
    }

    /// Route a join to the room, starting its actor if the room is not live.
    /// Concurrent joins for the same unseen room end up on one actor.
    pub fn join(&self, room_id: &str, connection_id: ConnectionId, outbox: Outbox) -> RoomHandle {
        let mut event = RoomEvent::Join {
            connection_id,
            outbox,
        };
        let mut rooms = self.inner.lock_rooms();

        if let Some(handle) = rooms.get(room_id) {
            match handle.try_submit(event) {
                Ok(()) => return handle.clone(),
                Err(returned) => {
                    warn!(room_id = %room_id, "Room actor stopped without tearing down, restarting it");
                    event = returned;
                }
            }
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let handle = RoomActor::spawn(
            room_id,
            generation,
            Arc::downgrade(&self.inner),
            self.inner.bridge.clone(),
            self.inner.executor.clone(),
        );
        // The receiver of a freshly spawned actor is alive
        let _ = handle.try_submit(event);
        rooms.insert(room_id.to_string(), handle.clone());
        handle
    }

    pub fn lookup(&self, room_id: &str) -> Option<RoomHandle> {
        self.inner.lock_rooms().get(room_id).cloned()
    }

    pub fn active_rooms(&self) -> usize {
        self.inner.lock_rooms().len()
    }

    /// Current state of a live room, read through its actor
    pub async fn inspect(&self, room_id: &str) -> Option<RoomView> {
        let handle = self.lookup(room_id)?;
        let (reply, response) = oneshot::channel();
        if !handle.submit(RoomEvent::Inspect { reply }) {
            return None;
        }
        response.await.ok()
    }

    pub fn bridge(&self) -> &Arc<PersistenceBridge> {
        &self.inner.bridge
    }

    pub fn executor(&self) -> &Arc<dyn CodeExecutor> {
        &self.inner.executor
    }
}

impl StoreInner {
    fn lock_rooms(&self) -> MutexGuard<'_, HashMap<String, RoomHandle>> {
        self.rooms.lock().unwrap_or_else(|poisoned| {
            warn!("Room table mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Remove the room's entry if it still belongs to `generation` and the
    /// actor has nothing left to process.
    pub(crate) fn prune(
        &self,
        room_id: &str,
        generation: u64,
        receiver: &mpsc::UnboundedReceiver<RoomEvent>,
    ) -> bool {
        let mut rooms = self.lock_rooms();
        if !receiver.is_empty() {
            return false;
        }
        match rooms.get(room_id) {
            Some(handle) if handle.generation() == generation => {
                rooms.remove(room_id);
                true
            }
            // Already replaced or gone; this actor is stale either way
            _ => true,
        }
    }
}

// ABOUTME: Fire-and-forget bridge between room actors and the RoomStore
// ABOUTME: Coalesces snapshots per room, retries failed writes with backoff, bounds loads

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::RoomStore;
use crate::types::PersistedRoom;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

type Shared = Arc<Mutex<BridgeState>>;

#[derive(Default)]
struct BridgeState {
    /// Newest unwritten snapshot per room
    pending: HashMap<String, PersistedRoom>,
    /// Added to a room's in-memory version before writing. Non-zero only for
    /// rooms that started without their stored state (a failed or slow
    /// load) and then found storage ahead of them.
    offsets: HashMap<String, i64>,
}

/// Mirrors room snapshots to a `RoomStore` without ever blocking the caller.
///
/// At most one snapshot per room is waiting to be written; a newer snapshot
/// replaces an older one that has not reached storage yet. A single writer
/// task drains the queue, so writes for one room are never concurrent.
///
/// A write refused as stale means the room's live state is newer than what
/// storage holds under a higher version number. The room's versions are
/// rebased above the stored one and the write is retried, so live edits are
/// never dropped in favour of older stored content.
pub struct PersistenceBridge {
    store: Arc<dyn RoomStore>,
    state: Shared,
    queue: mpsc::UnboundedSender<String>,
    load_timeout: Duration,
}

impl PersistenceBridge {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn RoomStore>, load_timeout: Duration) -> Arc<Self> {
        let (queue, rx) = mpsc::unbounded_channel();
        let state: Shared = Arc::new(Mutex::new(BridgeState::default()));

        let writer = Writer {
            store: store.clone(),
            state: state.clone(),
            retry_queue: queue.downgrade(),
            attempts: HashMap::new(),
        };
        tokio::spawn(writer.run(rx));

        Arc::new(Self {
            store,
            state,
            queue,
            load_timeout,
        })
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    /// Queue a snapshot for writing. Returns immediately.
    pub fn save(&self, snapshot: PersistedRoom) {
        let room_id = snapshot.room_id.clone();
        let newly_pending = {
            let mut state = lock_state(&self.state);
            match state.pending.get(&room_id) {
                Some(existing) if existing.version > snapshot.version => return,
                Some(_) => {
                    state.pending.insert(room_id.clone(), snapshot);
                    false
                }
                None => {
                    state.pending.insert(room_id.clone(), snapshot);
                    true
                }
            }
        };

        // A room already pending is picked up again by the writer
        if newly_pending && self.queue.send(room_id.clone()).is_err() {
            warn!(room_id = %room_id, "Persistence writer is gone, snapshot will not be written");
        }
    }

    /// Latest known state for a room: an unwritten snapshot if there is one,
    /// otherwise whatever storage returns within the load timeout.
    pub async fn load(&self, room_id: &str) -> StorageResult<Option<PersistedRoom>> {
        let pending = lock_state(&self.state).pending.get(room_id).cloned();
        if let Some(snapshot) = pending {
            debug!(room_id = %room_id, version = snapshot.version, "Loaded room from pending snapshot");
            return Ok(Some(snapshot));
        }

        let loaded = match tokio::time::timeout(self.load_timeout, self.store.load(room_id)).await {
            Ok(result) => result?,
            Err(_) => return Err(StorageError::Timeout(self.load_timeout.as_millis() as u64)),
        };

        // The room resumes at the stored version, so no rebasing applies
        if loaded.is_some() {
            lock_state(&self.state).offsets.remove(room_id);
        }
        Ok(loaded)
    }

    /// Snapshots accepted but not yet confirmed by storage
    pub fn pending_count(&self) -> usize {
        lock_state(&self.state).pending.len()
    }

    /// Wait until every pending snapshot is written or `wait` elapses.
    /// Returns true when nothing is left pending.
    pub async fn flush(&self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if self.pending_count() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(pending = self.pending_count(), "Persistence flush gave up with writes outstanding");
                return false;
            }
            tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
        }
    }
}

struct Writer {
    store: Arc<dyn RoomStore>,
    state: Shared,
    retry_queue: mpsc::WeakUnboundedSender<String>,
    attempts: HashMap<String, u32>,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<String>) {
        while let Some(room_id) = rx.recv().await {
            self.write(room_id).await;
        }
        debug!("Persistence writer stopped");
    }

    async fn write(&mut self, room_id: String) {
        let (snapshot, offset) = {
            let state = lock_state(&self.state);
            let Some(snapshot) = state.pending.get(&room_id).cloned() else {
                return;
            };
            (snapshot, state.offsets.get(&room_id).copied().unwrap_or(0))
        };

        let mut record = snapshot.clone();
        record.version += offset;

        match self.store.save(&record).await {
            Ok(()) => {
                self.attempts.remove(&room_id);
                let superseded = {
                    let mut state = lock_state(&self.state);
                    match state.pending.get(&room_id) {
                        Some(current) if current.version == snapshot.version => {
                            state.pending.remove(&room_id);
                            false
                        }
                        Some(_) => true,
                        None => false,
                    }
                };
                if superseded {
                    self.requeue(room_id, Duration::ZERO);
                }
            }
            Err(StorageError::Stale { stored, .. }) => {
                let offset = stored - snapshot.version + 1;
                warn!(
                    room_id = %room_id,
                    version = snapshot.version,
                    stored_version = stored,
                    persisted_as = snapshot.version + offset,
                    "Storage is ahead of the live room, rebasing persisted versions"
                );
                lock_state(&self.state).offsets.insert(room_id.clone(), offset);
                self.requeue(room_id, Duration::ZERO);
            }
            Err(e) => {
                let attempt = self.attempts.entry(room_id.clone()).or_insert(0);
                *attempt += 1;
                let delay = backoff(*attempt);
                warn!(
                    room_id = %room_id,
                    version = snapshot.version,
                    attempt = *attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Failed to persist room, will retry"
                );
                self.requeue(room_id, delay);
            }
        }
    }

    fn requeue(&self, room_id: String, delay: Duration) {
        let Some(queue) = self.retry_queue.upgrade() else {
            return;
        };
        if delay.is_zero() {
            let _ = queue.send(room_id);
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = queue.send(room_id);
        });
    }
}

/// 100ms, 200ms, 400ms, ... capped at 5s
fn backoff(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    INITIAL_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}

fn lock_state(state: &Shared) -> MutexGuard<'_, BridgeState> {
    state.lock().unwrap_or_else(|poisoned| {
        warn!("Persistence bridge mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

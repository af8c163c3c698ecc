// ABOUTME: Room synchronization engine for Pairroom
// ABOUTME: One actor per room serializes edits, membership, and execution results

mod actor;
pub mod event;
pub mod protocol;
pub mod room;
mod store;

pub use actor::RoomHandle;
pub use event::{outbox, BroadcastEvent, ConnectionId, Outbox, RoomEvent, OUTBOX_CAPACITY};
pub use protocol::{ClientMessage, FrameLimits, ProtocolError, ServerMessage};
pub use room::{Room, RoomView};
pub use store::RoomStateStore;

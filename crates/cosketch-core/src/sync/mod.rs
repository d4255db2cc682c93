//! Multi-user collaboration: wire protocol, transports, conflict resolution,
//! presence and the sync engine tying them to the scene.

#[cfg(not(target_arch = "wasm32"))]
mod client;
mod conflict;
mod engine;
mod operation;
mod presence;
mod protocol;
mod throttle;
mod transport;

#[cfg(not(target_arch = "wasm32"))]
pub use client::WebSocketTransport;
pub use conflict::{CausalTransform, ConflictResolver, LastWriteWins, resolver_for};
pub use engine::{SyncEngine, SyncMetrics, SyncNotice, UpdateOutcome};
pub use operation::{OperationId, OperationKind, SyncOperation};
pub use presence::{Presence, PresenceManager, SubscriptionId};
pub use protocol::{ClientMessage, CursorPosition, Identity, Peer, ServerMessage};
pub use throttle::CursorThrottle;
pub use transport::{
    ConnectionId, ConnectionState, MemoryHub, MemoryTransport, RoomState, Transport,
    TransportError, TransportEvent,
};

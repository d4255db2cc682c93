//! Collaboration transport contract and the in-process hub.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use thiserror::Error;

use crate::element::{ElementId, ElementRecord, UserId};
use crate::sync::operation::SyncOperation;
use crate::sync::protocol::{ClientMessage, CursorPosition, Peer, ServerMessage};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// A message from the server
    Received(ServerMessage),
    /// Error occurred
    Error { message: String },
}

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Connection closed")]
    Closed,
    #[error("Failed to encode message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Bidirectional message channel to the collaboration room.
pub trait Transport {
    fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError>;

    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Authoritative state of one room as held by a relay.
///
/// Elements use replace semantics keyed by id. The relay merges nothing: it
/// only refuses to let an operation overwrite one that already supersedes it,
/// so the snapshot matches what members converge to regardless of arrival
/// order.
#[derive(Debug, Clone, Default)]
pub struct RoomState {
    peers: Vec<Peer>,
    elements: HashMap<ElementId, ElementRecord>,
    order: Vec<ElementId>,
    /// Latest operation per element; deletes stay as tombstones.
    last_ops: HashMap<ElementId, SyncOperation>,
    selections: HashMap<UserId, Vec<ElementId>>,
    cursors: HashMap<UserId, CursorPosition>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member and build the `joined` reply carrying the room snapshot.
    pub fn join(&mut self, room: &str, peer: Peer) -> ServerMessage {
        self.peers.retain(|p| p.user_id != peer.user_id);
        self.peers.push(peer.clone());
        ServerMessage::Joined {
            room: room.to_string(),
            user_id: peer.user_id,
            peers: self.peers.clone(),
            elements: self.elements(),
            selections: self.selections.clone(),
            cursors: self.cursors.clone(),
        }
    }

    /// Remove a member along with its selection and cursor.
    pub fn leave(&mut self, user_id: &str) -> Option<Peer> {
        self.selections.remove(user_id);
        self.cursors.remove(user_id);
        let index = self.peers.iter().position(|p| p.user_id == user_id)?;
        Some(self.peers.remove(index))
    }

    /// Apply a member's message and return what to relay to the others.
    ///
    /// `join` and `leave` are handled by the caller, which owns room membership.
    /// Stale operations are dropped instead of relayed.
    pub fn handle(&mut self, from: &str, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Operation { op } => {
                if !self.apply_operation(&op) {
                    return None;
                }
                Some(ServerMessage::Operation {
                    from: from.to_string(),
                    op,
                })
            }
            ClientMessage::Selection { ids } => {
                self.selections.insert(from.to_string(), ids.clone());
                Some(ServerMessage::Selection {
                    from: from.to_string(),
                    ids,
                })
            }
            ClientMessage::Cursor { x, y } => {
                self.cursors.insert(from.to_string(), CursorPosition::new(x, y));
                Some(ServerMessage::Cursor {
                    from: from.to_string(),
                    x,
                    y,
                })
            }
            ClientMessage::Join { .. } | ClientMessage::Leave => None,
        }
    }

    /// Store an operation unless the one held for its element supersedes it.
    /// Returns false if the operation was stale or malformed.
    pub fn apply_operation(&mut self, op: &SyncOperation) -> bool {
        if let Some(held) = self.last_ops.get(&op.element_id) {
            if !op.supersedes(held) {
                log::debug!(
                    "dropping stale {:?} on {} from {}",
                    op.kind,
                    op.element_id,
                    op.origin_user
                );
                return false;
            }
        }
        if op.is_delete() {
            if self.elements.remove(&op.element_id).is_some() {
                self.order.retain(|id| id != &op.element_id);
            }
        } else {
            let Some(record) = &op.payload else {
                log::warn!("operation {} on {} has no payload", op.id, op.element_id);
                return false;
            };
            if self
                .elements
                .insert(op.element_id.clone(), record.clone())
                .is_none()
            {
                self.order.push(op.element_id.clone());
            }
        }
        self.last_ops.insert(op.element_id.clone(), op.clone());
        true
    }

    /// Element records in insertion order.
    pub fn elements(&self) -> Vec<ElementRecord> {
        self.order
            .iter()
            .filter_map(|id| self.elements.get(id).cloned())
            .collect()
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Identifies a connection registered with a [`MemoryHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(usize);

#[derive(Debug)]
struct Connection {
    state: ConnectionState,
    inbox: VecDeque<TransportEvent>,
    room: Option<String>,
    user_id: Option<UserId>,
}

#[derive(Debug, Default)]
struct HubInner {
    connections: Vec<Connection>,
    rooms: HashMap<String, RoomState>,
    next_user: usize,
}

impl HubInner {
    fn connection(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id.0)
    }

    fn push(&mut self, id: ConnectionId, event: TransportEvent) {
        if let Some(conn) = self.connection(id) {
            conn.inbox.push_back(event);
        }
    }

    /// Queue `message` for every connected member of `room` except `except`.
    fn broadcast(&mut self, room: &str, except: ConnectionId, message: &ServerMessage) {
        for (index, conn) in self.connections.iter_mut().enumerate() {
            if index == except.0 || conn.state != ConnectionState::Connected {
                continue;
            }
            if conn.room.as_deref() == Some(room) {
                conn.inbox.push_back(TransportEvent::Received(message.clone()));
            }
        }
    }

    fn deliver(&mut self, from: ConnectionId, message: ClientMessage) -> Result<(), TransportError> {
        let (state, room, user_id) = match self.connection(from) {
            Some(conn) => (conn.state, conn.room.clone(), conn.user_id.clone()),
            None => return Err(TransportError::Closed),
        };
        if state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        match message {
            ClientMessage::Join { room: name, name: display, color } => {
                if room.is_some() {
                    self.leave(from);
                }
                self.next_user += 1;
                let peer = Peer {
                    user_id: format!("user-{}", self.next_user),
                    name: display,
                    color,
                };
                let joined = self.rooms.entry(name.clone()).or_default().join(&name, peer.clone());
                if let Some(conn) = self.connection(from) {
                    conn.room = Some(name.clone());
                    conn.user_id = Some(peer.user_id.clone());
                }
                self.push(from, TransportEvent::Received(joined));
                self.broadcast(&name, from, &ServerMessage::PeerJoined { peer });
            }
            ClientMessage::Leave => self.leave(from),
            other => {
                let (Some(room), Some(user_id)) = (room, user_id) else {
                    self.push(
                        from,
                        TransportEvent::Received(ServerMessage::Error {
                            message: "Not in a room".to_string(),
                        }),
                    );
                    return Ok(());
                };
                let relay = self
                    .rooms
                    .get_mut(&room)
                    .and_then(|state| state.handle(&user_id, other));
                if let Some(relay) = relay {
                    self.broadcast(&room, from, &relay);
                }
            }
        }
        Ok(())
    }

    fn leave(&mut self, id: ConnectionId) {
        let Some(conn) = self.connection(id) else {
            return;
        };
        let (Some(room), Some(user_id)) = (conn.room.take(), conn.user_id.take()) else {
            return;
        };
        if let Some(state) = self.rooms.get_mut(&room) {
            state.leave(&user_id);
            if state.is_empty() {
                self.rooms.remove(&room);
            }
        }
        self.broadcast(&room, id, &ServerMessage::PeerLeft { user_id });
    }
}

/// In-process relay that routes messages between [`MemoryTransport`]s.
///
/// Delivery is immediate into each recipient's inbox; recipients see the
/// messages on their next poll.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inner: Rc<RefCell<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection. The transport reports `Connected` on its first poll.
    pub fn connect(&self) -> MemoryTransport {
        let mut inner = self.inner.borrow_mut();
        let id = ConnectionId(inner.connections.len());
        let mut inbox = VecDeque::new();
        inbox.push_back(TransportEvent::Connected);
        inner.connections.push(Connection {
            state: ConnectionState::Connected,
            inbox,
            room: None,
            user_id: None,
        });
        MemoryTransport {
            hub: self.clone(),
            id,
        }
    }

    /// Simulate connection loss: the member leaves its room and its
    /// transport reports `Disconnected`.
    pub fn drop_connection(&self, id: ConnectionId) {
        let mut inner = self.inner.borrow_mut();
        inner.leave(id);
        if let Some(conn) = inner.connection(id) {
            conn.state = ConnectionState::Disconnected;
            conn.inbox.clear();
            conn.inbox.push_back(TransportEvent::Disconnected);
        }
    }

    /// Bring a dropped connection back up.
    pub fn restore_connection(&self, id: ConnectionId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(conn) = inner.connection(id) {
            if conn.state == ConnectionState::Connected {
                return;
            }
            conn.state = ConnectionState::Connected;
            conn.inbox.push_back(TransportEvent::Connected);
        }
    }

    /// Snapshot of a room's records, if the room has members.
    pub fn room_elements(&self, room: &str) -> Option<Vec<ElementRecord>> {
        self.inner.borrow().rooms.get(room).map(RoomState::elements)
    }

    pub fn room_peer_count(&self, room: &str) -> usize {
        self.inner
            .borrow()
            .rooms
            .get(room)
            .map_or(0, RoomState::peer_count)
    }
}

/// Transport end of a [`MemoryHub`] connection.
#[derive(Debug)]
pub struct MemoryTransport {
    hub: MemoryHub,
    id: ConnectionId,
}

impl MemoryTransport {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        self.hub.inner.borrow_mut().deliver(self.id, message.clone())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut inner = self.hub.inner.borrow_mut();
        match inner.connection(self.id) {
            Some(conn) => conn.inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    fn state(&self) -> ConnectionState {
        self.hub
            .inner
            .borrow()
            .connections
            .get(self.id.0)
            .map_or(ConnectionState::Disconnected, |c| c.state)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.hub.inner.try_borrow_mut() {
            inner.leave(self.id);
            if let Some(conn) = inner.connection(self.id) {
                conn.state = ConnectionState::Disconnected;
            }
        }
    }
}

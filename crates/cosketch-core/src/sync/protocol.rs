//! Wire protocol shared by clients and the relay server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::element::{ElementId, ElementRecord, UserId};
use crate::sync::operation::SyncOperation;

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join {
        room: String,
        name: String,
        color: String,
    },
    /// Leave current room
    Leave,
    /// Scene edit
    Operation { op: SyncOperation },
    /// Replace this participant's selection
    Selection { ids: Vec<ElementId> },
    Cursor { x: f64, y: f64 },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with the room's current state
    Joined {
        room: String,
        user_id: UserId,
        peers: Vec<Peer>,
        elements: Vec<ElementRecord>,
        #[serde(default)]
        selections: HashMap<UserId, Vec<ElementId>>,
        #[serde(default)]
        cursors: HashMap<UserId, CursorPosition>,
    },
    PeerJoined { peer: Peer },
    PeerLeft { user_id: UserId },
    Operation { from: UserId, op: SyncOperation },
    Selection { from: UserId, ids: Vec<ElementId> },
    Cursor { from: UserId, x: f64, y: f64 },
    Error { message: String },
}

/// A connected participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub user_id: UserId,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How the local participant presents itself to others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub color: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

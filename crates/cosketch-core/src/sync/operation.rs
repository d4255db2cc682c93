//! Scene edit operations exchanged between participants.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::clock::Millis;
use crate::element::{ElementId, ElementRecord, UserId};

/// Operation identifier.
pub type OperationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Move,
}

/// One edit to one element.
///
/// `payload` is the full post-merge record for insert, update and move, and
/// `None` for delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub element_id: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ElementRecord>,
    pub origin_user: UserId,
    pub timestamp: Millis,
    #[serde(default)]
    pub dependencies: Vec<OperationId>,
}

impl SyncOperation {
    /// Operation carrying a record; author and time come from the record.
    pub fn with_record(kind: OperationKind, record: ElementRecord) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            element_id: record.element.id.clone(),
            origin_user: record.last_modified_by.clone(),
            timestamp: record.last_modified,
            payload: Some(record),
            dependencies: Vec::new(),
        }
    }

    pub fn delete(element_id: impl Into<ElementId>, origin_user: &str, timestamp: Millis) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: OperationKind::Delete,
            element_id: element_id.into(),
            payload: None,
            origin_user: origin_user.to_string(),
            timestamp,
            dependencies: Vec::new(),
        }
    }

    /// Stand-in for the write that produced an existing record.
    pub fn from_record(record: &ElementRecord) -> Self {
        Self {
            id: record.sync_checksum.clone(),
            ..Self::with_record(OperationKind::Update, record.clone())
        }
    }

    pub fn is_delete(&self) -> bool {
        self.kind == OperationKind::Delete
    }

    /// Total order used to pick the winner between concurrent writes.
    ///
    /// Later timestamps win; ties go to the greater user id, then the greater
    /// operation id.
    pub fn precedence(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then_with(|| self.origin_user.cmp(&other.origin_user))
            .then_with(|| self.id.cmp(&other.id))
    }

    /// True if this operation wins over `other`.
    pub fn supersedes(&self, other: &Self) -> bool {
        self.precedence(other) == Ordering::Greater
    }
}

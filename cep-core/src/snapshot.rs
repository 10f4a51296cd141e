//! Records handed to the transport: the join snapshot for a new client,
//! the update produced by each commit and the notice for each operation
//! the engine had to drop.

use crate::error::ApplyError;
use crate::operation::{ClientId, Operation, Version};

/// Full document state captured for a newly joined client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Id assigned to the joining client
    pub client_id: ClientId,
    pub version: Version,
    pub content: Vec<u8>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A committed operation in broadcast form.
///
/// `offset` is the post-transform offset, i.e. the position the edit
/// actually landed at in version `version - 1` of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub source: ClientId,
    pub version: Version,
    pub offset: u32,
    pub delete_count: u32,
    pub insert: Vec<u8>,
}

impl Update {
    /// Build from an operation that has just been committed at `version`.
    pub fn from_committed(op: &Operation, version: Version) -> Self {
        Self {
            source: op.client,
            version,
            offset: op.offset,
            delete_count: op.delete_count,
            insert: op.insert_bytes().to_vec(),
        }
    }

    pub fn insert_count(&self) -> u32 {
        // Operation guarantees the insert length fits u32
        self.insert.len() as u32
    }

    /// Apply this update to a replica of the document.
    ///
    /// Returns `false`, leaving `content` untouched, if the range does not
    /// fit, which means the replica has diverged.
    pub fn apply_to(&self, content: &mut Vec<u8>) -> bool {
        let offset = self.offset as usize;
        let end = offset + self.delete_count as usize;
        if end > content.len() {
            return false;
        }
        content.splice(offset..end, self.insert.iter().copied());
        true
    }
}

/// A validated operation the engine could not commit.
///
/// Carries the header as submitted so the author can match it to the edit
/// it sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub client: ClientId,
    pub base_version: Version,
    pub offset: u32,
    pub delete_count: u32,
    pub error: ApplyError,
}

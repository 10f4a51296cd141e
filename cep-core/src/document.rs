//! Canonical document: content bytes plus version bookkeeping.
//!
//! Content lives behind [`ContentStore`] so the rebuild-per-commit buffer
//! can be replaced (piece table, rope) without touching validation or
//! transform.

use crate::error::{ApplyError, EditorError, SubmitError};
use crate::operation::{EditRequest, Version};

/// Byte storage for the document.
pub trait ContentStore: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the full content, for snapshots.
    fn to_bytes(&self) -> Vec<u8>;

    /// Replace `delete` bytes at `offset` with `insert`.
    ///
    /// On error the store must be unchanged.
    fn splice(&mut self, offset: usize, delete: usize, insert: &[u8]) -> Result<(), ApplyError>;
}

/// Contiguous buffer rebuilt on every splice.
#[derive(Debug, Clone, Default)]
pub struct VecContent {
    bytes: Vec<u8>,
}

impl VecContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ContentStore for VecContent {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    fn splice(&mut self, offset: usize, delete: usize, insert: &[u8]) -> Result<(), ApplyError> {
        let len = self.bytes.len();
        let end = offset
            .checked_add(delete)
            .filter(|end| *end <= len)
            .ok_or(ApplyError::OutOfBounds {
                offset,
                delete,
                length: len,
            })?;

        let new_len = len - delete + insert.len();
        let mut rebuilt = Vec::new();
        rebuilt
            .try_reserve_exact(new_len)
            .map_err(|_| ApplyError::Allocation { requested: new_len })?;
        rebuilt.extend_from_slice(&self.bytes[..offset]);
        rebuilt.extend_from_slice(insert);
        rebuilt.extend_from_slice(&self.bytes[end..]);

        self.bytes = rebuilt;
        Ok(())
    }
}

/// The shared document.
///
/// Invariants: `min_version <= current_version`; the length reported is the
/// length of what is stored; length and version only change in [`Document::commit`].
pub struct Document {
    content: Box<dyn ContentStore>,
    min_version: Version,
    current_version: Version,
}

impl Document {
    /// Document at version 0 over `content`, which must fit a `u32` length.
    pub fn new(content: Box<dyn ContentStore>) -> Result<Self, EditorError> {
        let length = content.len();
        if u32::try_from(length).is_err() {
            return Err(EditorError::ContentTooLarge { length });
        }
        Ok(Self {
            content,
            min_version: 0,
            current_version: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn min_version(&self) -> Version {
        self.min_version
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.content.to_bytes()
    }

    /// Length as carried on the wire. Commits never let it exceed `u32`.
    fn wire_len(&self) -> u32 {
        self.content.len() as u32
    }

    /// Check a request against the current state.
    ///
    /// Order matters: the delete check relies on `offset <= length`.
    pub fn validate(&self, request: &EditRequest) -> Result<(), SubmitError> {
        let length = self.wire_len();
        if request.base_version < self.min_version {
            return Err(SubmitError::StaleBaseVersion {
                base: request.base_version,
                min: self.min_version,
            });
        }
        if request.base_version > self.current_version {
            return Err(SubmitError::FutureBaseVersion {
                base: request.base_version,
                current: self.current_version,
            });
        }
        if request.offset > length {
            return Err(SubmitError::OffsetOutOfRange {
                offset: request.offset,
                length,
            });
        }
        if request.delete_count > length - request.offset {
            return Err(SubmitError::DeleteOutOfRange {
                offset: request.offset,
                delete_count: request.delete_count,
                length,
            });
        }
        Ok(())
    }

    /// Splice the content and advance the version by one.
    ///
    /// Returns the new version. On error neither content nor version change.
    pub fn commit(&mut self, offset: u32, delete_count: u32, insert: &[u8]) -> Result<Version, ApplyError> {
        let new_len = (self.len() + insert.len()).saturating_sub(delete_count as usize);
        if new_len > u32::MAX as usize {
            return Err(ApplyError::LengthOverflow { length: new_len });
        }
        self.content.splice(offset as usize, delete_count as usize, insert)?;
        self.current_version += 1;
        Ok(self.current_version)
    }

    /// Raise the oldest base version accepted. Never moves backwards or
    /// past the current version.
    pub fn raise_min_version(&mut self, version: Version) {
        self.min_version = self.min_version.max(version.min(self.current_version));
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.len())
            .field("min_version", &self.min_version)
            .field("current_version", &self.current_version)
            .finish()
    }
}

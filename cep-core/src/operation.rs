//! Edit operations as they move from submission to applied history.
//!
//! ```text
//! EditRequest ──submit──► Operation (pending) ──transform──► Operation (applied)
//!                          final_version = None             final_version = Some(v)
//! ```

/// Document version. Version 0 is the initial document; every commit adds 1.
pub type Version = u32;

/// Identity of a connected client, assigned at connect and never reused.
pub type ClientId = u32;

/// An edit as composed by a client: delete `delete_count` bytes at `offset`,
/// then insert `insert` there. Offsets are raw byte positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    /// Version the author believed current
    pub base_version: Version,
    pub offset: u32,
    pub delete_count: u32,
    pub insert: Vec<u8>,
}

impl EditRequest {
    pub fn new(base_version: Version, offset: u32, delete_count: u32, insert: impl Into<Vec<u8>>) -> Self {
        Self {
            base_version,
            offset,
            delete_count,
            insert: insert.into(),
        }
    }

    /// Pure insertion.
    pub fn insert(base_version: Version, offset: u32, text: impl Into<Vec<u8>>) -> Self {
        Self::new(base_version, offset, 0, text)
    }

    /// Pure deletion.
    pub fn delete(base_version: Version, offset: u32, delete_count: u32) -> Self {
        Self::new(base_version, offset, delete_count, Vec::new())
    }
}

/// A validated edit owned by the editor.
///
/// `offset` is rewritten by the transform step; everything else is fixed
/// at submission. `client` is a plain id: the submitting connection may be
/// gone by the time the operation is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub client: ClientId,
    pub base_version: Version,
    pub offset: u32,
    pub delete_count: u32,
    insert: Vec<u8>,
    insert_count: u32,
    final_version: Option<Version>,
}

impl Operation {
    /// Build from a request whose insert length is already known to fit `u32`.
    pub(crate) fn new(client: ClientId, request: EditRequest, insert_count: u32) -> Self {
        debug_assert_eq!(request.insert.len(), insert_count as usize);
        Self {
            client,
            base_version: request.base_version,
            offset: request.offset,
            delete_count: request.delete_count,
            insert: request.insert,
            insert_count,
            final_version: None,
        }
    }

    pub fn insert_bytes(&self) -> &[u8] {
        &self.insert
    }

    pub fn insert_count(&self) -> u32 {
        self.insert_count
    }

    /// Version assigned at commit; `None` while still pending.
    pub fn final_version(&self) -> Option<Version> {
        self.final_version
    }

    pub(crate) fn set_final_version(&mut self, version: Version) {
        self.final_version = Some(version);
    }

    /// Net change in document length when this operation is applied.
    pub fn length_delta(&self) -> i64 {
        i64::from(self.insert_count) - i64::from(self.delete_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_request() {
        let op = Operation::new(3, EditRequest::new(2, 4, 1, "xyz"), 3);
        assert_eq!(op.client, 3);
        assert_eq!(op.base_version, 2);
        assert_eq!(op.offset, 4);
        assert_eq!(op.insert_bytes(), b"xyz");
        assert_eq!(op.insert_count(), 3);
        assert_eq!(op.final_version(), None);
    }

    #[test]
    fn test_length_delta() {
        let grow = Operation::new(0, EditRequest::insert(0, 0, "abcd"), 4);
        let shrink = Operation::new(0, EditRequest::delete(0, 0, 6), 0);
        assert_eq!(grow.length_delta(), 4);
        assert_eq!(shrink.length_delta(), -6);
    }
}

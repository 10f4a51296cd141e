//! Applied history: the transform's reference frame.
//!
//! Committed operations carry gapless final versions `1, 2, 3, ...`, so the
//! operations concurrent with a given base version are always a suffix of
//! the log and can be found by index instead of by scanning.
//!
//! ```text
//!  dropped_through = 2        retained
//!  ┌───┬───┐ ┌───┬───┬───┬───┬───┐
//!  │ 1 │ 2 │ │ 3 │ 4 │ 5 │ 6 │ 7 │
//!  └───┴───┘ └───┴───┴───┴───┴───┘
//!                    ▲
//!                    since(4) yields 5, 6, 7
//! ```

use std::collections::VecDeque;

use crate::operation::{Operation, Version};

/// Storage for committed operations.
pub trait OpHistory: Send {
    /// Append a committed operation. Its final version must be one past the
    /// last appended.
    fn push(&mut self, op: Operation);

    /// Operations committed after `base`, oldest first.
    fn since(&self, base: Version) -> Box<dyn Iterator<Item = &Operation> + '_>;

    /// Number of retained operations.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest base version this history can still transform against.
    fn retained_from(&self) -> Version;
}

/// In-memory log with an optional retention cap.
///
/// Uncapped by default: operations are kept for the life of the editor.
#[derive(Debug, Default)]
pub struct AppliedLog {
    ops: VecDeque<Operation>,
    limit: Option<usize>,
    /// Final version of the newest operation evicted by the cap
    dropped_through: Version,
}

impl AppliedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` operations, evicting the oldest.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }
}

impl OpHistory for AppliedLog {
    fn push(&mut self, op: Operation) {
        debug_assert_eq!(
            op.final_version(),
            Some(self.dropped_through + self.ops.len() as Version + 1),
            "history must stay gapless"
        );
        self.ops.push_back(op);

        if let Some(limit) = self.limit {
            while self.ops.len() > limit {
                if let Some(evicted) = self.ops.pop_front() {
                    self.dropped_through = evicted.final_version().unwrap_or(self.dropped_through);
                }
            }
        }
    }

    fn since(&self, base: Version) -> Box<dyn Iterator<Item = &Operation> + '_> {
        let skip = base.saturating_sub(self.dropped_through) as usize;
        Box::new(self.ops.iter().skip(skip))
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    fn retained_from(&self) -> Version {
        self.dropped_through
    }
}

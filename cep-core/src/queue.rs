use std::collections::VecDeque;

use crate::operation::Operation;

/// FIFO of validated operations waiting for the engine.
///
/// Order is the order submitters acquired the editor lock, not the order
/// their messages arrived on the wire.
#[derive(Debug, Default)]
pub struct PendingQueue {
    ops: VecDeque<Operation>,
    total_enqueued: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Returns `true` if the queue was empty before.
    pub fn push(&mut self, op: Operation) -> bool {
        let was_empty = self.ops.is_empty();
        self.ops.push_back(op);
        self.total_enqueued += 1;
        was_empty
    }

    pub fn pop(&mut self) -> Option<Operation> {
        self.ops.pop_front()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operations ever enqueued, including those since applied.
    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }
}

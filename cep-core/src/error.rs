use thiserror::Error;

use crate::operation::Version;

/// Why a submission was refused before reaching the pending queue.
///
/// Each variant carries the document state it was checked against so the
/// transport can tell the author what to refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("base version {base} predates retained history (min {min})")]
    StaleBaseVersion { base: Version, min: Version },

    #[error("base version {base} is ahead of the document (current {current})")]
    FutureBaseVersion { base: Version, current: Version },

    #[error("offset {offset} is past the end of the document (length {length})")]
    OffsetOutOfRange { offset: u32, length: u32 },

    #[error("deleting {delete_count} bytes at {offset} overruns the document (length {length})")]
    DeleteOutOfRange {
        offset: u32,
        delete_count: u32,
        length: u32,
    },

    #[error("insert of {len} bytes does not fit a 32-bit count")]
    InsertTooLarge { len: usize },

    #[error("editor is shutting down")]
    ShuttingDown,
}

impl SubmitError {
    /// Stable machine-readable tag, used in rejection replies.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::StaleBaseVersion { .. } => "stale_base_version",
            Self::FutureBaseVersion { .. } => "future_base_version",
            Self::OffsetOutOfRange { .. } => "offset_out_of_range",
            Self::DeleteOutOfRange { .. } => "delete_out_of_range",
            Self::InsertTooLarge { .. } => "insert_too_large",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Why a dequeued operation could not be committed.
///
/// None of these stop the engine: the operation is dropped and the
/// document is left exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// Transformed range no longer fits the document. Points at a logic
    /// error in transform or validation.
    #[error("transformed op from client {client} does not fit: offset {offset}, delete {delete_count}, length {length}")]
    Inconsistent {
        client: u32,
        offset: i64,
        delete_count: u32,
        length: usize,
    },

    /// A content store was asked to splice outside its bounds.
    #[error("splice of {delete} bytes at {offset} is outside content of length {length}")]
    OutOfBounds {
        offset: usize,
        delete: usize,
        length: usize,
    },

    /// The operation's base version fell behind the history cap while it
    /// was queued, so its concurrent set is no longer known.
    #[error("base version {base} was evicted from history (retained from {retained_from})")]
    HistoryEvicted { base: Version, retained_from: Version },

    #[error("could not allocate {requested} bytes for the rebuilt document")]
    Allocation { requested: usize },

    #[error("document would grow to {length} bytes, beyond the 32-bit wire limit")]
    LengthOverflow { length: usize },
}

impl ApplyError {
    /// Stable machine-readable tag, used when the author is told of a drop.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Inconsistent { .. } => "inconsistent",
            Self::OutOfBounds { .. } => "out_of_bounds",
            Self::HistoryEvicted { .. } => "history_evicted",
            Self::Allocation { .. } => "allocation_failed",
            Self::LengthOverflow { .. } => "length_overflow",
        }
    }
}

/// Why an editor could not be built or a client could not join it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("initial document of {length} bytes exceeds the 32-bit wire limit")]
    ContentTooLarge { length: usize },

    #[error("no client ids left to hand out")]
    ClientIdsExhausted,
}

//! Offset transform against concurrently applied operations.
//!
//! An operation authored at version `b` has seen every commit up to and
//! including `b`. Commits after `b` from other clients may have moved the
//! text it targets, so its offset is shifted by the net length change of
//! each such commit that landed strictly before it:
//!
//! ```text
//! doc @ v0:      a b c d e f
//! a (v1):        ins "XYZ" @2           net +3
//! op (base v0):  ins "!" @5   ──►  @8
//! ```
//!
//! This is a single-pass, offset-only rule. Deletes whose range overlaps the
//! target are not resolved; a range-aware rule would replace [`shift_offset`].
//!
//! Reference: Ellis & Gibbs, Concurrency Control in Groupware Systems (1989)

use crate::error::ApplyError;
use crate::history::OpHistory;
use crate::operation::Operation;

/// Offset of `op` after accounting for `concurrent`, in application order.
///
/// Operations from the same client are skipped: a client's own edits are
/// already ordered by the client itself. Returned as `i64` because a run of
/// deletes can drive the result negative.
pub fn shift_offset<'a>(op: &Operation, concurrent: impl IntoIterator<Item = &'a Operation>) -> i64 {
    let mut offset = i64::from(op.offset);
    for applied in concurrent {
        if applied.client == op.client {
            continue;
        }
        if i64::from(applied.offset) < offset {
            offset += applied.length_delta();
        }
    }
    offset
}

/// Rewrite `op.offset` against everything in `history` committed after the
/// operation's base version, then check the result fits a document of
/// `length` bytes.
///
/// On error `op` is untouched.
pub fn transform(op: &mut Operation, history: &dyn OpHistory, length: usize) -> Result<(), ApplyError> {
    let retained_from = history.retained_from();
    if op.base_version < retained_from {
        return Err(ApplyError::HistoryEvicted {
            base: op.base_version,
            retained_from,
        });
    }

    let shifted = shift_offset(op, history.since(op.base_version));

    let inconsistent = || ApplyError::Inconsistent {
        client: op.client,
        offset: shifted,
        delete_count: op.delete_count,
        length,
    };
    let offset = usize::try_from(shifted).map_err(|_| inconsistent())?;
    if offset > length || op.delete_count as usize > length - offset {
        return Err(inconsistent());
    }

    // length fits u32, so offset does too
    op.offset = offset as u32;
    Ok(())
}

//! Binary wire protocol for edits, snapshots and updates.
//!
//! All integers are unsigned 32-bit little-endian. Frames carry no type tag:
//! direction and order tell them apart.
//!
//! ```text
//! Snapshot (server → new client, first frame)
//! ┌───────────┬──────────┬──────────┬─────────────────┐
//! │ client_id │ version  │ length   │ content         │
//! │ 4 bytes   │ 4 bytes  │ 4 bytes  │ length bytes    │
//! └───────────┴──────────┴──────────┴─────────────────┘
//!
//! Submit (client → server)
//! ┌───────────┬──────────┬──────────┬──────────────┬─────────────────┐
//! │ base      │ offset   │ delete   │ insert_count │ insert          │
//! │ 4 bytes   │ 4 bytes  │ 4 bytes  │ 4 bytes      │ insert_count    │
//! └───────────┴──────────┴──────────┴──────────────┴─────────────────┘
//!
//! Update (server → every client, author included)
//! ┌───────────┬──────────┬──────────┬──────────┬──────────────┬────────┐
//! │ source    │ version  │ offset   │ delete   │ insert_count │ insert │
//! │ 4 bytes   │ 4 bytes  │ 4 bytes  │ 4 bytes  │ 4 bytes      │ ...    │
//! └───────────┴──────────┴──────────┴──────────┴──────────────┴────────┘
//! ```
//!
//! Rejections go back to the author only, as a JSON text frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use cep_core::{Dropped, EditRequest, Snapshot, SubmitError, Update};

/// Fixed part of a snapshot frame.
pub const SNAPSHOT_HEADER_LEN: usize = 12;
/// Fixed part of a submit frame.
pub const SUBMIT_HEADER_LEN: usize = 16;
/// Fixed part of an update frame.
pub const UPDATE_HEADER_LEN: usize = 20;

/// Framing and payload errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame too short: {len} bytes, header needs {min}")]
    Truncated { len: usize, min: usize },
    #[error("Frame carries {actual} payload bytes but declares {declared}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Unexpected text frame")]
    UnexpectedText,
    #[error("Invalid rejection payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Read a u32 length field followed by exactly that many bytes.
fn take_payload(buf: &mut &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let declared = buf.get_u32_le() as usize;
    if buf.remaining() != declared {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: buf.remaining(),
        });
    }
    Ok(buf.to_vec())
}

fn check_header(frame: &[u8], min: usize) -> Result<(), ProtocolError> {
    if frame.len() < min {
        return Err(ProtocolError::Truncated { len: frame.len(), min });
    }
    Ok(())
}

// ─── Submit ──────────────────────────────────────────────────────────────────

/// Decode a submit frame. The frame must be exactly `16 + insert_count` bytes.
pub fn decode_submit(frame: &[u8]) -> Result<EditRequest, ProtocolError> {
    check_header(frame, SUBMIT_HEADER_LEN)?;
    let mut buf = frame;
    let base_version = buf.get_u32_le();
    let offset = buf.get_u32_le();
    let delete_count = buf.get_u32_le();
    let insert = take_payload(&mut buf)?;
    Ok(EditRequest::new(base_version, offset, delete_count, insert))
}

pub fn encode_submit(request: &EditRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(SUBMIT_HEADER_LEN + request.insert.len());
    buf.put_u32_le(request.base_version);
    buf.put_u32_le(request.offset);
    buf.put_u32_le(request.delete_count);
    buf.put_u32_le(request.insert.len() as u32);
    buf.put_slice(&request.insert);
    buf.freeze()
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

pub fn encode_snapshot(snapshot: &Snapshot) -> Bytes {
    let mut buf = BytesMut::with_capacity(SNAPSHOT_HEADER_LEN + snapshot.len());
    buf.put_u32_le(snapshot.client_id);
    buf.put_u32_le(snapshot.version);
    // Document length never exceeds u32::MAX
    buf.put_u32_le(snapshot.len() as u32);
    buf.put_slice(&snapshot.content);
    buf.freeze()
}

pub fn decode_snapshot(frame: &[u8]) -> Result<Snapshot, ProtocolError> {
    check_header(frame, SNAPSHOT_HEADER_LEN)?;
    let mut buf = frame;
    let client_id = buf.get_u32_le();
    let version = buf.get_u32_le();
    let content = take_payload(&mut buf)?;
    Ok(Snapshot {
        client_id,
        version,
        content,
    })
}

// ─── Update ──────────────────────────────────────────────────────────────────

pub fn encode_update(update: &Update) -> Bytes {
    let mut buf = BytesMut::with_capacity(UPDATE_HEADER_LEN + update.insert.len());
    buf.put_u32_le(update.source);
    buf.put_u32_le(update.version);
    buf.put_u32_le(update.offset);
    buf.put_u32_le(update.delete_count);
    buf.put_u32_le(update.insert_count());
    buf.put_slice(&update.insert);
    buf.freeze()
}

pub fn decode_update(frame: &[u8]) -> Result<Update, ProtocolError> {
    check_header(frame, UPDATE_HEADER_LEN)?;
    let mut buf = frame;
    let source = buf.get_u32_le();
    let version = buf.get_u32_le();
    let offset = buf.get_u32_le();
    let delete_count = buf.get_u32_le();
    let insert = take_payload(&mut buf)?;
    Ok(Update {
        source,
        version,
        offset,
        delete_count,
        insert,
    })
}

// ─── Rejection ───────────────────────────────────────────────────────────────

/// Reply sent to the author of an edit that failed validation or that the
/// engine dropped after queueing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Machine-readable kind, e.g. `stale_base_version`
    pub reason: String,
    pub message: String,
    pub base_version: u32,
    pub offset: u32,
    pub delete_count: u32,
}

impl Rejection {
    /// Echo the header of the refused request alongside the reason.
    pub fn new(error: &SubmitError, base_version: u32, offset: u32, delete_count: u32) -> Self {
        Self {
            reason: error.reason().to_string(),
            message: error.to_string(),
            base_version,
            offset,
            delete_count,
        }
    }

    /// Report an operation the engine dropped after it was queued.
    pub fn dropped(dropped: &Dropped) -> Self {
        Self {
            reason: dropped.error.reason().to_string(),
            message: dropped.error.to_string(),
            base_version: dropped.base_version,
            offset: dropped.offset,
            delete_count: dropped.delete_count,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

//! One connected client as seen by the editor.
//!
//! ```text
//! connect ──► Session::open ──► editor.join (snapshot + subscribe, atomic)
//! frame   ──► on_message    ──► decode ──► editor.submit ──► Queued | Rejected
//! drop    ──► editor.leave
//! ```
//!
//! Outbound items are shared by every session; [`Session::accepts`] picks
//! the ones meant for this client.
//!
//! A session owns no socket: the server task does the I/O and asks the
//! session what each inbound frame means.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;

use cep_core::{ClientId, Editor, EditorError};

use crate::broadcast::{BroadcastGroup, Outbound};
use crate::protocol::{self, ProtocolError, Rejection};

/// What became of one inbound frame.
#[derive(Debug)]
pub enum MessageOutcome {
    /// Validated and waiting for the engine
    Queued,
    /// Failed validation; reply to the author only
    Rejected(Rejection),
    /// Not a well-formed submit frame; discard, keep the connection
    Malformed(ProtocolError),
}

pub struct Session {
    editor: Arc<Editor>,
    client_id: ClientId,
}

impl Session {
    /// Register a client and return the session, its encoded join snapshot
    /// and its update receiver.
    ///
    /// The receiver is subscribed under the editor lock, so it starts
    /// exactly at the first commit after the snapshot version.
    pub fn open(
        editor: &Arc<Editor>,
        group: &BroadcastGroup,
    ) -> Result<(Self, Bytes, broadcast::Receiver<Outbound>), EditorError> {
        let (snapshot, updates) = editor.join(|_| group.subscribe())?;
        let session = Self {
            editor: Arc::clone(editor),
            client_id: snapshot.client_id,
        };
        Ok((session, protocol::encode_snapshot(&snapshot), updates))
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Whether this client's connection should send `item`: every update,
    /// but only its own rejections.
    pub fn accepts(&self, item: &Outbound) -> bool {
        match item {
            Outbound::Update(_) => true,
            Outbound::Rejected { client, .. } => *client == self.client_id,
        }
    }

    /// Decode a binary frame and submit it on behalf of this client.
    pub fn on_message(&self, frame: &[u8]) -> MessageOutcome {
        let request = match protocol::decode_submit(frame) {
            Ok(request) => request,
            Err(e) => return MessageOutcome::Malformed(e),
        };
        let (base_version, offset, delete_count) = (request.base_version, request.offset, request.delete_count);

        match self.editor.submit(self.client_id, request) {
            Ok(()) => MessageOutcome::Queued,
            Err(e) => {
                log::debug!("Rejected edit from client {}: {e}", self.client_id);
                MessageOutcome::Rejected(Rejection::new(&e, base_version, offset, delete_count))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.editor.leave(self.client_id);
    }
}

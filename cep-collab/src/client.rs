//! WebSocket editing client with a local replica of the document.
//!
//! Provides:
//! - Connection and join snapshot handling
//! - Edit submission against the last version the client has seen
//! - Ordered application of broadcast updates to the replica
//!
//! The replica only ever changes by applying server updates, the client's
//! own edits included, so it always equals some prefix of the server's
//! history.
//!
//! Reference: Kleppmann, Chapter 5: Replication

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use cep_core::{ClientId, EditRequest, Update, Version};

use crate::protocol::{self, ProtocolError, Rejection};

/// Events delivered by [`EditClient::next_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A commit from any client; already applied to the replica
    Update(Update),
    /// One of our edits failed validation, or was queued and then dropped
    /// by the engine; it will never produce an update
    Rejected(Rejection),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Server did not open with a snapshot frame")]
    MissingSnapshot,
    #[error("Update v{version} does not fit the local replica")]
    Diverged { version: Version },
    #[error("Disconnected from server")]
    Disconnected,
}

/// A connected editing client.
pub struct EditClient {
    client_id: ClientId,
    version: Version,
    content: Vec<u8>,
    /// Channel to the WebSocket writer task
    outgoing_tx: mpsc::Sender<Message>,
    /// Events from the WebSocket reader task
    event_rx: mpsc::Receiver<ClientEvent>,
}

impl EditClient {
    /// Connect and wait for the join snapshot.
    ///
    /// Spawns background tasks for reading and writing WebSocket messages.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let snapshot = loop {
            match ws_reader.next().await {
                Some(Ok(Message::Binary(data))) => break protocol::decode_snapshot(&data)?,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(_)) => return Err(ClientError::MissingSnapshot),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ClientError::Disconnected),
            }
        };
        log::debug!(
            "Joined as client {} at v{} ({} bytes)",
            snapshot.client_id,
            snapshot.version,
            snapshot.len()
        );

        // Writer task: forward outgoing channel to WebSocket
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(256);
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if ws_writer.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Reader task: decode frames into events
        let (event_tx, event_rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let event = match msg {
                    Ok(Message::Binary(data)) => match protocol::decode_update(&data) {
                        Ok(update) => ClientEvent::Update(update),
                        Err(e) => {
                            log::warn!("Discarding undecodable update: {e}");
                            continue;
                        }
                    },
                    Ok(Message::Text(text)) => match Rejection::decode(text.as_str()) {
                        Ok(rejection) => ClientEvent::Rejected(rejection),
                        Err(e) => {
                            log::warn!("Discarding undecodable rejection: {e}");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            client_id: snapshot.client_id,
            version: snapshot.version,
            content: snapshot.content,
            outgoing_tx,
            event_rx,
        })
    }

    /// Submit an edit against the last version this client has seen.
    pub async fn submit(&self, offset: u32, delete_count: u32, insert: impl Into<Vec<u8>>) -> Result<(), ClientError> {
        self.submit_request(&EditRequest::new(self.version, offset, delete_count, insert))
            .await
    }

    /// Submit an edit with an explicit base version.
    pub async fn submit_request(&self, request: &EditRequest) -> Result<(), ClientError> {
        self.send_binary(protocol::encode_submit(request)).await
    }

    /// Send an arbitrary binary frame.
    pub async fn send_binary(&self, frame: Bytes) -> Result<(), ClientError> {
        self.send(Message::Binary(frame)).await
    }

    /// Send an arbitrary text frame.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let text: String = text.into();
        self.send(Message::text(text)).await
    }

    async fn send(&self, msg: Message) -> Result<(), ClientError> {
        self.outgoing_tx
            .send(msg)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    /// Wait for the next update or rejection.
    ///
    /// Updates are applied to the replica before they are returned.
    pub async fn next_event(&mut self) -> Result<ClientEvent, ClientError> {
        let event = self.event_rx.recv().await.ok_or(ClientError::Disconnected)?;
        if let ClientEvent::Update(update) = &event {
            if !update.apply_to(&mut self.content) {
                return Err(ClientError::Diverged {
                    version: update.version,
                });
            }
            self.version = update.version;
        }
        Ok(event)
    }

    /// Consume events until the replica reaches `version`.
    ///
    /// Rejections are consumed too, so a caller waiting on its own edit
    /// should use [`EditClient::next_event`] if the edit may be refused.
    pub async fn wait_for_version(&mut self, version: Version) -> Result<(), ClientError> {
        while self.version < version {
            self.next_event().await?;
        }
        Ok(())
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Last version applied to the replica.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Close the connection.
    pub async fn close(self) {
        let _ = self.outgoing_tx.send(Message::Close(None)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = EditClient::connect(&format!("ws://127.0.0.1:{port}")).await;
        assert!(matches!(result, Err(ClientError::WebSocket(_))));
    }

    #[tokio::test]
    async fn test_connect_requires_snapshot_first() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::text("hello".to_string())).await.unwrap();
            // Keep the socket open until the client gives up
            let _ = ws.next().await;
        });

        let result = EditClient::connect(&format!("ws://127.0.0.1:{port}")).await;
        assert!(matches!(result, Err(ClientError::MissingSnapshot)));
    }
}

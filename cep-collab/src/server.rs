//! WebSocket edit server for one shared document.
//!
//! Architecture:
//! ```text
//! Client A ──┐                                 ┌──► Client A
//!            ├── Session ── Editor.submit       │
//! Client B ──┘                 │                ├──► Client B
//!                              ▼                │
//!                     engine thread (apply) ── BroadcastGroup
//!                                                 │
//!                                                 └──► Client C
//! ```
//!
//! Each connection task:
//! - sends the join snapshot first
//! - decodes binary frames into edits and submits them
//! - replies to rejected edits with a JSON text frame
//! - forwards every broadcast update, its own included
//! - forwards the engine's drop notices for its own edits as rejections
//!
//! Reference: Kleppmann, Designing Data-Intensive Applications, Chapter 5

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use cep_core::{Editor, EditorConfig, EditorError, EngineHandle};

use crate::broadcast::{BroadcastGroup, Outbound};
use crate::protocol::ProtocolError;
use crate::session::{MessageOutcome, Session};

/// Update frames buffered per connection unless configured otherwise.
pub const DEFAULT_BROADCAST_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(1023);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Update frames buffered per connection before it is cut off
    pub broadcast_capacity: NonZeroUsize,
    /// Largest WebSocket message accepted from a client
    pub max_message_bytes: usize,
    pub editor: EditorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            max_message_bytes: 16 << 20,
            editor: EditorConfig::default(),
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub submissions_accepted: u64,
    pub submissions_rejected: u64,
    pub malformed_frames: u64,
    /// Queued edits the engine could not commit, reported to their authors
    pub edits_dropped: u64,
    pub lagged_disconnects: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),
    #[error("Broadcast capacity {0} exceeds the channel limit")]
    BroadcastCapacity(usize),
    #[error("Engine thread panicked")]
    EnginePanicked,
    #[error("Shutdown task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The edit server: one editor, one engine thread, many connections.
pub struct EditServer {
    config: ServerConfig,
    editor: Arc<Editor>,
    broadcast: Arc<BroadcastGroup>,
    stats: Arc<RwLock<ServerStats>>,
    engine: Mutex<Option<EngineHandle>>,
}

impl EditServer {
    /// Largest per-connection buffer the broadcast channel supports.
    pub const MAX_BROADCAST_CAPACITY: usize = usize::MAX / 2;

    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        if config.broadcast_capacity.get() > Self::MAX_BROADCAST_CAPACITY {
            return Err(ServerError::BroadcastCapacity(config.broadcast_capacity.get()));
        }
        let broadcast = Arc::new(BroadcastGroup::new(config.broadcast_capacity));
        let editor = Arc::new(Editor::new(config.editor.clone(), Arc::clone(&broadcast))?);
        Ok(Self {
            config,
            editor,
            broadcast,
            stats: Arc::new(RwLock::new(ServerStats::default())),
            engine: Mutex::new(None),
        })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self, ServerError> {
        Self::new(ServerConfig::default())
    }

    /// Bind the configured address and serve until an accept error.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.start_engine()?;
        log::info!("Edit server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let editor = Arc::clone(&self.editor);
            let broadcast = Arc::clone(&self.broadcast);
            let stats = Arc::clone(&self.stats);
            let max_message_bytes = self.config.max_message_bytes;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, editor, broadcast, stats, max_message_bytes).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    fn start_engine(&self) -> Result<(), ServerError> {
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        if engine.is_none() {
            *engine = Some(self.editor.spawn()?);
        }
        Ok(())
    }

    /// Stop accepting edits, let the engine drain the queue, join it.
    ///
    /// Returns the number of operations the engine committed.
    pub async fn shutdown(&self) -> Result<u64, ServerError> {
        let handle = self.engine.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(handle) = handle else {
            self.editor.shutdown();
            return Ok(0);
        };

        let committed = tokio::task::spawn_blocking(move || handle.shutdown())
            .await?
            .map_err(|_| ServerError::EnginePanicked)?;
        log::info!("Engine drained, {committed} operations committed");
        Ok(committed)
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        editor: Arc<Editor>,
        broadcast: Arc<BroadcastGroup>,
        stats: Arc<RwLock<ServerStats>>,
        max_message_bytes: usize,
    ) -> Result<(), ServerError> {
        let ws_config = WebSocketConfig::default().max_message_size(Some(max_message_bytes));
        let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await?;

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let result = Self::serve_session(ws_stream, addr, &editor, &broadcast, &stats).await;

        stats.write().await.active_connections -= 1;
        result
    }

    async fn serve_session(
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        addr: SocketAddr,
        editor: &Arc<Editor>,
        broadcast: &BroadcastGroup,
        stats: &RwLock<ServerStats>,
    ) -> Result<(), ServerError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (session, snapshot, mut updates) = Session::open(editor, broadcast)?;
        let client_id = session.client_id();
        log::info!("Client {client_id} connected from {addr}");
        ws_sender.send(Message::Binary(snapshot)).await?;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => match session.on_message(&data) {
                            MessageOutcome::Queued => {
                                stats.write().await.submissions_accepted += 1;
                            }
                            MessageOutcome::Rejected(rejection) => {
                                stats.write().await.submissions_rejected += 1;
                                ws_sender.send(Message::text(rejection.encode()?)).await?;
                            }
                            MessageOutcome::Malformed(e) => {
                                stats.write().await.malformed_frames += 1;
                                log::warn!("Discarding frame from client {client_id}: {e}");
                            }
                        },

                        Some(Ok(Message::Text(_))) => {
                            stats.write().await.malformed_frames += 1;
                            log::warn!(
                                "Discarding frame from client {client_id}: {}",
                                ProtocolError::UnexpectedText
                            );
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Client {client_id} disconnected");
                            break;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from client {client_id}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing broadcast update
                update = updates.recv() => {
                    match update {
                        Ok(item) if !session.accepts(&item) => {}
                        Ok(Outbound::Update(frame)) => {
                            ws_sender.send(Message::Binary(frame)).await?;
                        }
                        Ok(Outbound::Rejected { rejection, .. }) => {
                            stats.write().await.edits_dropped += 1;
                            ws_sender.send(Message::text(rejection.encode()?)).await?;
                        }
                        Err(RecvError::Lagged(n)) => {
                            log::warn!("Client {client_id} lagged by {n} updates, disconnecting");
                            broadcast.record_lagged();
                            stats.write().await.lagged_disconnects += 1;
                            let _ = ws_sender.send(Message::Close(None)).await;
                            break;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn editor(&self) -> &Arc<Editor> {
        &self.editor
    }

    pub fn broadcast(&self) -> &Arc<BroadcastGroup> {
        &self.broadcast
    }
}

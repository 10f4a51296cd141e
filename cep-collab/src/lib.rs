//! # cep-collab — WebSocket transport for the cep editor
//!
//! Serves one shared document over WebSocket: new clients get a snapshot,
//! edits are decoded and submitted to the [`cep_core::Editor`], and every
//! commit is broadcast to all connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket       ┌─────────────┐
//! │ EditClient  │ ◄─────────────────► │ EditServer  │
//! │ (replica)   │   binary frames     │ (sessions)  │
//! └─────────────┘   + JSON rejects    └──────┬──────┘
//!                                            │ submit
//!                                            ▼
//!                                     ┌─────────────┐
//!                                     │ cep Editor  │
//!                                     │ (engine)    │
//!                                     └──────┬──────┘
//!                                            │ dispatch
//!                                    ┌───────┴───────┐
//!                                    │ BroadcastGroup│
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire format and JSON rejection replies
//! - [`broadcast`] — Non-blocking fan-out of update frames
//! - [`session`] — Per-connection join, submit and leave
//! - [`server`] — WebSocket edit server
//! - [`client`] — WebSocket editing client with a local replica

pub mod protocol;
pub mod broadcast;
pub mod session;
pub mod server;
pub mod client;

// Re-exports for convenience
pub use protocol::{ProtocolError, Rejection};
pub use broadcast::{BroadcastGroup, BroadcastStats, Outbound};
pub use session::{MessageOutcome, Session};
pub use server::{EditServer, ServerConfig, ServerError, ServerStats};
pub use client::{ClientError, ClientEvent, EditClient};

//! # cep-core — Shared-document apply engine
//!
//! Holds the canonical copy of one text document and applies edits that
//! clients authored against slightly stale versions, so that every replica
//! converges on the same bytes.
//!
//! ## Architecture
//!
//! ```text
//!  submit ──► PendingQueue ──► engine thread ──► Document (bytes, versions)
//!                                   │    ▲
//!                                   │    └── transform vs AppliedLog
//!                                   ▼
//!                               Dispatcher ──► transport fan-out
//!
//!  join ──► ClientRegistry + Snapshot (same critical section)
//! ```
//!
//! ## Modules
//!
//! - [`operation`] — edit requests and operations, version/client ids
//! - [`document`] — content store and version bookkeeping, validation
//! - [`queue`] — FIFO of validated, not yet applied operations
//! - [`history`] — applied operations, the transform's reference frame
//! - [`transform`] — offset shift against concurrent commits
//! - [`registry`] — connected clients
//! - [`engine`] — the `Editor` context and its single-writer thread
//! - [`dispatch`] — hand-off of committed updates to the transport
//!
//! Offsets are raw byte positions. Nothing is persisted.

pub mod config;
pub mod dispatch;
pub mod document;
pub mod engine;
pub mod error;
pub mod history;
pub mod operation;
pub mod queue;
pub mod registry;
pub mod snapshot;
pub mod transform;

// Re-exports for convenience
pub use config::EditorConfig;
pub use dispatch::Dispatcher;
pub use document::{ContentStore, Document, VecContent};
pub use engine::{Editor, EditorStats, EngineHandle};
pub use error::{ApplyError, EditorError, SubmitError};
pub use history::{AppliedLog, OpHistory};
pub use operation::{ClientId, EditRequest, Operation, Version};
pub use queue::PendingQueue;
pub use registry::{Client, ClientRegistry};
pub use snapshot::{Dropped, Snapshot, Update};

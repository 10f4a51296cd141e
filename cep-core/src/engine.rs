//! Single-writer apply engine.
//!
//! ```text
//!  connection tasks                         engine thread
//!  ────────────────                         ─────────────
//!  submit() ──┐                              ┌─► wait_while(queue empty)
//!  submit() ──┼─► lock ─► validate ─► push ──┤   pop head
//!  submit() ──┘           (notify on         │   transform vs history
//!                          empty → 1)        │   splice + version += 1
//!                                            │   history.push
//!  join()  ─► lock ─► snapshot + subscribe   └─► dispatch (enqueue only)
//! ```
//!
//! One mutex guards document, pending queue, history and registry. The
//! condition variable is paired with that same mutex and always waited on
//! with its predicate, so a submit that lands between the engine's check and
//! its wait cannot be missed.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config::EditorConfig;
use crate::dispatch::Dispatcher;
use crate::document::{ContentStore, Document, VecContent};
use crate::error::{ApplyError, EditorError, SubmitError};
use crate::history::{AppliedLog, OpHistory};
use crate::operation::{ClientId, EditRequest, Operation, Version};
use crate::queue::PendingQueue;
use crate::registry::ClientRegistry;
use crate::snapshot::{Dropped, Snapshot, Update};
use crate::transform;

/// Point-in-time editor counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorStats {
    pub version: Version,
    pub min_version: Version,
    pub length: usize,
    pub pending: usize,
    pub history: usize,
    pub clients: usize,
    /// Operations committed since creation
    pub committed: u64,
    /// Operations dropped by the engine (allocation or consistency failure)
    pub dropped: u64,
}

struct EditorState {
    document: Document,
    pending: PendingQueue,
    history: Box<dyn OpHistory>,
    clients: ClientRegistry,
    shutting_down: bool,
    committed: u64,
    dropped: u64,
}

impl EditorState {
    /// Transform, splice and record one operation.
    fn apply(&mut self, mut op: Operation) -> Result<Update, ApplyError> {
        transform::transform(&mut op, self.history.as_ref(), self.document.len())?;

        let version = self
            .document
            .commit(op.offset, op.delete_count, op.insert_bytes())?;
        op.set_final_version(version);
        let update = Update::from_committed(&op, version);

        self.history.push(op);
        self.document.raise_min_version(self.history.retained_from());
        self.committed += 1;
        Ok(update)
    }
}

/// The shared editing context: one document, its queue and its history.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct Editor {
    state: Mutex<EditorState>,
    /// Signalled when the queue becomes non-empty or shutdown starts
    pending_op: Condvar,
    dispatcher: Box<dyn Dispatcher>,
    thread_name: String,
}

impl Editor {
    /// Editor over an in-memory buffer and log, configured by `config`.
    ///
    /// Fails if the initial content does not fit a 32-bit length.
    pub fn new(config: EditorConfig, dispatcher: impl Dispatcher + 'static) -> Result<Self, EditorError> {
        let history: Box<dyn OpHistory> = match config.history_limit {
            Some(limit) => Box::new(AppliedLog::with_limit(limit)),
            None => Box::new(AppliedLog::new()),
        };
        let mut editor = Self::with_stores(
            Box::new(VecContent::new(config.initial_content)),
            history,
            Box::new(dispatcher),
        )?;
        editor.thread_name = config.thread_name;
        Ok(editor)
    }

    /// Editor over caller-supplied content and history stores.
    pub fn with_stores(
        content: Box<dyn ContentStore>,
        history: Box<dyn OpHistory>,
        dispatcher: Box<dyn Dispatcher>,
    ) -> Result<Self, EditorError> {
        Ok(Self {
            state: Mutex::new(EditorState {
                document: Document::new(content)?,
                pending: PendingQueue::new(),
                history,
                clients: ClientRegistry::new(),
                shutting_down: false,
                committed: 0,
                dropped: 0,
            }),
            pending_op: Condvar::new(),
            dispatcher,
            thread_name: EditorConfig::default().thread_name,
        })
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        // Nothing panics while holding the lock; recover the data if it did
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Clients ─────────────────────────────────────────────────────────

    /// Register a new client and capture its join snapshot.
    ///
    /// `subscribe` runs inside the same critical section, so every commit
    /// is either contained in the snapshot or dispatched after the
    /// subscription exists, never both and never neither.
    ///
    /// Fails without calling `subscribe` once client ids are exhausted.
    pub fn join<R>(&self, subscribe: impl FnOnce(ClientId) -> R) -> Result<(Snapshot, R), EditorError> {
        let mut state = self.lock();
        let client_id = state.clients.register()?;
        let snapshot = Snapshot {
            client_id,
            version: state.document.current_version(),
            content: state.document.to_bytes(),
        };
        let subscription = subscribe(client_id);
        drop(state);

        log::info!(
            "Client {client_id} joined at v{} ({} bytes)",
            snapshot.version,
            snapshot.len()
        );
        Ok((snapshot, subscription))
    }

    /// Forget a client. Its already queued operations are still applied.
    pub fn leave(&self, client_id: ClientId) -> bool {
        let removed = self.lock().clients.unregister(client_id).is_some();
        if removed {
            log::info!("Client {client_id} left");
        }
        removed
    }

    // ─── Submission ──────────────────────────────────────────────────────

    /// Validate an edit and queue it for the engine.
    ///
    /// Never blocks beyond the critical section. Rejected edits are not
    /// queued and not retried.
    pub fn submit(&self, client: ClientId, request: EditRequest) -> Result<(), SubmitError> {
        let insert_count = u32::try_from(request.insert.len()).map_err(|_| SubmitError::InsertTooLarge {
            len: request.insert.len(),
        })?;

        let mut state = self.lock();
        if state.shutting_down {
            return Err(SubmitError::ShuttingDown);
        }
        state.document.validate(&request)?;

        let was_empty = state.pending.push(Operation::new(client, request, insert_count));
        drop(state);

        if was_empty {
            self.pending_op.notify_one();
        }
        Ok(())
    }

    // ─── Applying ────────────────────────────────────────────────────────

    fn commit_next(&self, state: &mut EditorState) -> Option<Result<Version, ApplyError>> {
        let op = state.pending.pop()?;
        let client = op.client;
        let (base_version, offset, delete_count) = (op.base_version, op.offset, op.delete_count);

        let result = state.apply(op).map(|update| {
            log::debug!(
                "Committed v{} from client {client}: offset {} -{} +{}",
                update.version,
                update.offset,
                update.delete_count,
                update.insert_count()
            );
            self.dispatcher.dispatch(&update);
            update.version
        });

        if let Err(e) = &result {
            state.dropped += 1;
            match e {
                ApplyError::Inconsistent { .. } => {
                    log::error!("Internal consistency violation, dropping op: {e}");
                }
                _ => log::error!("Dropping op from client {client}: {e}"),
            }
            self.dispatcher.dropped(&Dropped {
                client,
                base_version,
                offset,
                delete_count,
                error: e.clone(),
            });
        }
        Some(result)
    }

    /// Apply the head of the queue if there is one. Never waits.
    pub fn try_apply_next(&self) -> Option<Result<Version, ApplyError>> {
        let mut state = self.lock();
        self.commit_next(&mut state)
    }

    /// Wait for an operation and apply it.
    ///
    /// Returns `None` only once shutdown has started and the queue is empty.
    pub fn apply_next(&self) -> Option<Result<Version, ApplyError>> {
        let mut state = self.lock();
        if state.pending.is_empty() && !state.shutting_down {
            log::trace!("Pending queue empty, waiting");
        }
        state = self
            .pending_op
            .wait_while(state, |s| s.pending.is_empty() && !s.shutting_down)
            .unwrap_or_else(PoisonError::into_inner);
        self.commit_next(&mut state)
    }

    /// Apply everything currently queued. Returns the number committed.
    pub fn drain(&self) -> usize {
        let mut committed = 0;
        while let Some(result) = self.try_apply_next() {
            if result.is_ok() {
                committed += 1;
            }
        }
        committed
    }

    fn run(&self) -> u64 {
        log::info!("Engine started");
        let mut committed = 0;
        while let Some(result) = self.apply_next() {
            if result.is_ok() {
                committed += 1;
            }
        }
        log::info!("Engine stopped after {committed} commits");
        committed
    }

    /// Start the engine on a dedicated thread.
    pub fn spawn(self: &Arc<Self>) -> std::io::Result<EngineHandle> {
        let editor = Arc::clone(self);
        let thread = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || editor.run())?;
        Ok(EngineHandle {
            editor: Arc::clone(self),
            thread,
        })
    }

    /// Stop accepting submissions and wake the engine.
    ///
    /// The engine applies whatever is already queued, then exits.
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.pending_op.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    // ─── Inspection ──────────────────────────────────────────────────────

    pub fn version(&self) -> Version {
        self.lock().document.current_version()
    }

    pub fn min_version(&self) -> Version {
        self.lock().document.min_version()
    }

    pub fn len(&self) -> usize {
        self.lock().document.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().document.is_empty()
    }

    /// Copy of the document content.
    pub fn content(&self) -> Vec<u8> {
        self.lock().document.to_bytes()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.lock().clients.ids()
    }

    pub fn stats(&self) -> EditorStats {
        let state = self.lock();
        EditorStats {
            version: state.document.current_version(),
            min_version: state.document.min_version(),
            length: state.document.len(),
            pending: state.pending.len(),
            history: state.history.len(),
            clients: state.clients.len(),
            committed: state.committed,
            dropped: state.dropped,
        }
    }
}

/// Running engine thread.
pub struct EngineHandle {
    editor: Arc<Editor>,
    thread: JoinHandle<u64>,
}

impl EngineHandle {
    pub fn editor(&self) -> &Arc<Editor> {
        &self.editor
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Shut the editor down and wait for the engine to drain and exit.
    ///
    /// Returns the number of operations the thread committed.
    pub fn shutdown(self) -> thread::Result<u64> {
        self.editor.shutdown();
        self.thread.join()
    }
}

//! Engine properties exercised through the public API: version accounting,
//! length accounting, validation boundaries, convergence, transform,
//! join snapshots and concurrent submission.

use cep_core::{Dispatcher, EditRequest, Editor, EditorConfig, SubmitError, Update};
use proptest::prelude::*;

use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn editor(content: &str) -> (Editor, mpsc::Receiver<Update>) {
    let (tx, rx) = mpsc::channel();
    (Editor::new(EditorConfig::with_content(content), tx).unwrap(), rx)
}

/// Rebuild a document from a starting content and a stream of updates.
fn replay(start: &[u8], updates: impl IntoIterator<Item = Update>) -> Vec<u8> {
    let mut content = start.to_vec();
    for update in updates {
        assert!(update.apply_to(&mut content), "replica diverged at v{}", update.version);
    }
    content
}

/// One scripted edit: position as per-mille of the current length, bytes to
/// delete there (clamped to what is left) and bytes to insert.
type ScriptedEdit = (u32, u32, Vec<u8>);

fn arb_edit() -> impl Strategy<Value = ScriptedEdit> {
    (0..=1000u32, 0..4u32, prop::collection::vec(b'a'..=b'z', 0..4))
}

fn arb_script(max_len: usize) -> impl Strategy<Value = Vec<ScriptedEdit>> {
    prop::collection::vec(arb_edit(), 1..max_len)
}

/// Resolve a per-mille position against a document of `len` bytes.
fn offset_at(per_mille: u32, len: u32) -> u32 {
    (u64::from(len) * u64::from(per_mille) / 1000) as u32
}

/// Turn a scripted edit into a request against the editor's current state.
fn request_for(editor: &Editor, (per_mille, delete, insert): &ScriptedEdit) -> EditRequest {
    let len = editor.len() as u32;
    let offset = offset_at(*per_mille, len);
    let delete = (*delete).min(len - offset);
    EditRequest::new(editor.version(), offset, delete, insert.clone())
}

/// Dispatcher that fans out to every subscriber registered through `join`.
#[derive(Default)]
struct Fanout {
    subscribers: Mutex<Vec<mpsc::Sender<Update>>>,
}

impl Fanout {
    fn subscribe(&self) -> mpsc::Receiver<Update> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

impl Dispatcher for Fanout {
    fn dispatch(&self, update: &Update) {
        for tx in self.subscribers.lock().unwrap().iter() {
            let _ = tx.send(update.clone());
        }
    }
}

// ─── Version and length accounting ───────────────────────────────────────────

proptest! {
    #[test]
    fn test_version_equals_commit_count(
        script in arb_script(200),
        clients in prop::collection::vec(0..4u32, 200),
    ) {
        let (editor, updates) = editor("");

        for (edit, client) in script.iter().zip(&clients) {
            editor.submit(*client, request_for(&editor, edit)).unwrap();
            editor.drain();
        }

        let commits = script.len() as u32;
        prop_assert_eq!(editor.version(), commits);
        let versions: Vec<_> = updates.try_iter().map(|u| u.version).collect();
        let unique: HashSet<_> = versions.iter().copied().collect();
        prop_assert_eq!(versions.len(), script.len());
        prop_assert_eq!(unique.len(), script.len());
    }

    #[test]
    fn test_join_snapshot_matches_replay(script in arb_script(64)) {
        let (editor, updates) = editor("");

        for edit in &script {
            editor.submit(0, request_for(&editor, edit)).unwrap();
            editor.drain();
        }

        let (snapshot, ()) = editor.join(|_| ()).unwrap();
        prop_assert_eq!(snapshot.version, script.len() as u32);
        prop_assert_eq!(snapshot.content, replay(b"", updates.try_iter()));
    }
}

#[test]
fn test_length_tracks_insert_minus_delete() {
    let (editor, _updates) = editor("The quick brown fox");
    let cases = [
        EditRequest::insert(0, 4, "very "),
        EditRequest::delete(1, 0, 4),
        EditRequest::new(2, 5, 5, "slow"),
        EditRequest::new(3, 0, 0, ""),
    ];

    for request in cases {
        let before = editor.len() as i64;
        let delta = request.insert.len() as i64 - i64::from(request.delete_count);
        editor.submit(0, request).unwrap();
        editor.drain();
        assert_eq!(editor.len() as i64, before + delta);
    }
    assert_eq!(editor.content(), b"very slow brown fox");
}

// ─── Validation boundaries ───────────────────────────────────────────────────

#[test]
fn test_validation_boundaries() {
    let (editor, _updates) = editor("ABCDEF");

    assert!(editor.submit(0, EditRequest::insert(0, 6, "!")).is_ok());
    assert!(matches!(
        editor.submit(0, EditRequest::insert(0, 7, "!")),
        Err(SubmitError::OffsetOutOfRange { .. })
    ));

    assert!(editor.submit(0, EditRequest::delete(0, 1, 5)).is_ok());
    assert!(matches!(
        editor.submit(0, EditRequest::delete(0, 1, 6)),
        Err(SubmitError::DeleteOutOfRange { .. })
    ));

    assert!(matches!(
        editor.submit(0, EditRequest::insert(1, 0, "!")),
        Err(SubmitError::FutureBaseVersion { base: 1, current: 0 })
    ));
    assert_eq!(editor.pending_len(), 2);
}

// ─── Convergence and transform ───────────────────────────────────────────────

fn converge(x_first: bool) -> (Vec<u8>, Vec<Update>) {
    let (editor, updates) = editor("");
    editor.submit(0, EditRequest::insert(0, 0, "ABCDEF")).unwrap();
    editor.drain();
    let v = editor.version();
    let _ = updates.try_recv();

    let x = EditRequest::insert(v, 0, "X");
    let y = EditRequest::insert(v, 6, "Y");
    if x_first {
        editor.submit(1, x).unwrap();
        editor.submit(2, y).unwrap();
    } else {
        editor.submit(2, y).unwrap();
        editor.submit(1, x).unwrap();
    }
    assert_eq!(editor.drain(), 2);
    (editor.content(), updates.try_iter().collect())
}

#[test]
fn test_concurrent_inserts_converge_in_either_order() {
    let (a, a_updates) = converge(true);
    let (b, b_updates) = converge(false);

    assert_eq!(a, b"XABCDEFY");
    assert_eq!(b, b"XABCDEFY");

    // Only the version assignment differs
    assert_eq!(a_updates[0].source, 1);
    assert_eq!(b_updates[0].source, 2);
    assert_eq!(a_updates[0].version, b_updates[0].version);
}

#[test]
fn test_insert_before_shifts_later_op() {
    let (editor, updates) = editor("0123456789");
    editor.submit(1, EditRequest::insert(0, 2, "abc")).unwrap();
    editor.submit(2, EditRequest::insert(0, 5, "!")).unwrap();
    editor.drain();

    let landed: Vec<_> = updates.try_iter().map(|u| u.offset).collect();
    assert_eq!(landed, vec![2, 8]);
    assert_eq!(editor.content(), b"01abc234!56789");
}

#[test]
fn test_own_ops_are_not_shifted() {
    let (editor, _updates) = editor("0123456789");
    // Client 1 types twice without waiting for its first ack
    editor.submit(1, EditRequest::insert(0, 2, "abc")).unwrap();
    editor.submit(1, EditRequest::insert(0, 8, "!")).unwrap();
    editor.drain();

    assert_eq!(editor.content(), b"01abc234!56789");
}

// ─── Join snapshots ──────────────────────────────────────────────────────────

#[test]
fn test_snapshot_plus_updates_equals_document_under_load() {
    let fanout = Arc::new(Fanout::default());
    let editor = Arc::new(Editor::new(EditorConfig::default(), Arc::clone(&fanout)).unwrap());
    let engine = editor.spawn().unwrap();

    let writer = {
        let editor = Arc::clone(&editor);
        thread::spawn(move || {
            for _ in 0..500 {
                let len = editor.len() as u32;
                let base = editor.version();
                editor.submit(0, EditRequest::insert(base, len, "w")).unwrap();
            }
        })
    };

    // Join while the writer is busy
    thread::sleep(Duration::from_millis(1));
    let (snapshot, rx) = editor.join(|_| fanout.subscribe()).unwrap();

    writer.join().unwrap();
    engine.shutdown().unwrap();

    let replica = replay(&snapshot.content, rx.try_iter());
    assert_eq!(replica, editor.content());
}

// ─── Concurrent submission ───────────────────────────────────────────────────

const THREADS: usize = 8;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_concurrent_submitters_lose_nothing(
        scripts in prop::collection::vec(prop::collection::vec(0..=1000u32, 1..250), THREADS),
    ) {
        let (tx, updates) = mpsc::channel();
        let editor = Arc::new(Editor::new(EditorConfig::default(), tx).unwrap());
        let engine = editor.spawn().unwrap();

        let submitters: Vec<_> = scripts
            .iter()
            .cloned()
            .zip(0u32..)
            .map(|(positions, client)| {
                let editor = Arc::clone(&editor);
                thread::spawn(move || {
                    for per_mille in positions {
                        // Length before version: the document only grows, so an
                        // offset within the older length is valid at the newer base.
                        let len = editor.len() as u32;
                        let base = editor.version();
                        let request = EditRequest::insert(base, offset_at(per_mille, len), "xy");
                        editor.submit(client, request).unwrap();
                    }
                })
            })
            .collect();

        for handle in submitters {
            handle.join().unwrap();
        }
        let committed = engine.shutdown().unwrap();

        let total = scripts.iter().map(Vec::len).sum::<usize>() as u32;
        let stats = editor.stats();
        prop_assert_eq!(committed, u64::from(total));
        prop_assert_eq!(stats.version, total);
        prop_assert_eq!(stats.pending, 0);
        prop_assert_eq!(stats.dropped, 0);
        prop_assert_eq!(stats.length, 2 * total as usize);

        let updates: Vec<_> = updates.try_iter().collect();
        let versions: Vec<_> = updates.iter().map(|u| u.version).collect();
        prop_assert_eq!(versions, (1..=total).collect::<Vec<_>>());
        prop_assert_eq!(replay(b"", updates), editor.content());
    }
}

//! Linear undo/redo history over context snapshots.
//!
//! Two locks with distinct jobs: an async op mutex serializes whole
//! mutating operations (push, undo, redo, replace) end to end, including
//! any transform work and file restoration; a `parking_lot` state mutex
//! guards the snapshot stacks and is never held across an await.
//!
//! Selection is not a branch point: a push always applies to the true
//! top, and a real push discards whatever was undone (linear semantics).

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use vela_core::{Context, ProjectFile};

use crate::errors::EngineError;
use crate::events::{EngineEvent, EventEmitter, HistoryChangeKind};

/// Outcome of an undo or redo step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoResult {
    /// Snapshots stepped over.
    pub steps: usize,
    /// Files whose on-disk contents were restored.
    pub restored_files: Vec<ProjectFile>,
}

struct HistoryState {
    current: Context,
    undo: Vec<Context>,
    redo: Vec<Context>,
}

impl HistoryState {
    fn depth(&self) -> usize {
        self.undo.len() + 1
    }
}

/// The snapshot history: one current context, an undo stack beneath it,
/// and a redo stack of what was undone.
pub struct ContextHistory {
    op: tokio::sync::Mutex<()>,
    state: Mutex<HistoryState>,
    emitter: Arc<EventEmitter>,
}

impl ContextHistory {
    /// Create a history rooted at an initial snapshot.
    pub fn new(initial: Context, emitter: Arc<EventEmitter>) -> Self {
        Self {
            op: tokio::sync::Mutex::new(()),
            state: Mutex::new(HistoryState {
                current: initial,
                undo: Vec::new(),
                redo: Vec::new(),
            }),
            emitter,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// The current (top) snapshot.
    #[must_use]
    pub fn top(&self) -> Context {
        self.state.lock().current.clone()
    }

    /// Snapshot at `index`, oldest first; the last index is the top.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<Context> {
        let state = self.state.lock();
        match index.cmp(&state.undo.len()) {
            std::cmp::Ordering::Less => Some(state.undo[index].clone()),
            std::cmp::Ordering::Equal => Some(state.current.clone()),
            std::cmp::Ordering::Greater => None,
        }
    }

    /// All snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Context> {
        let state = self.state.lock();
        let mut all = state.undo.clone();
        all.push(state.current.clone());
        all
    }

    /// Number of live snapshots (undo stack plus the top).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().depth()
    }

    /// Always false: the history holds at least the root snapshot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Steps that can be undone.
    #[must_use]
    pub fn undoable(&self) -> usize {
        self.state.lock().undo.len()
    }

    /// Steps that can be redone.
    #[must_use]
    pub fn redoable(&self) -> usize {
        self.state.lock().redo.len()
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Apply a transform to the top snapshot and push the result.
    ///
    /// Returns `Ok(None)` when the transform was a no-op (same snapshot
    /// id); no entry is appended and the redo stack is untouched. A real
    /// push clears the redo stack.
    pub async fn push<F>(&self, transform: F) -> Result<Option<Context>, EngineError>
    where
        F: FnOnce(&Context) -> Result<Context, EngineError>,
    {
        let _op = self.op.lock().await;
        let top = self.state.lock().current.clone();
        let next = transform(&top)?;
        if next.id() == top.id() {
            debug!("transform was a no-op, nothing pushed");
            return Ok(None);
        }
        {
            let mut state = self.state.lock();
            let previous = std::mem::replace(&mut state.current, next.clone());
            state.undo.push(previous);
            state.redo.clear();
            gauge!("context_history_depth").set(state.depth() as f64);
        }
        let _ = self.emitter.emit(EngineEvent::HistoryChanged {
            kind: HistoryChangeKind::Pushed,
        });
        Ok(Some(next))
    }

    /// Undo `n` snapshots, restoring pre-edit file contents along the way.
    ///
    /// `n` must be between 1 and [`ContextHistory::undoable`]; otherwise
    /// the history is left untouched and `NothingToUndo` is returned.
    pub async fn undo(&self, n: usize) -> Result<UndoResult, EngineError> {
        let _op = self.op.lock().await;
        let available = self.state.lock().undo.len();
        if n == 0 || n > available {
            return Err(EngineError::NothingToUndo {
                requested: n,
                available,
            });
        }

        let mut restored = Vec::new();
        for _ in 0..n {
            let undone = {
                let mut state = self.state.lock();
                let Some(previous) = state.undo.pop() else {
                    break;
                };
                std::mem::replace(&mut state.current, previous)
            };
            let inverse = restore_files(&undone, &mut restored).await;
            let mut state = self.state.lock();
            state.redo.push(undone.invert_undo_backup(inverse));
            gauge!("context_history_depth").set(state.depth() as f64);
        }

        let _ = self.emitter.emit(EngineEvent::HistoryChanged {
            kind: HistoryChangeKind::Undone,
        });
        Ok(UndoResult {
            steps: n,
            restored_files: restored,
        })
    }

    /// Re-apply the most recently undone snapshot, restoring its post-edit
    /// file contents.
    pub async fn redo(&self) -> Result<UndoResult, EngineError> {
        let _op = self.op.lock().await;
        let Some(snapshot) = self.state.lock().redo.pop() else {
            return Err(EngineError::NothingToRedo);
        };

        let mut restored = Vec::new();
        let inverse = restore_files(&snapshot, &mut restored).await;
        {
            let mut state = self.state.lock();
            let previous =
                std::mem::replace(&mut state.current, snapshot.invert_undo_backup(inverse));
            state.undo.push(previous);
            gauge!("context_history_depth").set(state.depth() as f64);
        }

        let _ = self.emitter.emit(EngineEvent::HistoryChanged {
            kind: HistoryChangeKind::Redone,
        });
        Ok(UndoResult {
            steps: 1,
            restored_files: restored,
        })
    }

    /// Substitute a snapshot in place, keyed by id. The cursor does not
    /// move. Returns false when no snapshot carries the id.
    pub async fn replace(&self, id: Uuid, replacement: Context) -> bool {
        let _op = self.op.lock().await;
        let replaced = {
            let mut state = self.state.lock();
            if state.current.id() == id {
                state.current = replacement;
                true
            } else if let Some(slot) = state.undo.iter_mut().find(|c| c.id() == id) {
                *slot = replacement;
                true
            } else if let Some(slot) = state.redo.iter_mut().find(|c| c.id() == id) {
                *slot = replacement;
                true
            } else {
                false
            }
        };
        if replaced {
            let _ = self.emitter.emit(EngineEvent::HistoryChanged {
                kind: HistoryChangeKind::Replaced,
            });
        }
        replaced
    }
}

/// Apply the snapshot's backed-up file state to disk, recording restored
/// files and returning the inverse backup (what was on disk just before).
///
/// A `None` entry means the file did not exist on that side of the edit:
/// applying it removes the file, and a missing file on capture is
/// recorded as `None`, so create/delete round-trips exactly. Per-file
/// failures are logged and skipped; restoration is best-effort and never
/// fails the surrounding undo/redo.
async fn restore_files(
    snapshot: &Context,
    restored: &mut Vec<ProjectFile>,
) -> BTreeMap<ProjectFile, Option<String>> {
    let mut inverse = BTreeMap::new();
    for (file, contents) in snapshot.undo_backup() {
        let path = file.abs();
        let on_disk = match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(file = %file, error = %err, "cannot capture current contents, skipping restore");
                continue;
            }
        };
        let applied = match contents {
            Some(text) => tokio::fs::write(&path, text).await,
            None => match tokio::fs::remove_file(&path).await {
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(err) = applied {
            warn!(file = %file, error = %err, "file restore failed, skipping");
            continue;
        }
        let _ = inverse.insert(file.clone(), on_disk);
        restored.push(file.clone());
    }
    inverse
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::path::PathBuf;
    use vela_core::graph::memory::StaticGraph;
    use vela_core::{GraphProvider, PathFragment};

    fn new_history(root: Arc<PathBuf>) -> ContextHistory {
        let mut graph = StaticGraph::new();
        graph.add_entity("app.A", "class A", Some(ProjectFile::new(root, "a.rs")));
        let graph: Arc<dyn GraphProvider> = Arc::new(graph);
        ContextHistory::new(Context::new(graph, 0), Arc::new(EventEmitter::new()))
    }

    fn mem_history() -> ContextHistory {
        new_history(Arc::new(PathBuf::from("/proj")))
    }

    fn frag(root: &Arc<PathBuf>, rel: &str) -> PathFragment {
        PathFragment::new(ProjectFile::new(Arc::clone(root), rel))
    }

    #[tokio::test]
    async fn push_appends_and_noop_does_not() {
        let root = Arc::new(PathBuf::from("/proj"));
        let history = mem_history();
        assert_eq!(history.len(), 1);

        let pushed = history
            .push(|c| Ok(c.add_editable_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap();
        assert!(pushed.is_some());
        assert_eq!(history.len(), 2);

        // Same file again: clone with the same id, nothing appended.
        let noop = history
            .push(|c| Ok(c.add_editable_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap();
        assert!(noop.is_none());
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn failed_transform_leaves_history_unchanged() {
        let history = mem_history();
        let result = history
            .push(|_| Err(EngineError::SymbolNotFound("app.Z".into())))
            .await;
        assert!(result.is_err());
        assert_eq!(history.len(), 1);
        assert_eq!(history.redoable(), 0);
    }

    #[tokio::test]
    async fn undo_validates_bounds() {
        let root = Arc::new(PathBuf::from("/proj"));
        let history = mem_history();
        let _ = history
            .push(|c| Ok(c.add_editable_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap();

        assert_matches!(
            history.undo(0).await,
            Err(EngineError::NothingToUndo {
                requested: 0,
                available: 1
            })
        );
        assert_matches!(
            history.undo(2).await,
            Err(EngineError::NothingToUndo {
                requested: 2,
                available: 1
            })
        );
        // Bounds failure moved nothing.
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn real_push_clears_redo() {
        let root = Arc::new(PathBuf::from("/proj"));
        let history = mem_history();
        let _ = history
            .push(|c| Ok(c.add_editable_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap();
        let _ = history.undo(1).await.unwrap();
        assert_eq!(history.redoable(), 1);

        let _ = history
            .push(|c| Ok(c.add_readonly_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap();
        assert_eq!(history.redoable(), 0);
        assert!(matches!(
            history.redo().await,
            Err(EngineError::NothingToRedo)
        ));
    }

    #[tokio::test]
    async fn undo_and_redo_restore_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let root = Arc::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("a.rs"), "before").unwrap();

        let history = new_history(Arc::clone(&root));
        let file = ProjectFile::new(Arc::clone(&root), "a.rs");

        // An edit-recording push: capture pre-edit content, then "edit".
        let backup = BTreeMap::from([(file.clone(), Some("before".to_string()))]);
        let _ = history
            .push(|c| Ok(c.with_undo_backup(backup)))
            .await
            .unwrap();
        std::fs::write(dir.path().join("a.rs"), "after").unwrap();

        let result = history.undo(1).await.unwrap();
        assert_eq!(result.steps, 1);
        assert_eq!(result.restored_files, vec![file.clone()]);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.rs")).unwrap(), "before");

        let result = history.redo().await.unwrap();
        assert_eq!(result.restored_files, vec![file]);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.rs")).unwrap(), "after");

        // And back again: the inversion is symmetric.
        let _ = history.undo(1).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.rs")).unwrap(), "before");
    }

    #[tokio::test]
    async fn undo_deletes_a_created_file_and_redo_recreates_it() {
        let dir = tempfile::tempdir().unwrap();
        let root = Arc::new(dir.path().to_path_buf());
        let history = new_history(Arc::clone(&root));
        let file = ProjectFile::new(Arc::clone(&root), "new.rs");

        // The file did not exist before the edit: its backup entry is None.
        let backup = BTreeMap::from([(file.clone(), None)]);
        let _ = history
            .push(|c| Ok(c.with_undo_backup(backup)))
            .await
            .unwrap();
        std::fs::write(dir.path().join("new.rs"), "created").unwrap();

        let result = history.undo(1).await.unwrap();
        assert_eq!(result.restored_files, vec![file.clone()]);
        assert!(!dir.path().join("new.rs").exists());

        let result = history.redo().await.unwrap();
        assert_eq!(result.restored_files, vec![file]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("new.rs")).unwrap(),
            "created"
        );

        // Deleting again stays exact: the file is gone, not empty.
        let _ = history.undo(1).await.unwrap();
        assert!(!dir.path().join("new.rs").exists());
    }

    #[tokio::test]
    async fn undo_multiple_steps_in_one_call() {
        let root = Arc::new(PathBuf::from("/proj"));
        let history = mem_history();
        let _ = history
            .push(|c| Ok(c.add_editable_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap();
        let _ = history
            .push(|c| Ok(c.add_virtual_fragment(vela_core::VirtualFragment::Text {
                description: "notes".into(),
                content: "body".into(),
            })))
            .await
            .unwrap();

        let result = history.undo(2).await.unwrap();
        assert_eq!(result.steps, 2);
        assert_eq!(history.len(), 1);
        assert!(history.top().editable_files().is_empty());
        assert_eq!(history.redoable(), 2);
    }

    #[tokio::test]
    async fn replace_substitutes_without_moving_cursor() {
        let root = Arc::new(PathBuf::from("/proj"));
        let history = mem_history();
        let pushed = history
            .push(|c| Ok(c.add_editable_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap()
            .unwrap();

        let refreshed = pushed.refresh();
        let new_id = refreshed.id();
        assert!(history.replace(pushed.id(), refreshed).await);
        assert_eq!(history.top().id(), new_id);
        assert_eq!(history.len(), 2);

        assert!(!history.replace(Uuid::now_v7(), history.top()).await);
    }

    #[tokio::test]
    async fn history_change_events_fire() {
        let root = Arc::new(PathBuf::from("/proj"));
        let emitter = Arc::new(EventEmitter::new());
        let mut graph = StaticGraph::new();
        graph.add_entity(
            "app.A",
            "class A",
            Some(ProjectFile::new(Arc::clone(&root), "a.rs")),
        );
        let graph: Arc<dyn GraphProvider> = Arc::new(graph);
        let history = ContextHistory::new(Context::new(graph, 0), Arc::clone(&emitter));
        let mut rx = emitter.subscribe();

        let _ = history
            .push(|c| Ok(c.add_editable_files(&[frag(&root, "a.rs")])))
            .await
            .unwrap();
        let _ = history.undo(1).await.unwrap();
        let _ = history.redo().await.unwrap();

        for kind in [
            HistoryChangeKind::Pushed,
            HistoryChangeKind::Undone,
            HistoryChangeKind::Redone,
        ] {
            assert_eq!(
                rx.recv().await.unwrap(),
                EngineEvent::HistoryChanged { kind }
            );
        }
    }
}

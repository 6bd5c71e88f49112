//! Context persistence.
//!
//! Only raw state is persisted: fragment identities, the budget, the
//! conversation entries, and the undo backup. Derived state (auto-context)
//! is recomputed on load, never trusted from disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use vela_core::{
    Context, ConversationLog, GraphProvider, HistoryMessage, PathFragment, ProjectFile,
    VirtualFragment,
};

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("context store io: {0}")]
    Io(#[from] std::io::Error),
    /// The stored form did not parse.
    #[error("context store format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Boundary for saving and restoring the top context.
pub trait ContextStore: Send + Sync {
    /// Persist the snapshot's raw state.
    fn save(&self, context: &Context) -> Result<(), StoreError>;

    /// Restore the saved snapshot, if one exists, recomputing derived
    /// state against the given graph.
    fn load(&self, graph: Arc<dyn GraphProvider>) -> Result<Option<Context>, StoreError>;
}

/// The serialized snapshot form. Paths are stored relative to the root.
#[derive(Debug, Serialize, Deserialize)]
struct SavedContext {
    editable: Vec<PathBuf>,
    readonly: Vec<PathBuf>,
    virtuals: Vec<VirtualFragment>,
    auto_context_budget: usize,
    conversation: Vec<HistoryMessage>,
    undo_backup: BTreeMap<PathBuf, Option<String>>,
}

/// JSON-file store at `<root>/.vela/context.json`.
pub struct JsonContextStore {
    root: Arc<PathBuf>,
}

impl JsonContextStore {
    /// Store for the given project root.
    pub fn new(root: Arc<PathBuf>) -> Self {
        Self { root }
    }

    fn path(&self) -> PathBuf {
        self.root.join(".vela").join("context.json")
    }
}

impl ContextStore for JsonContextStore {
    fn save(&self, context: &Context) -> Result<(), StoreError> {
        let saved = SavedContext {
            editable: context
                .editable_files()
                .iter()
                .map(|f| f.file().rel().to_path_buf())
                .collect(),
            readonly: context
                .readonly_files()
                .iter()
                .map(|f| f.file().rel().to_path_buf())
                .collect(),
            virtuals: context.virtual_fragments().to_vec(),
            auto_context_budget: context.auto_context_budget(),
            conversation: context.conversation().entries(),
            undo_backup: context
                .undo_backup()
                .iter()
                .map(|(file, contents)| (file.rel().to_path_buf(), contents.clone()))
                .collect(),
        };

        let path = self.path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&saved)?)?;
        debug!(path = %path.display(), "context saved");
        Ok(())
    }

    fn load(&self, graph: Arc<dyn GraphProvider>) -> Result<Option<Context>, StoreError> {
        let path = self.path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let saved: SavedContext = serde_json::from_str(&text)?;

        let file = |rel: PathBuf| ProjectFile::new(Arc::clone(&self.root), rel);
        let context = Context::from_parts(
            graph,
            saved.editable.into_iter().map(|p| PathFragment::new(file(p))).collect(),
            saved.readonly.into_iter().map(|p| PathFragment::new(file(p))).collect(),
            saved.virtuals,
            saved.auto_context_budget,
            Arc::new(ConversationLog::with_entries(saved.conversation)),
            saved
                .undo_backup
                .into_iter()
                .map(|(p, contents)| (file(p), contents))
                .collect(),
        );
        debug!(path = %path.display(), "context loaded");
        Ok(Some(context))
    }
}

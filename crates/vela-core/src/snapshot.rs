//! The immutable context snapshot.
//!
//! [`Context`] aggregates everything that will be fed to the model:
//! editable and read-only file fragments, virtual fragments, the derived
//! auto-context, the shared conversation log, and (when produced by an
//! edit-recording action) a backup of pre-edit file contents for undo.
//!
//! All mutation is expressed as pure transforms `&Context -> Context`.
//! A transform that changes nothing returns a clone sharing the same
//! snapshot id — the history layer detects this and appends no entry, so
//! undo/redo never fills up with empty steps.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::autocontext;
use crate::entity::ProjectFile;
use crate::fragment::{AutoContextFragment, PathFragment, VirtualFragment};
use crate::graph::GraphProvider;
use crate::log::{ConversationLog, HistoryMessage};

/// One immutable version of the working context.
#[derive(Clone)]
pub struct Context {
    id: Uuid,
    graph: Arc<dyn GraphProvider>,
    editable: Vec<PathFragment>,
    readonly: Vec<PathFragment>,
    virtuals: Vec<VirtualFragment>,
    auto_context: AutoContextFragment,
    auto_context_budget: usize,
    log: Arc<ConversationLog>,
    /// Pre-edit file state; empty unless this snapshot was produced by an
    /// edit-recording action. `None` marks a file that did not exist
    /// before the edit. Does not carry forward to children.
    undo_backup: BTreeMap<ProjectFile, Option<String>>,
}

/// A fragment addressed inside a snapshot (lookup / removal handle).
#[derive(Clone, Debug, PartialEq)]
pub enum ContextEntry {
    /// The derived auto-context fragment.
    Auto(AutoContextFragment),
    /// An editable or read-only path fragment.
    Path(PathFragment),
    /// A virtual fragment.
    Virtual(VirtualFragment),
}

impl Context {
    /// Create an empty root snapshot.
    pub fn new(graph: Arc<dyn GraphProvider>, auto_context_budget: usize) -> Self {
        Self::from_parts(
            graph,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            auto_context_budget,
            Arc::new(ConversationLog::new()),
            BTreeMap::new(),
        )
    }

    /// Assemble a snapshot from its parts, recomputing auto-context.
    ///
    /// Used by persistence: derived state is never trusted after a load.
    pub fn from_parts(
        graph: Arc<dyn GraphProvider>,
        editable: Vec<PathFragment>,
        readonly: Vec<PathFragment>,
        virtuals: Vec<VirtualFragment>,
        auto_context_budget: usize,
        log: Arc<ConversationLog>,
        undo_backup: BTreeMap<ProjectFile, Option<String>>,
    ) -> Self {
        let auto_context = autocontext::build(
            &editable,
            &readonly,
            &virtuals,
            auto_context_budget,
            graph.as_ref(),
        );
        Self {
            id: Uuid::now_v7(),
            graph,
            editable,
            readonly,
            virtuals,
            auto_context,
            auto_context_budget,
            log,
            undo_backup,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Snapshot identity. Transforms that change nothing preserve it.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Editable path fragments, in insertion order.
    #[must_use]
    pub fn editable_files(&self) -> &[PathFragment] {
        &self.editable
    }

    /// Read-only path fragments, in insertion order.
    #[must_use]
    pub fn readonly_files(&self) -> &[PathFragment] {
        &self.readonly
    }

    /// Virtual fragments, in insertion order.
    #[must_use]
    pub fn virtual_fragments(&self) -> &[VirtualFragment] {
        &self.virtuals
    }

    /// The derived auto-context fragment.
    #[must_use]
    pub fn auto_context(&self) -> &AutoContextFragment {
        &self.auto_context
    }

    /// Auto-context budget; zero means disabled.
    #[must_use]
    pub fn auto_context_budget(&self) -> usize {
        self.auto_context_budget
    }

    /// Whether auto-context is enabled.
    #[must_use]
    pub fn auto_context_enabled(&self) -> bool {
        self.auto_context_budget > 0
    }

    /// The shared conversation log.
    #[must_use]
    pub fn conversation(&self) -> &Arc<ConversationLog> {
        &self.log
    }

    /// Pre-edit file contents backing undo for this snapshot.
    #[must_use]
    pub fn undo_backup(&self) -> &BTreeMap<ProjectFile, Option<String>> {
        &self.undo_backup
    }

    /// The graph provider this snapshot recomputes auto-context with.
    #[must_use]
    pub fn graph(&self) -> &Arc<dyn GraphProvider> {
        &self.graph
    }

    /// True when the snapshot holds no fragments and no conversation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.editable.is_empty()
            && self.readonly.is_empty()
            && self.virtuals.is_empty()
            && self.log.is_empty()
    }

    // ── Transforms ──────────────────────────────────────────────────────

    /// Rebuild with new fragment sequences / budget, recomputing
    /// auto-context. Backups never carry forward to derived snapshots.
    fn rebuilt(
        &self,
        editable: Vec<PathFragment>,
        readonly: Vec<PathFragment>,
        virtuals: Vec<VirtualFragment>,
        auto_context_budget: usize,
    ) -> Self {
        Self::from_parts(
            Arc::clone(&self.graph),
            editable,
            readonly,
            virtuals,
            auto_context_budget,
            Arc::clone(&self.log),
            BTreeMap::new(),
        )
    }

    /// Add editable files, skipping those already editable.
    #[must_use]
    pub fn add_editable_files(&self, fragments: &[PathFragment]) -> Self {
        let to_add: Vec<_> = fragments
            .iter()
            .filter(|f| !self.editable.contains(f))
            .cloned()
            .collect();
        if to_add.is_empty() {
            return self.clone();
        }
        let mut editable = self.editable.clone();
        editable.extend(to_add);
        self.rebuilt(
            editable,
            self.readonly.clone(),
            self.virtuals.clone(),
            self.auto_context_budget,
        )
    }

    /// Add read-only files, skipping those already read-only.
    #[must_use]
    pub fn add_readonly_files(&self, fragments: &[PathFragment]) -> Self {
        let to_add: Vec<_> = fragments
            .iter()
            .filter(|f| !self.readonly.contains(f))
            .cloned()
            .collect();
        if to_add.is_empty() {
            return self.clone();
        }
        let mut readonly = self.readonly.clone();
        readonly.extend(to_add);
        self.rebuilt(
            self.editable.clone(),
            readonly,
            self.virtuals.clone(),
            self.auto_context_budget,
        )
    }

    /// Remove editable files by identity.
    #[must_use]
    pub fn remove_editable_files(&self, fragments: &[PathFragment]) -> Self {
        let retained: Vec<_> = self
            .editable
            .iter()
            .filter(|f| !fragments.contains(f))
            .cloned()
            .collect();
        if retained.len() == self.editable.len() {
            return self.clone();
        }
        self.rebuilt(
            retained,
            self.readonly.clone(),
            self.virtuals.clone(),
            self.auto_context_budget,
        )
    }

    /// Remove read-only files by identity.
    #[must_use]
    pub fn remove_readonly_files(&self, fragments: &[PathFragment]) -> Self {
        let retained: Vec<_> = self
            .readonly
            .iter()
            .filter(|f| !fragments.contains(f))
            .cloned()
            .collect();
        if retained.len() == self.readonly.len() {
            return self.clone();
        }
        self.rebuilt(
            self.editable.clone(),
            retained,
            self.virtuals.clone(),
            self.auto_context_budget,
        )
    }

    /// Remove virtual fragments by content equality.
    #[must_use]
    pub fn remove_virtual_fragments(&self, fragments: &[VirtualFragment]) -> Self {
        let retained: Vec<_> = self
            .virtuals
            .iter()
            .filter(|f| !fragments.contains(f))
            .cloned()
            .collect();
        if retained.len() == self.virtuals.len() {
            return self.clone();
        }
        self.rebuilt(
            self.editable.clone(),
            self.readonly.clone(),
            retained,
            self.auto_context_budget,
        )
    }

    /// Append a virtual fragment.
    #[must_use]
    pub fn add_virtual_fragment(&self, fragment: VirtualFragment) -> Self {
        let mut virtuals = self.virtuals.clone();
        virtuals.push(fragment);
        self.rebuilt(
            self.editable.clone(),
            self.readonly.clone(),
            virtuals,
            self.auto_context_budget,
        )
    }

    /// Replace the auto-context budget (0 disables).
    #[must_use]
    pub fn set_auto_context_budget(&self, budget: usize) -> Self {
        if budget == self.auto_context_budget {
            return self.clone();
        }
        self.rebuilt(
            self.editable.clone(),
            self.readonly.clone(),
            self.virtuals.clone(),
            budget,
        )
    }

    /// Move every editable file into the read-only sequence.
    #[must_use]
    pub fn convert_all_to_readonly(&self) -> Self {
        if self.editable.is_empty() {
            return self.clone();
        }
        let mut readonly = self.readonly.clone();
        readonly.extend(self.editable.iter().cloned());
        self.rebuilt(
            Vec::new(),
            readonly,
            self.virtuals.clone(),
            self.auto_context_budget,
        )
    }

    /// Drop every fragment. The conversation log is untouched.
    #[must_use]
    pub fn remove_all(&self) -> Self {
        if self.editable.is_empty() && self.readonly.is_empty() && self.virtuals.is_empty() {
            return self.clone();
        }
        self.rebuilt(Vec::new(), Vec::new(), Vec::new(), self.auto_context_budget)
    }

    /// Remove a fragment that failed to materialize, whichever sequence
    /// holds it. The auto-context entry cannot be removed this way.
    #[must_use]
    pub fn remove_bad_fragment(&self, entry: &ContextEntry) -> Self {
        match entry {
            ContextEntry::Auto(_) => self.clone(),
            ContextEntry::Path(frag) => {
                let attempt = self.remove_editable_files(std::slice::from_ref(frag));
                if attempt.id() == self.id {
                    self.remove_readonly_files(std::slice::from_ref(frag))
                } else {
                    attempt
                }
            }
            ContextEntry::Virtual(frag) => {
                self.remove_virtual_fragments(std::slice::from_ref(frag))
            }
        }
    }

    // ── Conversation ────────────────────────────────────────────────────

    /// Append messages to the shared log.
    ///
    /// This mutates the log object every descendant snapshot shares; it
    /// does NOT create a new snapshot. Undo therefore never erases a
    /// conversation round — only [`Context::clear_conversation`] does.
    pub fn append_conversation(&self, messages: Vec<HistoryMessage>) {
        self.log.append(messages);
    }

    /// Swap in a fresh, empty conversation log.
    ///
    /// The one log operation that produces a new snapshot, so it remains
    /// undoable.
    #[must_use]
    pub fn clear_conversation(&self) -> Self {
        if self.log.is_empty() {
            return self.clone();
        }
        Self {
            id: Uuid::now_v7(),
            log: Arc::new(ConversationLog::new()),
            undo_backup: BTreeMap::new(),
            ..self.clone()
        }
    }

    /// Attach a pre-edit backup map, producing a new (undoable) snapshot.
    /// A `None` value marks a file the edit created.
    #[must_use]
    pub fn with_undo_backup(&self, backup: BTreeMap<ProjectFile, Option<String>>) -> Self {
        Self {
            id: Uuid::now_v7(),
            undo_backup: backup,
            ..self.clone()
        }
    }

    /// Swap the backup map while keeping the snapshot id.
    ///
    /// Used by history when a snapshot moves between the undo and redo
    /// stacks: the backup flips between pre-edit and post-edit contents,
    /// but it is still the same logical version.
    #[must_use]
    pub fn invert_undo_backup(&self, backup: BTreeMap<ProjectFile, Option<String>>) -> Self {
        Self {
            undo_backup: backup,
            ..self.clone()
        }
    }

    /// Recompute auto-context without touching the fragment sequences.
    #[must_use]
    pub fn refresh(&self) -> Self {
        self.rebuilt(
            self.editable.clone(),
            self.readonly.clone(),
            self.virtuals.clone(),
            self.auto_context_budget,
        )
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// Resolve a display target to a fragment: `"0"` is the auto-context
    /// (when enabled), positive ordinals index the virtual fragments, and
    /// anything else matches a path fragment by description.
    #[must_use]
    pub fn fragment_at(&self, target: &str) -> Option<ContextEntry> {
        if let Ok(ordinal) = target.parse::<usize>() {
            if ordinal == 0 {
                if !self.auto_context_enabled() {
                    return None;
                }
                return Some(ContextEntry::Auto(self.auto_context.clone()));
            }
            return self
                .virtuals
                .get(ordinal - 1)
                .cloned()
                .map(ContextEntry::Virtual);
        }
        self.editable
            .iter()
            .chain(&self.readonly)
            .find(|f| f.description() == target)
            .cloned()
            .map(ContextEntry::Path)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("editable", &self.editable)
            .field("readonly", &self.readonly)
            .field("virtuals", &self.virtuals.len())
            .field("auto_context", &self.auto_context.description())
            .field("budget", &self.auto_context_budget)
            .field("conversation_len", &self.log.len())
            .field("undo_backup", &self.undo_backup.len())
            .finish()
    }
}

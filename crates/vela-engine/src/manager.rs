//! The engine facade.
//!
//! `ContextManager` ties the pieces together: it owns the history, the
//! task pools, the store, the summarizer, and the event emitter, and
//! exposes one method per user-visible operation. Every successful push
//! is saved through the store; save failures are logged, never fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use vela_core::{
    Context, ContextEntry, EntityId, GraphProvider, HistoryMessage, PasteDescription,
    PathFragment, ProjectFile, SkeletonEntry, VirtualFragment,
};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::events::{EngineEvent, EventEmitter};
use crate::history::{ContextHistory, UndoResult};
use crate::store::ContextStore;
use crate::summarizer::Summarizer;
use crate::tasks::{ActionJob, TaskHandle, TaskPools};

/// Facade over history, pools, persistence, and notification.
pub struct ContextManager {
    graph: Arc<dyn GraphProvider>,
    history: Arc<ContextHistory>,
    pools: TaskPools,
    store: Arc<dyn ContextStore>,
    summarizer: Arc<dyn Summarizer>,
    emitter: Arc<EventEmitter>,
}

impl ContextManager {
    /// Build a manager, restoring the saved context when one exists.
    pub fn new(
        graph: Arc<dyn GraphProvider>,
        store: Arc<dyn ContextStore>,
        summarizer: Arc<dyn Summarizer>,
        config: &EngineConfig,
    ) -> Self {
        let emitter = Arc::new(EventEmitter::with_capacity(config.event_capacity));
        let initial = match store.load(Arc::clone(&graph)) {
            Ok(Some(context)) => {
                info!("restored saved context");
                context
            }
            Ok(None) => Context::new(Arc::clone(&graph), config.auto_context_budget),
            Err(err) => {
                warn!(error = %err, "saved context unusable, starting fresh");
                Context::new(Arc::clone(&graph), config.auto_context_budget)
            }
        };
        Self {
            graph,
            history: Arc::new(ContextHistory::new(initial, Arc::clone(&emitter))),
            pools: TaskPools::new(Arc::clone(&emitter), config),
            store,
            summarizer,
            emitter,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// The current (top) snapshot.
    #[must_use]
    pub fn top(&self) -> Context {
        self.history.top()
    }

    /// The snapshot history.
    #[must_use]
    pub fn history(&self) -> &Arc<ContextHistory> {
        &self.history
    }

    /// The graph provider.
    #[must_use]
    pub fn graph(&self) -> &Arc<dyn GraphProvider> {
        &self.graph
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.emitter.subscribe()
    }

    // ── File fragments ──────────────────────────────────────────────────

    /// Make files editable, moving them out of the read-only sequence if
    /// present.
    #[instrument(skip(self, files))]
    pub async fn edit_files(
        &self,
        files: Vec<ProjectFile>,
    ) -> Result<Option<Context>, EngineError> {
        let fragments: Vec<_> = files.into_iter().map(PathFragment::new).collect();
        self.apply(move |c| {
            Ok(c.remove_readonly_files(&fragments)
                .add_editable_files(&fragments))
        })
        .await
    }

    /// Add files read-only, moving them out of the editable sequence if
    /// present.
    #[instrument(skip(self, files))]
    pub async fn read_files(
        &self,
        files: Vec<ProjectFile>,
    ) -> Result<Option<Context>, EngineError> {
        let fragments: Vec<_> = files.into_iter().map(PathFragment::new).collect();
        self.apply(move |c| {
            Ok(c.remove_editable_files(&fragments)
                .add_readonly_files(&fragments))
        })
        .await
    }

    /// Drop the given fragments. Dropping the auto-context entry sets the
    /// budget to zero.
    pub async fn drop_fragments(
        &self,
        entries: Vec<ContextEntry>,
    ) -> Result<Option<Context>, EngineError> {
        self.apply(move |c| {
            let mut acc = c.clone();
            for entry in &entries {
                acc = match entry {
                    ContextEntry::Auto(_) => acc.set_auto_context_budget(0),
                    other => acc.remove_bad_fragment(other),
                };
            }
            Ok(acc)
        })
        .await
    }

    /// Drop every fragment, keeping the conversation.
    pub async fn drop_all(&self) -> Result<Option<Context>, EngineError> {
        self.apply(|c| Ok(c.remove_all())).await
    }

    /// Move every editable file into the read-only sequence.
    pub async fn convert_all_to_readonly(&self) -> Result<Option<Context>, EngineError> {
        self.apply(|c| Ok(c.convert_all_to_readonly())).await
    }

    // ── Virtual fragments ───────────────────────────────────────────────

    /// Add a literal text fragment.
    pub async fn add_text_fragment(
        &self,
        description: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Option<Context>, EngineError> {
        let fragment = VirtualFragment::Text {
            description: description.into(),
            content: content.into(),
        };
        self.apply(move |c| Ok(c.add_virtual_fragment(fragment))).await
    }

    /// Add pasted content. The fragment lands immediately with a pending
    /// description; a background task summarizes and fills it in.
    pub async fn add_paste(&self, content: String) -> Result<TaskHandle, EngineError> {
        let description = PasteDescription::pending();
        let fragment = VirtualFragment::Paste {
            content: content.clone(),
            description: description.clone(),
        };
        let _ = self.apply(move |c| Ok(c.add_virtual_fragment(fragment))).await?;

        let summarizer = Arc::clone(&self.summarizer);
        let emitter = Arc::clone(&self.emitter);
        Ok(self.pools.submit_background("summarize paste", async move {
            let summary = summarizer.summarize(&content, 12)?;
            description.resolve(summary.clone());
            let _ = emitter.emit(EngineEvent::Notice {
                message: format!("Paste summarized: {summary}"),
            });
            Ok(())
        }))
    }

    /// Add a parsed stack trace with the relevant method sources.
    pub async fn add_stacktrace(
        &self,
        sources: BTreeSet<EntityId>,
        original: impl Into<String>,
        exception: impl Into<String>,
        methods: impl Into<String>,
    ) -> Result<Option<Context>, EngineError> {
        let fragment = VirtualFragment::Stacktrace {
            sources,
            original: original.into(),
            exception: exception.into(),
            methods: methods.into(),
        };
        self.apply(move |c| Ok(c.add_virtual_fragment(fragment))).await
    }

    /// Add a symbol-usage extract.
    pub async fn add_usage(
        &self,
        label: impl Into<String>,
        target: &EntityId,
        sources: BTreeSet<EntityId>,
        code: impl Into<String>,
    ) -> Result<Option<Context>, EngineError> {
        let fragment = VirtualFragment::Usage {
            label: label.into(),
            target: target.to_string(),
            sources,
            code: code.into(),
        };
        self.apply(move |c| Ok(c.add_virtual_fragment(fragment))).await
    }

    /// Capture a search answer into the context.
    pub async fn add_search_result(
        &self,
        query: impl Into<String>,
        sources: BTreeSet<EntityId>,
        content: impl Into<String>,
    ) -> Result<Option<Context>, EngineError> {
        let fragment = VirtualFragment::Search {
            query: query.into(),
            sources,
            content: content.into(),
        };
        self.apply(move |c| Ok(c.add_virtual_fragment(fragment))).await
    }

    /// Summarize entities into a skeleton fragment.
    ///
    /// Nested entities whose outermost entity is also requested are
    /// coalesced away (the outer skeleton covers them). If no requested
    /// entity has a skeleton the operation aborts with `SymbolNotFound`
    /// and history is unchanged.
    #[instrument(skip(self, entities))]
    pub async fn summarize_entities(
        &self,
        entities: BTreeSet<EntityId>,
    ) -> Result<Option<Context>, EngineError> {
        let coalesced = coalesce_nested(&entities);
        let entries: Vec<SkeletonEntry> = coalesced
            .iter()
            .filter_map(|entity| {
                self.graph.skeleton_of(entity).map(|skeleton| SkeletonEntry {
                    short_name: entity.short_name().to_string(),
                    entities: BTreeSet::from([entity.clone()]),
                    skeleton,
                })
            })
            .collect();
        if entries.is_empty() {
            let names: Vec<_> = entities.iter().map(EntityId::to_string).collect();
            return Err(EngineError::SymbolNotFound(names.join(", ")));
        }
        self.apply(move |c| Ok(c.add_virtual_fragment(VirtualFragment::Skeleton { entries })))
            .await
    }

    // ── Budget, conversation, history ───────────────────────────────────

    /// Change the auto-context budget (0 disables).
    pub async fn set_auto_context_budget(
        &self,
        budget: usize,
    ) -> Result<Option<Context>, EngineError> {
        self.apply(move |c| Ok(c.set_auto_context_budget(budget))).await
    }

    /// Swap in a fresh conversation log (undoable).
    pub async fn clear_conversation(&self) -> Result<Option<Context>, EngineError> {
        self.apply(|c| Ok(c.clear_conversation())).await
    }

    /// Record a completed conversation round: append the messages to the
    /// shared log and push a snapshot carrying the round's pre-edit file
    /// backup (`None` for files the round created). Always a real push,
    /// so the round's edits are undoable.
    #[instrument(skip(self, messages, edited_files_backup))]
    pub async fn record_exchange(
        &self,
        messages: Vec<HistoryMessage>,
        edited_files_backup: BTreeMap<ProjectFile, Option<String>>,
    ) -> Result<Option<Context>, EngineError> {
        self.apply(move |c| {
            c.append_conversation(messages);
            Ok(c.with_undo_backup(edited_files_backup))
        })
        .await
    }

    /// Undo `n` steps, restoring pre-edit file contents.
    pub async fn undo(&self, steps: usize) -> Result<UndoResult, EngineError> {
        let result = self.history.undo(steps).await?;
        self.persist(&self.history.top());
        Ok(result)
    }

    /// Re-apply the most recently undone step.
    pub async fn redo(&self) -> Result<UndoResult, EngineError> {
        let result = self.history.redo().await?;
        self.persist(&self.history.top());
        Ok(result)
    }

    /// Remove a fragment that failed to materialize.
    pub async fn remove_bad_fragment(
        &self,
        entry: ContextEntry,
    ) -> Result<Option<Context>, EngineError> {
        warn!(description = %entry_description(&entry), "removing unreadable fragment");
        self.apply(move |c| Ok(c.remove_bad_fragment(&entry))).await
    }

    /// Files a fragment's content lives in, via the graph.
    #[must_use]
    pub fn files_for_fragment(&self, entry: &ContextEntry) -> BTreeSet<ProjectFile> {
        match entry {
            ContextEntry::Path(fragment) => BTreeSet::from([fragment.file().clone()]),
            ContextEntry::Virtual(fragment) => self.files_of(&fragment.sources()),
            ContextEntry::Auto(fragment) => self.files_of(&fragment.sources()),
        }
    }

    fn files_of(&self, sources: &BTreeSet<EntityId>) -> BTreeSet<ProjectFile> {
        sources
            .iter()
            .filter_map(|entity| self.graph.path_of(entity))
            .collect()
    }

    // ── Task pools ──────────────────────────────────────────────────────

    /// Queue a primary action (serialized with all other actions).
    pub fn submit_action(&self, description: impl Into<String>, job: ActionJob) -> TaskHandle {
        self.pools.submit_action(description, job)
    }

    /// Spawn a context-mutation task.
    pub fn submit_context<F>(&self, description: impl Into<String>, fut: F) -> TaskHandle
    where
        F: std::future::Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        self.pools.submit_context(description, fut)
    }

    /// Spawn a background task.
    pub fn submit_background<F>(&self, description: impl Into<String>, fut: F) -> TaskHandle
    where
        F: std::future::Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        self.pools.submit_background(description, fut)
    }

    /// Cancel the currently running primary action.
    pub fn cancel_action(&self) -> bool {
        self.pools.cancel_action()
    }

    /// Shut down the pools; in-flight work is cancelled.
    pub fn shutdown(&self) {
        self.pools.shutdown();
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn apply<F>(&self, transform: F) -> Result<Option<Context>, EngineError>
    where
        F: FnOnce(&Context) -> Result<Context, EngineError>,
    {
        let pushed = self.history.push(transform).await?;
        if let Some(context) = &pushed {
            self.persist(context);
        }
        Ok(pushed)
    }

    fn persist(&self, context: &Context) {
        if let Err(err) = self.store.save(context) {
            warn!(error = %err, "context save failed");
        }
    }
}

/// Drop nested entities whose outermost entity is also in the set.
fn coalesce_nested(entities: &BTreeSet<EntityId>) -> BTreeSet<EntityId> {
    entities
        .iter()
        .filter(|entity| {
            entity
                .outermost()
                .map_or(true, |outer| !entities.contains(&outer))
        })
        .cloned()
        .collect()
}

fn entry_description(entry: &ContextEntry) -> String {
    match entry {
        ContextEntry::Auto(fragment) => fragment.description(),
        ContextEntry::Path(fragment) => fragment.description(),
        ContextEntry::Virtual(fragment) => fragment.description(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vela_core::graph::memory::StaticGraph;

    use crate::store::JsonContextStore;
    use crate::summarizer::TruncatingSummarizer;
    use crate::tasks::TaskOutcome;

    struct Fixture {
        root: Arc<PathBuf>,
        manager: ContextManager,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = Arc::new(dir.path().to_path_buf());
        let mut graph = StaticGraph::new();
        graph.add_entity(
            "app.A",
            "class A",
            Some(ProjectFile::new(Arc::clone(&root), "a.rs")),
        );
        graph.add_entity(
            "app.A$Inner",
            "class Inner",
            Some(ProjectFile::new(Arc::clone(&root), "a.rs")),
        );
        graph.add_entity(
            "app.B",
            "class B",
            Some(ProjectFile::new(Arc::clone(&root), "b.rs")),
        );
        let manager = ContextManager::new(
            Arc::new(graph),
            Arc::new(JsonContextStore::new(Arc::clone(&root))),
            Arc::new(TruncatingSummarizer),
            &EngineConfig::default(),
        );
        Fixture {
            root,
            manager,
            _dir: dir,
        }
    }

    fn file(fx: &Fixture, rel: &str) -> ProjectFile {
        ProjectFile::new(Arc::clone(&fx.root), rel)
    }

    #[tokio::test]
    async fn edit_files_moves_out_of_readonly() {
        let fx = fixture();
        let f = file(&fx, "a.rs");
        let _ = fx.manager.read_files(vec![f.clone()]).await.unwrap();
        assert_eq!(fx.manager.top().readonly_files().len(), 1);

        let _ = fx.manager.edit_files(vec![f]).await.unwrap();
        let top = fx.manager.top();
        assert!(top.readonly_files().is_empty());
        assert_eq!(top.editable_files().len(), 1);
    }

    #[tokio::test]
    async fn repeated_edit_is_a_noop() {
        let fx = fixture();
        let f = file(&fx, "a.rs");
        assert!(fx.manager.edit_files(vec![f.clone()]).await.unwrap().is_some());
        assert!(fx.manager.edit_files(vec![f]).await.unwrap().is_none());
        assert_eq!(fx.manager.history().len(), 2);
    }

    #[tokio::test]
    async fn summarize_coalesces_nested_entities() {
        let fx = fixture();
        let entities = BTreeSet::from([EntityId::new("app.A"), EntityId::new("app.A$Inner")]);
        let top = fx
            .manager
            .summarize_entities(entities)
            .await
            .unwrap()
            .unwrap();

        match &top.virtual_fragments()[0] {
            VirtualFragment::Skeleton { entries } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].short_name, "A");
            }
            other => panic!("expected skeleton, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn summarize_unknown_symbol_aborts() {
        let fx = fixture();
        let before = fx.manager.history().len();
        let result = fx
            .manager
            .summarize_entities(BTreeSet::from([EntityId::new("app.Nope")]))
            .await;
        assert!(matches!(result, Err(EngineError::SymbolNotFound(_))));
        assert_eq!(fx.manager.history().len(), before);
    }

    #[tokio::test]
    async fn add_paste_resolves_description_in_background() {
        let fx = fixture();
        let handle = fx
            .manager
            .add_paste("a very long pasted stack trace body".into())
            .await
            .unwrap();
        assert_eq!(handle.outcome().await, TaskOutcome::Completed);

        let top = fx.manager.top();
        let VirtualFragment::Paste { description, .. } = &top.virtual_fragments()[0] else {
            panic!("expected paste fragment");
        };
        assert!(description.get().is_some());
    }

    #[tokio::test]
    async fn drop_auto_context_disables_budget() {
        let fx = fixture();
        let _ = fx.manager.edit_files(vec![file(&fx, "a.rs")]).await.unwrap();
        let auto = fx.manager.top().auto_context().clone();

        let top = fx
            .manager
            .drop_fragments(vec![ContextEntry::Auto(auto)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(top.auto_context_budget(), 0);
    }

    #[tokio::test]
    async fn record_exchange_and_undo_restore_files() {
        let fx = fixture();
        std::fs::write(fx.root.join("a.rs"), "original").unwrap();
        let f = file(&fx, "a.rs");

        let backup = BTreeMap::from([(f.clone(), Some("original".to_string()))]);
        let _ = fx
            .manager
            .record_exchange(
                vec![HistoryMessage::new(vela_core::Role::User, "change a.rs")],
                backup,
            )
            .await
            .unwrap();
        std::fs::write(fx.root.join("a.rs"), "edited").unwrap();

        let result = fx.manager.undo(1).await.unwrap();
        assert_eq!(result.restored_files, vec![f]);
        assert_eq!(
            std::fs::read_to_string(fx.root.join("a.rs")).unwrap(),
            "original"
        );
        // Undo does not erase the conversation: the log is shared.
        assert_eq!(fx.manager.top().conversation().len(), 1);
    }

    #[tokio::test]
    async fn top_context_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let root = Arc::new(dir.path().to_path_buf());
        let graph: Arc<dyn GraphProvider> = {
            let mut g = StaticGraph::new();
            g.add_entity(
                "app.A",
                "class A",
                Some(ProjectFile::new(Arc::clone(&root), "a.rs")),
            );
            Arc::new(g)
        };
        let store = Arc::new(JsonContextStore::new(Arc::clone(&root)));
        let config = EngineConfig::default();

        {
            let manager = ContextManager::new(
                Arc::clone(&graph),
                Arc::clone(&store) as Arc<dyn ContextStore>,
                Arc::new(TruncatingSummarizer),
                &config,
            );
            let _ = manager
                .edit_files(vec![ProjectFile::new(Arc::clone(&root), "a.rs")])
                .await
                .unwrap();
            manager.shutdown();
        }

        let reloaded = ContextManager::new(
            graph,
            store,
            Arc::new(TruncatingSummarizer),
            &config,
        );
        assert_eq!(reloaded.top().editable_files().len(), 1);
    }

    #[tokio::test]
    async fn files_for_fragment_resolves_through_graph() {
        let fx = fixture();
        let entry = ContextEntry::Virtual(VirtualFragment::Search {
            query: "q".into(),
            sources: BTreeSet::from([EntityId::new("app.A"), EntityId::new("app.B")]),
            content: "answer".into(),
        });
        let files = fx.manager.files_for_fragment(&entry);
        assert_eq!(files.len(), 2);
        assert!(files.contains(&file(&fx, "a.rs")));
    }
}

//! The fragment model.
//!
//! Fragments are the unit the rest of the engine manipulates: references
//! to files ([`PathFragment`]), generated or pasted content
//! ([`VirtualFragment`]), and the derived [`AutoContextFragment`] produced
//! only by the auto-context builder.
//!
//! Every fragment answers `sources()` without content I/O, a
//! `description()`, `text()` (which may fail for path fragments), and an
//! eligibility flag. Equality is by content so de-duplication works across
//! reconstructions (e.g. snapshots loaded from storage).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entity::{EntityId, ProjectFile};
use crate::errors::FragmentError;
use crate::graph::GraphProvider;

// ─────────────────────────────────────────────────────────────────────────────
// Path fragments
// ─────────────────────────────────────────────────────────────────────────────

/// A fragment wrapping a file identity.
///
/// Editable vs. read-only intent is not part of the structure: it is
/// encoded by which snapshot sequence holds the fragment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFragment {
    file: ProjectFile,
}

impl PathFragment {
    /// Wrap a project file.
    pub fn new(file: ProjectFile) -> Self {
        Self { file }
    }

    /// The wrapped file identity.
    #[must_use]
    pub fn file(&self) -> &ProjectFile {
        &self.file
    }

    /// Entities defined in the wrapped file, per the graph provider.
    pub fn sources(&self, graph: &dyn GraphProvider) -> BTreeSet<EntityId> {
        graph.entities_in(&self.file).into_iter().collect()
    }

    /// Short description (the relative path).
    #[must_use]
    pub fn description(&self) -> String {
        self.file.to_string()
    }

    /// Materialize the file contents.
    pub fn text(&self) -> Result<String, FragmentError> {
        self.file.read().map_err(|source| FragmentError::Unreadable {
            file: self.file.clone(),
            source,
        })
    }

    /// Path fragments always participate in auto-context.
    #[must_use]
    pub fn eligible_for_auto_context(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paste descriptions
// ─────────────────────────────────────────────────────────────────────────────

/// A short description of pasted content, resolved asynchronously.
///
/// The paste fragment is pushed immediately; a background summarization
/// task fills the slot in later. All clones share the slot, so the
/// snapshot sees the description once it arrives.
#[derive(Clone, Debug, Default)]
pub struct PasteDescription(Arc<OnceLock<String>>);

impl PasteDescription {
    /// A description that has not been summarized yet.
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// A description that is already known.
    pub fn resolved(text: impl Into<String>) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(text.into());
        Self(Arc::new(slot))
    }

    /// Fill the slot. Later calls are ignored (first writer wins).
    pub fn resolve(&self, text: impl Into<String>) {
        let _ = self.0.set(text.into());
    }

    /// The resolved description, if available.
    #[must_use]
    pub fn get(&self) -> Option<&str> {
        self.0.get().map(String::as_str)
    }
}

impl PartialEq for PasteDescription {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for PasteDescription {}

impl Serialize for PasteDescription {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PasteDescription {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(match value {
            Some(text) => Self::resolved(text),
            None => Self::pending(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Virtual fragments
// ─────────────────────────────────────────────────────────────────────────────

/// One labeled skeleton inside a skeleton or auto-context fragment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonEntry {
    /// Short display name of the summarized entity.
    pub short_name: String,
    /// Entities the skeleton summarizes.
    pub entities: BTreeSet<EntityId>,
    /// The textual skeleton.
    pub skeleton: String,
}

/// Generated content not backed by a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VirtualFragment {
    /// A literal string with a fixed description.
    Text {
        /// Short description.
        description: String,
        /// The content.
        content: String,
    },
    /// Pasted text; the description is summarized asynchronously.
    Paste {
        /// The pasted content.
        content: String,
        /// Lazily resolved short description.
        description: PasteDescription,
    },
    /// A stack-trace extract with the relevant method sources.
    Stacktrace {
        /// Entities whose methods appear in the trace.
        sources: BTreeSet<EntityId>,
        /// The original trace text.
        original: String,
        /// The exception type.
        exception: String,
        /// Source of the in-project methods on the trace.
        methods: String,
    },
    /// A symbol-usage (or call-graph) extract.
    Usage {
        /// What was extracted ("Uses", "Callers", "Callees").
        label: String,
        /// The symbol the extract is about.
        target: String,
        /// Entities the extract references.
        sources: BTreeSet<EntityId>,
        /// The extracted code.
        code: String,
    },
    /// Class skeletons produced by an explicit summarize request.
    Skeleton {
        /// The labeled skeletons, in request order.
        entries: Vec<SkeletonEntry>,
    },
    /// A captured search result (conversation capture).
    Search {
        /// The query that produced it.
        query: String,
        /// Entities referenced by the answer.
        sources: BTreeSet<EntityId>,
        /// The answer text.
        content: String,
    },
}

impl VirtualFragment {
    /// Entities this fragment references. Never performs I/O.
    #[must_use]
    pub fn sources(&self) -> BTreeSet<EntityId> {
        match self {
            Self::Text { .. } | Self::Paste { .. } => BTreeSet::new(),
            Self::Stacktrace { sources, .. }
            | Self::Usage { sources, .. }
            | Self::Search { sources, .. } => sources.clone(),
            Self::Skeleton { entries } => entries
                .iter()
                .flat_map(|e| e.entities.iter().cloned())
                .collect(),
        }
    }

    /// Short description for display.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Text { description, .. } => description.clone(),
            Self::Paste { description, .. } => match description.get() {
                Some(text) => format!("Paste of {text}"),
                None => "Paste of (summarizing...)".to_string(),
            },
            Self::Stacktrace { exception, .. } => format!("Stacktrace of {exception}"),
            Self::Usage { label, target, .. } => format!("{label} of {target}"),
            Self::Skeleton { entries } => {
                let names: Vec<_> = entries.iter().map(|e| e.short_name.as_str()).collect();
                format!("Summary of {}", names.join(", "))
            }
            Self::Search { query, .. } => format!("Search: {query}"),
        }
    }

    /// Materialize the fragment text. Virtual fragments never fail.
    pub fn text(&self) -> Result<String, FragmentError> {
        Ok(match self {
            Self::Text { content, .. } | Self::Paste { content, .. } => content.clone(),
            Self::Stacktrace {
                original, methods, ..
            } => {
                format!("{original}\n\nRelevant methods:\n\n{methods}")
            }
            Self::Usage { code, .. } => code.clone(),
            Self::Skeleton { entries } => entries
                .iter()
                .map(|e| e.skeleton.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            Self::Search { content, .. } => content.clone(),
        })
    }

    /// Whether the fragment's entities seed auto-context normally.
    ///
    /// Skeleton and search captures are ineligible: their entities are
    /// excluded from auto-context output, since their content already
    /// covers those entities.
    #[must_use]
    pub fn eligible_for_auto_context(&self) -> bool {
        !matches!(self, Self::Skeleton { .. } | Self::Search { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auto-context
// ─────────────────────────────────────────────────────────────────────────────

/// The derived fragment produced by the auto-context builder.
///
/// `Disabled` and `Empty` are the two sentinel states: the feature is off,
/// or it ran and found nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AutoContextFragment {
    /// Budget is zero; no computation was attempted.
    Disabled,
    /// Computed, found nothing.
    Empty,
    /// Ranked skeletons, highest relevance first.
    Entries(Vec<SkeletonEntry>),
}

impl AutoContextFragment {
    /// Whether the fragment carries skeletons.
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Entries(_))
    }

    /// Ordered short display names of the summarized entities.
    #[must_use]
    pub fn short_names(&self) -> Vec<&str> {
        match self {
            Self::Entries(entries) => entries.iter().map(|e| e.short_name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Entities the fragment summarizes.
    #[must_use]
    pub fn sources(&self) -> BTreeSet<EntityId> {
        match self {
            Self::Entries(entries) => entries
                .iter()
                .flat_map(|e| e.entities.iter().cloned())
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Combined skeleton text, in ranked order.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Entries(entries) => entries
                .iter()
                .map(|e| e.skeleton.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            _ => String::new(),
        }
    }

    /// Short description for display.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Disabled => "Auto-context (disabled)".to_string(),
            Self::Empty => "Auto-context (empty)".to_string(),
            Self::Entries(_) => format!("Auto-context: {}", self.short_names().join(", ")),
        }
    }
}

impl fmt::Display for AutoContextFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

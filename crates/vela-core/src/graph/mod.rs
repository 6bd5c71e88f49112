//! Boundary to the code-relationship graph.
//!
//! The engine never builds or inspects the graph itself; it consumes it
//! through [`GraphProvider`]: a personalized-ranking query plus entity
//! lookups. [`memory::StaticGraph`] is an in-memory implementation used by
//! tests and standalone setups.

pub mod memory;

use std::collections::BTreeMap;

use crate::entity::{EntityId, ProjectFile};

/// Errors from the graph collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph cannot answer right now (rebuilding, gone, etc.).
    ///
    /// Auto-context degrades to its empty sentinel on this error; it never
    /// blocks the rest of a push.
    #[error("graph unavailable: {0}")]
    Unavailable(String),
}

/// Ranking and lookup interface over the code-relationship graph.
///
/// `rank` must be stable for identical inputs within one graph generation;
/// any randomness lives entirely behind this trait.
pub trait GraphProvider: Send + Sync {
    /// Personalized-ranking query: entity ids by descending relevance to
    /// the weighted seed set, at most `limit` results.
    fn rank(
        &self,
        seeds: &BTreeMap<EntityId, f64>,
        limit: usize,
    ) -> Result<Vec<EntityId>, GraphError>;

    /// Whether the entity belongs to the project (as opposed to a
    /// dependency or the standard library).
    fn is_project_entity(&self, entity: &EntityId) -> bool;

    /// Textual skeleton of the entity, if one can be produced.
    fn skeleton_of(&self, entity: &EntityId) -> Option<String>;

    /// The file defining the entity, if known.
    fn path_of(&self, entity: &EntityId) -> Option<ProjectFile>;

    /// Entities defined in the given file.
    fn entities_in(&self, file: &ProjectFile) -> Vec<EntityId>;
}

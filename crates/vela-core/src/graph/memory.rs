//! In-memory graph provider.
//!
//! [`StaticGraph`] holds an explicit adjacency list and answers ranking
//! queries with a deterministic personalized PageRank (fixed iteration
//! count, ties broken by entity order). Built for tests; usable wherever a
//! real graph backend is not wired up.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::entity::{EntityId, ProjectFile};

use super::{GraphError, GraphProvider};

/// Damping factor for the personalized random walk.
const DAMPING: f64 = 0.85;
/// Power-iteration count. Small graphs converge well before this.
const ITERATIONS: usize = 25;

/// In-memory [`GraphProvider`] over an explicit adjacency list.
#[derive(Debug, Default)]
pub struct StaticGraph {
    edges: BTreeMap<EntityId, Vec<EntityId>>,
    skeletons: BTreeMap<EntityId, String>,
    files: BTreeMap<EntityId, ProjectFile>,
    project: BTreeSet<EntityId>,
    unavailable: AtomicBool,
}

impl StaticGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project entity with its skeleton and defining file.
    pub fn add_entity(
        &mut self,
        entity: impl Into<EntityId>,
        skeleton: impl Into<String>,
        file: Option<ProjectFile>,
    ) {
        let entity = entity.into();
        let _ = self.skeletons.insert(entity.clone(), skeleton.into());
        if let Some(file) = file {
            let _ = self.files.insert(entity.clone(), file);
        }
        let _ = self.project.insert(entity.clone());
        let _ = self.edges.entry(entity).or_default();
    }

    /// Register an entity outside the project (no skeleton, never ranked in).
    pub fn add_external(&mut self, entity: impl Into<EntityId>) {
        let _ = self.edges.entry(entity.into()).or_default();
    }

    /// Add a directed relationship edge.
    pub fn add_edge(&mut self, from: impl Into<EntityId>, to: impl Into<EntityId>) {
        let to = to.into();
        self.edges.entry(from.into()).or_default().push(to.clone());
        let _ = self.edges.entry(to).or_default();
    }

    /// Toggle simulated unavailability (ranking errors out while set).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn personalized_pagerank(&self, seeds: &BTreeMap<EntityId, f64>) -> BTreeMap<EntityId, f64> {
        let total: f64 = seeds.values().sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        let teleport: BTreeMap<EntityId, f64> = seeds
            .iter()
            .map(|(id, w)| (id.clone(), w / total))
            .collect();

        let mut scores: BTreeMap<EntityId, f64> = self
            .edges
            .keys()
            .map(|id| {
                let seed = teleport.get(id).copied().unwrap_or(0.0);
                (id.clone(), seed)
            })
            .collect();
        // Seeds the graph has never seen still get teleport mass.
        for (id, w) in &teleport {
            let _ = scores.entry(id.clone()).or_insert(*w);
        }

        for _ in 0..ITERATIONS {
            let mut next: BTreeMap<EntityId, f64> = scores
                .keys()
                .map(|id| {
                    let seed = teleport.get(id).copied().unwrap_or(0.0);
                    (id.clone(), (1.0 - DAMPING) * seed)
                })
                .collect();
            let mut dangling = 0.0;
            for (id, score) in &scores {
                match self.edges.get(id).filter(|out| !out.is_empty()) {
                    Some(out) => {
                        let share = DAMPING * score / out.len() as f64;
                        for target in out {
                            *next.entry(target.clone()).or_insert(0.0) += share;
                        }
                    }
                    None => dangling += DAMPING * score,
                }
            }
            // Dangling mass teleports back to the seeds.
            for (id, w) in &teleport {
                *next.entry(id.clone()).or_insert(0.0) += dangling * *w;
            }
            scores = next;
        }
        scores
    }
}

impl GraphProvider for StaticGraph {
    fn rank(
        &self,
        seeds: &BTreeMap<EntityId, f64>,
        limit: usize,
    ) -> Result<Vec<EntityId>, GraphError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::Unavailable("static graph marked offline".into()));
        }
        let scores = self.personalized_pagerank(seeds);
        let mut ranked: Vec<(EntityId, f64)> =
            scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        // Descending score; entity order breaks ties deterministically.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(limit).map(|(id, _)| id).collect())
    }

    fn is_project_entity(&self, entity: &EntityId) -> bool {
        self.project.contains(entity)
    }

    fn skeleton_of(&self, entity: &EntityId) -> Option<String> {
        self.skeletons.get(entity).cloned()
    }

    fn path_of(&self, entity: &EntityId) -> Option<ProjectFile> {
        self.files.get(entity).cloned()
    }

    fn entities_in(&self, file: &ProjectFile) -> Vec<EntityId> {
        self.files
            .iter()
            .filter(|(_, f)| *f == file)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

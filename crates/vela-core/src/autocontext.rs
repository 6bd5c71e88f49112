//! The auto-context builder.
//!
//! Given a snapshot's fragments, produce a derived fragment summarizing the
//! most structurally relevant code entities: the fragments' own entities
//! become weighted ranking seeds, the graph provider orders candidates, and
//! the top skeletons (up to the budget) form the result.
//!
//! Deterministic given an identical ranking response. A missing skeleton
//! for a ranked entity is skipped silently; a ranking failure degrades to
//! the empty sentinel and never blocks the surrounding push.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::entity::EntityId;
use crate::fragment::{AutoContextFragment, PathFragment, SkeletonEntry, VirtualFragment};
use crate::graph::GraphProvider;

/// Build the auto-context fragment for the given fragment sequences.
pub fn build(
    editable: &[PathFragment],
    readonly: &[PathFragment],
    virtuals: &[VirtualFragment],
    budget: usize,
    graph: &dyn GraphProvider,
) -> AutoContextFragment {
    if budget == 0 {
        return AutoContextFragment::Disabled;
    }

    let excluded = excluded_entities(editable, readonly, virtuals, graph);
    let seeds = weighted_seeds(editable, readonly, virtuals, graph);
    if seeds.is_empty() {
        return AutoContextFragment::Empty;
    }

    // Generous cap: post-filtering (excluded / out-of-project entities)
    // eats into the ranked list.
    let ranked = match graph.rank(&seeds, budget * 2) {
        Ok(ranked) => ranked,
        Err(err) => {
            warn!(error = %err, "ranking unavailable, auto-context degrades to empty");
            return AutoContextFragment::Empty;
        }
    };

    let mut entries = Vec::new();
    for entity in ranked {
        if is_excluded(&entity, &excluded) || !graph.is_project_entity(&entity) {
            continue;
        }
        if let Some(skeleton) = graph.skeleton_of(&entity) {
            entries.push(SkeletonEntry {
                short_name: entity.short_name().to_string(),
                entities: BTreeSet::from([entity]),
                skeleton,
            });
        }
        if entries.len() >= budget {
            break;
        }
    }

    if entries.is_empty() {
        AutoContextFragment::Empty
    } else {
        AutoContextFragment::Entries(entries)
    }
}

/// Entities referenced by ineligible fragments; excluded from the result
/// even if highly ranked. Exclusion covers nested entities via the
/// enclosing chain.
fn excluded_entities(
    editable: &[PathFragment],
    readonly: &[PathFragment],
    virtuals: &[VirtualFragment],
    graph: &dyn GraphProvider,
) -> BTreeSet<EntityId> {
    let mut excluded = BTreeSet::new();
    for frag in editable.iter().chain(readonly) {
        if !frag.eligible_for_auto_context() {
            excluded.extend(frag.sources(graph));
        }
    }
    for frag in virtuals {
        if !frag.eligible_for_auto_context() {
            excluded.extend(frag.sources());
        }
    }
    excluded
}

fn is_excluded(entity: &EntityId, excluded: &BTreeSet<EntityId>) -> bool {
    entity.enclosing_chain().any(|e| excluded.contains(&e))
}

/// Seed weights: each editable entity weighs 1.0; read-only and virtual
/// fragments together split a weight of 1.0, each contributing `1.0 / k`
/// per referenced entity (`k` = read-only + virtual fragment count),
/// summed on top of any editable weight.
fn weighted_seeds(
    editable: &[PathFragment],
    readonly: &[PathFragment],
    virtuals: &[VirtualFragment],
    graph: &dyn GraphProvider,
) -> BTreeMap<EntityId, f64> {
    let mut seeds = BTreeMap::new();
    for frag in editable {
        for entity in frag.sources(graph) {
            let _ = seeds.insert(entity, 1.0);
        }
    }

    let split_count = readonly.len() + virtuals.len();
    if split_count == 0 {
        return seeds;
    }
    let share = 1.0 / split_count as f64;
    let readonly_sources = readonly.iter().flat_map(|f| f.sources(graph));
    let virtual_sources = virtuals.iter().flat_map(VirtualFragment::sources);
    for entity in readonly_sources.chain(virtual_sources) {
        *seeds.entry(entity).or_insert(0.0) += share;
    }
    seeds
}

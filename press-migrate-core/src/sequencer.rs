//! Ordering policy: which families go first, and in which order (and which
//! batches) the entities of a hierarchical family are written.
//!
//! Families run in dependency order so that references resolve on the first
//! pass: authors, then flat taxonomies, then hierarchical taxonomies, then
//! posts (which reference all of those), then pages (which may link to
//! posts). Media is migrated in its own phase before any of these.
//!
//! Inside a hierarchical family every entity is placed after its parent.
//! Batching also breaks at every depth change, so a parent and its child never
//! share a batch and the parent's mapping is committed before the child is
//! written.

use std::collections::HashMap;

use crate::source::{Family, SourceEntity, SourceId};

/// Entry families in migration order. Media is not included: assets have
/// their own phase.
pub const ENTRY_FAMILY_ORDER: [Family; 5] = [
    Family::Authors,
    Family::Tags,
    Family::Categories,
    Family::Posts,
    Family::Pages,
];

pub fn entry_family_order() -> &'static [Family] {
    &ENTRY_FAMILY_ORDER
}

/// Depth of each entity within its family. Roots, orphans (parent not in the
/// snapshot) and members of parent cycles are depth 0.
pub fn depths(entities: &[SourceEntity]) -> HashMap<SourceId, usize> {
    let parents: HashMap<SourceId, Option<SourceId>> =
        entities.iter().map(|e| (e.id, e.parent_id())).collect();
    let mut depths: HashMap<SourceId, usize> = HashMap::with_capacity(entities.len());

    for entity in entities {
        if depths.contains_key(&entity.id) {
            continue;
        }
        // Walk up until a known depth, a root or a cycle.
        let mut chain = vec![entity.id];
        let mut base = 0;
        let mut cursor = entity.id;
        loop {
            match parents.get(&cursor).copied().flatten() {
                Some(parent) if parents.contains_key(&parent) => {
                    if let Some(known) = depths.get(&parent) {
                        base = known + 1;
                        break;
                    }
                    if chain.contains(&parent) {
                        break;
                    }
                    chain.push(parent);
                    cursor = parent;
                }
                _ => break,
            }
        }
        // `chain` runs child -> ancestor; assign from the top down.
        for (offset, id) in chain.iter().rev().enumerate() {
            depths.entry(*id).or_insert(base + offset);
        }
    }
    depths
}

/// Sorts a family for processing: parents before children, then by parent
/// id, then by id, so the order is stable across runs.
pub fn order_family(family: Family, mut entities: Vec<SourceEntity>) -> Vec<SourceEntity> {
    if !family.is_hierarchical() {
        entities.sort_by_key(|e| e.id);
        return entities;
    }
    let depths = depths(&entities);
    entities.sort_by_key(|e| {
        (
            depths.get(&e.id).copied().unwrap_or(0),
            e.parent_id().unwrap_or(0),
            e.id,
        )
    });
    entities
}

/// Splits ordered entities into batches of at most `batch_size`. For
/// hierarchical families a new batch also starts whenever depth changes.
pub fn plan_batches(
    family: Family,
    entities: Vec<SourceEntity>,
    batch_size: usize,
) -> Vec<Vec<SourceEntity>> {
    let batch_size = batch_size.max(1);
    let depths = if family.is_hierarchical() {
        depths(&entities)
    } else {
        HashMap::new()
    };
    let depth_of = |e: &SourceEntity| depths.get(&e.id).copied().unwrap_or(0);

    let mut batches: Vec<Vec<SourceEntity>> = Vec::new();
    let mut current: Vec<SourceEntity> = Vec::new();
    let mut current_depth = None;

    for entity in entities {
        let depth = depth_of(&entity);
        let depth_changed = current_depth.is_some_and(|d| d != depth);
        if current.len() >= batch_size || depth_changed {
            batches.push(std::mem::take(&mut current));
        }
        current_depth = Some(depth);
        current.push(entity);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: SourceId, parent: SourceId) -> SourceEntity {
        SourceEntity {
            parent: Some(parent),
            ..SourceEntity::new(id, format!("page {id}"))
        }
    }

    #[test]
    fn cycles_do_not_hang_and_land_at_depth_zero_or_above() {
        let entities = vec![page(1, 2), page(2, 1), page(3, 0)];
        let d = depths(&entities);
        assert_eq!(d.len(), 3);
        assert_eq!(d[&3], 0);
    }

    #[test]
    fn orphans_count_as_roots() {
        let d = depths(&[page(5, 99)]);
        assert_eq!(d[&5], 0);
    }
}

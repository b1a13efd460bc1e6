//! Parent-link checks for self-referencing tables (categories, pages).

use std::collections::{HashMap, HashSet};

/// Whether re-parenting `node` under `new_parent` would close a loop.
///
/// `parents` maps every row id to its current parent. Walks up from
/// `new_parent`; an already corrupted chain stops the walk instead of
/// looping forever.
pub fn creates_cycle(parents: &HashMap<i64, Option<i64>>, node: i64, new_parent: i64) -> bool {
    let mut seen = HashSet::new();
    let mut current = Some(new_parent);

    while let Some(id) = current {
        if id == node {
            return true;
        }
        if !seen.insert(id) {
            return false;
        }
        current = parents.get(&id).copied().flatten();
    }

    false
}

use std::collections::HashSet;
use std::sync::Arc;

use super::item::{identity_key, Item, ItemRef};
use crate::feed::Entry;

/// Appends every entry whose identity key is not already present.
///
/// Existing items are never modified, removed or reordered, and an entry seen
/// twice in the same batch is only added once. Returns the number of items
/// appended; ordering is left to the caller.
pub fn merge(existing: &mut Vec<ItemRef>, incoming: &[Entry]) -> usize {
    let mut seen: HashSet<String> = existing.iter().map(|i| i.key().to_owned()).collect();
    let before = existing.len();

    for entry in incoming {
        let key = identity_key(entry);
        if seen.contains(&key) {
            continue;
        }
        existing.push(Arc::new(Item::from_entry(entry)));
        seen.insert(key);
    }

    existing.len() - before
}

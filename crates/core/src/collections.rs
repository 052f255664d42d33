//! Small collection helpers shared by the matching engine.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,
}

/// Deduplicate items by a derived key.
///
/// The first item seen for each key wins; input order is preserved.
pub fn unique_by<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

/// Group items by a derived key.
///
/// Groups are returned in order of first appearance of their key, and items
/// keep their relative order inside each group.
pub fn group_by<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<(K, Vec<T>)>
where
    K: Eq + Hash + Clone,
    F: FnMut(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();

    for item in items {
        let k = key(&item);
        match index.get(&k) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![item]));
            }
        }
    }

    groups
}

/// Split items into chunks of `size`. The last chunk may be shorter.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Result<Vec<Vec<T>>, CollectionError> {
    if size == 0 {
        return Err(CollectionError::ZeroChunkSize);
    }
    Ok(items.chunks(size).map(<[T]>::to_vec).collect())
}

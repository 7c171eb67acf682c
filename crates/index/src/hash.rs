//! Hash index implementation.
//!
//! This module provides a hash-based index for O(1) point queries, used by
//! unique constraints and primary key lookups.

use crate::traits::{Index, IndexError};
use core::hash::Hash;
use hashbrown::HashMap;
use tabula_core::RowId;

/// A hash-based index for O(1) point queries.
///
/// This index uses a HashMap internally and supports both unique and non-unique indexes.
#[derive(Clone, Debug)]
pub struct HashIndex<K> {
    /// The underlying map from keys to row IDs.
    map: HashMap<K, Vec<RowId>>,
    /// Whether this is a unique index.
    unique: bool,
    /// Number of (key, row) entries.
    entries: usize,
}

impl<K: Eq + Hash + Clone> HashIndex<K> {
    /// Creates a new hash index.
    pub fn new(unique: bool) -> Self {
        Self {
            map: HashMap::new(),
            unique,
            entries: 0,
        }
    }

    /// Returns whether this is a unique index.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns a row other than `except` that holds `key`.
    pub fn conflict(&self, key: &K, except: Option<RowId>) -> Option<RowId> {
        self.map
            .get(key)
            .and_then(|rows| rows.iter().copied().find(|&r| Some(r) != except))
    }

    /// Returns the first row holding `key`.
    pub fn get_one(&self, key: &K) -> Option<RowId> {
        self.map.get(key).and_then(|rows| rows.first().copied())
    }

    /// Iterates over keys held by more than one row.
    pub fn duplicates(&self) -> impl Iterator<Item = (&K, &[RowId])> {
        self.map
            .iter()
            .filter(|(_, rows)| rows.len() > 1)
            .map(|(k, rows)| (k, rows.as_slice()))
    }
}

impl<K: Eq + Hash + Clone> Index<K> for HashIndex<K> {
    fn add(&mut self, key: K, value: RowId) -> Result<(), IndexError> {
        if self.unique {
            if let Some(existing) = self.conflict(&key, Some(value)) {
                return Err(IndexError::DuplicateKey { existing });
            }
        }
        let rows = self.map.entry(key).or_default();
        if !rows.contains(&value) {
            rows.push(value);
            self.entries += 1;
        }
        Ok(())
    }

    fn get(&self, key: &K) -> Vec<RowId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn remove(&mut self, key: &K, value: Option<RowId>) {
        match value {
            Some(v) => {
                if let Some(values) = self.map.get_mut(key) {
                    let original_len = values.len();
                    values.retain(|&x| x != v);
                    self.entries -= original_len - values.len();
                    if values.is_empty() {
                        self.map.remove(key);
                    }
                }
            }
            None => {
                if let Some(values) = self.map.remove(key) {
                    self.entries -= values.len();
                }
            }
        }
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn clear(&mut self) {
        self.map.clear();
        self.entries = 0;
    }
}

/// Builds a unique index, failing on the first duplicate.
pub fn build_unique<K, I>(entries: I) -> Result<HashIndex<K>, IndexError>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = (K, RowId)>,
{
    let mut index = HashIndex::new(true);
    for (key, row) in entries {
        index.add(key, row)?;
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::Value;

    #[test]
    fn test_hash_index_unique() {
        let mut index: HashIndex<i32> = HashIndex::new(true);
        index.add(10, 100).unwrap();
        assert_eq!(index.add(10, 200), Err(IndexError::DuplicateKey { existing: 100 }));
        // Re-adding the same row under its own key is a no-op.
        index.add(10, 100).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_hash_index_non_unique() {
        let mut index: HashIndex<i32> = HashIndex::new(false);
        index.add(10, 100).unwrap();
        index.add(10, 200).unwrap();
        assert_eq!(index.get(&10), vec![100, 200]);
        assert_eq!(index.duplicates().count(), 1);
    }

    #[test]
    fn test_hash_index_remove() {
        let mut index: HashIndex<i32> = HashIndex::new(false);
        index.add(10, 100).unwrap();
        index.add(10, 200).unwrap();
        index.remove(&10, Some(100));
        assert_eq!(index.get(&10), vec![200]);
        index.remove(&10, None);
        assert!(!index.contains_key(&10));
        assert!(index.is_empty());
    }

    #[test]
    fn test_conflict_excludes_self() {
        let mut index: HashIndex<Vec<Value>> = HashIndex::new(true);
        let key = vec![Value::Int32(1), Value::Null];
        index.add(key.clone(), 5).unwrap();
        assert_eq!(index.conflict(&key, Some(5)), None);
        assert_eq!(index.conflict(&key, Some(6)), Some(5));
        assert_eq!(index.conflict(&key, None), Some(5));
    }

    #[test]
    fn test_null_keys_collide() {
        let mut index: HashIndex<Vec<Value>> = HashIndex::new(true);
        index.add(vec![Value::Null], 1).unwrap();
        assert!(index.add(vec![Value::Null], 2).is_err());
    }

    #[test]
    fn test_build_unique() {
        assert!(build_unique(vec![(1, 1), (2, 2)]).is_ok());
        assert!(build_unique(vec![(1, 1), (1, 2)]).is_err());
    }
}

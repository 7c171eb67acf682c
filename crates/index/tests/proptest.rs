//! Property-based tests for tabula-index using proptest.

use proptest::prelude::*;
use tabula_core::Value;
use tabula_index::{HashIndex, Index, MultiKeyComparator, Order, SortedIndex};

fn sorted_keys(index: &SortedIndex, keys: &[i64]) -> Vec<i64> {
    index.row_ids().map(|r| keys[r as usize]).collect()
}

proptest! {
    /// Inserting in any order yields a sequence sorted by (key, row id).
    #[test]
    fn sorted_insert_is_ordered(keys in prop::collection::vec(0i64..50, 1..200)) {
        let mut index = SortedIndex::new(MultiKeyComparator::new(vec![Order::Asc], true));
        for (i, &key) in keys.iter().enumerate() {
            index.insert(vec![Value::Int64(key)], i as u64);
        }
        let mut expected: Vec<(i64, u64)> = keys.iter().enumerate().map(|(i, &k)| (k, i as u64)).collect();
        expected.sort();
        let actual: Vec<u64> = index.row_ids().collect();
        prop_assert_eq!(actual, expected.iter().map(|(_, r)| *r).collect::<Vec<_>>());
    }

    /// Incremental inserts and removes agree with a bulk rebuild.
    #[test]
    fn sorted_incremental_matches_rebuild(
        keys in prop::collection::vec(-20i64..20, 1..100),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..30)
    ) {
        let cmp = MultiKeyComparator::new(vec![Order::Desc], true);
        let mut index = SortedIndex::new(cmp.clone());
        for (i, &key) in keys.iter().enumerate() {
            index.insert(vec![Value::Int64(key)], i as u64);
        }
        let mut live: Vec<bool> = vec![true; keys.len()];
        for pick in removals {
            let row = pick.index(keys.len());
            let removed = index.remove(&[Value::Int64(keys[row])], row as u64);
            prop_assert_eq!(removed.is_some(), live[row]);
            live[row] = false;
        }
        let rebuilt = SortedIndex::from_entries(
            cmp,
            keys.iter()
                .enumerate()
                .filter(|(i, _)| live[*i])
                .map(|(i, &k)| (vec![Value::Int64(k)], i as u64))
                .collect(),
        );
        prop_assert_eq!(sorted_keys(&index, &keys), sorted_keys(&rebuilt, &keys));
        prop_assert_eq!(index.row_ids().collect::<Vec<_>>(), rebuilt.row_ids().collect::<Vec<_>>());
    }

    /// A unique hash index accepts a key set exactly when it has no duplicates.
    #[test]
    fn unique_hash_rejects_duplicates(keys in prop::collection::vec(0i64..30, 1..60)) {
        let mut index: HashIndex<i64> = HashIndex::new(true);
        let mut seen = std::collections::HashSet::new();
        for (i, &key) in keys.iter().enumerate() {
            let fresh = seen.insert(key);
            prop_assert_eq!(index.add(key, i as u64).is_ok(), fresh);
        }
        prop_assert_eq!(index.len(), seen.len());
    }
}

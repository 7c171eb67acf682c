//! Sorted index backing live views.
//!
//! Entries are kept in a vector ordered by (sort key, row id). Single-row
//! maintenance is a binary search plus a vector shift, which keeps positions
//! addressable for views.

use crate::comparator::MultiKeyComparator;
use core::cmp::Ordering;
use core::ops::Range;
use tabula_core::{RowId, Value};

/// An ordered sequence of row ids keyed by sort values.
///
/// Ties in the sort key are broken by row id, so rows with equal keys keep
/// table order.
#[derive(Clone, Debug)]
pub struct SortedIndex {
    entries: Vec<(Vec<Value>, RowId)>,
    comparator: MultiKeyComparator,
}

impl SortedIndex {
    /// Creates an empty index.
    pub fn new(comparator: MultiKeyComparator) -> Self {
        Self {
            entries: Vec::new(),
            comparator,
        }
    }

    /// Creates an index from unordered entries.
    pub fn from_entries(comparator: MultiKeyComparator, mut entries: Vec<(Vec<Value>, RowId)>) -> Self {
        entries.sort_by(|a, b| Self::order(&comparator, a, b));
        Self { entries, comparator }
    }

    fn order(cmp: &MultiKeyComparator, a: &(Vec<Value>, RowId), b: &(Vec<Value>, RowId)) -> Ordering {
        cmp.compare_slices(&a.0, &b.0).then(a.1.cmp(&b.1))
    }

    fn search(&self, key: &[Value], row: RowId) -> Result<usize, usize> {
        self.entries.binary_search_by(|(k, r)| {
            self.comparator
                .compare_slices(k, key)
                .then(r.cmp(&row))
        })
    }

    /// Returns the comparator.
    pub fn comparator(&self) -> &MultiKeyComparator {
        &self.comparator
    }

    /// Inserts a row and returns its position.
    pub fn insert(&mut self, key: Vec<Value>, row: RowId) -> usize {
        match self.search(&key, row) {
            Ok(pos) => {
                self.entries[pos].0 = key;
                pos
            }
            Err(pos) => {
                self.entries.insert(pos, (key, row));
                pos
            }
        }
    }

    /// Removes a row, returning its former position.
    ///
    /// `key` is the key the row was inserted with; if it does not match the
    /// row is located by scan.
    pub fn remove(&mut self, key: &[Value], row: RowId) -> Option<usize> {
        let pos = match self.search(key, row) {
            Ok(pos) => pos,
            Err(_) => self.position_of(row)?,
        };
        self.entries.remove(pos);
        Some(pos)
    }

    /// Returns the position of a row by scan.
    pub fn position_of(&self, row: RowId) -> Option<usize> {
        self.entries.iter().position(|(_, r)| *r == row)
    }

    /// Returns the key a row is currently stored under.
    pub fn key_of(&self, row: RowId) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(_, r)| *r == row)
            .map(|(k, _)| k.as_slice())
    }

    /// Returns the row id at a position.
    pub fn get(&self, pos: usize) -> Option<RowId> {
        self.entries.get(pos).map(|(_, r)| *r)
    }

    /// Positions of all entries whose key equals `key`.
    pub fn equal_range(&self, key: &[Value]) -> Range<usize> {
        let start = self
            .entries
            .partition_point(|(k, _)| self.comparator.compare_slices(k, key) == Ordering::Less);
        let end = self
            .entries
            .partition_point(|(k, _)| self.comparator.compare_slices(k, key) != Ordering::Greater);
        start..end.max(start)
    }

    /// Iterates row ids in order.
    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.entries.iter().map(|(_, r)| *r)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Index trait shared by the key indexes.

use tabula_core::RowId;
use thiserror::Error;

/// Core trait for key to row-id indexes.
pub trait Index<K> {
    /// Adds a key-value pair to the index.
    /// For unique indexes, this will fail if the key already maps to another row.
    fn add(&mut self, key: K, value: RowId) -> Result<(), IndexError>;

    /// Gets all row IDs associated with a key.
    fn get(&self, key: &K) -> Vec<RowId>;

    /// Removes a key (and optionally a specific value) from the index.
    /// If value is None, removes all values for the key.
    fn remove(&mut self, key: &K, value: Option<RowId>);

    /// Checks if the index contains the given key.
    fn contains_key(&self, key: &K) -> bool;

    /// Returns the number of entries in the index.
    fn len(&self) -> usize;

    /// Returns true if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all entries from the index.
    fn clear(&mut self);
}

/// Error type for index operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Attempted to insert a duplicate key in a unique index.
    #[error("duplicate key in unique index (held by row {existing})")]
    DuplicateKey { existing: RowId },
}

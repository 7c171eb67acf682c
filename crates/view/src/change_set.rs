//! Change sets delivered to view subscribers.
//!
//! A ChangeSet is the difference between two states of a view: which rows
//! entered it, which left it, and which stayed but changed value or
//! position.

use tabula_core::RowId;

/// Changes to a view's rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Rows that entered the view
    pub added: Vec<RowId>,
    /// Rows that left the view
    pub removed: Vec<RowId>,
    /// Rows still in the view whose values or position changed
    pub modified: Vec<RowId>,
    /// The view's order after the change
    pub current_result: Vec<RowId>,
}

impl ChangeSet {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A change set for a freshly built view: every row is an addition.
    pub fn initial(rows: Vec<RowId>) -> Self {
        Self {
            added: rows.clone(),
            removed: Vec::new(),
            modified: Vec::new(),
            current_result: rows,
        }
    }

    /// The difference between an old and a new order. Rows in both whose
    /// relative order changed are reported as modified.
    pub fn diff(old: &[RowId], new: Vec<RowId>) -> Self {
        let before: hashbrown::HashSet<RowId> = old.iter().copied().collect();
        let after: hashbrown::HashSet<RowId> = new.iter().copied().collect();
        let removed = old.iter().copied().filter(|r| !after.contains(r)).collect();
        let added = new.iter().copied().filter(|r| !before.contains(r)).collect();
        let kept_old = old.iter().copied().filter(|r| after.contains(r));
        let kept_new = new.iter().copied().filter(|r| before.contains(r));
        let modified = kept_old
            .zip(kept_new)
            .filter(|(a, b)| a != b)
            .map(|(_, b)| b)
            .collect();
        Self {
            added,
            removed,
            modified,
            current_result: new,
        }
    }

    /// Returns true if no row entered, left or changed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

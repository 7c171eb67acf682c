//! Row change notifications.
//!
//! Every mutating table operation collects [`TableChange`] records while it
//! runs and publishes them through the table's [`ChangeFeed`] once the
//! operation has succeeded. A failed operation publishes nothing.

use crate::table::DataTable;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tabula_core::RowId;

/// What happened to a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowAction {
    /// The row was added.
    Add,
    /// Current values changed.
    Change,
    /// The row was marked deleted.
    Delete,
    /// The row was physically removed.
    Remove,
    /// Changes were accepted.
    Commit,
    /// Changes were rejected.
    Rollback,
}

/// A change published by a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableChange {
    /// One row changed.
    Row { row: RowId, action: RowAction },
    /// Rows or schema changed wholesale (clear, merge, load, column edits).
    Reset,
}

impl TableChange {
    pub fn row(row: RowId, action: RowAction) -> Self {
        TableChange::Row { row, action }
    }
}

/// Receiver of table changes.
///
/// Listeners get shared access to the table after the change has been
/// applied; they cannot mutate it from inside a notification.
pub trait ChangeListener {
    fn on_change(&mut self, table: &DataTable, change: TableChange);
}

/// Identifier returned by [`ChangeFeed::subscribe`].
pub type ListenerId = u64;

/// Weakly held list of change listeners.
#[derive(Default)]
pub struct ChangeFeed {
    listeners: Vec<(ListenerId, Weak<RefCell<dyn ChangeListener>>)>,
    next_id: ListenerId,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. The feed keeps only a weak reference, so a
    /// dropped listener is pruned on the next publish.
    pub fn subscribe(&mut self, listener: &Rc<RefCell<dyn ChangeListener>>) -> ListenerId {
        self.next_id += 1;
        self.listeners.push((self.next_id, Rc::downgrade(listener)));
        self.next_id
    }

    /// Removes a listener. Returns true if it was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.listeners.iter().filter(|(_, l)| l.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops listeners whose owner is gone.
    pub fn prune(&mut self) {
        self.listeners.retain(|(_, l)| l.strong_count() > 0);
    }

    /// Delivers `change` to every live listener.
    ///
    /// A listener that is already borrowed (a view being iterated while the
    /// table changes) is skipped; it is stale until its next rebuild.
    pub fn publish(&self, table: &DataTable, change: TableChange) {
        for (_, listener) in &self.listeners {
            if let Some(listener) = listener.upgrade() {
                if let Ok(mut l) = listener.try_borrow_mut() {
                    l.on_change(table, change);
                }
            }
        }
    }
}

impl core::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

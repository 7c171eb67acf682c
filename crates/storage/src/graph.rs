//! Table graph abstraction used by the cascade engine.
//!
//! A standalone [`DataTable`] is a graph of one table with no relations; a
//! [`DataSet`](crate::DataSet) is an arena of tables linked by relations.

use crate::change::TableChange;
use crate::relation::DataRelation;
use crate::table::DataTable;
use tabula_core::{Error, Result};

/// Handle of a table inside a data set.
pub type TableId = usize;

/// Handle of a relation inside a data set.
pub type RelationId = usize;

pub(crate) trait TableGraph {
    fn table(&self, id: TableId) -> Result<&DataTable>;

    fn table_mut(&mut self, id: TableId) -> Result<&mut DataTable>;

    fn relation(&self, id: RelationId) -> Result<&DataRelation>;

    /// Relations in which `table` is the child.
    fn parent_relations(&self, table: TableId) -> Vec<RelationId>;

    /// Relations in which `table` is the parent.
    fn child_relations(&self, table: TableId) -> Vec<RelationId>;

    fn enforce_constraints(&self) -> bool;

    /// Whether constraint checks apply to `table` right now.
    fn enforcing(&self, table: TableId) -> bool {
        self.enforce_constraints() && self.table(table).map(|t| !t.is_loading()).unwrap_or(false)
    }

    fn publish(&self, table: TableId, change: TableChange) {
        if let Ok(t) = self.table(table) {
            if !t.is_loading() {
                t.feed().publish(t, change);
            }
        }
    }
}

impl TableGraph for DataTable {
    fn table(&self, _id: TableId) -> Result<&DataTable> {
        Ok(self)
    }

    fn table_mut(&mut self, _id: TableId) -> Result<&mut DataTable> {
        Ok(self)
    }

    fn relation(&self, id: RelationId) -> Result<&DataRelation> {
        Err(Error::RelationNotFound {
            name: format!("#{}", id),
        })
    }

    fn parent_relations(&self, _table: TableId) -> Vec<RelationId> {
        Vec::new()
    }

    fn child_relations(&self, _table: TableId) -> Vec<RelationId> {
        Vec::new()
    }

    fn enforce_constraints(&self) -> bool {
        self.enforces_constraints()
    }
}

//! Undo log for a single engine operation.
//!
//! Before a row slot is touched for the first time the journal stores a copy
//! of it (or `None` if the row did not exist yet). Rolling back restores the
//! slots in reverse order, which also restores the unique indexes.

use crate::graph::{TableGraph, TableId};
use hashbrown::HashSet;
use tabula_core::{RowId, RowRecord};

/// Snapshot of one row slot before the operation touched it.
#[derive(Clone, Debug)]
pub struct JournalEntry {
    pub table: TableId,
    pub row: RowId,
    pub before: Option<RowRecord>,
}

/// Undo log of touched row slots.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    touched: HashSet<(TableId, RowId)>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state of a slot unless it was already recorded.
    pub fn record(&mut self, table: TableId, row: RowId, before: Option<&RowRecord>) {
        if self.touched.insert((table, row)) {
            self.entries.push(JournalEntry {
                table,
                row,
                before: before.cloned(),
            });
        }
    }

    /// Returns true if the slot has been recorded.
    pub fn contains(&self, table: TableId, row: RowId) -> bool {
        self.touched.contains(&(table, row))
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Puts every recorded slot back the way it was.
    pub(crate) fn rollback<G: TableGraph + ?Sized>(self, graph: &mut G) {
        for entry in self.entries.into_iter().rev() {
            if let Ok(table) = graph.table_mut(entry.table) {
                table.restore_slot(entry.row, entry.before);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::DataTable;
    use tabula_core::schema::Column;
    use tabula_core::{DataType, Value};

    #[test]
    fn test_record_once() {
        let mut journal = Journal::new();
        let rec = RowRecord::added(vec![Value::Int32(1)]);
        journal.record(0, 5, Some(&rec));
        journal.record(0, 5, None);
        assert_eq!(journal.len(), 1);
        assert!(journal.entries()[0].before.is_some());
        assert!(journal.contains(0, 5));
        assert!(!journal.contains(1, 5));
    }

    #[test]
    fn test_rollback_restores_rows_and_index() {
        let mut table = DataTable::new("t");
        table.add_column(Column::new("id", DataType::Int32).unique(true)).unwrap();
        let a = table.add(vec![Value::Int32(1)]).unwrap();

        let mut journal = Journal::new();
        journal.record(0, a, table.row(a).ok());
        table.restore_slot(a, Some(RowRecord::added(vec![Value::Int32(9)])));
        let b = 999_999;
        journal.record(0, b, None);
        table.restore_slot(b, Some(RowRecord::added(vec![Value::Int32(1)])));

        journal.rollback(&mut table);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(a, 0).unwrap(), &Value::Int32(1));
        // Key 9 is free again, key 1 is taken.
        assert!(table.add(vec![Value::Int32(9)]).is_ok());
        assert!(table.add(vec![Value::Int32(1)]).is_err());
    }
}

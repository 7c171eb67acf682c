//! Merging tables and data sets.
//!
//! Rows are matched on the target's primary key (current values, or
//! original values of deleted rows). Tables without a primary key only
//! append. With `preserve_changes` a changed target row keeps its current
//! values and takes the source values as its original version; otherwise
//! the source row replaces it.
//!
//! Merges run on working copies and are validated before they replace the
//! target, so a failed merge changes nothing.

use crate::constraint::{is_null_key, key_of};
use crate::dataset::{Checkpoint, DataSet};
use crate::fill::MissingSchemaAction;
use crate::graph::TableGraph;
use crate::relation::RelationDef;
use crate::table::DataTable;
use tabula_core::{next_row_id, Error, Result, RowId, RowRecord, RowState, RowVersions, Value};
use tracing::{debug, warn};

impl DataTable {
    /// Merges the rows (and, per `missing_schema`, the columns) of `source`
    /// into this table.
    pub fn merge(&mut self, source: &DataTable, preserve_changes: bool, missing_schema: MissingSchemaAction) -> Result<()> {
        self.check_standalone()?;
        let mut work = self.backup();
        let result = merge_table(&mut work, source, preserve_changes, missing_schema).and_then(|_| {
            if self.enforces_constraints() && !self.is_loading() {
                work.validate_constraints()?;
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!(table = %self.name(), error = %e, "merge rolled back");
            return Err(e);
        }
        self.replace_contents(work);
        self.publish_reset();
        Ok(())
    }
}

impl DataSet {
    /// Merges every table and relation of `source` into this set. Tables
    /// are matched by name.
    pub fn merge(&mut self, source: &DataSet, preserve_changes: bool, missing_schema: MissingSchemaAction) -> Result<()> {
        let tables: Vec<&DataTable> = source.tables().map(|(_, t)| t).collect();
        self.merge_guarded(&tables, Some(source), preserve_changes, missing_schema)
    }

    /// Merges a single table into the table of the same name.
    pub fn merge_table(&mut self, source: &DataTable, preserve_changes: bool, missing_schema: MissingSchemaAction) -> Result<()> {
        self.merge_guarded(&[source], None, preserve_changes, missing_schema)
    }

    fn merge_guarded(
        &mut self,
        tables: &[&DataTable],
        relations: Option<&DataSet>,
        preserve_changes: bool,
        missing_schema: MissingSchemaAction,
    ) -> Result<()> {
        let checkpoint = Checkpoint::take(self);
        let result = self
            .merge_tables(tables, preserve_changes, missing_schema)
            .and_then(|_| match relations {
                Some(source) => self.merge_relations(source, missing_schema),
                None => Ok(()),
            })
            .and_then(|_| {
                if self.enforce_constraints() {
                    self.validate()?;
                }
                Ok(())
            });
        match result {
            Ok(()) => {
                for (_, t) in self.tables() {
                    t.publish_reset();
                }
                debug!(data_set = %self.name(), tables = tables.len(), "merge");
                Ok(())
            }
            Err(e) => {
                warn!(data_set = %self.name(), error = %e, "merge rolled back");
                checkpoint.restore(self);
                Err(e)
            }
        }
    }

    fn merge_tables(&mut self, tables: &[&DataTable], preserve_changes: bool, missing_schema: MissingSchemaAction) -> Result<()> {
        for source in tables {
            let id = match (self.table_id(source.name()), missing_schema) {
                (Some(id), _) => id,
                (None, MissingSchemaAction::Add) => self.add_table(source.clone_schema())?,
                (None, MissingSchemaAction::Ignore) => continue,
                (None, MissingSchemaAction::Error) => return Err(Error::table_not_found(source.name())),
            };
            let target = TableGraph::table_mut(self, id)?;
            merge_table(target, source, preserve_changes, missing_schema)?;
        }
        Ok(())
    }

    fn merge_relations(&mut self, source: &DataSet, missing_schema: MissingSchemaAction) -> Result<()> {
        for (_, rel) in source.relations() {
            if self.relation_id(rel.name()).is_some() {
                continue;
            }
            match missing_schema {
                MissingSchemaAction::Add => {}
                MissingSchemaAction::Ignore => continue,
                MissingSchemaAction::Error => {
                    return Err(Error::RelationNotFound {
                        name: rel.name().to_string(),
                    })
                }
            }
            let parent = TableGraph::table(source, rel.parent_table())?;
            let child = TableGraph::table(source, rel.child_table())?;
            let names = |t: &DataTable, cols: &[usize]| -> Vec<String> {
                cols.iter()
                    .filter_map(|&c| t.column(c).map(|c| c.name().to_string()))
                    .collect()
            };
            let def = RelationDef {
                name: rel.name().to_string(),
                parent_table: parent.name().to_string(),
                parent_columns: names(parent, rel.parent_columns()),
                child_table: child.name().to_string(),
                child_columns: names(child, rel.child_columns()),
                constraint: rel.foreign_key().cloned(),
                nested: rel.is_nested(),
            };
            self.add_relation(def)?;
        }
        Ok(())
    }
}

/// Merges `source` into `target` without validating the result.
fn merge_table(target: &mut DataTable, source: &DataTable, preserve_changes: bool, missing_schema: MissingSchemaAction) -> Result<()> {
    for column in source.columns() {
        if target.column_index(column.name()).is_some() {
            continue;
        }
        match missing_schema {
            MissingSchemaAction::Add => {
                target.add_column(column.clone())?;
            }
            MissingSchemaAction::Ignore => {}
            MissingSchemaAction::Error => return Err(Error::column_not_found(target.name(), column.name())),
        }
    }
    if target.primary_key().is_none() && missing_schema == MissingSchemaAction::Add {
        if let Some(columns) = source.primary_key_columns() {
            let names: Vec<&str> = columns
                .iter()
                .filter_map(|&c| source.column(c).map(|c| c.name()))
                .collect();
            if names.iter().all(|n| target.column_index(n).is_some()) {
                target.set_primary_key(&names)?;
            }
        }
    }

    let key_columns = target.primary_key_columns().map(<[usize]>::to_vec);
    let cs = target.is_case_sensitive();
    let mut merged = 0usize;
    for (_, record) in source.rows() {
        let incoming = target.map_record(source, record);
        let matched = match &key_columns {
            Some(pk) => {
                let values = incoming.current().or_else(|| incoming.original()).unwrap_or(&[]);
                let key = key_of(values, pk, cs);
                if is_null_key(&key) {
                    None
                } else {
                    matching_row(target, pk, &key)
                }
            }
            None => None,
        };
        match matched {
            Some(row) => {
                let existing = target.row(row)?;
                let record = if preserve_changes && existing.state() != RowState::Unchanged {
                    preserve(existing, &incoming)
                } else {
                    incoming
                };
                target.restore_slot(row, Some(record));
            }
            None => {
                if let Some(values) = incoming.current() {
                    let values = values.to_vec();
                    target.observe_auto_increment(&values);
                }
                target.insert_record(next_row_id(), incoming);
            }
        }
        merged += 1;
    }
    debug!(table = %target.name(), source = %source.name(), rows = merged, "merge table");
    Ok(())
}

/// The target row a source key lands on: a live row with that current key,
/// else a deleted row with that original key.
fn matching_row(target: &DataTable, pk: &[usize], key: &[Value]) -> Option<RowId> {
    if let Some(&row) = target.rows_by_key(pk, key).first() {
        return Some(row);
    }
    let cs = target.is_case_sensitive();
    target
        .rows()
        .find(|(_, r)| r.state() == RowState::Deleted && r.original().is_some_and(|v| key_of(v, pk, cs) == key))
        .map(|(id, _)| id)
}

/// Keeps the local edit of `existing` on top of the incoming values.
fn preserve(existing: &RowRecord, incoming: &RowRecord) -> RowRecord {
    let source_values = incoming
        .current()
        .or_else(|| incoming.original())
        .map(<[Value]>::to_vec)
        .unwrap_or_default();
    let versions = match existing.versions() {
        RowVersions::Deleted(_) => RowVersions::Deleted(source_values),
        RowVersions::Added(current) | RowVersions::Modified { current, .. } | RowVersions::Unchanged(current) => {
            RowVersions::Modified {
                original: source_values,
                current: current.clone(),
            }
        }
    };
    let mut record = RowRecord::from_versions(versions);
    record.set_error(existing.error().or_else(|| incoming.error()).map(str::to_string));
    record
}

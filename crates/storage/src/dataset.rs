//! Data sets: an arena of tables linked by relations.
//!
//! Tables and relations are addressed by [`TableId`] and [`RelationId`]
//! handles that stay valid until the object is removed. Two indices map a
//! table to the relations in which it is the parent or the child, so
//! cascades walk the graph without scanning.
//!
//! Row operations on tables owned by a data set go through the data set;
//! the tables themselves refuse them.

use crate::cascade;
use crate::constraint::{is_null_key, key_of};
use crate::graph::{RelationId, TableGraph, TableId};
use crate::relation::{DataRelation, RelationDef};
use crate::table::{DataRow, DataTable};
use hashbrown::{HashMap, HashSet};
use tabula_core::schema::{names_equal, PropertyBag};
use tabula_core::{
    next_row_id, DataSetOptions, Error, Result, RowId, RowState, RowVersion, Value,
};
use tracing::debug;

/// A set of tables and the relations between them.
#[derive(Debug)]
pub struct DataSet {
    name: String,
    options: DataSetOptions,
    tables: Vec<Option<DataTable>>,
    relations: Vec<Option<DataRelation>>,
    /// Relations in which the table is the child.
    parents_of: HashMap<TableId, Vec<RelationId>>,
    /// Relations in which the table is the parent.
    children_of: HashMap<TableId, Vec<RelationId>>,
    properties: PropertyBag,
}

impl Default for DataSet {
    fn default() -> Self {
        Self::new("NewDataSet")
    }
}

impl DataSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, DataSetOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: DataSetOptions) -> Self {
        Self {
            name: name.into(),
            options,
            tables: Vec::new(),
            relations: Vec::new(),
            parents_of: HashMap::new(),
            children_of: HashMap::new(),
            properties: PropertyBag::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn options(&self) -> &DataSetOptions {
        &self.options
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.options.case_sensitive
    }

    /// Changes case sensitivity of the set and every table in it.
    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> Result<()> {
        let ids: Vec<TableId> = self.table_ids().collect();
        for (done, &id) in ids.iter().enumerate() {
            let result = match self.table_mut(id) {
                Some(t) => t.set_case_sensitive(case_sensitive),
                None => Ok(()),
            };
            if let Err(e) = result {
                for &undo in &ids[..done] {
                    if let Some(t) = self.table_mut(undo) {
                        let _ = t.set_case_sensitive(!case_sensitive);
                    }
                }
                return Err(e);
            }
        }
        self.options.case_sensitive = case_sensitive;
        Ok(())
    }

    pub fn enforce_constraints(&self) -> bool {
        self.options.enforce_constraints
    }

    /// Turns constraint enforcement on or off.
    ///
    /// Turning it on validates every unique and foreign key constraint
    /// first; if one is violated enforcement stays off.
    pub fn set_enforce_constraints(&mut self, enforce: bool) -> Result<()> {
        if enforce && !self.options.enforce_constraints {
            self.validate()?;
        }
        self.options.enforce_constraints = enforce;
        Ok(())
    }

    /// Checks every constraint of every table.
    pub fn validate(&self) -> Result<()> {
        for (_, table) in self.tables() {
            table.validate_constraints()?;
        }
        let relations: Vec<RelationId> = self.relation_ids().collect();
        cascade::validate_foreign_keys(self, &relations)
    }

    // === Tables ===

    /// Adds a table. Its name must be unique within the set.
    pub fn add_table(&mut self, mut table: DataTable) -> Result<TableId> {
        if table.is_attached() {
            return Err(Error::invalid_operation(format!(
                "table '{}' already belongs to a data set",
                table.name()
            )));
        }
        if self.table_id(table.name()).is_some() {
            return Err(Error::DuplicateTable {
                name: table.name().to_string(),
            });
        }
        table.set_attached(true);
        let id = self.tables.len();
        debug!(data_set = %self.name, table = %table.name(), id, "add table");
        self.tables.push(Some(table));
        Ok(id)
    }

    /// Creates an empty table with the set's case sensitivity.
    pub fn create_table(&mut self, name: impl Into<String>) -> Result<TableId> {
        let table = DataTable::with_options(name, self.options.table_options());
        self.add_table(table)
    }

    /// Detaches and returns a table. Relations must be removed first.
    pub fn remove_table(&mut self, id: TableId) -> Result<DataTable> {
        let has_relations = self.relations().any(|(_, r)| r.parent_table() == id || r.child_table() == id);
        if has_relations {
            return Err(Error::invalid_operation(format!(
                "table '{}' takes part in relations; remove them first",
                self.table_name(id)
            )));
        }
        let mut table = self
            .tables
            .get_mut(id)
            .and_then(Option::take)
            .ok_or_else(|| Error::table_not_found(format!("#{}", id)))?;
        table.set_attached(false);
        Ok(table)
    }

    pub fn table(&self, id: TableId) -> Option<&DataTable> {
        self.tables.get(id).and_then(Option::as_ref)
    }

    /// Mutable access for schema edits. Row edits through the returned
    /// table fail; use the data set's row operations.
    pub fn table_mut(&mut self, id: TableId) -> Option<&mut DataTable> {
        self.tables.get_mut(id).and_then(Option::as_mut)
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        let cs = self.options.case_sensitive;
        self.tables()
            .find(|(_, t)| t.name() == name)
            .or_else(|| self.tables().find(|(_, t)| names_equal(t.name(), name, cs)))
            .map(|(id, _)| id)
    }

    pub fn table_by_name(&self, name: &str) -> Option<&DataTable> {
        self.table_id(name).and_then(|id| self.table(id))
    }

    fn require_table(&self, name: &str) -> Result<TableId> {
        self.table_id(name).ok_or_else(|| Error::table_not_found(name))
    }

    fn table_name(&self, id: TableId) -> String {
        self.table(id)
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| format!("#{}", id))
    }

    pub fn table_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables().map(|(id, _)| id)
    }

    pub fn tables(&self) -> impl Iterator<Item = (TableId, &DataTable)> + '_ {
        self.tables
            .iter()
            .enumerate()
            .filter_map(|(id, t)| t.as_ref().map(|t| (id, t)))
    }

    pub fn table_count(&self) -> usize {
        self.tables().count()
    }

    pub fn rename_table(&mut self, id: TableId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.table_id(&name).is_some_and(|other| other != id) {
            return Err(Error::DuplicateTable { name });
        }
        self.table_mut(id)
            .ok_or_else(|| Error::table_not_found(format!("#{}", id)))?
            .set_name(name);
        Ok(())
    }

    /// Removes a column that no relation, constraint or expression uses.
    pub fn remove_column(&mut self, table: TableId, column: &str) -> Result<()> {
        let t = TableGraph::table_mut(self, table)?;
        let removed = t.ordinal(column)?;
        t.remove_column_unchecked(column)?;
        for rel in self.relations.iter_mut().flatten() {
            if rel.parent == table {
                shift_after(&mut rel.parent_columns, removed);
            }
            if rel.child == table {
                shift_after(&mut rel.child_columns, removed);
            }
        }
        Ok(())
    }

    // === Relations ===

    /// Adds a relation. With a foreign key, the parent key gets a unique
    /// constraint (created when missing) and existing child rows must
    /// reference existing parents.
    pub fn add_relation(&mut self, def: RelationDef) -> Result<RelationId> {
        let cs = self.options.case_sensitive;
        if self.relations().any(|(_, r)| names_equal(r.name(), &def.name, cs)) {
            return Err(Error::DuplicateRelation { name: def.name });
        }
        let parent_id = self.require_table(&def.parent_table)?;
        let child_id = self.require_table(&def.child_table)?;
        let parent = TableGraph::table(self, parent_id)?;
        let child = TableGraph::table(self, child_id)?;
        let parent_columns = resolve(parent, &def.parent_columns)?;
        let child_columns = resolve(child, &def.child_columns)?;

        if parent_columns.is_empty() || parent_columns.len() != child_columns.len() {
            return Err(Error::invalid_constraint(
                &def.name,
                "parent and child column lists must be non-empty and of equal length",
            ));
        }
        for (&p, &c) in parent_columns.iter().zip(&child_columns) {
            let (pc, cc) = match (parent.column(p), child.column(c)) {
                (Some(pc), Some(cc)) => (pc, cc),
                _ => return Err(Error::invalid_schema("relation column out of range")),
            };
            if pc.data_type() != cc.data_type() {
                return Err(Error::invalid_constraint(
                    &def.name,
                    format!(
                        "column '{}' ({}) does not match column '{}' ({})",
                        pc.name(),
                        pc.data_type(),
                        cc.name(),
                        cc.data_type()
                    ),
                ));
            }
        }
        if parent_id == child_id && parent_columns == child_columns {
            return Err(Error::invalid_constraint(
                &def.name,
                "a relation cannot link a column set to itself",
            ));
        }

        let mut parent_key = None;
        let mut created_key = false;
        if def.constraint.is_some() {
            let parent = self.table_mut(parent_id).ok_or_else(|| Error::table_not_found(&def.parent_table))?;
            let position = match parent.find_unique(&parent_columns) {
                Some(pos) => pos,
                None => {
                    let name = unique_name(parent);
                    parent
                        .add_unique_ordinals(name, parent_columns.clone(), false)
                        .map_err(|e| Error::invalid_constraint(&def.name, e.to_string()))?;
                    created_key = true;
                    parent.unique_constraints().len() - 1
                }
            };
            parent_key = parent.unique_constraints().get(position).map(|u| u.name().to_string());
        }

        let relation = DataRelation {
            name: def.name.clone(),
            parent: parent_id,
            child: child_id,
            parent_columns: parent_columns.clone(),
            child_columns: child_columns.clone(),
            foreign_key: def.constraint,
            parent_key,
            nested: def.nested,
            properties: PropertyBag::new(),
        };

        if relation.foreign_key.is_some() && self.options.enforce_constraints {
            let child = TableGraph::table(self, child_id)?;
            let check = child
                .rows()
                .filter_map(|(_, r)| r.current())
                .try_for_each(|values| self.check_parent_exists(&relation, values));
            if let Err(e) = check {
                if created_key {
                    if let (Some(t), Some(name)) = (self.table_mut(parent_id), relation.parent_key.as_deref()) {
                        let _ = t.remove_constraint(name);
                    }
                }
                return Err(Error::invalid_constraint(&def.name, e.to_string()));
            }
        }

        if let Some(t) = self.table_mut(parent_id) {
            t.pin_columns(&parent_columns);
            if let Some(pos) = t.find_unique(&parent_columns) {
                if relation.foreign_key.is_some() {
                    if let Some(uc) = t.unique_mut(pos) {
                        uc.pin();
                    }
                }
            }
        }
        if let Some(t) = self.table_mut(child_id) {
            t.pin_columns(&child_columns);
        }

        let id = self.relations.len();
        debug!(relation = %relation.name, parent = parent_id, child = child_id, "add relation");
        self.relations.push(Some(relation));
        self.parents_of.entry(child_id).or_default().push(id);
        self.children_of.entry(parent_id).or_default().push(id);
        Ok(id)
    }

    fn check_parent_exists(&self, rel: &DataRelation, values: &[Value]) -> Result<()> {
        let parent = TableGraph::table(self, rel.parent)?;
        let key = key_of(values, &rel.child_columns, parent.is_case_sensitive());
        if is_null_key(&key) || !parent.rows_by_key(&rel.parent_columns, &key).is_empty() {
            return Ok(());
        }
        Err(Error::ForeignKeyViolation {
            constraint: rel.name.clone(),
            message: format!("child key {} has no parent row", crate::constraint::format_key(&key)),
        })
    }

    /// Removes a relation and its foreign key. The parent key's unique
    /// constraint stays.
    pub fn remove_relation(&mut self, id: RelationId) -> Result<DataRelation> {
        let relation = self
            .relations
            .get_mut(id)
            .and_then(Option::take)
            .ok_or_else(|| Error::RelationNotFound {
                name: format!("#{}", id),
            })?;
        if let Some(list) = self.parents_of.get_mut(&relation.child) {
            list.retain(|&r| r != id);
        }
        if let Some(list) = self.children_of.get_mut(&relation.parent) {
            list.retain(|&r| r != id);
        }
        if let Some(t) = self.table_mut(relation.parent) {
            t.unpin_columns(&relation.parent_columns);
            if relation.foreign_key.is_some() {
                if let Some(pos) = t.find_unique(&relation.parent_columns) {
                    if let Some(uc) = t.unique_mut(pos) {
                        uc.unpin();
                    }
                }
            }
        }
        if let Some(t) = self.table_mut(relation.child) {
            t.unpin_columns(&relation.child_columns);
        }
        debug!(relation = %relation.name, "remove relation");
        Ok(relation)
    }

    pub fn relation(&self, id: RelationId) -> Option<&DataRelation> {
        self.relations.get(id).and_then(Option::as_ref)
    }

    pub fn relation_mut(&mut self, id: RelationId) -> Option<&mut DataRelation> {
        self.relations.get_mut(id).and_then(Option::as_mut)
    }

    pub fn relation_id(&self, name: &str) -> Option<RelationId> {
        let cs = self.options.case_sensitive;
        self.relations()
            .find(|(_, r)| names_equal(r.name(), name, cs))
            .map(|(id, _)| id)
    }

    pub fn relation_ids(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.relations().map(|(id, _)| id)
    }

    pub fn relations(&self) -> impl Iterator<Item = (RelationId, &DataRelation)> + '_ {
        self.relations
            .iter()
            .enumerate()
            .filter_map(|(id, r)| r.as_ref().map(|r| (id, r)))
    }

    /// Relations in which `table` is the child.
    pub fn parent_relations(&self, table: TableId) -> Vec<RelationId> {
        self.parents_of.get(&table).cloned().unwrap_or_default()
    }

    /// Relations in which `table` is the parent.
    pub fn child_relations(&self, table: TableId) -> Vec<RelationId> {
        self.children_of.get(&table).cloned().unwrap_or_default()
    }

    fn require_relation(&self, id: RelationId) -> Result<&DataRelation> {
        self.relation(id).ok_or_else(|| Error::RelationNotFound {
            name: format!("#{}", id),
        })
    }

    /// Child rows of `parent_row`, matched on `version` of both sides.
    ///
    /// Deleted children only match when `version` is Original.
    pub fn child_rows(
        &self,
        relation: RelationId,
        parent_row: RowId,
        version: RowVersion,
    ) -> Result<impl Iterator<Item = RowId> + '_> {
        let rel = self.require_relation(relation)?;
        let parent = TableGraph::table(self, rel.parent)?;
        let child = TableGraph::table(self, rel.child)?;
        let cs = child.is_case_sensitive();
        let key = key_of(parent.values(parent_row, version)?, &rel.parent_columns, cs);
        let columns = &rel.child_columns;
        let live = !is_null_key(&key);
        Ok(child.rows().filter_map(move |(id, record)| {
            let values = match version {
                RowVersion::Original => record.original(),
                _ => record.current(),
            }?;
            (live && key_of(values, columns, cs) == key).then_some(id)
        }))
    }

    /// The parent row of `child_row`, if its key is not null and a parent
    /// matches.
    pub fn parent_row(&self, relation: RelationId, child_row: RowId, version: RowVersion) -> Result<Option<RowId>> {
        let rel = self.require_relation(relation)?;
        let parent = TableGraph::table(self, rel.parent)?;
        let child = TableGraph::table(self, rel.child)?;
        let cs = parent.is_case_sensitive();
        let key = key_of(child.values(child_row, version)?, &rel.child_columns, cs);
        if is_null_key(&key) {
            return Ok(None);
        }
        Ok(parent
            .rows()
            .find(|(_, record)| {
                let values = match version {
                    RowVersion::Original => record.original(),
                    _ => record.current(),
                };
                values.is_some_and(|v| key_of(v, &rel.parent_columns, cs) == key)
            })
            .map(|(id, _)| id))
    }

    // === Rows ===

    fn owned(&mut self, table: TableId) -> Result<&mut DataTable> {
        TableGraph::table_mut(self, table)
    }

    pub fn new_row(&mut self, table: TableId) -> Result<DataRow> {
        Ok(self.owned(table)?.new_row())
    }

    pub fn add_row(&mut self, table: TableId, row: DataRow) -> Result<RowId> {
        self.owned(table)?.check_row_owner(&row)?;
        cascade::add(self, table, row.into_values())
    }

    pub fn add(&mut self, table: TableId, values: Vec<Value>) -> Result<RowId> {
        let values = self.owned(table)?.fill_values(values)?;
        cascade::add(self, table, values)
    }

    pub fn begin_edit(&mut self, table: TableId, row: RowId) -> Result<()> {
        self.owned(table)?.open_edit(row)
    }

    pub fn set_value(&mut self, table: TableId, row: RowId, column: usize, value: impl Into<Value>) -> Result<()> {
        cascade::set_value(self, table, row, column, value.into())
    }

    pub fn set_value_by_name(&mut self, table: TableId, row: RowId, column: &str, value: impl Into<Value>) -> Result<()> {
        let index = TableGraph::table(self, table)?.ordinal(column)?;
        self.set_value(table, row, index, value)
    }

    pub fn end_edit(&mut self, table: TableId, row: RowId) -> Result<()> {
        cascade::end_edit(self, table, row)
    }

    pub fn cancel_edit(&mut self, table: TableId, row: RowId) -> Result<()> {
        self.owned(table)?.discard_edit(row)
    }

    pub fn delete_row(&mut self, table: TableId, row: RowId) -> Result<()> {
        cascade::delete(self, table, row)
    }

    pub fn remove_row(&mut self, table: TableId, row: RowId) -> Result<()> {
        cascade::remove(self, table, row)
    }

    pub fn accept_row(&mut self, table: TableId, row: RowId) -> Result<()> {
        cascade::settle_row(self, table, row, true)
    }

    pub fn reject_row(&mut self, table: TableId, row: RowId) -> Result<()> {
        cascade::settle_row(self, table, row, false)
    }

    pub fn accept_table(&mut self, table: TableId) -> Result<()> {
        cascade::settle_tables(self, &[table], true)
    }

    pub fn reject_table(&mut self, table: TableId) -> Result<()> {
        cascade::settle_tables(self, &[table], false)
    }

    /// Accepts every row of every table.
    pub fn accept_changes(&mut self) -> Result<()> {
        let ids: Vec<TableId> = self.table_ids().collect();
        cascade::settle_tables(self, &ids, true)
    }

    /// Rejects every row of every table.
    pub fn reject_changes(&mut self) -> Result<()> {
        let ids: Vec<TableId> = self.table_ids().collect();
        cascade::settle_tables(self, &ids, false)
    }

    pub fn set_added(&mut self, table: TableId, row: RowId) -> Result<()> {
        cascade::force_state(self, table, row, RowState::Added)
    }

    pub fn set_modified(&mut self, table: TableId, row: RowId) -> Result<()> {
        cascade::force_state(self, table, row, RowState::Modified)
    }

    /// Removes every row of a table. Fails while enforced foreign keys
    /// still reference them.
    pub fn clear_table(&mut self, table: TableId) -> Result<()> {
        cascade::clear(self, table)
    }

    /// Removes every row of every table.
    pub fn clear(&mut self) {
        for table in self.tables.iter_mut().flatten() {
            table.clear_rows();
        }
    }

    pub fn begin_load_data(&mut self, table: TableId) -> Result<()> {
        self.owned(table)?.begin_load_data();
        Ok(())
    }

    /// Ends a bulk load, validating the table and the foreign keys it takes
    /// part in. On failure the table stays in load mode.
    pub fn end_load_data(&mut self, table: TableId) -> Result<()> {
        let t = TableGraph::table(self, table)?;
        if !t.is_loading() {
            return Ok(());
        }
        if self.options.enforce_constraints {
            t.validate_constraints()?;
            let mut relations = self.parent_relations(table);
            relations.extend(self.child_relations(table));
            cascade::validate_foreign_keys(self, &relations)?;
        }
        let t = self.owned(table)?;
        t.set_loading(false);
        t.publish_reset();
        Ok(())
    }

    pub fn load_data_row(&mut self, table: TableId, values: Vec<Value>, accept: bool) -> Result<RowId> {
        cascade::load_data_row(self, table, values, accept)
    }

    /// Copies a row of any table into `table`, keeping state and versions.
    pub fn import_row(&mut self, table: TableId, source: &DataTable, row: RowId) -> Result<RowId> {
        let record = TableGraph::table(self, table)?.map_record(source, source.row(row)?);
        cascade::import(self, table, record)
    }

    pub fn set_row_error(&mut self, table: TableId, row: RowId, error: &str) -> Result<()> {
        self.owned(table)?.set_row_error(row, error)
    }

    pub fn has_changes(&self) -> bool {
        self.tables().any(|(_, t)| t.has_changes())
    }

    pub fn has_errors(&self) -> bool {
        self.tables().any(|(_, t)| t.has_errors())
    }

    // === Copies ===

    /// Copies tables, relations and options without rows.
    pub fn clone_schema(&self) -> DataSet {
        let mut copy = DataSet::with_options(self.name.clone(), self.options.clone());
        copy.tables = self
            .tables
            .iter()
            .map(|t| {
                t.as_ref().map(|t| {
                    let mut c = t.clone_schema();
                    c.set_attached(true);
                    c
                })
            })
            .collect();
        copy.relations = self.relations.clone();
        copy.parents_of = self.parents_of.clone();
        copy.children_of = self.children_of.clone();
        copy.properties = self.properties.clone();
        for rel in copy.relations.iter().flatten() {
            if rel.foreign_key.is_some() {
                if let Some(Some(t)) = copy.tables.get_mut(rel.parent) {
                    if let Some(pos) = t.find_unique(&rel.parent_columns) {
                        if let Some(uc) = t.unique_mut(pos) {
                            uc.pin();
                        }
                    }
                }
            }
        }
        copy
    }

    /// Copies schema and rows. Row ids are fresh.
    pub fn copy(&self) -> DataSet {
        self.copy_rows(|_, _| true)
    }

    /// Copies the rows in one of `states` (every changed row when empty)
    /// together with the parent rows they reference, or `None` if no row
    /// matches.
    pub fn get_changes(&self, states: &[RowState]) -> Option<DataSet> {
        let wanted = |s: RowState| {
            if states.is_empty() {
                s != RowState::Unchanged
            } else {
                states.contains(&s)
            }
        };
        let mut selected: HashSet<(TableId, RowId)> = HashSet::new();
        let mut work: Vec<(TableId, RowId)> = Vec::new();
        for (tid, table) in self.tables() {
            for (rid, record) in table.rows() {
                if wanted(record.state()) && selected.insert((tid, rid)) {
                    work.push((tid, rid));
                }
            }
        }
        if selected.is_empty() {
            return None;
        }
        while let Some((tid, rid)) = work.pop() {
            for rel_id in self.parent_relations(tid) {
                let Some(rel) = self.relation(rel_id) else { continue };
                let version = match self.table(tid).and_then(|t| t.row(rid).ok()) {
                    Some(r) if r.state() == RowState::Deleted => RowVersion::Original,
                    Some(_) => RowVersion::Current,
                    None => continue,
                };
                if let Ok(Some(parent)) = self.parent_row(rel_id, rid, version) {
                    if selected.insert((rel.parent, parent)) {
                        work.push((rel.parent, parent));
                    }
                }
            }
        }
        Some(self.copy_rows(|t, r| selected.contains(&(t, r))))
    }

    fn copy_rows(&self, keep: impl Fn(TableId, RowId) -> bool) -> DataSet {
        let mut copy = self.clone_schema();
        for (tid, table) in self.tables() {
            let Some(Some(target)) = copy.tables.get_mut(tid) else { continue };
            for (rid, record) in table.rows() {
                if keep(tid, rid) {
                    let mut record = record.clone();
                    record.cancel_edit();
                    target.insert_record(next_row_id(), record);
                }
            }
        }
        copy
    }
}

/// State of a data set before a multi-table operation, used to undo it.
pub(crate) struct Checkpoint {
    tables: usize,
    relations: usize,
    backups: Vec<(TableId, DataTable, bool)>,
}

impl Checkpoint {
    pub(crate) fn take(ds: &DataSet) -> Self {
        Self {
            tables: ds.tables.len(),
            relations: ds.relations.len(),
            backups: ds.tables().map(|(id, t)| (id, t.backup(), t.is_loading())).collect(),
        }
    }

    pub(crate) fn restore(self, ds: &mut DataSet) {
        while ds.relations.len() > self.relations {
            let id = ds.relations.len() - 1;
            if ds.relations[id].is_some() {
                let _ = ds.remove_relation(id);
            }
            ds.relations.pop();
        }
        ds.tables.truncate(self.tables);
        for (id, backup, loading) in self.backups {
            if let Some(t) = ds.table_mut(id) {
                t.replace_contents(backup);
                t.set_loading(loading);
            }
        }
    }
}

impl TableGraph for DataSet {
    fn table(&self, id: TableId) -> Result<&DataTable> {
        DataSet::table(self, id).ok_or_else(|| Error::table_not_found(format!("#{}", id)))
    }

    fn table_mut(&mut self, id: TableId) -> Result<&mut DataTable> {
        DataSet::table_mut(self, id).ok_or_else(|| Error::table_not_found(format!("#{}", id)))
    }

    fn relation(&self, id: RelationId) -> Result<&DataRelation> {
        self.require_relation(id)
    }

    fn parent_relations(&self, table: TableId) -> Vec<RelationId> {
        DataSet::parent_relations(self, table)
    }

    fn child_relations(&self, table: TableId) -> Vec<RelationId> {
        DataSet::child_relations(self, table)
    }

    fn enforce_constraints(&self) -> bool {
        self.options.enforce_constraints
    }
}

fn resolve(table: &DataTable, names: &[String]) -> Result<Vec<usize>> {
    names.iter().map(|n| table.ordinal(n)).collect()
}

fn unique_name(table: &DataTable) -> String {
    (1..)
        .map(|n| format!("Constraint{}", n))
        .find(|n| !table.constraint_name_taken(n))
        .unwrap_or_else(|| "Constraint".to_string())
}

fn shift_after(columns: &mut [usize], removed: usize) {
    for c in columns {
        if *c > removed {
            *c -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::schema::{AcceptRejectRule, Column, Rule};
    use tabula_core::{DataType, ErrorKind};

    /// Orders(id PK, customer) -> Lines(id PK, order_id, qty).
    fn orders(delete_rule: Rule) -> (DataSet, TableId, TableId, RelationId) {
        let mut ds = DataSet::new("shop");
        let orders = ds.create_table("orders").unwrap();
        let t = ds.table_mut(orders).unwrap();
        t.add_column(Column::new("id", DataType::Int32)).unwrap();
        t.add_column(Column::new("customer", DataType::String)).unwrap();
        t.set_primary_key(&["id"]).unwrap();

        let lines = ds.create_table("lines").unwrap();
        let t = ds.table_mut(lines).unwrap();
        t.add_column(Column::new("id", DataType::Int32).auto_increment(1, 1)).unwrap();
        t.add_column(Column::new("order_id", DataType::Int32).default_value(0)).unwrap();
        t.add_column(Column::new("qty", DataType::Int32)).unwrap();
        t.set_primary_key(&["id"]).unwrap();

        let rel = ds
            .add_relation(
                RelationDef::new("order_lines", "orders", &["id"], "lines", &["order_id"])
                    .delete_rule(delete_rule)
                    .update_rule(delete_rule),
            )
            .unwrap();
        (ds, orders, lines, rel)
    }

    fn line(ds: &mut DataSet, lines: TableId, order: i32, qty: i32) -> RowId {
        ds.add(lines, vec![Value::Null, Value::Int32(order), Value::Int32(qty)]).unwrap()
    }

    #[test]
    fn test_direct_row_edits_are_refused() {
        let (mut ds, orders, _, _) = orders(Rule::Cascade);
        let t = ds.table_mut(orders).unwrap();
        let err = t.add(vec![Value::Int32(1), Value::from("a")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateViolation);
    }

    #[test]
    fn test_duplicate_names() {
        let (mut ds, _, _, _) = orders(Rule::Cascade);
        assert!(matches!(ds.create_table("ORDERS"), Err(Error::DuplicateTable { .. })));
        let err = ds
            .add_relation(RelationDef::new("Order_Lines", "orders", &["id"], "lines", &["order_id"]))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRelation { .. }));
    }

    #[test]
    fn test_relation_setup_errors() {
        let (mut ds, _, _, _) = orders(Rule::Cascade);
        let err = ds
            .add_relation(RelationDef::new("r1", "orders", &["id", "customer"], "lines", &["order_id"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint { .. }));
        let err = ds
            .add_relation(RelationDef::new("r2", "orders", &["customer"], "lines", &["qty"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint { .. }));
        let err = ds
            .add_relation(RelationDef::new("r3", "orders", &["nope"], "lines", &["qty"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert!(matches!(
            ds.add_relation(RelationDef::new("r4", "nowhere", &["id"], "lines", &["qty"])),
            Err(Error::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_relation_rejects_orphaned_children() {
        let mut ds = DataSet::new("d");
        let p = ds.create_table("p").unwrap();
        ds.table_mut(p).unwrap().add_column(Column::new("id", DataType::Int32)).unwrap();
        let c = ds.create_table("c").unwrap();
        ds.table_mut(c).unwrap().add_column(Column::new("pid", DataType::Int32)).unwrap();
        ds.add(p, vec![Value::Int32(1)]).unwrap();
        ds.add(c, vec![Value::Int32(2)]).unwrap();

        let err = ds.add_relation(RelationDef::new("r", "p", &["id"], "c", &["pid"])).unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint { .. }));
        // The parent key created for the attempt is gone again.
        assert!(ds.table(p).unwrap().unique_constraints().is_empty());
        // Without a foreign key the relation is navigation only.
        ds.add_relation(RelationDef::new("r", "p", &["id"], "c", &["pid"]).without_constraint())
            .unwrap();
    }

    #[test]
    fn test_parent_key_created_and_pinned() {
        let mut ds = DataSet::new("d");
        let p = ds.create_table("p").unwrap();
        ds.table_mut(p).unwrap().add_column(Column::new("code", DataType::String)).unwrap();
        let c = ds.create_table("c").unwrap();
        ds.table_mut(c).unwrap().add_column(Column::new("code", DataType::String)).unwrap();
        let rel = ds.add_relation(RelationDef::new("r", "p", &["code"], "c", &["code"])).unwrap();

        let key = ds.relation(rel).unwrap().parent_key_constraint().unwrap().to_string();
        let parent = ds.table_mut(p).unwrap();
        assert!(parent.unique_constraint(&key).is_some());
        assert!(parent.remove_constraint(&key).is_err());
        assert!(ds.remove_column(p, "code").is_err());
        assert!(ds.remove_table(p).is_err());

        ds.remove_relation(rel).unwrap();
        ds.table_mut(p).unwrap().remove_constraint(&key).unwrap();
        ds.remove_column(p, "code").unwrap();
    }

    #[test]
    fn test_child_requires_parent() {
        let (mut ds, orders, lines, _) = orders(Rule::Cascade);
        let err = ds
            .add(lines, vec![Value::Null, Value::Int32(7), Value::Int32(1)])
            .unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation { .. }));
        assert!(ds.table(lines).unwrap().is_empty());

        ds.add(orders, vec![Value::Int32(7), Value::from("x")]).unwrap();
        line(&mut ds, lines, 7, 1);
        // A null key needs no parent.
        ds.add(lines, vec![Value::Null, Value::Null, Value::Int32(1)]).unwrap();
    }

    #[test]
    fn test_cascade_delete() {
        let (mut ds, orders, lines, rel) = orders(Rule::Cascade);
        let o = ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        let l1 = line(&mut ds, lines, 1, 5);
        let l2 = line(&mut ds, lines, 1, 6);
        ds.accept_changes().unwrap();

        assert_eq!(ds.child_rows(rel, o, RowVersion::Current).unwrap().count(), 2);
        assert_eq!(ds.parent_row(rel, l1, RowVersion::Current).unwrap(), Some(o));

        ds.delete_row(orders, o).unwrap();
        let t = ds.table(lines).unwrap();
        assert_eq!(t.row_state(l1).unwrap(), RowState::Deleted);
        assert_eq!(t.row_state(l2).unwrap(), RowState::Deleted);
        assert_eq!(ds.child_rows(rel, o, RowVersion::Original).unwrap().count(), 2);
    }

    #[test]
    fn test_delete_rule_none_blocks() {
        let (mut ds, orders, lines, _) = orders(Rule::None);
        let o = ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        let l = line(&mut ds, lines, 1, 5);
        let err = ds.delete_row(orders, o).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CascadeFailure);
        assert_eq!(ds.table(orders).unwrap().row_state(o).unwrap(), RowState::Added);
        assert_eq!(ds.table(lines).unwrap().row_state(l).unwrap(), RowState::Added);
    }

    #[test]
    fn test_update_rules() {
        let (mut ds, orders, lines, _) = orders(Rule::Cascade);
        let o = ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        let l = line(&mut ds, lines, 1, 5);
        ds.set_value(orders, o, 0, 2).unwrap();
        assert_eq!(ds.table(lines).unwrap().get(l, 1).unwrap(), &Value::Int32(2));

        let (mut ds, orders, lines, _) = self::orders(Rule::SetNull);
        let o = ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        let l = line(&mut ds, lines, 1, 5);
        ds.set_value(orders, o, 0, 2).unwrap();
        assert_eq!(ds.table(lines).unwrap().get(l, 1).unwrap(), &Value::Null);

        // Default 0 has no parent row.
        let (mut ds, orders, lines, _) = self::orders(Rule::SetDefault);
        let o = ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        let l = line(&mut ds, lines, 1, 5);
        let err = ds.set_value(orders, o, 0, 2).unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation { .. }));
        assert_eq!(ds.table(orders).unwrap().get(o, 0).unwrap(), &Value::Int32(1));
        assert_eq!(ds.table(lines).unwrap().get(l, 1).unwrap(), &Value::Int32(1));
        ds.add(orders, vec![Value::Int32(0), Value::from("fallback")]).unwrap();
        ds.set_value(orders, o, 0, 2).unwrap();
        assert_eq!(ds.table(lines).unwrap().get(l, 1).unwrap(), &Value::Int32(0));
    }

    #[test]
    fn test_set_default_without_default() {
        let (mut ds, orders, lines, _) = orders(Rule::SetDefault);
        ds.table_mut(lines)
            .unwrap()
            .set_column_default("order_id", None)
            .unwrap();
        let o = ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        line(&mut ds, lines, 1, 5);
        let err = ds.delete_row(orders, o).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CascadeFailure);
    }

    #[test]
    fn test_self_referencing_cycle() {
        let mut ds = DataSet::new("d");
        let t = ds.create_table("nodes").unwrap();
        let nodes = ds.table_mut(t).unwrap();
        nodes.add_column(Column::new("id", DataType::Int32)).unwrap();
        nodes.add_column(Column::new("next", DataType::Int32)).unwrap();
        nodes.set_primary_key(&["id"]).unwrap();
        ds.add_relation(RelationDef::new("chain", "nodes", &["id"], "nodes", &["next"]))
            .unwrap();

        ds.set_enforce_constraints(false).unwrap();
        for (id, next) in [(1, 2), (2, 3), (3, 1)] {
            ds.add(t, vec![Value::Int32(id), Value::Int32(next)]).unwrap();
        }
        ds.set_enforce_constraints(true).unwrap();
        ds.accept_changes().unwrap();

        let first = ds.table(t).unwrap().find(&[Value::Int32(1)]).unwrap().unwrap();
        ds.delete_row(t, first).unwrap();
        let table = ds.table(t).unwrap();
        assert!(table.rows().all(|(_, r)| r.state() == RowState::Deleted));
    }

    /// parents(id PK) referenced twice by edges(src, dst).
    fn two_paths(update_rule: Rule, delete_rule: Rule) -> (DataSet, TableId, TableId, RowId, RowId) {
        let mut ds = DataSet::new("graph");
        let parents = ds.create_table("parents").unwrap();
        let t = ds.table_mut(parents).unwrap();
        t.add_column(Column::new("id", DataType::Int32)).unwrap();
        t.set_primary_key(&["id"]).unwrap();
        let edges = ds.create_table("edges").unwrap();
        let t = ds.table_mut(edges).unwrap();
        t.add_column(Column::new("src", DataType::Int32)).unwrap();
        t.add_column(Column::new("dst", DataType::Int32)).unwrap();
        for (name, column) in [("by_src", "src"), ("by_dst", "dst")] {
            ds.add_relation(
                RelationDef::new(name, "parents", &["id"], "edges", &[column])
                    .update_rule(update_rule)
                    .delete_rule(delete_rule),
            )
            .unwrap();
        }
        let p = ds.add(parents, vec![Value::Int32(1)]).unwrap();
        let e = ds.add(edges, vec![Value::Int32(1), Value::Int32(1)]).unwrap();
        ds.accept_changes().unwrap();
        (ds, parents, edges, p, e)
    }

    #[test]
    fn test_cascade_reaches_row_through_two_relations() {
        let (mut ds, parents, edges, p, e) = two_paths(Rule::Cascade, Rule::Cascade);
        ds.set_value(parents, p, 0, 10).unwrap();
        let t = ds.table(edges).unwrap();
        assert_eq!(t.values(e, RowVersion::Current).unwrap(), &[Value::Int32(10), Value::Int32(10)]);
        assert_eq!(t.row_state(e).unwrap(), RowState::Modified);
        assert!(ds.validate().is_ok());

        ds.reject_changes().unwrap();
        let t = ds.table(edges).unwrap();
        assert_eq!(t.values(e, RowVersion::Current).unwrap(), &[Value::Int32(1), Value::Int32(1)]);
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn test_set_null_on_delete_through_two_relations() {
        let (mut ds, parents, edges, p, e) = two_paths(Rule::Cascade, Rule::SetNull);
        ds.delete_row(parents, p).unwrap();
        let t = ds.table(edges).unwrap();
        assert_eq!(t.values(e, RowVersion::Current).unwrap(), &[Value::Null, Value::Null]);
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn test_self_referencing_root_key_change() {
        let mut ds = DataSet::new("d");
        let t = ds.create_table("tree").unwrap();
        let tree = ds.table_mut(t).unwrap();
        tree.add_column(Column::new("id", DataType::Int32)).unwrap();
        tree.add_column(Column::new("parent", DataType::Int32)).unwrap();
        tree.set_primary_key(&["id"]).unwrap();
        ds.add_relation(
            RelationDef::new("children", "tree", &["id"], "tree", &["parent"]).update_rule(Rule::Cascade),
        )
        .unwrap();

        ds.set_enforce_constraints(false).unwrap();
        let root = ds.add(t, vec![Value::Int32(1), Value::Int32(1)]).unwrap();
        let leaf = ds.add(t, vec![Value::Int32(2), Value::Int32(1)]).unwrap();
        ds.set_enforce_constraints(true).unwrap();
        ds.accept_changes().unwrap();

        ds.set_value(t, root, 0, 10).unwrap();
        let table = ds.table(t).unwrap();
        assert_eq!(table.values(root, RowVersion::Current).unwrap(), &[Value::Int32(10), Value::Int32(10)]);
        assert_eq!(table.get(leaf, 1).unwrap(), &Value::Int32(10));
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn test_mutual_key_cascade_terminates() {
        let mut ds = DataSet::new("d");
        for name in ["left", "right"] {
            let id = ds.create_table(name).unwrap();
            let t = ds.table_mut(id).unwrap();
            t.add_column(Column::new("id", DataType::Int32)).unwrap();
            t.set_primary_key(&["id"]).unwrap();
        }
        let left = ds.table_id("left").unwrap();
        let right = ds.table_id("right").unwrap();
        ds.add_relation(RelationDef::new("l_r", "left", &["id"], "right", &["id"]).update_rule(Rule::Cascade))
            .unwrap();
        ds.add_relation(RelationDef::new("r_l", "right", &["id"], "left", &["id"]).update_rule(Rule::Cascade))
            .unwrap();

        ds.set_enforce_constraints(false).unwrap();
        let l = ds.add(left, vec![Value::Int32(1)]).unwrap();
        let r = ds.add(right, vec![Value::Int32(1)]).unwrap();
        ds.set_enforce_constraints(true).unwrap();

        ds.set_value(left, l, 0, 2).unwrap();
        assert_eq!(ds.table(left).unwrap().get(l, 0).unwrap(), &Value::Int32(2));
        assert_eq!(ds.table(right).unwrap().get(r, 0).unwrap(), &Value::Int32(2));
        assert!(ds.validate().is_ok());

        ds.set_value(right, r, 0, 3).unwrap();
        assert_eq!(ds.table(left).unwrap().get(l, 0).unwrap(), &Value::Int32(3));
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn test_enforce_constraints_validation() {
        let (mut ds, orders, lines, _) = orders(Rule::Cascade);
        ds.set_enforce_constraints(false).unwrap();
        let l = line(&mut ds, lines, 9, 1);
        assert!(ds.set_enforce_constraints(true).is_err());
        assert!(!ds.enforce_constraints());
        ds.add(orders, vec![Value::Int32(9), Value::from("late")]).unwrap();
        ds.set_enforce_constraints(true).unwrap();
        assert_eq!(ds.table(lines).unwrap().get(l, 1).unwrap(), &Value::Int32(9));
    }

    #[test]
    fn test_load_data_validates_relations() {
        let (mut ds, orders, lines, _) = orders(Rule::Cascade);
        ds.begin_load_data(lines).unwrap();
        ds.load_data_row(lines, vec![Value::Int32(1), Value::Int32(4), Value::Int32(1)], true)
            .unwrap();
        assert!(ds.end_load_data(lines).is_err());
        assert!(ds.table(lines).unwrap().is_loading());
        ds.load_data_row(orders, vec![Value::Int32(4), Value::from("x")], true).unwrap();
        ds.end_load_data(lines).unwrap();
    }

    #[test]
    fn test_accept_reject_cascade() {
        let mut ds = DataSet::new("d");
        let p = ds.create_table("p").unwrap();
        ds.table_mut(p).unwrap().add_column(Column::new("id", DataType::Int32)).unwrap();
        let c = ds.create_table("c").unwrap();
        ds.table_mut(c).unwrap().add_column(Column::new("pid", DataType::Int32)).unwrap();
        ds.add_relation(
            RelationDef::new("r", "p", &["id"], "c", &["pid"])
                .accept_reject_rule(AcceptRejectRule::Cascade),
        )
        .unwrap();
        let parent = ds.add(p, vec![Value::Int32(1)]).unwrap();
        let child = ds.add(c, vec![Value::Int32(1)]).unwrap();
        let other = ds.add(c, vec![Value::Null]).unwrap();

        ds.accept_row(p, parent).unwrap();
        assert_eq!(ds.table(c).unwrap().row_state(child).unwrap(), RowState::Unchanged);
        assert_eq!(ds.table(c).unwrap().row_state(other).unwrap(), RowState::Added);

        ds.set_value(p, parent, 0, 2).unwrap();
        assert_eq!(ds.table(c).unwrap().row_state(child).unwrap(), RowState::Modified);
        ds.reject_row(p, parent).unwrap();
        assert_eq!(ds.table(p).unwrap().get(parent, 0).unwrap(), &Value::Int32(1));
        assert_eq!(ds.table(c).unwrap().get(child, 0).unwrap(), &Value::Int32(1));
    }

    #[test]
    fn test_clear_table_with_children() {
        let (mut ds, orders, lines, _) = orders(Rule::Cascade);
        ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        line(&mut ds, lines, 1, 5);
        assert!(matches!(ds.clear_table(orders), Err(Error::ForeignKeyViolation { .. })));
        ds.clear_table(lines).unwrap();
        ds.clear_table(orders).unwrap();
        assert!(!ds.has_changes());
    }

    #[test]
    fn test_get_changes_includes_parents() {
        let (mut ds, orders, lines, _) = orders(Rule::Cascade);
        ds.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        ds.add(orders, vec![Value::Int32(2), Value::from("b")]).unwrap();
        let l = line(&mut ds, lines, 1, 5);
        ds.accept_changes().unwrap();
        ds.set_value(lines, l, 2, 9).unwrap();

        let changes = ds.get_changes(&[RowState::Modified]).unwrap();
        let orders_copy = changes.table_by_name("orders").unwrap();
        assert_eq!(orders_copy.len(), 1);
        assert_eq!(orders_copy.rows().next().unwrap().1.state(), RowState::Unchanged);
        assert_eq!(changes.table_by_name("lines").unwrap().len(), 1);
        assert_eq!(changes.relation_ids().count(), 1);

        ds.accept_changes().unwrap();
        assert!(ds.get_changes(&[]).is_none());
    }

    #[test]
    fn test_clone_schema_keeps_relations() {
        let (ds, _, _, _) = orders(Rule::Cascade);
        let mut copy = ds.clone_schema();
        let orders = copy.table_id("orders").unwrap();
        let lines = copy.table_id("lines").unwrap();
        assert!(copy.add(lines, vec![Value::Null, Value::Int32(1), Value::Int32(1)]).is_err());
        copy.add(orders, vec![Value::Int32(1), Value::from("a")]).unwrap();
        copy.add(lines, vec![Value::Null, Value::Int32(1), Value::Int32(1)]).unwrap();
        assert!(ds.table(orders).unwrap().is_empty());
    }
}

//! Row operations with constraint checks, referential rules and rollback.
//!
//! Every public operation runs through [`run`]: its steps record each row
//! slot in a [`Journal`] before touching it, collect their change
//! notifications, and either publish them all on success or roll the
//! journal back on the first error. Cascades re-enter the same steps on
//! child tables inside the same operation, so a parent and its children
//! commit or fail together.
//!
//! Checks follow one rule: column rules and constraints apply while the
//! graph enforces constraints and the table is not loading; referential
//! rules run unless the parent table is loading.

use crate::change::{RowAction, TableChange};
use crate::constraint::{format_key, is_null_key, key_of};
use crate::graph::{RelationId, TableGraph, TableId};
use crate::journal::Journal;
use crate::relation::DataRelation;
use crate::table::DataTable;
use hashbrown::HashSet;
use tabula_core::schema::{AcceptRejectRule, Rule};
use tabula_core::{next_row_id, Error, Result, RowId, RowRecord, RowState, RowVersion, Settle, Value};
use tracing::{debug, trace, warn};

/// State of one running operation.
#[derive(Debug, Default)]
pub(crate) struct Operation {
    journal: Journal,
    changes: Vec<(TableId, TableChange)>,
    resets: Vec<TableId>,
    updated: HashSet<(TableId, RowId)>,
    settled: HashSet<(TableId, RowId)>,
}

impl Operation {
    fn touch<G: TableGraph + ?Sized>(&mut self, g: &G, table: TableId, row: RowId) -> Result<()> {
        let record = g.table(table)?.row(row).ok();
        self.journal.record(table, row, record);
        Ok(())
    }

    fn push(&mut self, table: TableId, row: RowId, action: RowAction) {
        self.changes.push((table, TableChange::row(row, action)));
    }

    /// Replaces the row notifications of `table` with a single reset.
    fn reset(&mut self, table: TableId) {
        if !self.resets.contains(&table) {
            self.resets.push(table);
        }
    }

    fn publish<G: TableGraph + ?Sized>(self, g: &G) {
        let resets = self.resets;
        for (table, change) in self.changes {
            if !resets.contains(&table) {
                g.publish(table, change);
            }
        }
        for table in resets {
            g.publish(table, TableChange::Reset);
        }
    }
}

/// Runs `f` as one atomic operation.
pub(crate) fn run<G, R, F>(g: &mut G, name: &'static str, f: F) -> Result<R>
where
    G: TableGraph + ?Sized,
    F: FnOnce(&mut G, &mut Operation) -> Result<R>,
{
    let mut op = Operation::default();
    match f(g, &mut op) {
        Ok(result) => {
            debug!(operation = name, rows = op.journal.len(), "operation committed");
            op.publish(g);
            Ok(result)
        }
        Err(e) => {
            warn!(operation = name, rows = op.journal.len(), error = %e, "operation rolled back");
            op.journal.rollback(g);
            Err(e)
        }
    }
}

// === Entry points ===

pub(crate) fn add<G: TableGraph + ?Sized>(g: &mut G, table: TableId, values: Vec<Value>) -> Result<RowId> {
    run(g, "add", |g, op| add_in(g, op, table, values))
}

pub(crate) fn end_edit<G: TableGraph + ?Sized>(g: &mut G, table: TableId, row: RowId) -> Result<()> {
    let proposed = g.table_mut(table)?.take_proposed(row)?;
    run(g, "commit", |g, op| update_in(g, op, table, row, proposed))
}

pub(crate) fn set_value<G: TableGraph + ?Sized>(
    g: &mut G,
    table: TableId,
    row: RowId,
    column: usize,
    value: Value,
) -> Result<()> {
    let enforce = g.enforcing(table);
    if g.table(table)?.row(row)?.is_editing() {
        return g.table_mut(table)?.set_proposed(row, column, value, enforce);
    }
    let t = g.table_mut(table)?;
    t.open_edit(row)?;
    if let Err(e) = t.set_proposed(row, column, value, enforce) {
        t.discard_edit(row)?;
        return Err(e);
    }
    end_edit(g, table, row)
}

pub(crate) fn delete<G: TableGraph + ?Sized>(g: &mut G, table: TableId, row: RowId) -> Result<()> {
    run(g, "delete", |g, op| delete_in(g, op, table, row))
}

/// Deletes a row, then removes it physically.
pub(crate) fn remove<G: TableGraph + ?Sized>(g: &mut G, table: TableId, row: RowId) -> Result<()> {
    run(g, "remove", |g, op| {
        if g.table(table)?.row_state(row)? != RowState::Deleted {
            delete_in(g, op, table, row)?;
        }
        if g.table(table)?.contains_row(row) {
            op.touch(g, table, row)?;
            g.table_mut(table)?.remove_record(row);
            op.push(table, row, RowAction::Remove);
        }
        Ok(())
    })
}

pub(crate) fn settle_row<G: TableGraph + ?Sized>(g: &mut G, table: TableId, row: RowId, accept: bool) -> Result<()> {
    let name = if accept { "accept row" } else { "reject row" };
    run(g, name, |g, op| settle_in(g, op, table, row, accept, true))
}

/// Accepts or rejects every row of `tables`.
pub(crate) fn settle_tables<G: TableGraph + ?Sized>(g: &mut G, tables: &[TableId], accept: bool) -> Result<()> {
    let name = if accept { "accept" } else { "reject" };
    run(g, name, |g, op| {
        for &table in tables {
            op.reset(table);
            let rows: Vec<(RowId, RowState)> = g
                .table(table)?
                .rows()
                .map(|(id, r)| (id, r.state()))
                .collect();
            if !accept {
                // Added rows go first so restored keys cannot collide with them.
                for &(id, _) in rows.iter().filter(|(_, s)| *s == RowState::Added) {
                    settle_in(g, op, table, id, false, false)?;
                }
            }
            for &(id, _) in &rows {
                if g.table(table)?.contains_row(id) {
                    settle_in(g, op, table, id, accept, false)?;
                }
            }
        }
        for &table in tables {
            if g.enforcing(table) {
                g.table(table)?.validate_unique()?;
            }
        }
        Ok(())
    })
}

/// Forces an unchanged row into the Added or Modified state.
pub(crate) fn force_state<G: TableGraph + ?Sized>(g: &mut G, table: TableId, row: RowId, state: RowState) -> Result<()> {
    run(g, "set state", |g, op| {
        op.touch(g, table, row)?;
        g.table_mut(table)?.force_record_state(row, state)?;
        op.push(table, row, RowAction::Change);
        Ok(())
    })
}

/// Inserts or updates by primary key.
///
/// Nulls in `values` mean "no value given": a new row takes its defaults,
/// an existing row keeps what it has.
pub(crate) fn load_data_row<G: TableGraph + ?Sized>(
    g: &mut G,
    table: TableId,
    values: Vec<Value>,
    accept: bool,
) -> Result<RowId> {
    run(g, "load row", |g, op| {
        let t = g.table(table)?;
        let existing = match t.primary_key_columns() {
            Some(columns) => {
                let key: Option<Vec<Value>> = columns
                    .iter()
                    .map(|&c| values.get(c).filter(|v| !v.is_null()).cloned())
                    .collect();
                match key {
                    Some(key) => t.find(&key)?,
                    None => None,
                }
            }
            None => None,
        };
        let id = match existing {
            Some(id) => {
                let mut merged = t.values(id, RowVersion::Current)?.to_vec();
                for (slot, value) in merged.iter_mut().zip(values) {
                    if !value.is_null() {
                        *slot = value;
                    }
                }
                let t = g.table_mut(table)?;
                if t.row(id)?.is_editing() {
                    t.discard_edit(id)?;
                }
                update_in(g, op, table, id, merged)?;
                id
            }
            None => {
                let filled = g.table_mut(table)?.fill_values(values)?;
                add_in(g, op, table, filled)?
            }
        };
        if accept {
            settle_in(g, op, table, id, true, false)?;
        }
        Ok(id)
    })
}

/// Inserts a copy of a record, keeping its state and versions.
pub(crate) fn import<G: TableGraph + ?Sized>(g: &mut G, table: TableId, record: RowRecord) -> Result<RowId> {
    run(g, "import", |g, op| {
        let enforce = g.enforcing(table);
        let current = record.current().map(|v| v.to_vec());
        if enforce {
            if let Some(values) = &current {
                g.table(table)?.check_unique(values, None)?;
            }
        }
        let id = next_row_id();
        op.journal.record(table, id, None);
        let t = g.table_mut(table)?;
        t.insert_record(id, record);
        if let Some(values) = &current {
            t.observe_auto_increment(values);
            if enforce {
                check_parents(g, table, values)?;
            }
        }
        op.push(table, id, RowAction::Add);
        Ok(id)
    })
}

/// Removes every row of a table. Fails if enforced foreign keys still
/// reference any of them.
pub(crate) fn clear<G: TableGraph + ?Sized>(g: &mut G, table: TableId) -> Result<()> {
    if g.enforcing(table) {
        let parent = g.table(table)?;
        for rel_id in g.child_relations(table) {
            let rel = g.relation(rel_id)?;
            let Some(fk) = rel.foreign_key() else { continue };
            let child = g.table(rel.child_table())?;
            let referenced = parent.rows().any(|(id, r)| {
                r.current().is_some_and(|v| {
                    let key = key_of(v, rel.parent_columns(), child.is_case_sensitive());
                    !is_null_key(&key)
                        && child
                            .rows_by_key(rel.child_columns(), &key)
                            .iter()
                            .any(|&c| !(rel.is_self_referencing() && c == id))
                })
            });
            if referenced {
                return Err(Error::ForeignKeyViolation {
                    constraint: fk.name.clone(),
                    message: format!(
                        "cannot clear table '{}': rows of '{}' still reference it",
                        parent.name(),
                        child.name()
                    ),
                });
            }
        }
    }
    g.table_mut(table)?.clear_rows();
    Ok(())
}

/// Checks every foreign key of `relations` against the current rows.
pub(crate) fn validate_foreign_keys<G: TableGraph + ?Sized>(g: &G, relations: &[RelationId]) -> Result<()> {
    for &rel_id in relations {
        let rel = g.relation(rel_id)?;
        if rel.foreign_key().is_none() {
            continue;
        }
        let child = g.table(rel.child_table())?;
        for (_, record) in child.rows() {
            if let Some(values) = record.current() {
                check_parent(g, rel, child, values)?;
            }
        }
    }
    Ok(())
}

// === Steps ===

fn add_in<G: TableGraph + ?Sized>(g: &mut G, op: &mut Operation, table: TableId, values: Vec<Value>) -> Result<RowId> {
    let enforce = g.enforcing(table);
    let t = g.table(table)?;
    let values = t.prepare_values(values, enforce)?;
    if enforce {
        t.check_unique(&values, None)?;
    }
    let id = next_row_id();
    op.journal.record(table, id, None);
    let t = g.table_mut(table)?;
    t.observe_auto_increment(&values);
    t.insert_record(id, RowRecord::added(values));
    if enforce {
        let values = g.table(table)?.values(id, RowVersion::Current)?.to_vec();
        check_parents(g, table, &values)?;
    }
    op.push(table, id, RowAction::Add);
    Ok(id)
}

/// Commits new Current values for a row and applies update rules to its
/// children.
///
/// A row may be rewritten several times in one operation: a child reached
/// through two relations, or a self-referencing row whose own key moves.
/// Only a rewrite that changes nothing stops the walk, which is what ends
/// update cycles. Foreign keys of the row are checked once its cascade has
/// settled, against the values it ends up with.
fn update_in<G: TableGraph + ?Sized>(
    g: &mut G,
    op: &mut Operation,
    table: TableId,
    row: RowId,
    mut values: Vec<Value>,
) -> Result<()> {
    let revisit = !op.updated.insert((table, row));
    let enforce = g.enforcing(table);
    let t = g.table(table)?;
    let old = t
        .row(row)?
        .current()
        .ok_or(Error::RowDeleted { row })?
        .to_vec();
    t.apply_computed(&mut values)?;
    if revisit && values == old {
        trace!(table, row, "row already holds these values");
        return Ok(());
    }
    if enforce {
        for (column, value) in t.columns().iter().zip(&values) {
            column.check_rules(t.name(), value)?;
        }
        t.check_unique(&values, Some(row))?;
    }
    op.touch(g, table, row)?;
    g.table_mut(table)?.write_current(row, values)?;
    op.push(table, row, RowAction::Change);
    let values = g.table(table)?.values(row, RowVersion::Current)?.to_vec();
    cascade_update(g, op, table, &old, &values)?;
    if enforce {
        let t = g.table(table)?;
        let Some(settled) = t.row(row).ok().and_then(|r| r.current()) else {
            return Ok(());
        };
        for rel_id in g.parent_relations(table) {
            let rel = g.relation(rel_id)?;
            let cs = g.table(rel.parent_table())?.is_case_sensitive();
            if key_of(&old, rel.child_columns(), cs) != key_of(settled, rel.child_columns(), cs) {
                check_parent(g, rel, t, settled)?;
            }
        }
    }
    Ok(())
}

fn delete_in<G: TableGraph + ?Sized>(g: &mut G, op: &mut Operation, table: TableId, row: RowId) -> Result<()> {
    let record = g.table(table)?.row(row)?;
    let current = record.current().ok_or(Error::RowDeleted { row })?.to_vec();
    op.touch(g, table, row)?;
    let settle = g.table_mut(table)?.mark_deleted(row)?;
    let action = match settle {
        Settle::Remove => RowAction::Remove,
        Settle::Keep => RowAction::Delete,
    };
    op.push(table, row, action);
    cascade_delete(g, op, table, &current)
}

/// Accepts or rejects one row, then propagates along relations whose
/// accept/reject rule is Cascade. With `check` a reject re-validates the
/// restored unique keys.
fn settle_in<G: TableGraph + ?Sized>(
    g: &mut G,
    op: &mut Operation,
    table: TableId,
    row: RowId,
    accept: bool,
    check: bool,
) -> Result<()> {
    if !op.settled.insert((table, row)) {
        return Ok(());
    }
    op.touch(g, table, row)?;
    if accept && g.table(table)?.row(row)?.is_editing() {
        let proposed = g.table_mut(table)?.take_proposed(row)?;
        update_in(g, op, table, row, proposed)?;
    }
    let record = g.table(table)?.row(row)?;
    let key_values = record.current().or_else(|| record.original()).map(|v| v.to_vec());
    let settle = g.table_mut(table)?.settle_row(row, accept)?;
    let action = match (settle, accept) {
        (Settle::Remove, _) => RowAction::Remove,
        (Settle::Keep, true) => RowAction::Commit,
        (Settle::Keep, false) => RowAction::Rollback,
    };
    op.push(table, row, action);

    if check && !accept && g.enforcing(table) {
        let t = g.table(table)?;
        if let Some(values) = t.row(row).ok().and_then(|r| r.current()) {
            t.check_unique(values, Some(row))?;
        }
    }

    let Some(key_values) = key_values else {
        return Ok(());
    };
    for rel_id in g.child_relations(table) {
        let rel = g.relation(rel_id)?;
        let cascades = rel
            .foreign_key()
            .is_some_and(|fk| fk.accept_reject_rule == AcceptRejectRule::Cascade);
        if !cascades {
            continue;
        }
        let child_table = rel.child_table();
        let child = g.table(child_table)?;
        let key = key_of(&key_values, rel.parent_columns(), child.is_case_sensitive());
        if is_null_key(&key) {
            continue;
        }
        let children = rows_with_key(child, rel.child_columns(), &key);
        for c in children {
            trace!(relation = rel_id, child = c, accept, "accept/reject cascade");
            settle_in(g, op, child_table, c, accept, check)?;
        }
    }
    Ok(())
}

// === Referential rules ===

enum KeyAction {
    Delete,
    Assign(Vec<Value>),
    Keep,
}

fn cascade_update<G: TableGraph + ?Sized>(
    g: &mut G,
    op: &mut Operation,
    table: TableId,
    old: &[Value],
    new: &[Value],
) -> Result<()> {
    if g.table(table)?.is_loading() {
        return Ok(());
    }
    for rel_id in g.child_relations(table) {
        let rel = g.relation(rel_id)?;
        let Some(fk) = rel.foreign_key() else { continue };
        let rule = fk.update_rule;
        let child = g.table(rel.child_table())?;
        let cs = child.is_case_sensitive();
        let old_key = key_of(old, rel.parent_columns(), cs);
        if is_null_key(&old_key) || old_key == key_of(new, rel.parent_columns(), cs) {
            continue;
        }
        let children = child.rows_by_key(rel.child_columns(), &old_key);
        if children.is_empty() {
            continue;
        }
        let new_key: Vec<Value> = rel
            .parent_columns()
            .iter()
            .map(|&c| new.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        let action = match rule {
            Rule::Cascade => KeyAction::Assign(new_key),
            _ => rule_action(g, rel, rule, "update")?,
        };
        apply_rule(g, op, rel_id, children, action)?;
    }
    Ok(())
}

fn cascade_delete<G: TableGraph + ?Sized>(g: &mut G, op: &mut Operation, table: TableId, old: &[Value]) -> Result<()> {
    if g.table(table)?.is_loading() {
        return Ok(());
    }
    for rel_id in g.child_relations(table) {
        let rel = g.relation(rel_id)?;
        let Some(fk) = rel.foreign_key() else { continue };
        let rule = fk.delete_rule;
        let child = g.table(rel.child_table())?;
        let key = key_of(old, rel.parent_columns(), child.is_case_sensitive());
        if is_null_key(&key) {
            continue;
        }
        let children = child.rows_by_key(rel.child_columns(), &key);
        if children.is_empty() {
            continue;
        }
        let action = match rule {
            Rule::Cascade => KeyAction::Delete,
            _ => rule_action(g, rel, rule, "delete")?,
        };
        apply_rule(g, op, rel_id, children, action)?;
    }
    Ok(())
}

/// Resolves SetNull, SetDefault and None into the key each child receives.
fn rule_action<G: TableGraph + ?Sized>(g: &G, rel: &DataRelation, rule: Rule, event: &str) -> Result<KeyAction> {
    let child = g.table(rel.child_table())?;
    let constraint = rel.foreign_key().map(|fk| fk.name.as_str()).unwrap_or(rel.name());
    let columns = rel.child_columns().iter().filter_map(|&c| child.column(c));
    match rule {
        Rule::SetNull => {
            if g.enforcing(rel.child_table()) {
                if let Some(column) = columns.clone().find(|c| !c.allows_null()) {
                    return Err(Error::cascade(
                        constraint,
                        format!("cannot set non-nullable column '{}' to null", column.name()),
                    ));
                }
            }
            Ok(KeyAction::Assign(vec![Value::Null; rel.child_columns().len()]))
        }
        Rule::SetDefault => {
            let mut key = Vec::with_capacity(rel.child_columns().len());
            for column in columns {
                let default = column.get_default_value().ok_or_else(|| {
                    Error::cascade(
                        constraint,
                        format!("column '{}' has no default value", column.name()),
                    )
                })?;
                key.push(default.clone());
            }
            Ok(KeyAction::Assign(key))
        }
        Rule::None if g.enforcing(rel.child_table()) => Err(Error::cascade(
            constraint,
            format!(
                "cannot {} parent row: rows of '{}' depend on it",
                event,
                child.name()
            ),
        )),
        _ => Ok(KeyAction::Keep),
    }
}

fn apply_rule<G: TableGraph + ?Sized>(
    g: &mut G,
    op: &mut Operation,
    rel_id: RelationId,
    children: Vec<RowId>,
    action: KeyAction,
) -> Result<()> {
    if matches!(action, KeyAction::Keep) {
        return Ok(());
    }
    let rel = g.relation(rel_id)?;
    let child_table = rel.child_table();
    let child_columns = rel.child_columns().to_vec();
    for c in children {
        // An earlier step of this cascade may have removed or deleted it.
        let Some(current) = g
            .table(child_table)?
            .row(c)
            .ok()
            .and_then(|r| r.current())
            .map(|v| v.to_vec())
        else {
            continue;
        };
        trace!(relation = rel_id, table = child_table, row = c, "cascade step");
        match &action {
            KeyAction::Delete => delete_in(g, op, child_table, c)?,
            KeyAction::Assign(key) => {
                let mut values = current;
                for (&column, value) in child_columns.iter().zip(key) {
                    values[column] = g
                        .table(child_table)?
                        .column(column)
                        .map(|col| col.coerce(value.clone()))
                        .transpose()?
                        .unwrap_or(Value::Null);
                }
                update_in(g, op, child_table, c, values)?;
            }
            KeyAction::Keep => {}
        }
    }
    Ok(())
}

// === Helpers ===

fn check_parents<G: TableGraph + ?Sized>(g: &G, table: TableId, values: &[Value]) -> Result<()> {
    let child = g.table(table)?;
    for rel_id in g.parent_relations(table) {
        check_parent(g, g.relation(rel_id)?, child, values)?;
    }
    Ok(())
}

fn check_parent<G: TableGraph + ?Sized>(g: &G, rel: &DataRelation, child: &DataTable, values: &[Value]) -> Result<()> {
    let Some(fk) = rel.foreign_key() else {
        return Ok(());
    };
    let parent = g.table(rel.parent_table())?;
    let key = key_of(values, rel.child_columns(), parent.is_case_sensitive());
    if is_null_key(&key) || !parent.rows_by_key(rel.parent_columns(), &key).is_empty() {
        return Ok(());
    }
    Err(Error::ForeignKeyViolation {
        constraint: fk.name.clone(),
        message: format!(
            "key {} of table '{}' has no parent row in '{}'",
            format_key(&key),
            child.name(),
            parent.name()
        ),
    })
}

/// Rows whose key matches, reading deleted rows through their Original.
fn rows_with_key(table: &DataTable, columns: &[usize], key: &[Value]) -> Vec<RowId> {
    let cs = table.is_case_sensitive();
    table
        .rows()
        .filter(|(_, r)| {
            r.current()
                .or_else(|| r.original())
                .is_some_and(|v| key_of(v, columns, cs) == key)
        })
        .map(|(id, _)| id)
        .collect()
}

//! Tables: columns, versioned rows, unique constraints and a change feed.
//!
//! Rows live in a `BTreeMap` keyed by [`RowId`]. Ids grow monotonically, so
//! map order is insertion order. Every unique constraint indexes the Current
//! values of the rows that are not deleted; the private record mutators
//! below keep those indexes in step with the rows.
//!
//! A table that belongs to a [`DataSet`](crate::DataSet) refuses row
//! mutations made directly on it: they must go through the data set so
//! foreign keys and cascades see them.

use crate::change::{ChangeFeed, ChangeListener, ListenerId, TableChange};
use crate::constraint::{key_of, ColumnPins, UniqueConstraint};
use crate::cascade;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tabula_core::schema::{names_equal, AutoIncrement, Column, PropertyBag};
use tabula_core::{
    DataType, Error, Result, RowId, RowRecord, RowState, RowVersion, Settle, TableOptions, Value,
};
use tabula_expr::{ColumnSource, Expression};
use tracing::debug;

static NEXT_TABLE_UID: AtomicU64 = AtomicU64::new(1);

/// Type of one slot of a detached row.
#[derive(Clone, Debug, PartialEq)]
struct Slot {
    name: String,
    data_type: DataType,
    computed: bool,
}

/// A row created by [`DataTable::new_row`] that has not been added yet.
///
/// It belongs to no table: views and constraints do not see it.
#[derive(Clone, Debug)]
pub struct DataRow {
    table: u64,
    slots: Rc<[Slot]>,
    values: Vec<Value>,
}

impl PartialEq for DataRow {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.values == other.values
    }
}

impl DataRow {
    /// Always `RowState::Detached`.
    pub fn state(&self) -> RowState {
        RowState::Detached
    }

    pub fn get(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }

    /// Converts and stores a value. Computed columns refuse writes; null and
    /// max length rules are checked when the row is added.
    pub fn set(&mut self, column: usize, value: impl Into<Value>) -> Result<()> {
        let slot = self
            .slots
            .get(column)
            .ok_or_else(|| Error::invalid_operation(format!("column ordinal {} is out of range", column)))?;
        if slot.computed {
            return Err(Error::ReadOnly {
                column: slot.name.clone(),
            });
        }
        let value = value.into();
        let converted = value.coerce_to(slot.data_type).ok_or_else(|| Error::TypeMismatch {
            column: slot.name.clone(),
            expected: slot.data_type,
            value: value.to_string(),
        })?;
        self.values[column] = converted;
        Ok(())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// An in-memory table of versioned rows.
pub struct DataTable {
    uid: u64,
    name: String,
    options: TableOptions,
    columns: Vec<Column>,
    rows: BTreeMap<RowId, RowRecord>,
    uniques: Vec<UniqueConstraint>,
    computed: Vec<(usize, Expression)>,
    pins: ColumnPins,
    properties: PropertyBag,
    feed: ChangeFeed,
    attached: bool,
    loading: bool,
    enforce: bool,
    next_constraint: usize,
}

impl core::fmt::Debug for DataTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataTable")
            .field("name", &self.name)
            .field("columns", &self.columns.len())
            .field("rows", &self.rows.len())
            .finish()
    }
}

impl DataTable {
    /// Creates an empty, case-insensitive table.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, TableOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: TableOptions) -> Self {
        Self {
            uid: NEXT_TABLE_UID.fetch_add(1, Ordering::SeqCst),
            name: name.into(),
            options,
            columns: Vec::new(),
            rows: BTreeMap::new(),
            uniques: Vec::new(),
            computed: Vec::new(),
            pins: ColumnPins::default(),
            properties: PropertyBag::new(),
            feed: ChangeFeed::new(),
            attached: false,
            loading: false,
            enforce: true,
            next_constraint: 1,
        }
    }

    // === Identity and options ===

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Renames a standalone table. Tables of a data set are renamed through
    /// the data set, which keeps names unique.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<()> {
        self.check_standalone()?;
        self.name = name.into();
        Ok(())
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    #[inline]
    pub fn is_case_sensitive(&self) -> bool {
        self.options.case_sensitive
    }

    /// Changes string comparison for keys and names.
    ///
    /// Fails, leaving the setting unchanged, if unique keys would collide
    /// under the new comparison.
    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> Result<()> {
        if case_sensitive == self.options.case_sensitive {
            return Ok(());
        }
        let previous = self.options.case_sensitive;
        self.options.case_sensitive = case_sensitive;
        self.rebuild_indexes();
        if self.enforce && !self.loading {
            if let Err(e) = self.validate_unique() {
                self.options.case_sensitive = previous;
                self.rebuild_indexes();
                return Err(e);
            }
        }
        self.rebind_computed()?;
        self.feed.publish(self, TableChange::Reset);
        Ok(())
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }

    /// Returns true if the table is owned by a data set.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    pub(crate) fn check_standalone(&self) -> Result<()> {
        if self.attached {
            return Err(Error::invalid_operation(format!(
                "table '{}' belongs to a data set; modify it through the data set",
                self.name
            )));
        }
        Ok(())
    }

    /// Returns true between `begin_load_data` and `end_load_data`.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether constraints are checked on commit (standalone tables only; a
    /// data set carries its own setting).
    pub fn enforces_constraints(&self) -> bool {
        self.enforce
    }

    /// Turns constraint enforcement on or off for a standalone table.
    ///
    /// Turning it on validates every row first; on failure enforcement stays
    /// off.
    pub fn set_enforce_constraints(&mut self, enforce: bool) -> Result<()> {
        self.check_standalone()?;
        if enforce && !self.enforce {
            self.validate_constraints()?;
        }
        self.enforce = enforce;
        Ok(())
    }

    // === Change feed ===

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Registers a change listener; see [`ChangeFeed::subscribe`].
    pub fn subscribe(&mut self, listener: &Rc<RefCell<dyn ChangeListener>>) -> ListenerId {
        self.feed.prune();
        self.feed.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.feed.unsubscribe(id)
    }

    pub(crate) fn publish_reset(&self) {
        if !self.loading {
            self.feed.publish(self, TableChange::Reset);
        }
    }

    // === Columns ===

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Resolves a column name: an exact match wins, then a match under the
    /// table's case rule.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name).or_else(|| {
            self.columns
                .iter()
                .position(|c| names_equal(c.name(), name, self.options.case_sensitive))
        })
    }

    /// Like [`column_index`](Self::column_index) but fails with `ColumnNotFound`.
    pub fn ordinal(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.column_index(name).and_then(|i| self.columns.get(i))
    }

    fn name_taken(&self, name: &str, except: Option<usize>) -> bool {
        self.columns
            .iter()
            .enumerate()
            .any(|(i, c)| Some(i) != except && names_equal(c.name(), name, self.options.case_sensitive))
    }

    /// Appends a column. Existing rows receive the column's default,
    /// auto-increment or computed value.
    pub fn add_column(&mut self, mut column: Column) -> Result<usize> {
        column.validate()?;
        if self.name_taken(column.name(), None) {
            return Err(Error::DuplicateColumn {
                table: self.name.clone(),
                column: column.name().to_string(),
            });
        }
        let index = self.columns.len();
        column.set_ordinal(index);

        let expression = match column.get_expression() {
            Some(text) => Some(Expression::compile_column(text, self)?),
            None => None,
        };

        // Values for existing rows, computed before anything changes.
        let mut fill: Vec<(RowId, Value)> = Vec::with_capacity(self.rows.len());
        for (&id, record) in &self.rows {
            let value = match (&expression, record.current().or(record.original())) {
                (Some(expr), Some(values)) => column.coerce(expr.eval(values)?)?,
                _ => column.new_row_value(),
            };
            if self.enforce && !self.loading {
                column.check_rules(&self.name, &value)?;
            }
            fill.push((id, value));
        }
        if column.is_unique() && self.enforce && !self.loading {
            let mut seen = hashbrown::HashSet::new();
            for (_, v) in &fill {
                if !seen.insert(v.fold_case(self.options.case_sensitive)) {
                    return Err(Error::invalid_constraint(
                        column.name(),
                        format!("existing rows hold duplicate value {}", v),
                    ));
                }
            }
        }

        debug!(table = %self.name, column = %column.name(), rows = fill.len(), "add column");
        let unique = column.is_unique();
        self.columns.push(column);
        for (id, value) in fill {
            if let Some(record) = self.rows.get_mut(&id) {
                record.map_values(|v| v.push(value.clone()));
            }
        }
        if let Some(expr) = &expression {
            self.pins.pin(&expr.columns());
        }
        if unique {
            let constraint = self.next_constraint_name();
            let mut uc = UniqueConstraint::new(constraint, vec![index], false);
            self.pins.pin(&[index]);
            uc.rebuild(current_rows(&self.rows), self.options.case_sensitive);
            self.uniques.push(uc);
        }
        self.rebind_computed()?;
        // Recompute per version so Original values carry the right result.
        if expression.is_some() {
            self.recompute_all();
        }
        self.publish_reset();
        Ok(index)
    }

    /// Removes a column that no constraint, relation or expression uses.
    ///
    /// The column's own single-column unique constraint is dropped with it.
    pub fn remove_column(&mut self, name: &str) -> Result<Column> {
        self.check_standalone()?;
        self.remove_column_unchecked(name)
    }

    pub(crate) fn remove_column_unchecked(&mut self, name: &str) -> Result<Column> {
        let index = self.ordinal(name)?;
        let own = self
            .uniques
            .iter()
            .position(|u| u.columns() == [index] && !u.is_primary_key() && !u.is_pinned());
        let pinned_elsewhere = {
            let mut pins = self.pins.clone();
            if own.is_some() {
                pins.unpin(&[index]);
            }
            pins.is_pinned(index)
        };
        if pinned_elsewhere {
            return Err(Error::invalid_schema(format!(
                "column '{}' is used by a constraint, relation or expression",
                name
            )));
        }
        if let Some(pos) = own {
            self.uniques.remove(pos);
            self.pins.unpin(&[index]);
        }
        if let Some((_, expr)) = self.computed.iter().find(|(i, _)| *i == index) {
            let refs = expr.columns();
            self.pins.unpin(&refs);
        }

        let mut column = self.columns.remove(index);
        for (i, c) in self.columns.iter_mut().enumerate() {
            c.set_ordinal(i);
        }
        for record in self.rows.values_mut() {
            record.map_values(|v| {
                if index < v.len() {
                    v.remove(index);
                }
            });
        }
        self.pins.column_removed(index);
        for uc in &mut self.uniques {
            uc.shift_columns(index);
        }
        self.rebind_computed()?;
        column.set_unique_flag(false);
        debug!(table = %self.name, column = %column.name(), "remove column");
        self.publish_reset();
        Ok(column)
    }

    /// Renames a column. Columns read by a computed column keep their name.
    pub fn rename_column(&mut self, name: &str, new_name: &str) -> Result<()> {
        let index = self.ordinal(name)?;
        if new_name.is_empty() {
            return Err(Error::invalid_schema("column name cannot be empty"));
        }
        if self.name_taken(new_name, Some(index)) {
            return Err(Error::DuplicateColumn {
                table: self.name.clone(),
                column: new_name.to_string(),
            });
        }
        if self.computed.iter().any(|(_, e)| e.columns().contains(&index)) {
            return Err(Error::invalid_schema(format!(
                "column '{}' is referenced by a computed column",
                name
            )));
        }
        self.columns[index].set_name(new_name.to_string());
        self.rebind_computed()?;
        self.publish_reset();
        Ok(())
    }

    fn column_mut(&mut self, name: &str) -> Result<(usize, &mut Column)> {
        let index = self.ordinal(name)?;
        Ok((index, &mut self.columns[index]))
    }

    /// Allows or forbids nulls. Forbidding fails if a current value is null.
    pub fn set_column_allow_null(&mut self, name: &str, allow_null: bool) -> Result<()> {
        let index = self.ordinal(name)?;
        if !allow_null && self.enforce && !self.loading {
            if self.current_values(index).any(Value::is_null) {
                return Err(Error::invalid_schema(format!(
                    "column '{}' has null values",
                    name
                )));
            }
        }
        self.columns[index].set_allow_null(allow_null);
        Ok(())
    }

    /// Sets the max length of a string column. Shrinking fails if a current
    /// value is longer.
    pub fn set_column_max_length(&mut self, name: &str, max_length: Option<usize>) -> Result<()> {
        let index = self.ordinal(name)?;
        if let Some(max) = max_length {
            if self.columns[index].data_type() != DataType::String {
                return Err(Error::invalid_schema(format!(
                    "max length only applies to string columns, '{}' is {}",
                    name,
                    self.columns[index].data_type()
                )));
            }
            let too_long = self
                .current_values(index)
                .filter_map(Value::as_str)
                .any(|s| s.chars().count() > max);
            if too_long {
                return Err(Error::invalid_schema(format!(
                    "column '{}' holds values longer than {}",
                    name, max
                )));
            }
        }
        self.columns[index].set_max_length(max_length);
        Ok(())
    }

    /// Adds or drops the column's single-column unique constraint.
    pub fn set_column_unique(&mut self, name: &str, unique: bool) -> Result<()> {
        let index = self.ordinal(name)?;
        if self.columns[index].is_computed() && unique {
            return Err(Error::invalid_schema(format!(
                "computed column '{}' cannot be unique",
                name
            )));
        }
        let existing = self.uniques.iter().position(|u| u.columns() == [index]);
        match (unique, existing) {
            (true, None) => {
                let column_name = self.columns[index].name().to_string();
                self.add_unique_constraint(None, &[column_name.as_str()], false)?;
            }
            (false, Some(pos)) => {
                if self.uniques[pos].is_pinned() || self.uniques[pos].is_primary_key() {
                    return Err(Error::invalid_schema(format!(
                        "column '{}' is a key of a primary key or relation",
                        name
                    )));
                }
                self.uniques.remove(pos);
                self.pins.unpin(&[index]);
            }
            _ => {}
        }
        self.columns[index].set_unique_flag(unique);
        Ok(())
    }

    pub fn set_column_default(&mut self, name: &str, value: Option<Value>) -> Result<()> {
        let (_, column) = self.column_mut(name)?;
        let value = match value {
            Some(v) => Some(column.coerce(v)?),
            None => None,
        };
        if column.get_auto_increment().is_some() && value.as_ref().is_some_and(|v| !v.is_null()) {
            return Err(Error::invalid_schema(format!(
                "auto-increment column '{}' cannot have a default value",
                name
            )));
        }
        column.set_default_value(value);
        Ok(())
    }

    pub fn set_column_read_only(&mut self, name: &str, read_only: bool) -> Result<()> {
        self.column_mut(name)?.1.set_read_only(read_only);
        Ok(())
    }

    /// Turns auto-increment on with `(seed, step)` or off.
    pub fn set_column_auto_increment(&mut self, name: &str, settings: Option<(i64, i64)>) -> Result<()> {
        let (_, column) = self.column_mut(name)?;
        match settings {
            Some((seed, step)) => {
                if !column.data_type().is_integer() {
                    return Err(Error::invalid_schema(format!(
                        "auto-increment column '{}' must be an integer type",
                        name
                    )));
                }
                if column.is_computed() {
                    return Err(Error::invalid_schema(format!(
                        "column '{}' cannot be both computed and auto-increment",
                        name
                    )));
                }
                if step == 0 {
                    return Err(Error::invalid_schema("auto-increment step cannot be zero"));
                }
                column.set_default_value(None);
                column.set_auto_increment(Some(AutoIncrement::new(seed, step)));
            }
            None => column.set_auto_increment(None),
        }
        Ok(())
    }

    pub fn set_column_caption(&mut self, name: &str, caption: Option<String>) -> Result<()> {
        self.column_mut(name)?.1.set_caption(caption);
        Ok(())
    }

    pub fn column_properties_mut(&mut self, name: &str) -> Result<&mut PropertyBag> {
        Ok(self.column_mut(name)?.1.properties_mut())
    }

    fn current_values(&self, column: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows
            .values()
            .filter_map(move |r| r.current().and_then(|v| v.get(column)))
    }

    pub(crate) fn pin_columns(&mut self, columns: &[usize]) {
        self.pins.pin(columns);
    }

    pub(crate) fn unpin_columns(&mut self, columns: &[usize]) {
        self.pins.unpin(columns);
    }

    /// Returns true if a constraint, relation or expression uses the column.
    pub fn is_column_pinned(&self, column: usize) -> bool {
        self.pins.is_pinned(column)
    }

    // === Computed columns ===

    fn rebind_computed(&mut self) -> Result<()> {
        let mut computed = Vec::new();
        for (i, c) in self.columns.iter().enumerate() {
            if let Some(text) = c.get_expression() {
                computed.push((i, Expression::compile_column(text, self)?));
            }
        }
        self.computed = computed;
        Ok(())
    }

    /// Evaluates computed columns over `values` in place.
    pub(crate) fn apply_computed(&self, values: &mut [Value]) -> Result<()> {
        for (index, expr) in &self.computed {
            let result = expr.eval(values)?;
            values[*index] = self.columns[*index].coerce(result)?;
        }
        Ok(())
    }

    fn recompute_all(&mut self) {
        let computed = std::mem::take(&mut self.computed);
        let columns = &self.columns;
        for record in self.rows.values_mut() {
            record.map_values(|values| {
                for (index, expr) in &computed {
                    let v = expr
                        .eval(values)
                        .and_then(|r| columns[*index].coerce(r))
                        .unwrap_or(Value::Null);
                    values[*index] = v;
                }
            });
        }
        self.computed = computed;
        self.rebuild_indexes();
    }

    // === Unique constraints ===

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.uniques
    }

    pub fn unique_constraint(&self, name: &str) -> Option<&UniqueConstraint> {
        self.uniques
            .iter()
            .find(|u| names_equal(u.name(), name, self.options.case_sensitive))
    }

    pub fn primary_key(&self) -> Option<&UniqueConstraint> {
        self.uniques.iter().find(|u| u.is_primary_key())
    }

    /// Column ordinals of the primary key.
    pub fn primary_key_columns(&self) -> Option<&[usize]> {
        self.primary_key().map(|u| u.columns())
    }

    fn next_constraint_name(&mut self) -> String {
        loop {
            let name = format!("Constraint{}", self.next_constraint);
            self.next_constraint += 1;
            if !self.constraint_name_taken(&name) {
                return name;
            }
        }
    }

    pub(crate) fn constraint_name_taken(&self, name: &str) -> bool {
        self.unique_constraint(name).is_some()
    }

    pub(crate) fn find_unique(&self, columns: &[usize]) -> Option<usize> {
        self.uniques.iter().position(|u| u.columns() == columns)
    }

    pub(crate) fn unique_mut(&mut self, index: usize) -> Option<&mut UniqueConstraint> {
        self.uniques.get_mut(index)
    }

    /// Adds a unique constraint over `columns` and returns its name.
    ///
    /// Existing rows must already be unique on those columns.
    pub fn add_unique_constraint(&mut self, name: Option<&str>, columns: &[&str], primary_key: bool) -> Result<String> {
        let ordinals = columns
            .iter()
            .map(|c| self.ordinal(c))
            .collect::<Result<Vec<_>>>()?;
        let name = match name {
            Some(n) => {
                if self.constraint_name_taken(n) {
                    return Err(Error::DuplicateConstraint {
                        table: self.name.clone(),
                        name: n.to_string(),
                    });
                }
                n.to_string()
            }
            None => self.next_constraint_name(),
        };
        self.add_unique_ordinals(name, ordinals, primary_key)
    }

    pub(crate) fn add_unique_ordinals(&mut self, name: String, ordinals: Vec<usize>, primary_key: bool) -> Result<String> {
        if ordinals.is_empty() {
            return Err(Error::invalid_constraint(&name, "a unique constraint needs at least one column"));
        }
        if primary_key && self.primary_key().is_some() {
            return Err(Error::invalid_constraint(&name, format!("table '{}' already has a primary key", self.name)));
        }
        for &c in &ordinals {
            if self.columns[c].is_computed() {
                return Err(Error::invalid_constraint(
                    &name,
                    format!("computed column '{}' cannot be part of a key", self.columns[c].name()),
                ));
            }
        }
        let mut uc = UniqueConstraint::new(name.clone(), ordinals.clone(), primary_key);
        uc.rebuild(current_rows(&self.rows), self.options.case_sensitive);
        if self.enforce && !self.loading {
            uc.validate(&self.name)
                .map_err(|e| Error::invalid_constraint(&name, e.to_string()))?;
        }
        if primary_key {
            self.require_non_null(&ordinals, &name)?;
            for &c in &ordinals {
                self.columns[c].set_allow_null(false);
            }
        }
        if ordinals.len() == 1 {
            self.columns[ordinals[0]].set_unique_flag(true);
        }
        self.pins.pin(&ordinals);
        self.uniques.push(uc);
        debug!(table = %self.name, constraint = %name, primary_key, "add unique constraint");
        Ok(name)
    }

    fn require_non_null(&self, ordinals: &[usize], constraint: &str) -> Result<()> {
        for &c in ordinals {
            if self.current_values(c).any(Value::is_null) {
                return Err(Error::invalid_constraint(
                    constraint,
                    format!("column '{}' contains nulls", self.columns[c].name()),
                ));
            }
        }
        Ok(())
    }

    /// Removes a unique constraint that no relation depends on.
    pub fn remove_constraint(&mut self, name: &str) -> Result<()> {
        let pos = self
            .uniques
            .iter()
            .position(|u| names_equal(u.name(), name, self.options.case_sensitive))
            .ok_or_else(|| Error::ConstraintNotFound {
                table: self.name.clone(),
                name: name.to_string(),
            })?;
        if self.uniques[pos].is_pinned() {
            return Err(Error::invalid_operation(format!(
                "constraint '{}' is the parent key of a relation",
                name
            )));
        }
        let uc = self.uniques.remove(pos);
        self.pins.unpin(uc.columns());
        if let [single] = uc.columns() {
            if self.find_unique(&[*single]).is_none() {
                self.columns[*single].set_unique_flag(false);
            }
        }
        Ok(())
    }

    /// Sets the primary key columns; an empty list clears the primary key
    /// (its unique constraint stays).
    pub fn set_primary_key(&mut self, columns: &[&str]) -> Result<()> {
        let ordinals = columns
            .iter()
            .map(|c| self.ordinal(c))
            .collect::<Result<Vec<_>>>()?;
        if let Some(pos) = self.uniques.iter().position(|u| u.is_primary_key()) {
            if self.uniques[pos].columns() == ordinals.as_slice() {
                return Ok(());
            }
        }
        if !ordinals.is_empty() {
            if let Some(pos) = self.find_unique(&ordinals) {
                let name = self.uniques[pos].name().to_string();
                self.require_non_null(&ordinals, &name)?;
                self.demote_primary_key();
                self.uniques[pos].set_primary_key(true);
                for &c in &ordinals {
                    self.columns[c].set_allow_null(false);
                }
                return Ok(());
            }
        }
        let previous = self.uniques.iter().position(|u| u.is_primary_key());
        if let Some(pos) = previous {
            self.uniques[pos].set_primary_key(false);
        }
        if ordinals.is_empty() {
            return Ok(());
        }
        let name = self.next_constraint_name();
        match self.add_unique_ordinals(name, ordinals, true) {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(pos) = previous {
                    self.uniques[pos].set_primary_key(true);
                }
                Err(e)
            }
        }
    }

    fn demote_primary_key(&mut self) {
        for uc in &mut self.uniques {
            uc.set_primary_key(false);
        }
    }

    /// Fails if `values` would duplicate a unique key of another row.
    pub(crate) fn check_unique(&self, values: &[Value], except: Option<RowId>) -> Result<()> {
        for uc in &self.uniques {
            uc.check(&self.name, values, except, self.options.case_sensitive)?;
        }
        Ok(())
    }

    pub(crate) fn validate_unique(&self) -> Result<()> {
        for uc in &self.uniques {
            uc.validate(&self.name)?;
        }
        Ok(())
    }

    /// Checks unique constraints and column rules over every current row.
    pub(crate) fn validate_constraints(&self) -> Result<()> {
        self.validate_unique()?;
        for record in self.rows.values() {
            if let Some(values) = record.current() {
                for (column, value) in self.columns.iter().zip(values) {
                    column.check_rules(&self.name, value)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn rebuild_indexes(&mut self) {
        let cs = self.options.case_sensitive;
        for uc in &mut self.uniques {
            uc.rebuild(current_rows(&self.rows), cs);
        }
    }

    // === Row reads ===

    /// Number of rows, including deleted ones.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row ids in table order.
    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.keys().copied()
    }

    /// Rows in table order.
    pub fn rows(&self) -> impl Iterator<Item = (RowId, &RowRecord)> + '_ {
        self.rows.iter().map(|(id, r)| (*id, r))
    }

    pub fn contains_row(&self, row: RowId) -> bool {
        self.rows.contains_key(&row)
    }

    pub fn row(&self, row: RowId) -> Result<&RowRecord> {
        self.rows.get(&row).ok_or_else(|| Error::RowNotFound {
            table: self.name.clone(),
            row,
        })
    }

    pub fn row_state(&self, row: RowId) -> Result<RowState> {
        Ok(self.row(row)?.state())
    }

    pub fn values(&self, row: RowId, version: RowVersion) -> Result<&[Value]> {
        self.row(row)?.values(row, version)
    }

    /// Reads a value of the Default version.
    pub fn get(&self, row: RowId, column: usize) -> Result<&Value> {
        self.get_version(row, column, RowVersion::Default)
    }

    pub fn get_version(&self, row: RowId, column: usize, version: RowVersion) -> Result<&Value> {
        let values = self.values(row, version)?;
        values.get(column).ok_or_else(|| Error::column_not_found(&self.name, format!("#{}", column)))
    }

    pub fn get_by_name(&self, row: RowId, column: &str) -> Result<&Value> {
        let index = self.ordinal(column)?;
        self.get(row, index)
    }

    /// Finds a row by primary key.
    pub fn find(&self, key: &[Value]) -> Result<Option<RowId>> {
        let pk = self
            .primary_key()
            .ok_or_else(|| Error::invalid_operation(format!("table '{}' has no primary key", self.name)))?;
        self.find_in(pk, key)
    }

    fn find_in(&self, uc: &UniqueConstraint, key: &[Value]) -> Result<Option<RowId>> {
        if key.len() != uc.columns().len() {
            return Err(Error::invalid_operation(format!(
                "expected {} key values, got {}",
                uc.columns().len(),
                key.len()
            )));
        }
        let mut folded = Vec::with_capacity(key.len());
        for (&c, v) in uc.columns().iter().zip(key) {
            folded.push(self.columns[c].coerce(v.clone())?.fold_case(self.options.case_sensitive));
        }
        Ok(uc.lookup(&folded).first().copied())
    }

    /// Finds rows whose current values equal `key` on `columns`, using a
    /// unique index when one covers the columns.
    pub(crate) fn rows_by_key(&self, columns: &[usize], key: &[Value]) -> Vec<RowId> {
        if let Some(pos) = self.find_unique(columns) {
            return self.uniques[pos].lookup(&key.to_vec());
        }
        let cs = self.options.case_sensitive;
        self.rows
            .iter()
            .filter(|(_, r)| r.current().is_some_and(|v| key_of(v, columns, cs) == key))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.rows.values().any(|r| r.state() != RowState::Unchanged)
    }

    pub fn has_errors(&self) -> bool {
        self.rows.values().any(|r| r.error().is_some())
    }

    pub fn rows_with_errors(&self) -> Vec<RowId> {
        self.rows
            .iter()
            .filter(|(_, r)| r.error().is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    // === Record mutators (index maintaining) ===

    fn unindex(&mut self, row: RowId) {
        let cs = self.options.case_sensitive;
        if let Some(values) = self.rows.get(&row).and_then(|r| r.current()) {
            for uc in &mut self.uniques {
                uc.remove(values, row, cs);
            }
        }
    }

    fn index(&mut self, row: RowId) {
        let cs = self.options.case_sensitive;
        if let Some(values) = self.rows.get(&row).and_then(|r| r.current()) {
            for uc in &mut self.uniques {
                uc.insert(values, row, cs);
            }
        }
    }

    fn with_record<R>(&mut self, row: RowId, f: impl FnOnce(&mut RowRecord) -> Result<R>) -> Result<R> {
        if !self.rows.contains_key(&row) {
            return Err(Error::RowNotFound {
                table: self.name.clone(),
                row,
            });
        }
        self.unindex(row);
        let result = match self.rows.get_mut(&row) {
            Some(record) => f(record),
            None => Err(Error::RowNotFound {
                table: self.name.clone(),
                row,
            }),
        };
        self.index(row);
        result
    }

    /// Puts a slot back to a journaled state.
    pub(crate) fn restore_slot(&mut self, row: RowId, before: Option<RowRecord>) {
        self.unindex(row);
        match before {
            Some(record) => {
                self.rows.insert(row, record);
                self.index(row);
            }
            None => {
                self.rows.remove(&row);
            }
        }
    }

    pub(crate) fn insert_record(&mut self, row: RowId, record: RowRecord) {
        self.rows.insert(row, record);
        self.index(row);
    }

    pub(crate) fn remove_record(&mut self, row: RowId) -> Option<RowRecord> {
        self.unindex(row);
        self.rows.remove(&row)
    }

    pub(crate) fn write_current(&mut self, row: RowId, values: Vec<Value>) -> Result<()> {
        self.with_record(row, |r| r.commit(row, values))
    }

    /// Marks a row deleted, removing it physically if it was added.
    pub(crate) fn mark_deleted(&mut self, row: RowId) -> Result<Settle> {
        let settle = self.with_record(row, |r| r.delete(row))?;
        if settle == Settle::Remove {
            self.remove_record(row);
        }
        Ok(settle)
    }

    /// Accepts or rejects one row, removing it physically when required.
    pub(crate) fn settle_row(&mut self, row: RowId, accept: bool) -> Result<Settle> {
        let settle = self.with_record(row, |r| Ok(if accept { r.accept() } else { r.reject() }))?;
        if settle == Settle::Remove {
            self.remove_record(row);
        }
        Ok(settle)
    }

    pub(crate) fn force_record_state(&mut self, row: RowId, state: RowState) -> Result<()> {
        let record = self.rows.get_mut(&row).ok_or_else(|| Error::RowNotFound {
            table: self.name.clone(),
            row,
        })?;
        match state {
            RowState::Added => record.set_added(),
            _ => record.set_modified(),
        }
    }

    pub(crate) fn open_edit(&mut self, row: RowId) -> Result<()> {
        self.rows
            .get_mut(&row)
            .ok_or_else(|| Error::RowNotFound {
                table: self.name.clone(),
                row,
            })?
            .begin_edit(row)
    }

    pub(crate) fn take_proposed(&mut self, row: RowId) -> Result<Vec<Value>> {
        let name = self.name.clone();
        self.rows
            .get_mut(&row)
            .ok_or(Error::RowNotFound { table: name, row })?
            .take_proposed()
            .ok_or(Error::NoEditInProgress { row })
    }

    pub(crate) fn discard_edit(&mut self, row: RowId) -> Result<()> {
        let name = self.name.clone();
        let record = self.rows.get_mut(&row).ok_or(Error::RowNotFound { table: name, row })?;
        if !record.is_editing() {
            return Err(Error::NoEditInProgress { row });
        }
        record.cancel_edit();
        Ok(())
    }

    /// Stores a value into the open edit after checking the column rules.
    pub(crate) fn set_proposed(&mut self, row: RowId, column: usize, value: Value, enforce: bool) -> Result<()> {
        let col = self
            .columns
            .get(column)
            .ok_or_else(|| Error::column_not_found(&self.name, format!("#{}", column)))?;
        if col.is_read_only() {
            return Err(Error::ReadOnly {
                column: col.name().to_string(),
            });
        }
        let value = if enforce {
            col.check_value(&self.name, value)?
        } else {
            col.coerce(value)?
        };
        let mut proposed = {
            let record = self.row(row)?;
            record.proposed().ok_or(Error::NoEditInProgress { row })?.to_vec()
        };
        proposed[column] = value;
        self.apply_computed(&mut proposed)?;
        if let Some(slot) = self.rows.get_mut(&row).and_then(|r| r.proposed_mut()) {
            *slot = proposed;
        }
        Ok(())
    }

    pub(crate) fn set_row_error_text(&mut self, row: RowId, error: Option<String>) -> Result<()> {
        let name = self.name.clone();
        self.rows
            .get_mut(&row)
            .ok_or(Error::RowNotFound { table: name, row })?
            .set_error(error);
        Ok(())
    }

    /// Converts and checks a full row of values, then evaluates computed
    /// columns.
    pub(crate) fn prepare_values(&self, values: Vec<Value>, enforce: bool) -> Result<Vec<Value>> {
        if values.len() != self.columns.len() {
            return Err(Error::invalid_operation(format!(
                "table '{}' has {} columns, got {} values",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        let mut out = Vec::with_capacity(values.len());
        for (column, value) in self.columns.iter().zip(values) {
            let value = if column.is_computed() {
                Value::Null
            } else {
                column.coerce(value)?
            };
            out.push(value);
        }
        self.apply_computed(&mut out)?;
        if enforce {
            for (column, value) in self.columns.iter().zip(&out) {
                column.check_rules(&self.name, value)?;
            }
        }
        Ok(out)
    }

    /// Moves auto-increment generators past explicitly supplied values.
    pub(crate) fn observe_auto_increment(&mut self, values: &[Value]) {
        for (column, value) in self.columns.iter_mut().zip(values) {
            if let (Some(auto), Some(v)) = (column.auto_increment_mut(), value.to_i64()) {
                auto.observe(v);
            }
        }
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn uid(&self) -> u64 {
        self.uid
    }

    // === Row operations ===

    /// Creates a detached row holding defaults and auto-increment values.
    ///
    /// Auto-increment generators advance here and are not rewound if the
    /// row is never added or its add fails.
    pub fn new_row(&mut self) -> DataRow {
        let slots = self
            .columns
            .iter()
            .map(|c| Slot {
                name: c.name().to_string(),
                data_type: c.data_type(),
                computed: c.is_computed(),
            })
            .collect();
        DataRow {
            table: self.uid,
            slots,
            values: self.new_row_values(),
        }
    }

    fn new_row_values(&mut self) -> Vec<Value> {
        self.columns.iter_mut().map(|c| c.new_row_value()).collect()
    }

    /// Builds a full value vector from a partial one: missing trailing
    /// values and nulls in columns with a default or auto-increment take
    /// the new-row value.
    pub(crate) fn fill_values(&mut self, values: Vec<Value>) -> Result<Vec<Value>> {
        if values.len() > self.columns.len() {
            return Err(Error::invalid_operation(format!(
                "table '{}' has {} columns, got {} values",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        let mut row = self.new_row_values();
        for (slot, value) in row.iter_mut().zip(values) {
            if !value.is_null() {
                *slot = value;
            }
        }
        Ok(row)
    }

    pub(crate) fn check_row_owner(&self, row: &DataRow) -> Result<()> {
        if row.table != self.uid {
            return Err(Error::invalid_operation(format!(
                "row was created by another table than '{}'",
                self.name
            )));
        }
        Ok(())
    }

    /// Adds a detached row: it becomes Added with a fresh id.
    pub fn add_row(&mut self, row: DataRow) -> Result<RowId> {
        self.check_standalone()?;
        self.check_row_owner(&row)?;
        cascade::add(self, 0, row.values)
    }

    /// Adds a row from values in column order; see [`load_data_row`](Self::load_data_row)
    /// for how nulls are treated.
    ///
    /// A failed add leaves rows and constraints as they were, but an
    /// auto-increment value handed out for it stays consumed.
    pub fn add(&mut self, values: Vec<Value>) -> Result<RowId> {
        self.check_standalone()?;
        let values = self.fill_values(values)?;
        cascade::add(self, 0, values)
    }

    pub fn begin_edit(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        self.open_edit(row)
    }

    /// Sets one value. Inside an edit the value goes to Proposed; outside
    /// it is committed immediately.
    pub fn set_value(&mut self, row: RowId, column: usize, value: impl Into<Value>) -> Result<()> {
        self.check_standalone()?;
        cascade::set_value(self, 0, row, column, value.into())
    }

    pub fn set_value_by_name(&mut self, row: RowId, column: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.ordinal(column)?;
        self.set_value(row, index, value)
    }

    /// Commits the open edit. On failure the edit is discarded and the row
    /// is as it was before `begin_edit`.
    pub fn end_edit(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        cascade::end_edit(self, 0, row)
    }

    pub fn cancel_edit(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        self.discard_edit(row)
    }

    /// Marks a row deleted; an added row is removed physically.
    pub fn delete_row(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        cascade::delete(self, 0, row)
    }

    /// Deletes a row and removes it physically.
    pub fn remove_row(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        cascade::remove(self, 0, row)
    }

    pub fn accept_changes(&mut self) -> Result<()> {
        self.check_standalone()?;
        cascade::settle_tables(self, &[0], true)
    }

    pub fn reject_changes(&mut self) -> Result<()> {
        self.check_standalone()?;
        cascade::settle_tables(self, &[0], false)
    }

    pub fn accept_row(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        cascade::settle_row(self, 0, row, true)
    }

    pub fn reject_row(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        cascade::settle_row(self, 0, row, false)
    }

    /// Forces an unchanged row to Added.
    pub fn set_added(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        cascade::force_state(self, 0, row, RowState::Added)
    }

    /// Forces an unchanged row to Modified.
    pub fn set_modified(&mut self, row: RowId) -> Result<()> {
        self.check_standalone()?;
        cascade::force_state(self, 0, row, RowState::Modified)
    }

    /// Removes every row.
    pub fn clear(&mut self) -> Result<()> {
        self.check_standalone()?;
        cascade::clear(self, 0)
    }

    pub(crate) fn clear_rows(&mut self) {
        debug!(table = %self.name, rows = self.rows.len(), "clear");
        self.rows.clear();
        for uc in &mut self.uniques {
            uc.clear();
        }
        self.publish_reset();
    }

    /// Sets the error text of a row; an empty text clears it.
    pub fn set_row_error(&mut self, row: RowId, error: &str) -> Result<()> {
        self.set_row_error_text(row, Some(error.to_string()))
    }

    pub fn clear_errors(&mut self) {
        for record in self.rows.values_mut() {
            record.set_error(None);
        }
    }

    /// Suspends constraint checks and notifications for a bulk load.
    pub fn begin_load_data(&mut self) {
        self.loading = true;
    }

    /// Ends a bulk load. Validates every constraint; on failure the table
    /// stays in load mode.
    pub fn end_load_data(&mut self) -> Result<()> {
        self.check_standalone()?;
        if !self.loading {
            return Ok(());
        }
        if self.enforce {
            self.validate_constraints()?;
        }
        self.loading = false;
        self.publish_reset();
        Ok(())
    }

    /// Inserts or updates a row by primary key.
    ///
    /// A null value keeps what the row already has (or the default for a
    /// new row). With `accept` the row is accepted afterwards.
    pub fn load_data_row(&mut self, values: Vec<Value>, accept: bool) -> Result<RowId> {
        self.check_standalone()?;
        cascade::load_data_row(self, 0, values, accept)
    }

    /// Copies a row from another table, keeping its state and versions.
    /// Columns are matched by name.
    pub fn import_row(&mut self, source: &DataTable, row: RowId) -> Result<RowId> {
        self.check_standalone()?;
        let record = self.map_record(source, source.row(row)?);
        cascade::import(self, 0, record)
    }

    /// Re-shapes a record of `source` onto this table's columns by name.
    pub(crate) fn map_record(&self, source: &DataTable, record: &RowRecord) -> RowRecord {
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| source.column_index(c.name()))
            .collect();
        let mut out = record.clone();
        out.cancel_edit();
        let columns = &self.columns;
        out.map_values(|values| {
            let mapped: Vec<Value> = mapping
                .iter()
                .zip(columns)
                .map(|(m, col)| {
                    m.and_then(|i| values.get(i).cloned())
                        .and_then(|v| v.coerce_to(col.data_type()))
                        .unwrap_or(Value::Null)
                })
                .collect();
            *values = mapped;
        });
        out
    }

    /// Copies columns, constraints, options and properties; no rows.
    pub fn clone_schema(&self) -> DataTable {
        let mut table = DataTable::with_options(self.name.clone(), self.options.clone());
        table.columns = self.columns.clone();
        table.computed = self.computed.clone();
        table.pins = self.pins.clone();
        table.uniques = self
            .uniques
            .iter()
            .map(|u| UniqueConstraint::new(u.name(), u.columns().to_vec(), u.is_primary_key()))
            .collect();
        table.properties = self.properties.clone();
        table.enforce = self.enforce;
        table.next_constraint = self.next_constraint;
        table
    }

    /// Copies schema and rows. Rows get fresh ids in the same order.
    pub fn copy(&self) -> DataTable {
        let mut table = self.clone_schema();
        for record in self.rows.values() {
            table.insert_record(tabula_core::next_row_id(), record.clone());
        }
        table
    }

    /// Returns a copy holding only rows in one of `states` (all changed rows
    /// when empty), or `None` if no row matches.
    pub fn get_changes(&self, states: &[RowState]) -> Option<DataTable> {
        let wanted = |s: RowState| {
            if states.is_empty() {
                s != RowState::Unchanged
            } else {
                states.contains(&s)
            }
        };
        let mut table = self.clone_schema();
        for record in self.rows.values().filter(|r| wanted(r.state())) {
            let mut copy = record.clone();
            copy.cancel_edit();
            table.insert_record(tabula_core::next_row_id(), copy);
        }
        if table.is_empty() {
            None
        } else {
            Some(table)
        }
    }

    /// Replaces rows and schema with those of `other`, keeping identity,
    /// listeners and the attached flag.
    pub(crate) fn replace_contents(&mut self, other: DataTable) {
        self.columns = other.columns;
        self.rows = other.rows;
        self.uniques = other.uniques;
        self.computed = other.computed;
        self.pins = other.pins;
        self.next_constraint = other.next_constraint;
    }

    /// Snapshot used to undo multi-table operations.
    pub(crate) fn backup(&self) -> DataTable {
        let mut copy = self.clone_schema();
        copy.rows = self.rows.clone();
        copy.uniques = self.uniques.clone();
        copy
    }
}

impl ColumnSource for DataTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        DataTable::column_index(self, name)
    }

    fn column_type(&self, index: usize) -> Option<DataType> {
        self.columns.get(index).map(|c| c.data_type())
    }

    fn is_computed(&self, index: usize) -> bool {
        self.columns.get(index).is_some_and(|c| c.is_computed())
    }

    fn is_case_sensitive(&self) -> bool {
        self.options.case_sensitive
    }
}

fn current_rows(rows: &BTreeMap<RowId, RowRecord>) -> impl Iterator<Item = (RowId, &[Value])> + '_ {
    rows.iter().filter_map(|(id, r)| r.current().map(|v| (*id, v)))
}

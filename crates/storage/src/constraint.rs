//! Unique and foreign key constraints.
//!
//! A [`UniqueConstraint`] keeps a hash index from key values to the rows that
//! hold them, covering every row that is not deleted. The index itself
//! tolerates duplicates so constraint enforcement can be suspended; the
//! check on commit asks it for a conflicting row instead.
//!
//! A [`ForeignKeyConstraint`] carries the rules of a relation. Its columns are
//! those of the owning relation.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tabula_core::schema::{AcceptRejectRule, Rule};
use tabula_core::{Error, Result, RowId, Value};
use tabula_index::{HashIndex, Index};

/// Extracts the key of `values` for the given column ordinals.
///
/// Strings are folded when `case_sensitive` is false, so the key can be used
/// for hash lookups directly.
pub fn key_of(values: &[Value], columns: &[usize], case_sensitive: bool) -> Vec<Value> {
    columns
        .iter()
        .map(|&c| values.get(c).map(|v| v.fold_case(case_sensitive)).unwrap_or(Value::Null))
        .collect()
}

/// Formats a key for error messages: `(1, 'a')`.
pub fn format_key(key: &[Value]) -> String {
    let parts: Vec<String> = key
        .iter()
        .map(|v| match v {
            Value::String(s) => format!("'{}'", s),
            other => other.to_string(),
        })
        .collect();
    format!("({})", parts.join(", "))
}

/// Returns true when every key value is null.
pub fn is_null_key(key: &[Value]) -> bool {
    key.iter().all(Value::is_null)
}

/// Column set whose current values must be distinct.
#[derive(Clone, Debug)]
pub struct UniqueConstraint {
    name: String,
    columns: Vec<usize>,
    primary_key: bool,
    index: HashIndex<Vec<Value>>,
    /// Relations using this constraint as their parent key.
    pins: usize,
}

impl UniqueConstraint {
    pub fn new(name: impl Into<String>, columns: Vec<usize>, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
            index: HashIndex::new(false),
            pins: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub(crate) fn set_primary_key(&mut self, primary_key: bool) {
        self.primary_key = primary_key;
    }

    /// Returns true if a relation depends on this constraint.
    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub(crate) fn pin(&mut self) {
        self.pins += 1;
    }

    pub(crate) fn unpin(&mut self) {
        self.pins = self.pins.saturating_sub(1);
    }

    /// Shifts ordinals after a removed column down by one.
    pub(crate) fn shift_columns(&mut self, removed: usize) {
        for c in &mut self.columns {
            if *c > removed {
                *c -= 1;
            }
        }
    }

    /// Returns true if the constraint covers exactly `columns`, in any order.
    pub fn covers(&self, columns: &[usize]) -> bool {
        self.columns.len() == columns.len() && columns.iter().all(|c| self.columns.contains(c))
    }

    /// Returns a row other than `except` holding `key`.
    pub fn conflict(&self, key: &Vec<Value>, except: Option<RowId>) -> Option<RowId> {
        self.index.conflict(key, except)
    }

    /// Rows holding `key`.
    pub fn lookup(&self, key: &Vec<Value>) -> Vec<RowId> {
        self.index.get(key)
    }

    /// Fails if `values` would duplicate another row's key.
    pub fn check(&self, table: &str, values: &[Value], row: Option<RowId>, case_sensitive: bool) -> Result<()> {
        let key = key_of(values, &self.columns, case_sensitive);
        if self.conflict(&key, row).is_some() {
            return Err(Error::UniqueViolation {
                constraint: self.name.clone(),
                table: table.to_string(),
                key: format_key(&key),
            });
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, values: &[Value], row: RowId, case_sensitive: bool) {
        let key = key_of(values, &self.columns, case_sensitive);
        // The index is non-unique; add cannot fail.
        let _ = self.index.add(key, row);
    }

    pub(crate) fn remove(&mut self, values: &[Value], row: RowId, case_sensitive: bool) {
        let key = key_of(values, &self.columns, case_sensitive);
        self.index.remove(&key, Some(row));
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
    }

    /// Rebuilds the index from `(row, current values)` pairs.
    pub(crate) fn rebuild<'a>(&mut self, rows: impl Iterator<Item = (RowId, &'a [Value])>, case_sensitive: bool) {
        self.index.clear();
        for (id, values) in rows {
            self.insert(values, id, case_sensitive);
        }
    }

    /// Fails with the first duplicated key, if any.
    pub fn validate(&self, table: &str) -> Result<()> {
        match self.index.duplicates().next() {
            Some((key, _)) => Err(Error::UniqueViolation {
                constraint: self.name.clone(),
                table: table.to_string(),
                key: format_key(key),
            }),
            None => Ok(()),
        }
    }
}

/// Rules of a foreign key constraint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub name: String,
    #[serde(default)]
    pub delete_rule: Rule,
    #[serde(default)]
    pub update_rule: Rule,
    #[serde(default)]
    pub accept_reject_rule: AcceptRejectRule,
}

impl ForeignKeyConstraint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delete_rule: Rule::default(),
            update_rule: Rule::default(),
            accept_reject_rule: AcceptRejectRule::default(),
        }
    }

    pub fn delete_rule(mut self, rule: Rule) -> Self {
        self.delete_rule = rule;
        self
    }

    pub fn update_rule(mut self, rule: Rule) -> Self {
        self.update_rule = rule;
        self
    }

    pub fn accept_reject_rule(mut self, rule: AcceptRejectRule) -> Self {
        self.accept_reject_rule = rule;
        self
    }
}

/// Counts how many constraints, relations and expressions use each column.
#[derive(Clone, Debug, Default)]
pub(crate) struct ColumnPins {
    counts: HashMap<usize, usize>,
}

impl ColumnPins {
    pub fn pin(&mut self, columns: &[usize]) {
        for c in columns {
            *self.counts.entry(*c).or_default() += 1;
        }
    }

    pub fn unpin(&mut self, columns: &[usize]) {
        for c in columns {
            if let Some(n) = self.counts.get_mut(c) {
                *n -= 1;
                if *n == 0 {
                    self.counts.remove(c);
                }
            }
        }
    }

    pub fn is_pinned(&self, column: usize) -> bool {
        self.counts.contains_key(&column)
    }

    /// Shifts ordinals after `removed` down by one.
    pub fn column_removed(&mut self, removed: usize) {
        self.counts = self
            .counts
            .drain()
            .map(|(c, n)| if c > removed { (c - 1, n) } else { (c, n) })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i32, name: &str) -> Vec<Value> {
        vec![Value::Int32(id), Value::from(name)]
    }

    #[test]
    fn test_unique_check() {
        let mut uc = UniqueConstraint::new("uq_name", vec![1], false);
        uc.insert(&row(1, "Alice"), 1, false);
        uc.insert(&row(2, "Bob"), 2, false);

        assert!(uc.check("t", &row(3, "Carol"), None, false).is_ok());
        // Case folded when the table is case-insensitive.
        let err = uc.check("t", &row(3, "ALICE"), None, false).unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { ref constraint, .. } if constraint == "uq_name"));
        assert!(uc.check("t", &row(3, "ALICE"), None, true).is_ok());
        // A row does not conflict with itself.
        assert!(uc.check("t", &row(1, "Alice"), Some(1), false).is_ok());
    }

    #[test]
    fn test_null_keys_collide() {
        let mut uc = UniqueConstraint::new("uq", vec![0], false);
        uc.insert(&[Value::Null], 1, true);
        assert!(uc.check("t", &[Value::Null], None, true).is_err());
    }

    #[test]
    fn test_validate_finds_duplicates() {
        let mut uc = UniqueConstraint::new("uq", vec![0], false);
        uc.insert(&row(1, "a"), 1, true);
        assert!(uc.validate("t").is_ok());
        uc.insert(&row(1, "b"), 2, true);
        assert!(uc.validate("t").is_err());
        uc.remove(&row(1, "b"), 2, true);
        assert!(uc.validate("t").is_ok());
    }

    #[test]
    fn test_format_key() {
        assert_eq!(format_key(&[Value::Int32(1), Value::from("x")]), "(1, 'x')");
        assert!(is_null_key(&[Value::Null, Value::Null]));
        assert!(!is_null_key(&[Value::Null, Value::Int32(0)]));
    }

    #[test]
    fn test_column_pins() {
        let mut pins = ColumnPins::default();
        pins.pin(&[0, 2]);
        pins.pin(&[2]);
        pins.unpin(&[2]);
        assert!(pins.is_pinned(2));
        pins.column_removed(1);
        assert!(pins.is_pinned(1));
        assert!(!pins.is_pinned(2));
    }
}

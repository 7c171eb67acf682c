//! Row state filters, filtered and sorted selection, aggregate computation.

use crate::table::DataTable;
use core::ops::{BitOr, BitOrAssign};
use serde::{Deserialize, Serialize};
use tabula_core::{Result, RowId, RowRecord, RowState, RowVersion, Value};
use tabula_expr::{parse_sort, Expression};
use tabula_index::{MultiKeyComparator, SortedIndex};

/// Set of row states (and the version shown for each) a selection includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowStateFilter(u8);

impl RowStateFilter {
    pub const NONE: Self = Self(0);
    pub const UNCHANGED: Self = Self(1);
    pub const ADDED: Self = Self(2);
    /// Deleted rows, shown with their Original values.
    pub const DELETED: Self = Self(4);
    /// Modified rows, shown with their Current values.
    pub const MODIFIED_CURRENT: Self = Self(8);
    /// Modified rows, shown with their Original values.
    pub const MODIFIED_ORIGINAL: Self = Self(16);
    pub const CURRENT_ROWS: Self = Self(1 | 2 | 8);
    pub const ORIGINAL_ROWS: Self = Self(1 | 4 | 16);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 31)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The version through which `record` is visible, or `None` if the
    /// filter excludes it. A modified row under both modified flags shows
    /// its Current values once.
    pub fn version_for(self, record: &RowRecord) -> Option<RowVersion> {
        match record.state() {
            RowState::Unchanged if self.intersects(Self::UNCHANGED) => Some(RowVersion::Current),
            RowState::Added if self.intersects(Self::ADDED) => Some(RowVersion::Current),
            RowState::Deleted if self.intersects(Self::DELETED) => Some(RowVersion::Original),
            RowState::Modified if self.intersects(Self::MODIFIED_CURRENT) => Some(RowVersion::Current),
            RowState::Modified if self.intersects(Self::MODIFIED_ORIGINAL) => Some(RowVersion::Original),
            _ => None,
        }
    }
}

impl Default for RowStateFilter {
    fn default() -> Self {
        Self::CURRENT_ROWS
    }
}

impl BitOr for RowStateFilter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RowStateFilter {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A resolved sort: column ordinals plus their comparator.
#[derive(Clone, Debug)]
pub struct SortSpec {
    pub columns: Vec<usize>,
    pub comparator: MultiKeyComparator,
}

impl SortSpec {
    /// Extracts the sort key of a row.
    pub fn key(&self, values: &[Value]) -> Vec<Value> {
        self.columns
            .iter()
            .map(|&c| values.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl DataTable {
    /// Resolves a sort text such as `"name ASC, [unit price] DESC"`.
    pub fn resolve_sort(&self, text: &str) -> Result<SortSpec> {
        let parsed = parse_sort(text)?;
        let mut columns = Vec::with_capacity(parsed.len());
        let mut orders = Vec::with_capacity(parsed.len());
        for sc in parsed {
            columns.push(self.ordinal(&sc.name)?);
            orders.push(sc.order);
        }
        Ok(SortSpec {
            columns,
            comparator: MultiKeyComparator::new(orders, self.is_case_sensitive()),
        })
    }

    /// Values of `row` as seen by `states`, or `None` if excluded.
    pub fn visible_values(&self, row: RowId, states: RowStateFilter) -> Option<&[Value]> {
        let record = self.row(row).ok()?;
        let version = states.version_for(record)?;
        record.values(row, version).ok()
    }

    /// Returns the ids of rows in `states` matching `filter`, ordered by
    /// `sort`. Rows with equal sort keys (or no sort) keep table order.
    pub fn select(&self, filter: Option<&str>, sort: Option<&str>, states: RowStateFilter) -> Result<Vec<RowId>> {
        let filter = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(text) => Some(Expression::compile(text, self)?),
            None => None,
        };
        let sort = match sort {
            Some(text) => self.resolve_sort(text)?,
            None => SortSpec {
                columns: Vec::new(),
                comparator: MultiKeyComparator::new(Vec::new(), self.is_case_sensitive()),
            },
        };
        let mut entries = Vec::new();
        for (id, _) in self.rows() {
            let Some(values) = self.visible_values(id, states) else {
                continue;
            };
            if let Some(f) = &filter {
                if !f.matches(values)? {
                    continue;
                }
            }
            entries.push((sort.key(values), id));
        }
        if sort.is_empty() {
            return Ok(entries.into_iter().map(|(_, id)| id).collect());
        }
        Ok(SortedIndex::from_entries(sort.comparator, entries).row_ids().collect())
    }

    /// Evaluates an aggregate expression such as `Sum(total)` over the
    /// current rows matching `filter`.
    pub fn compute(&self, expression: &str, filter: Option<&str>) -> Result<Value> {
        let expr = Expression::compile(expression, self)?;
        let ids = self.select(filter, None, RowStateFilter::CURRENT_ROWS)?;
        let rows = ids
            .iter()
            .map(|&id| self.values(id, RowVersion::Current))
            .collect::<Result<Vec<_>>>()?;
        expr.compute(&rows)
    }

    /// Resolves column names to ordinals.
    pub fn ordinals(&self, names: &[&str]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.ordinal(n)).collect()
    }
}

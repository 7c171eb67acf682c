//! Diffgram snapshots.
//!
//! A diffgram captures a data set's schema and, for every row, its state
//! with both the Current and the Original versions. The snapshot types are
//! plain serde structs; the XML layout is left to the serializer.

use crate::dataset::DataSet;
use crate::graph::TableGraph;
use crate::table::DataTable;
use serde::{Deserialize, Serialize};
use tabula_core::schema::{AcceptRejectRule, Rule};
use tabula_core::{DataType, RowState, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diffgram {
    pub data_set: String,
    pub tables: Vec<TableSnapshot>,
    pub relations: Vec<RelationSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnSnapshot>,
    /// Names of the primary key columns.
    pub primary_key: Vec<String>,
    pub rows: Vec<RowSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub name: String,
    pub data_type: DataType,
    pub allow_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// One row. `current` is absent for deleted rows, `original` for added
/// ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowSnapshot {
    /// Position of the row in table order.
    pub row_order: usize,
    pub state: RowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationSnapshot {
    pub name: String,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    pub child_table: String,
    pub child_columns: Vec<String>,
    pub nested: bool,
    /// Rules of the foreign key; absent for navigation-only relations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<(Rule, Rule, AcceptRejectRule)>,
}

impl DataTable {
    pub fn snapshot(&self) -> TableSnapshot {
        let columns = self
            .columns()
            .iter()
            .map(|c| ColumnSnapshot {
                name: c.name().to_string(),
                data_type: c.data_type(),
                allow_null: c.allows_null(),
                expression: c.get_expression().map(str::to_string),
            })
            .collect();
        let rows = self
            .rows()
            .enumerate()
            .map(|(row_order, (_, record))| {
                // Unchanged rows carry only one version.
                let original = match record.state() {
                    RowState::Modified | RowState::Deleted => record.original().map(<[Value]>::to_vec),
                    _ => None,
                };
                RowSnapshot {
                    row_order,
                    state: record.state(),
                    current: record.current().map(<[Value]>::to_vec),
                    original,
                    error: record.error().map(str::to_string),
                }
            })
            .collect();
        TableSnapshot {
            name: self.name().to_string(),
            columns,
            primary_key: self.column_names(self.primary_key_columns().unwrap_or(&[])),
            rows,
        }
    }

    fn column_names(&self, ordinals: &[usize]) -> Vec<String> {
        ordinals
            .iter()
            .filter_map(|&c| self.column(c).map(|c| c.name().to_string()))
            .collect()
    }
}

impl DataSet {
    /// Snapshot of every table, in table order, and every relation.
    pub fn diffgram(&self) -> Diffgram {
        let tables = self.tables().map(|(_, t)| t.snapshot()).collect();
        let relations = self
            .relations()
            .filter_map(|(_, rel)| {
                let parent = TableGraph::table(self, rel.parent_table()).ok()?;
                let child = TableGraph::table(self, rel.child_table()).ok()?;
                Some(RelationSnapshot {
                    name: rel.name().to_string(),
                    parent_table: parent.name().to_string(),
                    parent_columns: parent.column_names(rel.parent_columns()),
                    child_table: child.name().to_string(),
                    child_columns: child.column_names(rel.child_columns()),
                    nested: rel.is_nested(),
                    rules: rel
                        .foreign_key()
                        .map(|fk| (fk.delete_rule, fk.update_rule, fk.accept_reject_rule)),
                })
            })
            .collect();
        Diffgram {
            data_set: self.name().to_string(),
            tables,
            relations,
        }
    }
}

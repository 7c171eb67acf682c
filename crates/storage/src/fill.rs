//! Bulk loading of source rows into a data set.
//!
//! A [`SourceTable`] is what a data reader would hand over: a table name,
//! named and typed columns, and rows. [`TableMapping`]s translate source
//! names to data set names; names without a mapping follow
//! [`MissingMappingAction`], and tables or columns missing from the data
//! set follow [`MissingSchemaAction`].

use crate::dataset::{Checkpoint, DataSet};
use crate::graph::{TableGraph, TableId};
use serde::{Deserialize, Serialize};
use tabula_core::schema::{names_equal, Column};
use tabula_core::{DataType, Error, Result, Value};
use tracing::{debug, warn};

/// What to do with a source table or column that has no mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingMappingAction {
    /// Use the source name unchanged.
    #[default]
    Passthrough,
    /// Skip the table or column.
    Ignore,
    Error,
}

/// What to do when the mapped table or column does not exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingSchemaAction {
    /// Create it from the source schema.
    #[default]
    Add,
    Ignore,
    Error,
}

/// Options of [`DataSet::fill`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillOptions {
    pub missing_mapping_action: MissingMappingAction,
    pub missing_schema_action: MissingSchemaAction,
    /// Accept each loaded row, leaving it Unchanged.
    pub accept_changes_during_fill: bool,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            missing_mapping_action: MissingMappingAction::Passthrough,
            missing_schema_action: MissingSchemaAction::Add,
            accept_changes_during_fill: true,
        }
    }
}

impl FillOptions {
    pub fn missing_mapping_action(mut self, action: MissingMappingAction) -> Self {
        self.missing_mapping_action = action;
        self
    }

    pub fn missing_schema_action(mut self, action: MissingSchemaAction) -> Self {
        self.missing_schema_action = action;
        self
    }

    pub fn accept_changes_during_fill(mut self, accept: bool) -> Self {
        self.accept_changes_during_fill = accept;
        self
    }
}

/// A column of a source table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    pub data_type: DataType,
}

/// Rows handed over by a data source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub name: String,
    pub columns: Vec<SourceColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl SourceTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(SourceColumn {
            name: name.into(),
            data_type,
        });
        self
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }
}

/// Maps a source table and its columns onto a data set table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub source_table: String,
    pub dataset_table: String,
    /// Pairs of (source column, data set column).
    #[serde(default)]
    pub column_mappings: Vec<(String, String)>,
}

impl TableMapping {
    pub fn new(source_table: impl Into<String>, dataset_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            dataset_table: dataset_table.into(),
            column_mappings: Vec::new(),
        }
    }

    pub fn map_column(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.column_mappings.push((source.into(), target.into()));
        self
    }

    fn column_for(&self, source: &str) -> Option<&str> {
        self.column_mappings
            .iter()
            .find(|(s, _)| names_equal(s, source, false))
            .map(|(_, t)| t.as_str())
    }
}

/// Outcome of a fill.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub rows_added: usize,
    pub rows_updated: usize,
    /// Data set tables that received rows or were created.
    pub tables: Vec<String>,
}

impl DataSet {
    /// Loads `source` into the mapped table.
    ///
    /// Rows upsert by primary key with load semantics: constraint checks
    /// are deferred to the end of the load and a null source value leaves
    /// the existing value alone. The fill is atomic: on error the data set
    /// is left as it was, including any tables or columns it created.
    pub fn fill(&mut self, source: &SourceTable, mappings: &[TableMapping], options: &FillOptions) -> Result<FillReport> {
        let checkpoint = Checkpoint::take(self);
        match self.fill_rows(source, mappings, options) {
            Ok(report) => {
                debug!(
                    source = %source.name,
                    added = report.rows_added,
                    updated = report.rows_updated,
                    "fill"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(source = %source.name, error = %e, "fill rolled back");
                checkpoint.restore(self);
                Err(e)
            }
        }
    }

    fn fill_rows(&mut self, source: &SourceTable, mappings: &[TableMapping], options: &FillOptions) -> Result<FillReport> {
        let mut report = FillReport::default();
        let mapping = mappings
            .iter()
            .find(|m| names_equal(&m.source_table, &source.name, false));
        let table_name = match (mapping, options.missing_mapping_action) {
            (Some(m), _) => m.dataset_table.clone(),
            (None, MissingMappingAction::Passthrough) => source.name.clone(),
            (None, MissingMappingAction::Ignore) => return Ok(report),
            (None, MissingMappingAction::Error) => {
                return Err(Error::invalid_operation(format!(
                    "no table mapping for source table '{}'",
                    source.name
                )))
            }
        };

        let table = match (self.table_id(&table_name), options.missing_schema_action) {
            (Some(id), _) => id,
            (None, MissingSchemaAction::Add) => self.create_table(table_name.clone())?,
            (None, MissingSchemaAction::Ignore) => return Ok(report),
            (None, MissingSchemaAction::Error) => return Err(Error::table_not_found(table_name)),
        };

        let targets = self.map_columns(table, source, mapping, options)?;
        self.begin_load_data(table)?;
        let width = TableGraph::table(self, table)?.column_count();
        for values in &source.rows {
            let mut row = vec![Value::Null; width];
            for (value, target) in values.iter().zip(&targets) {
                if let Some(&ordinal) = target.as_ref() {
                    row[ordinal] = value.clone();
                }
            }
            let before = TableGraph::table(self, table)?.len();
            self.load_data_row(table, row, options.accept_changes_during_fill)?;
            if TableGraph::table(self, table)?.len() > before {
                report.rows_added += 1;
            } else {
                report.rows_updated += 1;
            }
        }
        self.end_load_data(table)?;
        report.tables.push(table_name);
        Ok(report)
    }

    /// Resolves each source column to a table ordinal, adding columns when
    /// the schema action allows it.
    fn map_columns(
        &mut self,
        table: TableId,
        source: &SourceTable,
        mapping: Option<&TableMapping>,
        options: &FillOptions,
    ) -> Result<Vec<Option<usize>>> {
        let mut targets = Vec::with_capacity(source.columns.len());
        for column in &source.columns {
            let name = match (mapping.and_then(|m| m.column_for(&column.name)), options.missing_mapping_action) {
                (Some(target), _) => target.to_string(),
                (None, MissingMappingAction::Passthrough) => column.name.clone(),
                (None, MissingMappingAction::Ignore) => {
                    targets.push(None);
                    continue;
                }
                (None, MissingMappingAction::Error) => {
                    return Err(Error::invalid_operation(format!(
                        "no column mapping for source column '{}'",
                        column.name
                    )))
                }
            };
            let t = TableGraph::table_mut(self, table)?;
            let ordinal = match (t.column_index(&name), options.missing_schema_action) {
                (Some(i), _) => Some(i),
                (None, MissingSchemaAction::Add) => Some(t.add_column(Column::new(name, column.data_type))?),
                (None, MissingSchemaAction::Ignore) => None,
                (None, MissingSchemaAction::Error) => return Err(Error::column_not_found(t.name(), name)),
            };
            targets.push(ordinal);
        }
        Ok(targets)
    }
}

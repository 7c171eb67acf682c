//! Tabula Storage - Tables, constraints, relations and data sets.
//!
//! This crate provides the mutable half of the data model:
//!
//! - `DataTable`: versioned rows, unique constraints, computed columns,
//!   selection and aggregates
//! - `DataSet`: an arena of tables linked by `DataRelation`s with foreign
//!   key rules (Cascade, SetNull, SetDefault, None)
//! - Cascades: every mutation runs as one journaled operation that either
//!   completes with all of its referential actions or is rolled back
//! - `ChangeFeed`: change notifications published after each successful
//!   operation
//! - `fill`, `merge`, `diffgram`: bulk loading, merging and snapshots
//!
//! # Example
//!
//! ```rust
//! use tabula_core::schema::{Column, Rule};
//! use tabula_core::{DataType, RowState, Value};
//! use tabula_storage::{DataSet, RelationDef};
//!
//! let mut ds = DataSet::new("shop");
//! let orders = ds.create_table("orders").unwrap();
//! let t = ds.table_mut(orders).unwrap();
//! t.add_column(Column::new("id", DataType::Int32)).unwrap();
//! t.set_primary_key(&["id"]).unwrap();
//! let lines = ds.create_table("lines").unwrap();
//! ds.table_mut(lines)
//!     .unwrap()
//!     .add_column(Column::new("order_id", DataType::Int32))
//!     .unwrap();
//! ds.add_relation(
//!     RelationDef::new("order_lines", "orders", &["id"], "lines", &["order_id"])
//!         .delete_rule(Rule::Cascade),
//! )
//! .unwrap();
//!
//! let order = ds.add(orders, vec![Value::Int32(1)]).unwrap();
//! let line = ds.add(lines, vec![Value::Int32(1)]).unwrap();
//! ds.accept_changes().unwrap();
//!
//! ds.delete_row(orders, order).unwrap();
//! assert_eq!(ds.table(lines).unwrap().row_state(line).unwrap(), RowState::Deleted);
//! ```

mod cascade;
pub mod change;
pub mod constraint;
pub mod dataset;
pub mod diffgram;
pub mod fill;
mod graph;
mod journal;
mod merge;
pub mod relation;
pub mod select;
pub mod table;

pub use change::{ChangeFeed, ChangeListener, ListenerId, RowAction, TableChange};
pub use constraint::{ForeignKeyConstraint, UniqueConstraint};
pub use dataset::DataSet;
pub use diffgram::{ColumnSnapshot, Diffgram, RelationSnapshot, RowSnapshot, TableSnapshot};
pub use fill::{
    FillOptions, FillReport, MissingMappingAction, MissingSchemaAction, SourceColumn, SourceTable, TableMapping,
};
pub use graph::{RelationId, TableId};
pub use relation::{DataRelation, RelationDef};
pub use select::{RowStateFilter, SortSpec};
pub use table::{DataRow, DataTable};

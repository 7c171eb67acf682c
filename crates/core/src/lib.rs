//! Tabula Core - Core types and schema definitions for the Tabula data model.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - `DataType` / `Value`: column types, cell values and assignment coercion
//! - `RowRecord`: the per-row version state machine (Original / Current / Proposed)
//! - `schema`: column definitions, referential rules, property bags
//! - `options`: serde-loadable table and data set options
//! - `Error` / `ErrorKind`: error types and their taxonomy
//!
//! # Example
//!
//! ```rust
//! use tabula_core::{DataType, RowRecord, RowState, RowVersion, Value};
//! use tabula_core::schema::Column;
//!
//! let name = Column::new("name", DataType::String).max_length(8);
//! let value = name.check_value("users", Value::from("Alice")).unwrap();
//!
//! let mut row = RowRecord::added(vec![Value::Int64(1), value]);
//! row.accept();
//! row.begin_edit(1).unwrap();
//! row.proposed_mut().unwrap()[1] = Value::from("Bob");
//! let proposed = row.take_proposed().unwrap();
//! row.commit(1, proposed).unwrap();
//!
//! assert_eq!(row.state(), RowState::Modified);
//! assert_eq!(row.values(1, RowVersion::Original).unwrap()[1], Value::from("Alice"));
//! ```

mod error;
pub mod options;
pub mod pattern_match;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, ErrorKind, Result};
pub use options::{DataSetOptions, TableOptions};
pub use row::{next_row_id, RowId, RowRecord, RowState, RowVersion, RowVersions, Settle};
pub use types::DataType;
pub use value::Value;

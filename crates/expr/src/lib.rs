//! Tabula Expr - Expression language for filters, computed columns and sorts.
//!
//! - `parser`: text to [`Expr`] syntax tree
//! - `Expression`: a parsed tree bound to column ordinals of a [`ColumnSource`]
//! - `eval`: row evaluation with null propagation and three-valued logic
//! - `aggregate`: `Sum`, `Avg`, `Min`, `Max`, `Count`, `StDev`, `Var` for `compute`
//! - `sort`: `"Name ASC, Id DESC"` specifications
//!
//! # Example
//!
//! ```rust
//! use tabula_core::{DataType, Value};
//! use tabula_expr::{ColumnSource, Expression};
//!
//! struct People;
//! impl ColumnSource for People {
//!     fn table_name(&self) -> &str { "people" }
//!     fn column_index(&self, name: &str) -> Option<usize> {
//!         ["name", "age"].iter().position(|c| c.eq_ignore_ascii_case(name))
//!     }
//!     fn column_type(&self, _: usize) -> Option<DataType> { None }
//!     fn is_computed(&self, _: usize) -> bool { false }
//!     fn is_case_sensitive(&self) -> bool { false }
//! }
//!
//! let filter = Expression::compile("Name LIKE 'a*' AND Age >= 18", &People).unwrap();
//! assert!(filter.matches(&[Value::from("Alice"), Value::Int32(30)]).unwrap());
//! assert!(!filter.matches(&[Value::from("Bob"), Value::Int32(30)]).unwrap());
//! ```

pub mod aggregate;
pub mod ast;
pub mod eval;
mod expression;
pub mod parser;
pub mod sort;

pub use ast::{AggregateFunc, BinaryOp, ColumnRef, Expr, Function, UnaryOp};
pub use expression::{ColumnSource, Expression};
pub use parser::parse;
pub use sort::{parse_sort, SortColumn};

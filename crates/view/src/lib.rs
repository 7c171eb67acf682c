//! Tabula View - Live projections over tables.
//!
//! - `DataView`: a filtered, sorted view that follows its table's change
//!   feed and updates incrementally
//! - Related views bound to a parent row through a relation
//! - `ChangeSet` notifications for view subscribers
//! - Binding adapters describing the properties of table items
//!
//! # Example
//!
//! ```rust
//! use tabula_core::schema::Column;
//! use tabula_core::{DataType, Value};
//! use tabula_storage::DataTable;
//! use tabula_view::{DataView, DataViewRowState};
//!
//! let mut table = DataTable::new("stock");
//! table.add_column(Column::new("item", DataType::String)).unwrap();
//! table.add_column(Column::new("qty", DataType::Int32)).unwrap();
//! table.add(vec![Value::from("bolt"), Value::Int32(40)]).unwrap();
//! table.add(vec![Value::from("nut"), Value::Int32(0)]).unwrap();
//!
//! let mut low = DataView::new()
//!     .with_filter("qty < 10")
//!     .with_row_state_filter(DataViewRowState::CURRENT_ROWS);
//! low.open(&mut table).unwrap();
//! assert_eq!(low.len(), 1);
//!
//! let bolt = table.row_ids().next().unwrap();
//! table.set_value(bolt, 1, 2).unwrap();
//! assert_eq!(low.len(), 2);
//! ```

pub mod binding;
pub mod change_set;
pub mod related;
pub mod subscription;
pub mod view;

pub use binding::{ItemProperties, PropertyDescriptor, PropertyKind, PropertyValue, RelationBinding, TableBinding};
pub use change_set::ChangeSet;
pub use related::RelatedViewKey;
pub use subscription::{SubscriptionId, SubscriptionManager};
pub use tabula_storage::RowStateFilter as DataViewRowState;
pub use view::{DataView, ViewSettings, ViewState};

//! Tabula Index - Key and sort indexes for the Tabula data model.
//!
//! This crate provides the index structures tables and views maintain:
//!
//! - `HashIndex`: O(1) point lookups, used by unique constraints
//! - `SortedIndex`: ordered row ids for live views
//! - `MultiKeyComparator`: composite key ordering with case folding
//!
//! # Example
//!
//! ```rust
//! use tabula_core::Value;
//! use tabula_index::{HashIndex, Index, MultiKeyComparator, Order, SortedIndex};
//!
//! let mut unique: HashIndex<Vec<Value>> = HashIndex::new(true);
//! unique.add(vec![Value::Int32(1)], 100).unwrap();
//! assert!(unique.add(vec![Value::Int32(1)], 200).is_err());
//!
//! let mut sorted = SortedIndex::new(MultiKeyComparator::new(vec![Order::Desc], false));
//! sorted.insert(vec![Value::from("a")], 1);
//! sorted.insert(vec![Value::from("B")], 2);
//! assert_eq!(sorted.row_ids().collect::<Vec<_>>(), vec![2, 1]);
//! ```

pub mod comparator;
pub mod hash;
pub mod sorted;
pub mod traits;

pub use comparator::{Comparator, MultiKeyComparator, Order};
pub use hash::HashIndex;
pub use sorted::SortedIndex;
pub use traits::{Index, IndexError};

//! Schema building blocks shared by tables and data sets.

mod column;
mod property;
mod rules;

pub use column::{AutoIncrement, Column};
pub use property::PropertyBag;
pub use rules::{AcceptRejectRule, Rule};

/// Compares object names the way the owning table is configured to.
pub fn names_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
    }
}

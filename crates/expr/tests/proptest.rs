//! Property-based tests for tabula-expr using proptest.

use proptest::prelude::*;
use tabula_core::{DataType, Value};
use tabula_expr::{ColumnSource, Expression};

struct Pair;

impl ColumnSource for Pair {
    fn table_name(&self) -> &str {
        "pair"
    }
    fn column_index(&self, name: &str) -> Option<usize> {
        ["a", "b"].iter().position(|c| c.eq_ignore_ascii_case(name))
    }
    fn column_type(&self, _index: usize) -> Option<DataType> {
        None
    }
    fn is_computed(&self, _index: usize) -> bool {
        false
    }
    fn is_case_sensitive(&self) -> bool {
        false
    }
}

fn tri_state() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::Boolean(true)),
        Just(Value::Boolean(false)),
    ]
}

proptest! {
    /// De Morgan holds under three-valued logic.
    #[test]
    fn de_morgan_three_valued(a in tri_state(), b in tri_state()) {
        let lhs = Expression::compile("NOT (A AND B)", &Pair).unwrap();
        let rhs = Expression::compile("(NOT A) OR (NOT B)", &Pair).unwrap();
        let row = [a, b];
        prop_assert_eq!(lhs.eval(&row).unwrap(), rhs.eval(&row).unwrap());
    }

    /// Integer comparisons agree with Rust's ordering, and a null operand never matches.
    #[test]
    fn comparison_matches_native(a in -1000i32..1000, b in -1000i32..1000, null_left in any::<bool>()) {
        let lt = Expression::compile("A < B", &Pair).unwrap();
        let row = [Value::Int32(a), Value::Int32(b)];
        prop_assert_eq!(lt.matches(&row).unwrap(), a < b);

        let left = if null_left { Value::Null } else { Value::Int32(a) };
        let row = [left.clone(), Value::Null];
        prop_assert!(!lt.matches(&row).unwrap());
    }

    /// Addition of two Int32 values never overflows; it widens instead.
    #[test]
    fn addition_widens(a in any::<i32>(), b in any::<i32>()) {
        let sum = Expression::compile("A + B", &Pair).unwrap();
        let v = sum.eval(&[Value::Int32(a), Value::Int32(b)]).unwrap();
        prop_assert_eq!(v.to_i64(), Some(a as i64 + b as i64));
    }

    /// `*` alone matches any non-null string.
    #[test]
    fn star_matches_everything(s in "[a-zA-Z0-9 ]{0,16}") {
        let like = Expression::compile("A LIKE '*'", &Pair).unwrap();
        prop_assert!(like.matches(&[Value::from(s.as_str()), Value::Null]).unwrap());
    }
}

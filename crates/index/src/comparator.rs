//! Comparator implementations for sort keys.
//!
//! This module provides comparators for ordering rows in sorted indexes.

use core::cmp::Ordering;
use tabula_core::Value;

/// Sort order for one key column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    /// Ascending order (smallest first)
    Asc,
    /// Descending order (largest first)
    Desc,
}

impl Order {
    /// Applies this order to a comparison result.
    #[inline]
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }
}

/// Trait for comparing keys.
pub trait Comparator<K: ?Sized> {
    /// Compares two keys according to the comparator's ordering.
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// Returns true if a < b according to this comparator.
    fn is_less(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Returns true if a == b according to this comparator.
    fn is_equal(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// Compares composite keys column by column.
///
/// Nulls sort before every other value in ascending order. Strings compare
/// case-insensitively unless the comparator is case-sensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MultiKeyComparator {
    orders: Vec<Order>,
    case_sensitive: bool,
}

impl MultiKeyComparator {
    /// Creates a new multi-key comparator with the given orders.
    pub fn new(orders: Vec<Order>, case_sensitive: bool) -> Self {
        Self {
            orders,
            case_sensitive,
        }
    }

    /// Creates orders for n keys, all with the same order.
    pub fn create_orders(n: usize, order: Order) -> Vec<Order> {
        (0..n).map(|_| order).collect()
    }

    /// Returns the orders of this comparator.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Compares borrowed key slices.
    pub fn compare_slices(&self, a: &[Value], b: &[Value]) -> Ordering {
        compare_keys(&self.orders, self.case_sensitive, a, b)
    }

    /// Returns whether strings compare case-sensitively.
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

impl Comparator<Vec<Value>> for MultiKeyComparator {
    fn compare(&self, a: &Vec<Value>, b: &Vec<Value>) -> Ordering {
        compare_keys(&self.orders, self.case_sensitive, a, b)
    }
}

fn compare_keys(orders: &[Order], case_sensitive: bool, a: &[Value], b: &[Value]) -> Ordering {
    for (i, order) in orders.iter().enumerate() {
        let cmp = match (a.get(i), b.get(i)) {
            (Some(av), Some(bv)) => order.apply(av.cmp_with_case(bv, case_sensitive)),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_apply() {
        assert_eq!(Order::Asc.apply(Ordering::Less), Ordering::Less);
        assert_eq!(Order::Desc.apply(Ordering::Less), Ordering::Greater);
    }

    #[test]
    fn test_multi_key_mixed_orders() {
        let cmp = MultiKeyComparator::new(vec![Order::Asc, Order::Desc], true);
        let a = vec![Value::Int32(1), Value::Int32(5)];
        let b = vec![Value::Int32(1), Value::Int32(9)];
        assert_eq!(cmp.compare(&a, &b), Ordering::Greater);
        let c = vec![Value::Int32(0), Value::Int32(0)];
        assert!(cmp.is_less(&c, &a));
    }

    #[test]
    fn test_multi_key_null_sorting() {
        let asc = MultiKeyComparator::new(vec![Order::Asc], true);
        let desc = MultiKeyComparator::new(vec![Order::Desc], true);
        let null = vec![Value::Null];
        let one = vec![Value::Int32(1)];
        assert!(asc.is_less(&null, &one));
        assert!(desc.is_less(&one, &null));
    }

    #[test]
    fn test_multi_key_case_folding() {
        let insensitive = MultiKeyComparator::new(vec![Order::Asc], false);
        let sensitive = MultiKeyComparator::new(vec![Order::Asc], true);
        let a = vec![Value::from("apple")];
        let b = vec![Value::from("Apple")];
        assert!(insensitive.is_equal(&a, &b));
        assert!(!sensitive.is_equal(&a, &b));
    }

    #[test]
    fn test_create_orders() {
        assert_eq!(
            MultiKeyComparator::create_orders(3, Order::Desc),
            vec![Order::Desc, Order::Desc, Order::Desc]
        );
    }
}

//! Property-based tests for tabula-storage using proptest.

use proptest::prelude::*;
use tabula_core::schema::Column;
use tabula_core::{DataType, RowVersion, Value};
use tabula_storage::DataTable;

#[derive(Clone, Debug)]
enum Edit {
    Add(i32),
    Set(prop::sample::Index, i32),
    Delete(prop::sample::Index),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0i32..20).prop_map(Edit::Add),
        (any::<prop::sample::Index>(), 0i32..20).prop_map(|(i, v)| Edit::Set(i, v)),
        any::<prop::sample::Index>().prop_map(Edit::Delete),
    ]
}

fn keyed(seed: &[i32]) -> DataTable {
    let mut t = DataTable::new("t");
    t.add_column(Column::new("key", DataType::Int32).unique(true)).unwrap();
    t.add_column(Column::new("payload", DataType::String)).unwrap();
    for &k in seed {
        let _ = t.add(vec![Value::Int32(k), Value::from(format!("v{}", k))]);
    }
    t.accept_changes().unwrap();
    t
}

fn apply(t: &mut DataTable, edit: &Edit) {
    let ids: Vec<_> = t.row_ids().collect();
    // Failed edits are part of the property: they must leave no trace.
    let _ = match edit {
        Edit::Add(k) => t.add(vec![Value::Int32(*k), Value::Null]).map(|_| ()),
        Edit::Set(i, v) if !ids.is_empty() => t.set_value(ids[i.index(ids.len())], 0, *v),
        Edit::Delete(i) if !ids.is_empty() => t.delete_row(ids[i.index(ids.len())]),
        _ => Ok(()),
    };
}

fn snapshot(t: &DataTable) -> Vec<(u64, Vec<Value>)> {
    t.rows()
        .filter_map(|(id, r)| r.current().map(|v| (id, v.to_vec())))
        .collect()
}

proptest! {
    /// Rejecting changes restores exactly the accepted rows.
    #[test]
    fn reject_restores_accepted(
        seed in prop::collection::vec(0i32..20, 0..15),
        edits in prop::collection::vec(edit(), 0..40)
    ) {
        let mut t = keyed(&seed);
        let accepted = snapshot(&t);
        for e in &edits {
            apply(&mut t, e);
        }
        t.reject_changes().unwrap();
        prop_assert_eq!(snapshot(&t), accepted);
        prop_assert!(!t.has_changes());
    }

    /// No two live rows ever share a unique key, and failed edits change
    /// nothing.
    #[test]
    fn unique_keys_stay_unique(
        seed in prop::collection::vec(0i32..20, 0..15),
        edits in prop::collection::vec(edit(), 0..40)
    ) {
        let mut t = keyed(&seed);
        for e in &edits {
            let before = snapshot(&t);
            let ids: Vec<_> = t.row_ids().collect();
            let result = match e {
                Edit::Add(k) => t.add(vec![Value::Int32(*k), Value::Null]).map(|_| ()),
                Edit::Set(i, v) if !ids.is_empty() => t.set_value(ids[i.index(ids.len())], 0, *v),
                Edit::Delete(i) if !ids.is_empty() => t.delete_row(ids[i.index(ids.len())]),
                _ => Ok(()),
            };
            if result.is_err() {
                prop_assert_eq!(snapshot(&t), before);
            }
            let mut keys: Vec<Value> = snapshot(&t).into_iter().map(|(_, v)| v[0].clone()).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), total);
        }
    }

    /// Accepting makes Original equal Current for every remaining row.
    #[test]
    fn accept_aligns_versions(
        seed in prop::collection::vec(0i32..20, 0..15),
        edits in prop::collection::vec(edit(), 0..40)
    ) {
        let mut t = keyed(&seed);
        for e in &edits {
            apply(&mut t, e);
        }
        t.accept_changes().unwrap();
        for id in t.row_ids().collect::<Vec<_>>() {
            prop_assert_eq!(
                t.values(id, RowVersion::Original).unwrap(),
                t.values(id, RowVersion::Current).unwrap()
            );
        }
    }
}

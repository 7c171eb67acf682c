//! Property-based tests for tabula-view using proptest.

use proptest::prelude::*;
use tabula_core::schema::Column;
use tabula_core::{DataType, Value};
use tabula_storage::{DataTable, RowStateFilter};
use tabula_view::{DataView, ViewSettings};

#[derive(Clone, Debug)]
enum Edit {
    Add(i32, &'static str),
    Set(prop::sample::Index, i32),
    Rename(prop::sample::Index, &'static str),
    Delete(prop::sample::Index),
    Remove(prop::sample::Index),
    AcceptRow(prop::sample::Index),
    RejectRow(prop::sample::Index),
    AcceptAll,
    RejectAll,
}

const NAMES: &[&str] = &["ant", "Bee", "cat", "bee", "eel"];

fn edit() -> impl Strategy<Value = Edit> {
    let name = prop::sample::select(NAMES);
    prop_oneof![
        4 => (0i32..10, name.clone()).prop_map(|(q, n)| Edit::Add(q, n)),
        4 => (any::<prop::sample::Index>(), 0i32..10).prop_map(|(i, q)| Edit::Set(i, q)),
        2 => (any::<prop::sample::Index>(), name).prop_map(|(i, n)| Edit::Rename(i, n)),
        2 => any::<prop::sample::Index>().prop_map(Edit::Delete),
        1 => any::<prop::sample::Index>().prop_map(Edit::Remove),
        1 => any::<prop::sample::Index>().prop_map(Edit::AcceptRow),
        1 => any::<prop::sample::Index>().prop_map(Edit::RejectRow),
        1 => Just(Edit::AcceptAll),
        1 => Just(Edit::RejectAll),
    ]
}

fn settings() -> impl Strategy<Value = ViewSettings> {
    let filter = prop::option::of(prop::sample::select(&["qty > 3", "name LIKE 'b*'", "qty % 2 = 0"][..]));
    let sort = prop::option::of(prop::sample::select(&["qty", "name DESC, qty", "name"][..]));
    let states = prop::sample::select(&[
        RowStateFilter::CURRENT_ROWS,
        RowStateFilter::ORIGINAL_ROWS,
        RowStateFilter::ADDED,
        RowStateFilter::DELETED,
        RowStateFilter::MODIFIED_CURRENT,
        RowStateFilter::MODIFIED_ORIGINAL,
    ][..]);
    (filter, sort, states).prop_map(|(filter, sort, row_states)| ViewSettings {
        filter: filter.map(str::to_string),
        sort: sort.map(str::to_string),
        row_states,
    })
}

fn stock() -> DataTable {
    let mut t = DataTable::new("stock");
    t.add_column(Column::new("name", DataType::String)).unwrap();
    t.add_column(Column::new("qty", DataType::Int32)).unwrap();
    for (n, q) in [("cat", 4), ("ant", 1), ("bee", 7)] {
        t.add(vec![Value::from(n), Value::Int32(q)]).unwrap();
    }
    t.accept_changes().unwrap();
    t
}

fn apply(t: &mut DataTable, edit: &Edit) {
    let ids: Vec<_> = t.row_ids().collect();
    let pick = |i: &prop::sample::Index| ids[i.index(ids.len())];
    // Invalid edits (touching deleted rows) fail and change nothing.
    let _ = match edit {
        Edit::Add(q, n) => t.add(vec![Value::from(*n), Value::Int32(*q)]).map(|_| ()),
        Edit::AcceptAll => t.accept_changes(),
        Edit::RejectAll => t.reject_changes(),
        _ if ids.is_empty() => Ok(()),
        Edit::Set(i, q) => t.set_value(pick(i), 1, *q),
        Edit::Rename(i, n) => t.set_value(pick(i), 0, *n),
        Edit::Delete(i) => t.delete_row(pick(i)),
        Edit::Remove(i) => t.remove_row(pick(i)),
        Edit::AcceptRow(i) => t.accept_row(pick(i)),
        Edit::RejectRow(i) => t.reject_row(pick(i)),
    };
}

proptest! {
    /// An open view tracks every edit exactly as a freshly opened one would
    /// see the final table.
    #[test]
    fn incremental_matches_fresh(
        settings in settings(),
        edits in prop::collection::vec(edit(), 0..40)
    ) {
        let mut t = stock();
        let mut live = DataView::with_settings(settings.clone());
        live.open(&mut t).unwrap();
        for e in &edits {
            apply(&mut t, e);
        }
        let mut fresh = DataView::with_settings(settings);
        fresh.open(&mut t).unwrap();
        prop_assert_eq!(live.row_ids(), fresh.row_ids());
    }

    /// Subscribers can rebuild the view order from change sets alone.
    #[test]
    fn change_sets_carry_current_order(
        edits in prop::collection::vec(edit(), 1..30)
    ) {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut t = stock();
        let mut view = DataView::new().with_sort("qty").with_filter("qty > 2");
        view.open(&mut t).unwrap();
        let last = Rc::new(RefCell::new(view.row_ids()));
        let sink = last.clone();
        view.subscribe(move |cs| *sink.borrow_mut() = cs.current_result.clone());
        for e in &edits {
            apply(&mut t, e);
        }
        prop_assert_eq!(last.borrow().clone(), view.row_ids());
    }
}

//! End-to-end scenarios over data sets and standalone tables.

use tabula_core::schema::{Column, Rule};
use tabula_core::{DataType, Error, ErrorKind, RowState, RowVersion, Value};
use tabula_storage::{DataSet, DataTable, RelationDef, RowStateFilter, TableId};

/// T1(Id unique, Name) -> T2(T1Id, Value), cascading on delete.
fn master_detail() -> (DataSet, TableId, TableId) {
    let mut ds = DataSet::new("ds");
    let t1 = ds.create_table("T1").unwrap();
    let t = ds.table_mut(t1).unwrap();
    t.add_column(Column::new("Id", DataType::Int32).unique(true)).unwrap();
    t.add_column(Column::new("Name", DataType::String)).unwrap();
    let t2 = ds.create_table("T2").unwrap();
    let t = ds.table_mut(t2).unwrap();
    t.add_column(Column::new("T1Id", DataType::Int32)).unwrap();
    t.add_column(Column::new("Value", DataType::String)).unwrap();
    ds.add_relation(RelationDef::new("R", "T1", &["Id"], "T2", &["T1Id"]).delete_rule(Rule::Cascade))
        .unwrap();
    (ds, t1, t2)
}

#[test]
fn test_cascade_delete_then_get_changes() {
    let (mut ds, t1, t2) = master_detail();
    let parent = ds.add(t1, vec![Value::Int32(1), Value::from("a")]).unwrap();
    let x = ds.add(t2, vec![Value::Int32(1), Value::from("x")]).unwrap();
    let y = ds.add(t2, vec![Value::Int32(1), Value::from("y")]).unwrap();
    ds.accept_changes().unwrap();

    ds.delete_row(t1, parent).unwrap();
    let detail = ds.table(t2).unwrap();
    assert_eq!(detail.row_state(x).unwrap(), RowState::Deleted);
    assert_eq!(detail.row_state(y).unwrap(), RowState::Deleted);

    let deleted = detail.get_changes(&[RowState::Deleted]).unwrap();
    assert_eq!(deleted.len(), 2);
    let values: Vec<Value> = deleted
        .row_ids()
        .map(|id| deleted.get_version(id, 1, RowVersion::Original).unwrap().clone())
        .collect();
    assert_eq!(values, vec![Value::from("x"), Value::from("y")]);
}

#[test]
fn test_unique_edit_fails_and_keeps_row() {
    let mut t = DataTable::new("people");
    t.add_column(Column::new("id", DataType::Int32).unique(true)).unwrap();
    let a = t.add(vec![Value::Int32(1)]).unwrap();
    t.add(vec![Value::Int32(2)]).unwrap();
    t.accept_changes().unwrap();

    t.begin_edit(a).unwrap();
    t.set_value(a, 0, 2).unwrap();
    let err = t.end_edit(a).unwrap_err();
    assert!(matches!(err, Error::UniqueViolation { .. }));
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(t.get(a, 0).unwrap(), &Value::Int32(1));
    assert_eq!(t.row_state(a).unwrap(), RowState::Unchanged);
}

#[test]
fn test_second_insert_with_same_key_fails() {
    let mut t = DataTable::new("people");
    t.add_column(Column::new("id", DataType::Int32)).unwrap();
    t.set_primary_key(&["id"]).unwrap();
    t.add(vec![Value::Int32(1)]).unwrap();
    assert!(t.add(vec![Value::Int32(1)]).is_err());
    assert_eq!(t.len(), 1);
}

#[test]
fn test_delete_rule_none_keeps_everything() {
    let mut ds = DataSet::new("ds");
    let p = ds.create_table("p").unwrap();
    ds.table_mut(p).unwrap().add_column(Column::new("id", DataType::Int32)).unwrap();
    let c = ds.create_table("c").unwrap();
    ds.table_mut(c).unwrap().add_column(Column::new("pid", DataType::Int32)).unwrap();
    ds.add_relation(RelationDef::new("r", "p", &["id"], "c", &["pid"]).delete_rule(Rule::None))
        .unwrap();
    let parent = ds.add(p, vec![Value::Int32(1)]).unwrap();
    ds.add(c, vec![Value::Int32(1)]).unwrap();
    ds.accept_changes().unwrap();

    let err = ds.delete_row(p, parent).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CascadeFailure);
    assert!(!ds.has_changes());
}

#[test]
fn test_transitive_cascade() {
    let mut ds = DataSet::new("ds");
    for name in ["a", "b", "c"] {
        let id = ds.create_table(name).unwrap();
        let t = ds.table_mut(id).unwrap();
        t.add_column(Column::new("id", DataType::Int32)).unwrap();
        t.add_column(Column::new("up", DataType::Int32)).unwrap();
        t.set_primary_key(&["id"]).unwrap();
    }
    ds.add_relation(RelationDef::new("ab", "a", &["id"], "b", &["up"])).unwrap();
    ds.add_relation(RelationDef::new("bc", "b", &["id"], "c", &["up"])).unwrap();
    let (a, b, c) = (0, 1, 2);
    let root = ds.add(a, vec![Value::Int32(1), Value::Null]).unwrap();
    ds.add(b, vec![Value::Int32(10), Value::Int32(1)]).unwrap();
    ds.add(b, vec![Value::Int32(11), Value::Int32(1)]).unwrap();
    ds.add(c, vec![Value::Int32(100), Value::Int32(10)]).unwrap();
    ds.add(c, vec![Value::Int32(101), Value::Int32(11)]).unwrap();
    ds.add(c, vec![Value::Int32(102), Value::Null]).unwrap();
    ds.accept_changes().unwrap();

    ds.delete_row(a, root).unwrap();
    let states = |t: TableId| -> Vec<RowState> {
        ds.table(t).unwrap().rows().map(|(_, r)| r.state()).collect()
    };
    assert_eq!(states(b), vec![RowState::Deleted; 2]);
    assert_eq!(
        states(c),
        vec![RowState::Deleted, RowState::Deleted, RowState::Unchanged]
    );

    ds.reject_changes().unwrap();
    assert!(!ds.has_changes());
    assert_eq!(ds.table(c).unwrap().len(), 3);
}

#[test]
fn test_failed_cascade_rolls_back_every_table() {
    let mut ds = DataSet::new("ds");
    let p = ds.create_table("p").unwrap();
    let t = ds.table_mut(p).unwrap();
    t.add_column(Column::new("id", DataType::Int32)).unwrap();
    t.set_primary_key(&["id"]).unwrap();
    let c = ds.create_table("c").unwrap();
    let t = ds.table_mut(c).unwrap();
    t.add_column(Column::new("pid", DataType::Int32).allow_null(false)).unwrap();
    ds.add_relation(RelationDef::new("r", "p", &["id"], "c", &["pid"]).update_rule(Rule::SetNull))
        .unwrap();
    let parent = ds.add(p, vec![Value::Int32(1)]).unwrap();
    let child = ds.add(c, vec![Value::Int32(1)]).unwrap();

    let err = ds.set_value(p, parent, 0, 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CascadeFailure);
    assert_eq!(ds.table(p).unwrap().get(parent, 0).unwrap(), &Value::Int32(1));
    assert_eq!(ds.table(c).unwrap().get(child, 0).unwrap(), &Value::Int32(1));
}

#[test]
fn test_select_over_states() {
    let mut t = DataTable::new("t");
    t.add_column(Column::new("n", DataType::Int32)).unwrap();
    let rows: Vec<_> = (0..4).map(|i| t.add(vec![Value::Int32(i)]).unwrap()).collect();
    t.accept_changes().unwrap();
    t.set_value(rows[1], 0, 10).unwrap();
    t.delete_row(rows[2]).unwrap();

    let current = t.select(None, Some("n DESC"), RowStateFilter::CURRENT_ROWS).unwrap();
    assert_eq!(current, vec![rows[1], rows[3], rows[0]]);
    let original = t.select(None, Some("n"), RowStateFilter::ORIGINAL_ROWS).unwrap();
    assert_eq!(original, rows);
}

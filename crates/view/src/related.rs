//! Views bound to a parent row.

use crate::view::{DataView, ViewSettings};
use tabula_core::{Error, Result, RowId, RowState, RowVersion, Value};
use tabula_storage::constraint::{is_null_key, key_of};
use tabula_storage::{DataSet, DataTable, RelationId};

/// Identity of a related view. Two views with equal keys show the same rows
/// and may share a cache slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelatedViewKey {
    /// Child key columns.
    pub columns: Vec<usize>,
    /// Parent key values, case folded when the child table is case
    /// insensitive.
    pub key: Vec<Value>,
    pub filter: Option<String>,
}

/// Child key columns fixed to one parent key.
#[derive(Clone, Debug)]
pub(crate) struct KeyBinding {
    pub(crate) columns: Vec<usize>,
    pub(crate) key: Vec<Value>,
}

impl KeyBinding {
    pub(crate) fn check(&self, table: &DataTable) -> Result<()> {
        match self.columns.iter().find(|&&c| c >= table.column_count()) {
            Some(c) => Err(Error::invalid_operation(format!(
                "column {} of the related view no longer exists in '{}'",
                c,
                table.name()
            ))),
            None => Ok(()),
        }
    }

    /// A null parent key matches no child.
    pub(crate) fn matches(&self, values: &[Value], case_sensitive: bool) -> bool {
        !is_null_key(&self.key) && key_of(values, &self.columns, case_sensitive) == self.key
    }
}

impl DataView {
    /// An unopened view over the child table of `relation` showing the
    /// children of `parent_row`. A deleted parent is matched through its
    /// original key.
    ///
    /// Open it on `ds.table_mut(relation.child_table())`.
    pub fn related(ds: &DataSet, relation: RelationId, parent_row: RowId) -> Result<DataView> {
        Self::related_with(ds, relation, parent_row, ViewSettings::default())
    }

    pub fn related_with(ds: &DataSet, relation: RelationId, parent_row: RowId, settings: ViewSettings) -> Result<DataView> {
        let rel = ds.relation(relation).ok_or_else(|| Error::RelationNotFound {
            name: format!("#{}", relation),
        })?;
        let parent = ds
            .table(rel.parent_table())
            .ok_or_else(|| Error::table_not_found(format!("#{}", rel.parent_table())))?;
        let child = ds
            .table(rel.child_table())
            .ok_or_else(|| Error::table_not_found(format!("#{}", rel.child_table())))?;
        let version = match parent.row_state(parent_row)? {
            RowState::Deleted => RowVersion::Original,
            _ => RowVersion::Current,
        };
        let key = key_of(
            parent.values(parent_row, version)?,
            rel.parent_columns(),
            child.is_case_sensitive(),
        );
        let binding = KeyBinding {
            columns: rel.child_columns().to_vec(),
            key,
        };
        Ok(DataView::build(settings, Some(binding)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashSet;
    use tabula_core::schema::Column;
    use tabula_core::DataType;
    use tabula_storage::{RelationDef, RowStateFilter, TableId};

    fn shop() -> (DataSet, RelationId, TableId, TableId, RowId, RowId) {
        let mut ds = DataSet::new("shop");
        let cust = ds.create_table("customers").unwrap();
        let t = ds.table_mut(cust).unwrap();
        t.add_column(Column::new("code", DataType::String)).unwrap();
        t.set_primary_key(&["code"]).unwrap();
        let orders = ds.create_table("orders").unwrap();
        let t = ds.table_mut(orders).unwrap();
        t.add_column(Column::new("code", DataType::String)).unwrap();
        t.add_column(Column::new("total", DataType::Int32)).unwrap();
        let rel = ds
            .add_relation(RelationDef::new("cust_orders", "customers", &["code"], "orders", &["code"]))
            .unwrap();
        let alfki = ds.add(cust, vec![Value::from("ALFKI")]).unwrap();
        let bonap = ds.add(cust, vec![Value::from("BONAP")]).unwrap();
        for (code, total) in [("ALFKI", 10), ("BONAP", 20), ("alfki", 30)] {
            ds.add(orders, vec![Value::from(code), Value::Int32(total)]).unwrap();
        }
        ds.accept_changes().unwrap();
        (ds, rel, cust, orders, alfki, bonap)
    }

    #[test]
    fn test_related_view_rows() {
        let (mut ds, rel, _, orders, alfki, _) = shop();
        let mut view = DataView::related(&ds, rel, alfki).unwrap().with_sort("total DESC");
        view.open(ds.table_mut(orders).unwrap()).unwrap();
        assert_eq!(view.len(), 2);

        let added = ds.add(orders, vec![Value::from("ALFKI"), Value::Int32(99)]).unwrap();
        assert_eq!(view.get(0), Some(added));
        ds.add(orders, vec![Value::from("BONAP"), Value::Int32(5)]).unwrap();
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_related_key_equality() {
        let (ds, rel, _, _, alfki, bonap) = shop();
        let a = DataView::related(&ds, rel, alfki).unwrap();
        let b = DataView::related(&ds, rel, alfki).unwrap();
        let c = DataView::related(&ds, rel, bonap).unwrap();
        let d = DataView::related(&ds, rel, alfki).unwrap().with_filter("total > 10");
        let keys: HashSet<RelatedViewKey> = [&a, &b, &c, &d].iter().filter_map(|v| v.related_key()).collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(a.related_key(), b.related_key());
        assert!(DataView::new().related_key().is_none());
    }

    #[test]
    fn test_deleted_parent_uses_original_key() {
        let (mut ds, rel, cust, orders, _, bonap) = shop();
        let before = DataView::related(&ds, rel, bonap).unwrap();
        ds.delete_row(cust, bonap).unwrap();
        let mut view = DataView::related(&ds, rel, bonap)
            .unwrap()
            .with_row_state_filter(RowStateFilter::DELETED);
        view.open(ds.table_mut(orders).unwrap()).unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.related_key(), before.related_key());
    }

    #[test]
    fn test_unknown_relation() {
        let (ds, _, _, _, alfki, _) = shop();
        assert!(matches!(DataView::related(&ds, 42, alfki), Err(Error::RelationNotFound { .. })));
    }
}

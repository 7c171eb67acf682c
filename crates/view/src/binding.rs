//! Property descriptors for data binding.
//!
//! A binding lists the properties an item of a table exposes: one per
//! column, then one per child relation. Descriptors are resolved once when
//! the binding is built; a schema change calls for a new binding.

use tabula_core::{DataType, Error, Result, RowId, RowVersion, Value};
use tabula_storage::{DataSet, RelationId, TableId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Column {
        ordinal: usize,
        data_type: DataType,
        read_only: bool,
    },
    /// Navigates to the child rows of a relation.
    Relation { relation: RelationId, child_table: TableId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
}

impl PropertyDescriptor {
    pub fn is_read_only(&self) -> bool {
        match self.kind {
            PropertyKind::Column { read_only, .. } => read_only,
            PropertyKind::Relation { .. } => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Value(Value),
    Rows(Vec<RowId>),
}

/// Typed access to the properties of rows of one table.
pub trait ItemProperties {
    /// Table whose rows are the items.
    fn table(&self) -> TableId;

    fn item_properties(&self) -> &[PropertyDescriptor];

    /// Looks a property up by name, ignoring case.
    fn find_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        let folded = name.to_lowercase();
        self.item_properties()
            .iter()
            .find(|p| p.name.to_lowercase() == folded)
    }

    fn get_value(&self, ds: &DataSet, row: RowId, property: &PropertyDescriptor) -> Result<PropertyValue> {
        match property.kind {
            PropertyKind::Column { ordinal, .. } => {
                let table = ds
                    .table(self.table())
                    .ok_or_else(|| Error::table_not_found(format!("#{}", self.table())))?;
                Ok(PropertyValue::Value(table.get(row, ordinal)?.clone()))
            }
            PropertyKind::Relation { relation, .. } => Ok(PropertyValue::Rows(
                ds.child_rows(relation, row, RowVersion::Current)?.collect(),
            )),
        }
    }

    fn set_value(&self, ds: &mut DataSet, row: RowId, property: &PropertyDescriptor, value: Value) -> Result<()> {
        match property.kind {
            PropertyKind::Column { read_only: true, .. } => Err(Error::ReadOnly {
                column: property.name.clone(),
            }),
            PropertyKind::Column { ordinal, .. } => ds.set_value(self.table(), row, ordinal, value),
            PropertyKind::Relation { .. } => Err(Error::invalid_operation(format!(
                "relation property '{}' cannot be set",
                property.name
            ))),
        }
    }
}

fn describe(ds: &DataSet, table: TableId) -> Result<Vec<PropertyDescriptor>> {
    let t = ds
        .table(table)
        .ok_or_else(|| Error::table_not_found(format!("#{}", table)))?;
    let mut properties: Vec<PropertyDescriptor> = t
        .columns()
        .iter()
        .enumerate()
        .map(|(ordinal, c)| PropertyDescriptor {
            name: c.name().to_string(),
            kind: PropertyKind::Column {
                ordinal,
                data_type: c.data_type(),
                read_only: c.is_read_only() || c.is_computed(),
            },
        })
        .collect();
    for relation in ds.child_relations(table) {
        if let Some(rel) = ds.relation(relation) {
            properties.push(PropertyDescriptor {
                name: rel.name().to_string(),
                kind: PropertyKind::Relation {
                    relation,
                    child_table: rel.child_table(),
                },
            });
        }
    }
    Ok(properties)
}

/// Binding over all rows of a table.
#[derive(Clone, Debug)]
pub struct TableBinding {
    table: TableId,
    properties: Vec<PropertyDescriptor>,
}

impl TableBinding {
    pub fn new(ds: &DataSet, table: TableId) -> Result<Self> {
        Ok(Self {
            table,
            properties: describe(ds, table)?,
        })
    }
}

impl ItemProperties for TableBinding {
    fn table(&self) -> TableId {
        self.table
    }

    fn item_properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }
}

/// Binding over the child rows reached through a relation; items are the
/// children of one parent row.
#[derive(Clone, Debug)]
pub struct RelationBinding {
    relation: RelationId,
    child: TableBinding,
}

impl RelationBinding {
    pub fn new(ds: &DataSet, relation: RelationId) -> Result<Self> {
        let rel = ds.relation(relation).ok_or_else(|| Error::RelationNotFound {
            name: format!("#{}", relation),
        })?;
        Ok(Self {
            relation,
            child: TableBinding::new(ds, rel.child_table())?,
        })
    }

    pub fn relation(&self) -> RelationId {
        self.relation
    }

    pub fn items(&self, ds: &DataSet, parent_row: RowId) -> Result<Vec<RowId>> {
        Ok(ds.child_rows(self.relation, parent_row, RowVersion::Current)?.collect())
    }
}

impl ItemProperties for RelationBinding {
    fn table(&self) -> TableId {
        self.child.table
    }

    fn item_properties(&self) -> &[PropertyDescriptor] {
        &self.child.properties
    }
}

//! Parent/child relations between tables of a data set.

use crate::constraint::ForeignKeyConstraint;
use crate::graph::TableId;
use tabula_core::schema::{AcceptRejectRule, PropertyBag, Rule};

/// A named link from a parent key to a child column set.
#[derive(Clone, Debug)]
pub struct DataRelation {
    pub(crate) name: String,
    pub(crate) parent: TableId,
    pub(crate) child: TableId,
    pub(crate) parent_columns: Vec<usize>,
    pub(crate) child_columns: Vec<usize>,
    pub(crate) foreign_key: Option<ForeignKeyConstraint>,
    /// Name of the parent unique constraint the relation pinned.
    pub(crate) parent_key: Option<String>,
    pub(crate) nested: bool,
    pub(crate) properties: PropertyBag,
}

impl DataRelation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_table(&self) -> TableId {
        self.parent
    }

    pub fn child_table(&self) -> TableId {
        self.child
    }

    pub fn parent_columns(&self) -> &[usize] {
        &self.parent_columns
    }

    pub fn child_columns(&self) -> &[usize] {
        &self.child_columns
    }

    /// The foreign key constraint enforced on the child table, if any.
    pub fn foreign_key(&self) -> Option<&ForeignKeyConstraint> {
        self.foreign_key.as_ref()
    }

    /// Name of the unique constraint on the parent key.
    pub fn parent_key_constraint(&self) -> Option<&str> {
        self.parent_key.as_deref()
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn set_nested(&mut self, nested: bool) {
        self.nested = nested;
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }

    pub(crate) fn is_self_referencing(&self) -> bool {
        self.parent == self.child
    }
}

/// Definition of a relation, resolved by name when added to a data set.
///
/// ```rust
/// use tabula_core::schema::Rule;
/// use tabula_storage::RelationDef;
///
/// let def = RelationDef::new("orders_lines", "orders", &["id"], "lines", &["order_id"])
///     .delete_rule(Rule::Cascade)
///     .update_rule(Rule::SetNull);
/// assert_eq!(def.name, "orders_lines");
/// ```
#[derive(Clone, Debug)]
pub struct RelationDef {
    pub name: String,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    pub child_table: String,
    pub child_columns: Vec<String>,
    /// Rules of the foreign key, or `None` for a navigation-only relation.
    pub constraint: Option<ForeignKeyConstraint>,
    pub nested: bool,
}

impl RelationDef {
    /// Creates a relation backed by a foreign key with default rules.
    pub fn new(
        name: impl Into<String>,
        parent_table: impl Into<String>,
        parent_columns: &[&str],
        child_table: impl Into<String>,
        child_columns: &[&str],
    ) -> Self {
        let name = name.into();
        Self {
            constraint: Some(ForeignKeyConstraint::new(name.clone())),
            name,
            parent_table: parent_table.into(),
            parent_columns: parent_columns.iter().map(|c| c.to_string()).collect(),
            child_table: child_table.into(),
            child_columns: child_columns.iter().map(|c| c.to_string()).collect(),
            nested: false,
        }
    }

    /// Drops the foreign key; the relation is then only used for navigation.
    pub fn without_constraint(mut self) -> Self {
        self.constraint = None;
        self
    }

    pub fn delete_rule(mut self, rule: Rule) -> Self {
        if let Some(fk) = self.constraint.as_mut() {
            fk.delete_rule = rule;
        }
        self
    }

    pub fn update_rule(mut self, rule: Rule) -> Self {
        if let Some(fk) = self.constraint.as_mut() {
            fk.update_rule = rule;
        }
        self
    }

    pub fn accept_reject_rule(mut self, rule: AcceptRejectRule) -> Self {
        if let Some(fk) = self.constraint.as_mut() {
            fk.accept_reject_rule = rule;
        }
        self
    }

    pub fn nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }
}

//! Referential actions for foreign key constraints.

use serde::{Deserialize, Serialize};

/// Action taken on child rows when a parent key is deleted or changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rule {
    /// Fail if dependent rows exist.
    None,
    /// Delete or re-key dependent rows.
    #[default]
    Cascade,
    /// Set the child key columns to null.
    SetNull,
    /// Set the child key columns to their default values.
    SetDefault,
}

/// Whether accepting or rejecting a parent row carries over to its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AcceptRejectRule {
    /// Children are left alone.
    #[default]
    None,
    /// Children are accepted or rejected with the parent.
    Cascade,
}

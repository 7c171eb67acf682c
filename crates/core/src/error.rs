//! Error types for Tabula.

use crate::row::{RowId, RowVersion};
use crate::types::DataType;
use thiserror::Error;

/// Result type alias for Tabula operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad names, unknown objects, type mismatches, malformed expressions.
    SchemaViolation,
    /// A row value or key breaks a column rule or a constraint.
    ConstraintViolation,
    /// The row or object is not in a state that permits the operation.
    StateViolation,
    /// A delete/update rule could not be applied to dependent rows.
    CascadeFailure,
}

/// Error types for Tabula operations.
///
/// No operation applies partially: when one of these is returned the data set
/// is exactly as it was before the call.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    // === Schema ===
    /// A column with this name already exists in the table.
    #[error("column '{column}' already belongs to table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// A table with this name already exists in the data set.
    #[error("table '{name}' already exists")]
    DuplicateTable { name: String },

    /// A relation with this name already exists in the data set.
    #[error("relation '{name}' already exists")]
    DuplicateRelation { name: String },

    /// A constraint with this name already exists on the table.
    #[error("constraint '{name}' already exists on table '{table}'")]
    DuplicateConstraint { table: String, name: String },

    /// Column not found.
    #[error("column '{column}' does not belong to table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Table not found.
    #[error("table '{name}' not found")]
    TableNotFound { name: String },

    /// Relation not found.
    #[error("relation '{name}' not found")]
    RelationNotFound { name: String },

    /// Constraint not found.
    #[error("constraint '{name}' not found on table '{table}'")]
    ConstraintNotFound { table: String, name: String },

    /// A value could not be converted to the column type.
    #[error("column '{column}' expects {expected}, got '{value}'")]
    TypeMismatch {
        column: String,
        expected: DataType,
        value: String,
    },

    /// Invalid schema definition or schema edit.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// Malformed or ill-typed expression.
    #[error("expression error at {position}: {message}")]
    Expression { message: String, position: usize },

    // === Constraint ===
    /// Null assigned to a column that does not allow nulls.
    #[error("column '{column}' of table '{table}' does not allow nulls")]
    NoNullAllowed { table: String, column: String },

    /// Write to a read-only or computed column.
    #[error("column '{column}' is read only")]
    ReadOnly { column: String },

    /// String longer than the column's max length.
    #[error("column '{column}' exceeds max length {max_length} (got {length})")]
    MaxLengthExceeded {
        column: String,
        max_length: usize,
        length: usize,
    },

    /// Duplicate key under a unique constraint.
    #[error("unique constraint '{constraint}' on table '{table}' violated by key {key}")]
    UniqueViolation {
        constraint: String,
        table: String,
        key: String,
    },

    /// Child key without a matching parent row.
    #[error("foreign key constraint '{constraint}' violated: {message}")]
    ForeignKeyViolation { constraint: String, message: String },

    /// Constraint or relation could not be created.
    #[error("invalid constraint '{constraint}': {message}")]
    InvalidConstraint { constraint: String, message: String },

    // === State ===
    /// Access to a deleted row's current or proposed values.
    #[error("row {row} has been deleted")]
    RowDeleted { row: RowId },

    /// The requested version does not exist for the row's state.
    #[error("row {row} has no {version:?} version")]
    VersionNotFound { row: RowId, version: RowVersion },

    /// Row handle does not belong to the table.
    #[error("row {row} not found in table '{table}'")]
    RowNotFound { table: String, row: RowId },

    /// `begin_edit` while an edit is already open.
    #[error("row {row} is already being edited")]
    EditInProgress { row: RowId },

    /// `end_edit` or `cancel_edit` without an open edit.
    #[error("row {row} is not being edited")]
    NoEditInProgress { row: RowId },

    /// Operation not valid in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    // === Cascade ===
    /// A delete or update rule could not be applied.
    #[error("cascade through '{constraint}' failed: {message}")]
    CascadeFailure { constraint: String, message: String },
}

impl Error {
    /// Returns the taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateColumn { .. }
            | Error::DuplicateTable { .. }
            | Error::DuplicateRelation { .. }
            | Error::DuplicateConstraint { .. }
            | Error::ColumnNotFound { .. }
            | Error::TableNotFound { .. }
            | Error::RelationNotFound { .. }
            | Error::ConstraintNotFound { .. }
            | Error::TypeMismatch { .. }
            | Error::InvalidSchema { .. }
            | Error::Expression { .. } => ErrorKind::SchemaViolation,
            Error::NoNullAllowed { .. }
            | Error::ReadOnly { .. }
            | Error::MaxLengthExceeded { .. }
            | Error::UniqueViolation { .. }
            | Error::ForeignKeyViolation { .. }
            | Error::InvalidConstraint { .. } => ErrorKind::ConstraintViolation,
            Error::RowDeleted { .. }
            | Error::VersionNotFound { .. }
            | Error::RowNotFound { .. }
            | Error::EditInProgress { .. }
            | Error::NoEditInProgress { .. }
            | Error::InvalidOperation { .. } => ErrorKind::StateViolation,
            Error::CascadeFailure { .. } => ErrorKind::CascadeFailure,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an expression error at the given character offset.
    pub fn expression(message: impl Into<String>, position: usize) -> Self {
        Error::Expression {
            message: message.into(),
            position,
        }
    }

    /// Creates an invalid constraint error.
    pub fn invalid_constraint(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidConstraint {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    /// Creates a cascade failure.
    pub fn cascade(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CascadeFailure {
            constraint: constraint.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::table_not_found("users");
        assert_eq!(err.to_string(), "table 'users' not found");

        let err = Error::UniqueViolation {
            constraint: "pk_users".into(),
            table: "users".into(),
            key: "(1)".into(),
        };
        assert!(err.to_string().contains("pk_users"));
        assert!(err.to_string().contains("(1)"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::invalid_schema("x").kind(), ErrorKind::SchemaViolation);
        assert_eq!(
            Error::NoNullAllowed {
                table: "t".into(),
                column: "c".into()
            }
            .kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(Error::RowDeleted { row: 3 }.kind(), ErrorKind::StateViolation);
        assert_eq!(Error::cascade("fk", "no default").kind(), ErrorKind::CascadeFailure);
        assert_eq!(
            Error::VersionNotFound {
                row: 1,
                version: RowVersion::Original
            }
            .kind(),
            ErrorKind::StateViolation
        );
    }
}

//! Row versions and the row state machine.
//!
//! A row that belongs to a table is a [`RowRecord`]: a [`RowVersions`] tag
//! holding the Original and/or Current values, plus an optional Proposed
//! buffer while an edit is open. State transitions only happen through the
//! methods here; the table layer decides when to call them.

use crate::error::{Error, Result};
use crate::value::Value;
use core::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

/// Unique identifier for a row.
pub type RowId = u64;

/// Global row ID counter. IDs grow monotonically, so table order equals ID order.
static NEXT_ROW_ID: AtomicU64 = AtomicU64::new(1);

/// Gets the next unique row ID.
pub fn next_row_id() -> RowId {
    NEXT_ROW_ID.fetch_add(1, Ordering::SeqCst)
}

/// Lifecycle state of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowState {
    /// Created but not attached to a table.
    Detached,
    /// Unmodified since the last accept.
    Unchanged,
    /// Added since the last accept.
    Added,
    /// Deleted since the last accept.
    Deleted,
    /// Modified since the last accept.
    Modified,
}

/// Selector for one of a row's value versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowVersion {
    /// Values as of the last accept.
    Original,
    /// Committed values.
    Current,
    /// Values of an open edit.
    Proposed,
    /// Proposed while editing, Current otherwise.
    Default,
}

/// Tagged storage of the committed versions of a row.
#[derive(Clone, Debug, PartialEq)]
pub enum RowVersions {
    /// Current only; no original exists yet.
    Added(Vec<Value>),
    /// Original and Current are the same values.
    Unchanged(Vec<Value>),
    /// Original and Current differ.
    Modified {
        original: Vec<Value>,
        current: Vec<Value>,
    },
    /// Original only.
    Deleted(Vec<Value>),
}

/// Outcome of accepting or rejecting a row's changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settle {
    /// The row stays in the table.
    Keep,
    /// The row must be physically removed from the table.
    Remove,
}

/// A row owned by a table.
#[derive(Clone, Debug, PartialEq)]
pub struct RowRecord {
    versions: RowVersions,
    proposed: Option<Vec<Value>>,
    error: Option<String>,
}

impl RowRecord {
    /// Creates a freshly added row.
    pub fn added(values: Vec<Value>) -> Self {
        Self {
            versions: RowVersions::Added(values),
            proposed: None,
            error: None,
        }
    }

    /// Creates a row from explicit versions (used by import and snapshots).
    pub fn from_versions(versions: RowVersions) -> Self {
        Self {
            versions,
            proposed: None,
            error: None,
        }
    }

    /// Returns the committed versions.
    #[inline]
    pub fn versions(&self) -> &RowVersions {
        &self.versions
    }

    /// Returns the row state.
    pub fn state(&self) -> RowState {
        match self.versions {
            RowVersions::Added(_) => RowState::Added,
            RowVersions::Unchanged(_) => RowState::Unchanged,
            RowVersions::Modified { .. } => RowState::Modified,
            RowVersions::Deleted(_) => RowState::Deleted,
        }
    }

    /// Returns true while an edit is open.
    #[inline]
    pub fn is_editing(&self) -> bool {
        self.proposed.is_some()
    }

    /// Returns the Current values, or None for a deleted row.
    pub fn current(&self) -> Option<&[Value]> {
        match &self.versions {
            RowVersions::Added(v) | RowVersions::Unchanged(v) => Some(v),
            RowVersions::Modified { current, .. } => Some(current),
            RowVersions::Deleted(_) => None,
        }
    }

    /// Returns the Original values, or None for an added row.
    pub fn original(&self) -> Option<&[Value]> {
        match &self.versions {
            RowVersions::Added(_) => None,
            RowVersions::Unchanged(v) | RowVersions::Deleted(v) => Some(v),
            RowVersions::Modified { original, .. } => Some(original),
        }
    }

    /// Returns the Proposed values of an open edit.
    pub fn proposed(&self) -> Option<&[Value]> {
        self.proposed.as_deref()
    }

    /// Returns true if the version can be read in the current state.
    pub fn has_version(&self, version: RowVersion) -> bool {
        match version {
            RowVersion::Original => self.original().is_some(),
            RowVersion::Current => self.current().is_some(),
            RowVersion::Proposed => self.proposed.is_some(),
            RowVersion::Default => self.proposed.is_some() || self.current().is_some(),
        }
    }

    /// Reads one version of the row.
    pub fn values(&self, id: RowId, version: RowVersion) -> Result<&[Value]> {
        let deleted = self.state() == RowState::Deleted;
        let found = match version {
            RowVersion::Original => self.original(),
            RowVersion::Current => self.current(),
            RowVersion::Proposed => self.proposed(),
            RowVersion::Default => self.proposed().or_else(|| self.current()),
        };
        match found {
            Some(values) => Ok(values),
            None if deleted && version != RowVersion::Original => Err(Error::RowDeleted { row: id }),
            None => Err(Error::VersionNotFound { row: id, version }),
        }
    }

    /// Opens an edit; Proposed starts as a copy of Current.
    pub fn begin_edit(&mut self, id: RowId) -> Result<()> {
        if self.proposed.is_some() {
            return Err(Error::EditInProgress { row: id });
        }
        let current = self.current().ok_or(Error::RowDeleted { row: id })?.to_vec();
        self.proposed = Some(current);
        Ok(())
    }

    /// Mutable access to the Proposed buffer.
    pub fn proposed_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.proposed.as_mut()
    }

    /// Closes the edit and hands back the Proposed values.
    pub fn take_proposed(&mut self) -> Option<Vec<Value>> {
        self.proposed.take()
    }

    /// Discards the Proposed values.
    pub fn cancel_edit(&mut self) {
        self.proposed = None;
    }

    /// Makes `values` the new Current version.
    ///
    /// An unchanged row only becomes Modified if a value actually differs.
    pub fn commit(&mut self, id: RowId, values: Vec<Value>) -> Result<()> {
        let next = match core::mem::replace(&mut self.versions, RowVersions::Added(Vec::new())) {
            RowVersions::Added(_) => RowVersions::Added(values),
            RowVersions::Unchanged(current) if current == values => RowVersions::Unchanged(current),
            RowVersions::Unchanged(current) => RowVersions::Modified {
                original: current,
                current: values,
            },
            RowVersions::Modified { original, .. } => RowVersions::Modified {
                original,
                current: values,
            },
            deleted @ RowVersions::Deleted(_) => {
                self.versions = deleted;
                return Err(Error::RowDeleted { row: id });
            }
        };
        self.versions = next;
        Ok(())
    }

    /// Marks the row deleted. Returns `Settle::Remove` for an added row, which
    /// has no original to keep and must be removed physically.
    pub fn delete(&mut self, id: RowId) -> Result<Settle> {
        self.proposed = None;
        let next = match core::mem::replace(&mut self.versions, RowVersions::Added(Vec::new())) {
            RowVersions::Added(values) => {
                self.versions = RowVersions::Added(values);
                return Ok(Settle::Remove);
            }
            RowVersions::Unchanged(original) | RowVersions::Modified { original, .. } => {
                RowVersions::Deleted(original)
            }
            deleted @ RowVersions::Deleted(_) => {
                self.versions = deleted;
                return Err(Error::RowDeleted { row: id });
            }
        };
        self.versions = next;
        Ok(Settle::Keep)
    }

    /// Current becomes Original. Deleted rows must then be removed.
    pub fn accept(&mut self) -> Settle {
        if let Some(proposed) = self.proposed.take() {
            // An open edit is committed before accepting.
            if self.state() != RowState::Deleted {
                self.versions = match core::mem::replace(&mut self.versions, RowVersions::Added(Vec::new())) {
                    RowVersions::Unchanged(_) | RowVersions::Added(_) | RowVersions::Modified { .. } => {
                        RowVersions::Unchanged(proposed)
                    }
                    deleted => deleted,
                };
            }
        }
        match core::mem::replace(&mut self.versions, RowVersions::Added(Vec::new())) {
            RowVersions::Added(v) | RowVersions::Unchanged(v) => {
                self.versions = RowVersions::Unchanged(v);
                Settle::Keep
            }
            RowVersions::Modified { current, .. } => {
                self.versions = RowVersions::Unchanged(current);
                Settle::Keep
            }
            deleted @ RowVersions::Deleted(_) => {
                self.versions = deleted;
                Settle::Remove
            }
        }
    }

    /// Original becomes Current again. Added rows must then be removed.
    pub fn reject(&mut self) -> Settle {
        self.proposed = None;
        match core::mem::replace(&mut self.versions, RowVersions::Added(Vec::new())) {
            added @ RowVersions::Added(_) => {
                self.versions = added;
                Settle::Remove
            }
            RowVersions::Unchanged(original)
            | RowVersions::Modified { original, .. }
            | RowVersions::Deleted(original) => {
                self.versions = RowVersions::Unchanged(original);
                Settle::Keep
            }
        }
    }

    /// Forces the row into the Added state with its Current values.
    pub fn set_added(&mut self) -> Result<()> {
        match &self.versions {
            RowVersions::Unchanged(v) => {
                self.versions = RowVersions::Added(v.clone());
                Ok(())
            }
            _ => Err(Error::invalid_operation("set_added requires an unchanged row")),
        }
    }

    /// Forces the row into the Modified state with identical versions.
    pub fn set_modified(&mut self) -> Result<()> {
        match &self.versions {
            RowVersions::Unchanged(v) => {
                self.versions = RowVersions::Modified {
                    original: v.clone(),
                    current: v.clone(),
                };
                Ok(())
            }
            _ => Err(Error::invalid_operation("set_modified requires an unchanged row")),
        }
    }

    /// Returns the row error text, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Sets or clears the row error text.
    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error.filter(|e| !e.is_empty());
    }

    /// Applies `f` to every stored version, including an open edit.
    pub fn map_values(&mut self, mut f: impl FnMut(&mut Vec<Value>)) {
        match &mut self.versions {
            RowVersions::Added(v) | RowVersions::Unchanged(v) | RowVersions::Deleted(v) => f(v),
            RowVersions::Modified { original, current } => {
                f(original);
                f(current);
            }
        }
        if let Some(p) = self.proposed.as_mut() {
            f(p);
        }
    }
}

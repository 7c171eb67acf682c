//! Configuration for tables and data sets.
//!
//! Options are plain structs with `Default` and serde support, so hosts can
//! keep them in JSON or TOML next to the rest of their configuration.

use serde::{Deserialize, Serialize};

/// Per-table options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Compare strings (keys, filters, sorts, names) case sensitively.
    pub case_sensitive: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
        }
    }
}

impl TableOptions {
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

/// Data set options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSetOptions {
    /// Default case sensitivity for tables added to the set.
    pub case_sensitive: bool,
    /// Check unique and foreign key constraints on every commit.
    pub enforce_constraints: bool,
}

impl Default for DataSetOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            enforce_constraints: true,
        }
    }
}

impl DataSetOptions {
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn enforce_constraints(mut self, enforce: bool) -> Self {
        self.enforce_constraints = enforce;
        self
    }

    /// Table options inherited by tables created in this set.
    pub fn table_options(&self) -> TableOptions {
        TableOptions::default().case_sensitive(self.case_sensitive)
    }
}

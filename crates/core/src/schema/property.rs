//! Free-form extended properties attached to schema objects.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed string-keyed map carried by columns, tables, relations and data sets.
///
/// Entries are not validated and have no lifecycle beyond their owner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag {
    entries: BTreeMap<String, Value>,
}

impl PropertyBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Stores a value, returning the previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_bag() {
        let mut bag = PropertyBag::new();
        assert!(bag.set("owner", "ops").is_none());
        assert_eq!(bag.set("owner", "dev"), Some(Value::from("ops")));
        bag.set("version", 3);
        assert_eq!(bag.len(), 2);
        let keys: Vec<&str> = bag.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["owner", "version"]);
        assert_eq!(bag.remove("owner"), Some(Value::from("dev")));
        assert_eq!(bag.get("version"), Some(&Value::Int32(3)));
    }

    #[test]
    fn test_property_bag_json() {
        let mut bag = PropertyBag::new();
        bag.set("flag", true);
        let json = serde_json::to_string(&bag).unwrap();
        assert_eq!(json, r#"{"flag":{"Boolean":true}}"#);
    }
}

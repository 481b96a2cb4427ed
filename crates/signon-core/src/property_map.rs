//! The property-map representation shared between the daemon, plugins and
//! the UI dialog (spec.md §4.11, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A loosely-typed map of named properties, the wire representation used
/// for plugin parameters, UI dialog payloads, `queryIdentities` filters and
/// `IdentityInfo::to_map`/`from_map`.
///
/// `BTreeMap` keeps iteration order deterministic, which matters for
/// reproducible logging and tests; insertion order is explicitly *not*
/// semantically meaningful (spec.md §3: "mapping ... insertion order
/// irrelevant").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, Value>);

impl PropertyMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a serialisable value under `key`, returning `self` for
    /// chaining (builder style, matching the teacher's `with_*` idiom).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a key, returning its previous value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get a raw JSON value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Get a bool field.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Merge `other` into `self`, with `other`'s entries taking precedence
    /// on key collision. This is the dispatch-time composition rule from
    /// spec.md §4.5 step 1: "merge [the persisted blob] into the incoming
    /// params" reads as `incoming.merged_over(persisted)`.
    #[must_use]
    pub fn merged_over(mut self, base: &PropertyMap) -> Self {
        for (k, v) in &base.0 {
            self.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether `self` satisfies `filter` under conjunctive equality
    /// matching (spec.md §4.2 `list(filter)`): every key present in
    /// `filter` must be present in `self` with an equal value. An empty
    /// filter matches everything (spec.md §9's ruling on the dead
    /// `IdentityRegExp` filter).
    #[must_use]
    pub fn matches_filter(&self, filter: &PropertyMap) -> bool {
        filter.0.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }
}

impl FromIterator<(String, Value)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertyMap {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

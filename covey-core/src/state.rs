//! Shared state store passed across all turns of a run
//!
//! Every run owns exactly one `SharedState`. Agents mutate it only through
//! tool calls, one turn at a time, so no locking is required. A key written
//! on any turn is visible to every subsequent turn of the same run.

use serde_json::Value;
use std::collections::BTreeMap;

/// The single mutable key-value record shared by all agents in a run.
///
/// Keys are open strings, values are arbitrary JSON. Absence of a key is a
/// recoverable condition: consumers read through [`SharedState::get_str`]
/// and receive an empty default rather than an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedState {
    entries: BTreeMap<String, Value>,
}

impl SharedState {
    /// Create an empty state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state store seeded with initial key/value pairs
    pub fn with_initial<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a string value by key, defaulting to the empty string
    ///
    /// Absent keys and non-string values both degrade to `""`.
    pub fn get_str(&self, key: &str) -> String {
        self.entries
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Set a value, overwriting any previous value for the key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Whether the store holds a value for the key
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over the stored keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the store, returning the underlying map
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_state_is_empty() {
        let state = SharedState::new();
        assert!(state.is_empty());
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn test_with_initial_keys() {
        let state = SharedState::with_initial([("gathered_context", ""), ("draft_comment", "")]);
        assert_eq!(state.len(), 2);
        assert!(state.contains("gathered_context"));
        assert!(state.contains("draft_comment"));
        assert!(!state.contains("final_review_comment"));
    }

    #[test]
    fn test_set_then_get() {
        let mut state = SharedState::new();
        state.set("draft_comment", "looks good");
        assert_eq!(state.get("draft_comment"), Some(&json!("looks good")));
        assert_eq!(state.get_str("draft_comment"), "looks good");
    }

    #[test]
    fn test_absent_key_degrades_to_empty() {
        let state = SharedState::new();
        assert!(state.get("missing").is_none());
        assert_eq!(state.get_str("missing"), "");
    }

    #[test]
    fn test_non_string_value_degrades_to_empty() {
        let mut state = SharedState::new();
        state.set("count", 3);
        assert_eq!(state.get_str("count"), "");
    }

    #[test]
    fn test_set_overwrites() {
        let mut state = SharedState::new();
        state.set("key", "first");
        state.set("key", "second");
        assert_eq!(state.get_str("key"), "second");
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_nested_values() {
        let mut state = SharedState::new();
        state.set("pr", json!({"author": "octocat", "commit_shas": ["abc"]}));
        let pr = state.get("pr").unwrap();
        assert_eq!(pr["author"], "octocat");
    }

    #[test]
    fn test_into_inner() {
        let mut state = SharedState::new();
        state.set("a", 1);
        let inner = state.into_inner();
        assert_eq!(inner.get("a"), Some(&json!(1)));
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label (or annotation) map attached to every stored object.
///
/// Backed by a [`BTreeMap`] so iteration, serialization and equality are stable.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(pub BTreeMap<String, String>);

impl Labels {
    /// Create an empty set of labels.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns `true` if no labels are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Insert or overwrite a label.
    ///
    /// Returns `self` for chaining.
    pub fn insert<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), val.into());
        self
    }

    /// Builder-style insert.
    pub fn with<K, V>(mut self, key: K, val: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), val.into());
        self
    }

    /// Remove a label, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Get the value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Returns `true` if the key is present (any value).
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns `true` if `key` is present with exactly `value`.
    pub fn has(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    /// Interpret a label as a boolean flag (`"true"` / `"false"`).
    ///
    /// Missing or malformed values read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(v) if v.eq_ignore_ascii_case("true"))
    }

    /// Iterate through all labels as `(&str, &str)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Labels;

    #[test]
    fn insert_overwrites_and_get_returns_last_value() {
        let mut labels = Labels::new();
        labels.insert("environment", "env-a");
        labels.insert("environment", "env-b");

        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("environment"), Some("env-b"));
        assert!(labels.has("environment", "env-b"));
        assert!(!labels.has("environment", "env-a"));
    }

    #[test]
    fn flag_reads_true_case_insensitively() {
        let labels: Labels = [("bound", "TRUE"), ("ready", "false"), ("dynamic", "yes")]
            .into_iter()
            .collect();

        assert!(labels.flag("bound"));
        assert!(!labels.flag("ready"));
        assert!(!labels.flag("dynamic"));
        assert!(!labels.flag("missing"));
    }

    #[test]
    fn serde_is_a_plain_json_object() {
        let labels = Labels::new().with("scheduledevent", "se-1");
        let json = serde_json::to_string(&labels).unwrap();
        assert_eq!(json, r#"{"scheduledevent":"se-1"}"#);

        let back: Labels = serde_json::from_str(&json).unwrap();
        assert_eq!(back, labels);
    }
}

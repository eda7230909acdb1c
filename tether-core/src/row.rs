//! Raw associative records.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A raw associative record, as returned by a webservice backend.
///
/// Field order is preserved: a backend that returns `id, title, body`
/// produces a row that iterates in that order, and deep-merging keeps the
/// original positions of existing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, Value>);

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field value, returning the previous value if any.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field, preserving the order of the remaining fields.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    /// Check whether a field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Extract a sub-row containing only the named fields (those present).
    pub fn extract(&self, fields: &[String]) -> Row {
        let mut out = Row::new();
        for field in fields {
            if let Some(value) = self.0.get(field) {
                out.insert(field.clone(), value.clone());
            }
        }
        out
    }

    /// Deep-merge `other` into this row.
    ///
    /// Maps merge recursively, lists concatenate, and anything else is
    /// replaced by the incoming value. This is the merge rule used by
    /// non-overwriting clause setters.
    pub fn deep_merge(&mut self, other: Row) {
        for (field, incoming) in other.0 {
            match (self.0.get_mut(&field), incoming) {
                (Some(Value::Map(existing)), Value::Map(new)) => existing.deep_merge(new),
                (Some(Value::List(existing)), Value::List(mut new)) => existing.append(&mut new),
                (_, incoming) => {
                    self.0.insert(field, incoming);
                }
            }
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Row {
    fn from(fields: [(&str, Value); N]) -> Self {
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(fields: &[(&str, Value)]) -> Row {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut r = Row::new();
        r.insert("b", 1i64);
        r.insert("a", 2i64);
        let keys: Vec<_> = r.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_deep_merge_scalars_replace() {
        let mut base = row(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        base.deep_merge(row(&[("b", Value::Int(9)), ("c", Value::Int(3))]));
        assert_eq!(base.get("a"), Some(&Value::Int(1)));
        assert_eq!(base.get("b"), Some(&Value::Int(9)));
        assert_eq!(base.get("c"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_deep_merge_lists_concatenate() {
        let mut base = row(&[("tags", Value::from(vec!["a", "b"]))]);
        base.deep_merge(row(&[("tags", Value::from(vec!["c"]))]));
        assert_eq!(base.get("tags"), Some(&Value::from(vec!["a", "b", "c"])));
    }

    #[test]
    fn test_deep_merge_maps_recurse() {
        let inner_a = row(&[("x", Value::Int(1)), ("y", Value::Int(2))]);
        let inner_b = row(&[("y", Value::Int(9))]);
        let mut base = row(&[("nested", Value::Map(inner_a))]);
        base.deep_merge(row(&[("nested", Value::Map(inner_b))]));

        let nested = base.get("nested").and_then(Value::as_map).unwrap();
        assert_eq!(nested.get("x"), Some(&Value::Int(1)));
        assert_eq!(nested.get("y"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_extract() {
        let r = row(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        let sub = r.extract(&["b".to_string(), "missing".to_string()]);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.get("b"), Some(&Value::Int(2)));
    }
}

//! Filter conditions for the `where` clause.
//!
//! Conditions are an ordered tree: leaves map a field expression (for
//! example `"title"` or `"views >="`) to a scalar or list value, and the
//! reserved keys `AND`/`OR` introduce boolean-grouped subtrees. The tree
//! is handed to the webservice backend verbatim; this layer never parses
//! field expressions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tether_core::Value;

/// Key introducing an AND-grouped subtree.
pub const AND: &str = "AND";
/// Key introducing an OR-grouped subtree.
pub const OR: &str = "OR";

/// One node of a condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    /// A field expression compared against a scalar or list value.
    Value(Value),
    /// A boolean-grouped subtree, keyed by `AND` or `OR`.
    Group(Conditions),
}

/// An ordered set of filter conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(IndexMap<String, ConditionNode>);

impl Conditions {
    /// Create an empty condition set (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// A single equality-style condition.
    ///
    /// ```rust
    /// use tether_query::Conditions;
    ///
    /// let conditions = Conditions::eq("published", true);
    /// assert!(!conditions.is_empty());
    /// ```
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut c = Self::new();
        c.set(field, value.into());
        c
    }

    /// A field matched against a list of candidate values.
    pub fn in_list(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::eq(field, Value::List(list))
    }

    /// Wrap a condition set in an AND group.
    pub fn and(group: Conditions) -> Self {
        let mut c = Self::new();
        c.0.insert(AND.to_string(), ConditionNode::Group(group));
        c
    }

    /// Wrap a condition set in an OR group.
    pub fn or(group: Conditions) -> Self {
        let mut c = Self::new();
        c.0.insert(OR.to_string(), ConditionNode::Group(group));
        c
    }

    /// Set a leaf condition.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), ConditionNode::Value(value));
    }

    /// Get a condition node.
    pub fn get(&self, field: &str) -> Option<&ConditionNode> {
        self.0.get(field)
    }

    /// Get a leaf condition value.
    pub fn value(&self, field: &str) -> Option<&Value> {
        match self.0.get(field) {
            Some(ConditionNode::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Check whether no conditions are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of top-level conditions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over top-level conditions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConditionNode)> {
        self.0.iter()
    }

    /// Deep-merge `other` into this condition set.
    ///
    /// Groups merge recursively, list leaves concatenate, and scalar
    /// leaves are replaced by the incoming value, the same rule as
    /// [`tether_core::Row::deep_merge`].
    pub fn merge(&mut self, other: Conditions) {
        for (field, incoming) in other.0 {
            match (self.0.get_mut(&field), incoming) {
                (Some(ConditionNode::Group(existing)), ConditionNode::Group(new)) => {
                    existing.merge(new);
                }
                (
                    Some(ConditionNode::Value(Value::List(existing))),
                    ConditionNode::Value(Value::List(mut new)),
                ) => {
                    existing.append(&mut new);
                }
                (_, incoming) => {
                    self.0.insert(field, incoming);
                }
            }
        }
    }
}

impl FromIterator<(String, Value)> for Conditions {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k, ConditionNode::Value(v)))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Conditions {
    fn from(items: [(&str, Value); N]) -> Self {
        items
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

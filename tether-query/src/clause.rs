//! The clause model shared by every query.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tether_core::Row;

use crate::conditions::Conditions;

/// The action a query performs when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create new record(s).
    Create,
    /// Fetch records. The default.
    #[default]
    Read,
    /// Update existing record(s).
    Update,
    /// Delete record(s).
    Delete,
}

impl Action {
    /// Check whether this action may carry a `set` clause.
    pub fn allows_set(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// Sort order for an `order` clause entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

/// The ordered collection of clauses a query carries.
///
/// Clauses not set hold an empty/neutral value; reading them never
/// panics. The `set` clause is only meaningful for create/update actions,
/// enforced by [`crate::Query::set`] rather than here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClauseSet {
    /// The query action.
    pub action: Action,
    /// Filter conditions.
    pub where_: Conditions,
    /// Ordered map from field to sort direction.
    pub order: IndexMap<String, SortOrder>,
    /// Field expressions to select.
    pub select: Vec<String>,
    /// Field values for create/update actions.
    pub set: Row,
    /// Maximum number of records to fetch.
    pub limit: Option<u64>,
    /// Number of records to skip.
    pub offset: Option<u64>,
    /// 1-indexed page number.
    pub page: Option<u64>,
}

impl ClauseSet {
    /// Create an empty clause set (read action, no filters).
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge or replace the `where` clause.
    pub fn apply_where(&mut self, conditions: Conditions, overwrite: bool) {
        if overwrite {
            self.where_ = conditions;
        } else {
            self.where_.merge(conditions);
        }
    }

    /// Merge or replace the `order` clause. Merging re-positions a field
    /// that is ordered again, keeping the most recent direction.
    pub fn apply_order(
        &mut self,
        order: impl IntoIterator<Item = (String, SortOrder)>,
        overwrite: bool,
    ) {
        if overwrite {
            self.order = order.into_iter().collect();
        } else {
            for (field, dir) in order {
                self.order.insert(field, dir);
            }
        }
    }

    /// Merge (concatenate, deduplicated) or replace the `select` clause.
    pub fn apply_select(
        &mut self,
        fields: impl IntoIterator<Item = String>,
        overwrite: bool,
    ) {
        if overwrite {
            self.select = fields.into_iter().collect();
        } else {
            for field in fields {
                if !self.select.contains(&field) {
                    self.select.push(field);
                }
            }
        }
    }

    /// Merge or replace the `set` clause.
    pub fn apply_set(&mut self, fields: Row, overwrite: bool) {
        if overwrite {
            self.set = fields;
        } else {
            self.set.deep_merge(fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tether_core::Value;

    #[test]
    fn test_defaults_are_neutral() {
        let clauses = ClauseSet::new();
        assert_eq!(clauses.action, Action::Read);
        assert!(clauses.where_.is_empty());
        assert!(clauses.order.is_empty());
        assert!(clauses.select.is_empty());
        assert!(clauses.set.is_empty());
        assert_eq!(clauses.limit, None);
        assert_eq!(clauses.page, None);
    }

    #[test]
    fn test_action_allows_set() {
        assert!(Action::Create.allows_set());
        assert!(Action::Update.allows_set());
        assert!(!Action::Read.allows_set());
        assert!(!Action::Delete.allows_set());
    }

    #[test]
    fn test_apply_where_merges_then_overwrites() {
        let mut clauses = ClauseSet::new();
        clauses.apply_where(Conditions::eq("a", 1i64), false);
        clauses.apply_where(Conditions::eq("b", 2i64), false);
        assert_eq!(clauses.where_.len(), 2);

        clauses.apply_where(Conditions::eq("c", 3i64), true);
        assert_eq!(clauses.where_.len(), 1);
        assert_eq!(clauses.where_.value("c"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_apply_order_merge_keeps_latest_direction() {
        let mut clauses = ClauseSet::new();
        clauses.apply_order([("created".to_string(), SortOrder::Asc)], false);
        clauses.apply_order([("created".to_string(), SortOrder::Desc)], false);
        assert_eq!(clauses.order.get("created"), Some(&SortOrder::Desc));
        assert_eq!(clauses.order.len(), 1);
    }

    #[test]
    fn test_apply_select_deduplicates() {
        let mut clauses = ClauseSet::new();
        clauses.apply_select(["id".to_string(), "title".to_string()], false);
        clauses.apply_select(["title".to_string(), "body".to_string()], false);
        assert_eq!(clauses.select, vec!["id", "title", "body"]);
    }
}

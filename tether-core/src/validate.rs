//! Validation over raw rows, run during marshalling.

use indexmap::IndexMap;

use crate::row::Row;
use crate::value::Value;

/// Per-field validation errors: field name to a list of error codes.
pub type ValidationErrors = IndexMap<String, Vec<String>>;

/// Validates a raw row before its fields are copied onto an entity.
///
/// Validation never aborts marshalling; failing fields are excluded from
/// the entity and recorded on its error map instead.
pub trait Validator: Send + Sync {
    /// Validate a row. `is_new` is true when the row is being marshalled
    /// into a fresh entity rather than merged into an existing one.
    fn validate(&self, row: &Row, is_new: bool) -> ValidationErrors;
}

/// A single field rule: returns an error code when the value is rejected.
pub type Rule = Box<dyn Fn(Option<&Value>, bool) -> Option<String> + Send + Sync>;

/// A named set of per-field rules.
///
/// This is the batteries-included [`Validator`] used by endpoint
/// implementations and tests; anything implementing the trait works.
#[derive(Default)]
pub struct RuleSet {
    rules: IndexMap<String, Vec<Rule>>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for a field.
    pub fn add<F>(mut self, field: impl Into<String>, rule: F) -> Self
    where
        F: Fn(Option<&Value>, bool) -> Option<String> + Send + Sync + 'static,
    {
        self.rules
            .entry(field.into())
            .or_default()
            .push(Box::new(rule));
        self
    }

    /// Require a field to be present and non-null on new rows.
    pub fn require_present(self, field: impl Into<String>) -> Self {
        self.add(field, |value, is_new| match value {
            Some(v) if !v.is_null() => None,
            _ if is_new => Some("required".to_string()),
            _ => None,
        })
    }

    /// Require a field, when present, to be a non-empty string.
    pub fn not_empty(self, field: impl Into<String>) -> Self {
        self.add(field, |value, _| match value {
            Some(v) if v.is_empty_string() => Some("empty".to_string()),
            _ => None,
        })
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("fields", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Validator for RuleSet {
    fn validate(&self, row: &Row, is_new: bool) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for (field, rules) in &self.rules {
            let value = row.get(field);
            let failed: Vec<String> = rules
                .iter()
                .filter_map(|rule| rule(value, is_new))
                .collect();
            if !failed.is_empty() {
                errors.insert(field.clone(), failed);
            }
        }
        errors
    }
}

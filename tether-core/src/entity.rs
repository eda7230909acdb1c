//! The entity value object produced by marshalling.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::row::Row;
use crate::value::Value;

/// A hydrated domain record: a property bag with dirty tracking.
///
/// Entities do not know which endpoint they came from; the marshaller and
/// the endpoint facade own that context. Validation failures recorded
/// during marshalling live in the per-field error map, and the raw values
/// that failed validation are kept aside in the invalid-field map so they
/// can be inspected (for example, to re-render a form).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    fields: Row,
    dirty: IndexSet<String>,
    new: bool,
    errors: IndexMap<String, Vec<String>>,
    invalid: Row,
}

impl Entity {
    /// Create an empty, new entity.
    pub fn new() -> Self {
        Self {
            new: true,
            ..Self::default()
        }
    }

    /// Create an entity from an existing row, marked as persisted and clean.
    pub fn from_row(row: Row) -> Self {
        Self {
            fields: row,
            new: false,
            ..Self::default()
        }
    }

    /// Get a property value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a property value, marking the field dirty.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        self.fields.insert(field.clone(), value);
        self.dirty.insert(field);
    }

    /// Remove a property, marking the field dirty.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        let removed = self.fields.remove(field);
        if removed.is_some() {
            self.dirty.insert(field.to_string());
        }
        removed
    }

    /// Check whether a property is present.
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Extract the named properties (those present) as a row.
    pub fn extract(&self, fields: &[String]) -> Row {
        self.fields.extract(fields)
    }

    /// All properties as a row.
    pub fn fields(&self) -> &Row {
        &self.fields
    }

    /// Check whether this entity has never been persisted.
    pub fn is_new(&self) -> bool {
        self.new
    }

    /// Mark the entity as new or persisted.
    pub fn set_new(&mut self, new: bool) {
        self.new = new;
    }

    /// Check whether any field changed since the entity was last clean.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Check whether a specific field changed.
    pub fn is_field_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    /// Names of the dirty fields, in the order they were touched.
    pub fn dirty_fields(&self) -> impl Iterator<Item = &String> {
        self.dirty.iter()
    }

    /// Clear dirty state, typically after a successful save.
    pub fn clean(&mut self) {
        self.dirty.clear();
    }

    /// Per-field validation errors.
    pub fn errors(&self) -> &IndexMap<String, Vec<String>> {
        &self.errors
    }

    /// Record validation errors for a field.
    pub fn set_error(&mut self, field: impl Into<String>, messages: Vec<String>) {
        self.errors.insert(field.into(), messages);
    }

    /// Replace the whole error map.
    pub fn set_errors(&mut self, errors: IndexMap<String, Vec<String>>) {
        self.errors = errors;
    }

    /// Check whether any validation errors are recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Raw values that were rejected by validation.
    pub fn invalid(&self) -> &Row {
        &self.invalid
    }

    /// Record a raw value rejected by validation.
    pub fn set_invalid(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.invalid.insert(field, value);
    }
}

impl From<Row> for Entity {
    fn from(row: Row) -> Self {
        Self::from_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_marks_dirty() {
        let mut e = Entity::new();
        assert!(!e.is_dirty());
        e.set("title", "T");
        assert!(e.is_dirty());
        assert!(e.is_field_dirty("title"));
        assert!(!e.is_field_dirty("body"));
    }

    #[test]
    fn test_from_row_is_clean_and_persisted() {
        let mut row = Row::new();
        row.insert("id", 1i64);
        let e = Entity::from_row(row);
        assert!(!e.is_new());
        assert!(!e.is_dirty());
        assert_eq!(e.get("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_clean_resets_dirty() {
        let mut e = Entity::new();
        e.set("a", 1i64);
        e.clean();
        assert!(!e.is_dirty());
    }

    #[test]
    fn test_errors_and_invalid() {
        let mut e = Entity::new();
        e.set_error("email", vec!["format".to_string()]);
        e.set_invalid("email", "not-an-email");
        assert!(e.has_errors());
        assert_eq!(e.errors().get("email").map(Vec::len), Some(1));
        assert_eq!(
            e.invalid().get("email"),
            Some(&Value::String("not-an-email".into()))
        );
        assert!(e.get("email").is_none());
    }
}

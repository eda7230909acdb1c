//! Turning raw request payloads into entities.
//!
//! The marshaller validates incoming field maps through the endpoint's
//! validators, records rejected values on the entity instead of
//! applying them, and can merge payload batches onto existing entities
//! by primary key.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use tether_core::{Entity, Row, Validator, Value};

use crate::error::{QueryError, QueryResult};
use crate::traits::Endpoint;

/// Delimiter joining primary key fragments into a grouping key.
const KEY_DELIMITER: &str = ";";

/// Which validator a marshalling pass runs.
#[derive(Clone)]
pub enum Validate {
    /// The endpoint's default validator when `true`, none when `false`.
    Bool(bool),
    /// A named validator registered on the endpoint.
    Named(String),
    /// A caller-supplied validator.
    Custom(Arc<dyn Validator>),
}

impl Default for Validate {
    fn default() -> Self {
        Self::Bool(true)
    }
}

impl std::fmt::Debug for Validate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for a marshalling pass.
#[derive(Debug, Clone, Default)]
pub struct MarshalOptions {
    /// Validator selection.
    pub validate: Validate,
    /// Allow-list of fields applied after validation; fields outside the
    /// list are silently not set.
    pub field_list: Option<Vec<String>>,
}

impl MarshalOptions {
    /// Options that skip validation entirely.
    pub fn unvalidated() -> Self {
        Self {
            validate: Validate::Bool(false),
            field_list: None,
        }
    }

    /// Options with a field allow-list.
    pub fn fields(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            validate: Validate::default(),
            field_list: Some(fields.into_iter().map(Into::into).collect()),
        }
    }
}

/// Builds entities out of raw payload maps for one endpoint.
pub struct Marshaller {
    endpoint: Arc<dyn Endpoint>,
}

impl Marshaller {
    /// A marshaller bound to an endpoint.
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self { endpoint }
    }

    /// Build a new entity from one raw payload.
    ///
    /// Fields rejected by validation land in the entity's invalid bag,
    /// not in its fields. A primary key submitted as a blank string is
    /// dropped outright so a fresh record never carries a fake key.
    pub fn one(&self, raw: &Value, options: &MarshalOptions) -> QueryResult<Entity> {
        let data = self.unwrap_alias(raw);
        let mut entity = Entity::new();
        self.apply(&mut entity, &data, true, options)?;
        Ok(entity)
    }

    /// Build entities from a batch of raw payloads, skipping entries
    /// that are not maps.
    pub fn many(&self, raws: &[Value], options: &MarshalOptions) -> QueryResult<Vec<Entity>> {
        let mut out = Vec::with_capacity(raws.len());
        for raw in raws {
            if raw.as_map().is_none() {
                continue;
            }
            out.push(self.one(raw, options)?);
        }
        Ok(out)
    }

    /// Merge one raw payload onto an existing entity.
    ///
    /// Validation sees the incoming fields plus the entity's current
    /// primary key values, and runs in update mode.
    pub fn merge(
        &self,
        entity: &mut Entity,
        raw: &Value,
        options: &MarshalOptions,
    ) -> QueryResult<()> {
        let mut data = self.unwrap_alias(raw);
        for pk in self.endpoint.primary_key() {
            if !data.contains(&pk) {
                if let Some(value) = entity.get(&pk).cloned() {
                    data.insert(pk, value);
                }
            }
        }
        self.apply(entity, &data, false, options)
    }

    /// Merge a batch of raw payloads onto a batch of existing entities,
    /// matched by primary key.
    ///
    /// Entities with no matching payload are dropped. Payloads with no
    /// matching entity, and payloads with an incomplete primary key,
    /// become fresh entities appended after the merged ones. Payloads
    /// sharing a key merge onto the same entity in payload order.
    pub fn merge_many(
        &self,
        entities: Vec<Entity>,
        raws: &[Value],
        options: &MarshalOptions,
    ) -> QueryResult<Vec<Entity>> {
        let primary_key = self.endpoint.primary_key();

        let mut keyed: IndexMap<String, Vec<Row>> = IndexMap::new();
        let mut keyless: Vec<Row> = Vec::new();
        for raw in raws {
            if raw.as_map().is_none() {
                continue;
            }
            let data = self.unwrap_alias(raw);
            match grouping_key(&data, &primary_key) {
                Some(key) => keyed.entry(key).or_default().push(data),
                None => keyless.push(data),
            }
        }

        let mut out = Vec::with_capacity(entities.len() + keyless.len());
        for mut entity in entities {
            let Some(key) = entity_key(&entity, &primary_key) else {
                continue;
            };
            let Some(group) = keyed.shift_remove(&key) else {
                continue;
            };
            for data in group {
                self.apply(&mut entity, &data, false, options)?;
            }
            out.push(entity);
        }

        for (_, group) in keyed {
            for data in group {
                out.push(self.one(&Value::Map(data), options)?);
            }
        }
        for data in keyless {
            out.push(self.one(&Value::Map(data), options)?);
        }
        Ok(out)
    }

    /// Payloads may arrive nested under the endpoint alias; unwrap that
    /// envelope when present.
    fn unwrap_alias(&self, raw: &Value) -> Row {
        let Some(map) = raw.as_map() else {
            return Row::new();
        };
        if let Some(inner) = map.get(self.endpoint.alias()).and_then(Value::as_map) {
            return inner.clone();
        }
        map.clone()
    }

    fn resolve_validator(&self, validate: &Validate) -> QueryResult<Option<Arc<dyn Validator>>> {
        match validate {
            Validate::Bool(false) => Ok(None),
            Validate::Bool(true) => Ok(self.endpoint.validator("default")),
            Validate::Named(name) => match self.endpoint.validator(name) {
                Some(validator) => Ok(Some(validator)),
                None => Err(QueryError::configuration(format!(
                    "endpoint `{}` has no validator named `{}`",
                    self.endpoint.alias(),
                    name
                ))),
            },
            Validate::Custom(validator) => Ok(Some(Arc::clone(validator))),
        }
    }

    fn apply(
        &self,
        entity: &mut Entity,
        data: &Row,
        is_new: bool,
        options: &MarshalOptions,
    ) -> QueryResult<()> {
        let errors = match self.resolve_validator(&options.validate)? {
            Some(validator) => validator.validate(data, is_new),
            None => IndexMap::new(),
        };
        if !errors.is_empty() {
            debug!(
                endpoint = self.endpoint.alias(),
                fields = errors.len(),
                "validation rejected fields"
            );
        }

        let primary_key = self.endpoint.primary_key();
        for (field, value) in data.iter() {
            if is_new
                && primary_key.contains(field)
                && value.is_empty_string()
            {
                continue;
            }
            if errors.contains_key(field) {
                entity.set_invalid(field.clone(), value.clone());
                continue;
            }
            if let Some(allowed) = &options.field_list {
                if !allowed.contains(field) {
                    continue;
                }
            }
            // an unchanged value is not a change; leave the field clean
            if entity.get(field) == Some(value) {
                continue;
            }
            entity.set(field.clone(), value.clone());
        }
        entity.set_errors(errors);
        Ok(())
    }
}

impl std::fmt::Debug for Marshaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marshaller")
            .field("endpoint", &self.endpoint.alias())
            .finish()
    }
}

/// A payload groups by primary key only when every key field is present,
/// non-null, and not a blank string.
fn grouping_key(data: &Row, primary_key: &[String]) -> Option<String> {
    let mut parts = Vec::with_capacity(primary_key.len());
    for field in primary_key {
        match data.get(field) {
            Some(value) if !value.is_null() && !value.is_empty_string() => {
                parts.push(value.key_fragment())
            }
            _ => return None,
        }
    }
    Some(parts.join(KEY_DELIMITER))
}

fn entity_key(entity: &Entity, primary_key: &[String]) -> Option<String> {
    grouping_key(entity.fields(), primary_key)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tether_core::RuleSet;

    use crate::mock::{rows_result, MockEndpoint, MockWebservice};

    use super::*;

    fn endpoint() -> Arc<dyn Endpoint> {
        MockEndpoint::new("Articles", MockWebservice::returning(rows_result(vec![]))).arc()
    }

    fn validated_endpoint() -> Arc<dyn Endpoint> {
        let rules = RuleSet::new().not_empty("title");
        MockEndpoint::new("Articles", MockWebservice::returning(rows_result(vec![])))
            .with_validator(Arc::new(rules))
            .arc()
    }

    fn payload(fields: &[(&str, Value)]) -> Value {
        Value::Map(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_one_builds_new_entity() {
        let marshaller = Marshaller::new(endpoint());
        let entity = marshaller
            .one(
                &payload(&[("title", Value::from("First")), ("body", Value::from("text"))]),
                &MarshalOptions::default(),
            )
            .unwrap();
        assert!(entity.is_new());
        assert_eq!(entity.get("title"), Some(&Value::from("First")));
        assert!(entity.is_field_dirty("title"));
        assert!(!entity.has_errors());
    }

    #[test]
    fn test_one_unwraps_alias_envelope() {
        let marshaller = Marshaller::new(endpoint());
        let entity = marshaller
            .one(
                &payload(&[(
                    "Articles",
                    Value::Map(Row::from([("title", Value::from("Nested"))])),
                )]),
                &MarshalOptions::default(),
            )
            .unwrap();
        assert_eq!(entity.get("title"), Some(&Value::from("Nested")));
    }

    #[test]
    fn test_invalid_fields_are_recorded_not_applied() {
        let marshaller = Marshaller::new(validated_endpoint());
        let entity = marshaller
            .one(
                &payload(&[("title", Value::from("")), ("body", Value::from("text"))]),
                &MarshalOptions::default(),
            )
            .unwrap();
        assert_eq!(entity.get("title"), None);
        assert_eq!(entity.invalid().get("title"), Some(&Value::from("")));
        assert!(entity.has_errors());
        assert_eq!(entity.get("body"), Some(&Value::from("text")));
    }

    #[test]
    fn test_blank_primary_key_string_is_dropped() {
        let marshaller = Marshaller::new(endpoint());
        let entity = marshaller
            .one(
                &payload(&[("id", Value::from("")), ("title", Value::from("T"))]),
                &MarshalOptions::default(),
            )
            .unwrap();
        assert_eq!(entity.get("id"), None);
        assert!(entity.invalid().is_empty());
    }

    #[test]
    fn test_field_list_limits_applied_fields() {
        let marshaller = Marshaller::new(endpoint());
        let entity = marshaller
            .one(
                &payload(&[("title", Value::from("T")), ("body", Value::from("B"))]),
                &MarshalOptions::fields(["title"]),
            )
            .unwrap();
        assert_eq!(entity.get("title"), Some(&Value::from("T")));
        assert_eq!(entity.get("body"), None);
    }

    #[test]
    fn test_named_validator_missing_is_configuration_error() {
        let marshaller = Marshaller::new(endpoint());
        let err = marshaller
            .one(
                &payload(&[("title", Value::from("T"))]),
                &MarshalOptions {
                    validate: Validate::Named("publish".into()),
                    field_list: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
    }

    #[test]
    fn test_many_skips_non_maps() {
        let marshaller = Marshaller::new(endpoint());
        let entities = marshaller
            .many(
                &[
                    payload(&[("title", Value::from("a"))]),
                    Value::from("noise"),
                    payload(&[("title", Value::from("b"))]),
                ],
                &MarshalOptions::default(),
            )
            .unwrap();
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn test_merge_keeps_identity_and_marks_dirty() {
        let marshaller = Marshaller::new(endpoint());
        let mut entity = Entity::from_row(Row::from([
            ("id", Value::Int(1)),
            ("title", Value::from("Old")),
        ]));
        marshaller
            .merge(
                &mut entity,
                &payload(&[("title", Value::from("New"))]),
                &MarshalOptions::default(),
            )
            .unwrap();
        assert!(!entity.is_new());
        assert_eq!(entity.get("title"), Some(&Value::from("New")));
        assert!(entity.is_field_dirty("title"));
        assert!(!entity.is_field_dirty("id"));
    }

    #[test]
    fn test_merge_many_matches_by_key_and_appends_new() {
        let marshaller = Marshaller::new(endpoint());
        let entities = vec![
            Entity::from_row(Row::from([("id", Value::Int(1)), ("title", Value::from("a"))])),
            Entity::from_row(Row::from([("id", Value::Int(2)), ("title", Value::from("b"))])),
            Entity::from_row(Row::from([("id", Value::Int(3)), ("title", Value::from("c"))])),
        ];
        let raws = vec![
            payload(&[("id", Value::Int(1)), ("title", Value::from("a2"))]),
            payload(&[("id", Value::Int(2)), ("title", Value::from("b2"))]),
            payload(&[("title", Value::from("fresh"))]),
        ];

        let merged = marshaller
            .merge_many(entities, &raws, &MarshalOptions::default())
            .unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(merged[0].get("title"), Some(&Value::from("a2")));
        assert!(!merged[0].is_new());
        assert_eq!(merged[1].get("title"), Some(&Value::from("b2")));
        // entity 3 had no payload and is gone; the keyless payload is new
        assert_eq!(merged[2].get("title"), Some(&Value::from("fresh")));
        assert!(merged[2].is_new());
    }

    #[test]
    fn test_merge_many_duplicate_keys_merge_in_order() {
        let marshaller = Marshaller::new(endpoint());
        let entities = vec![Entity::from_row(Row::from([("id", Value::Int(1))]))];
        let raws = vec![
            payload(&[("id", Value::Int(1)), ("title", Value::from("first"))]),
            payload(&[("id", Value::Int(1)), ("title", Value::from("second"))]),
        ];
        let merged = marshaller
            .merge_many(entities, &raws, &MarshalOptions::default())
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get("title"), Some(&Value::from("second")));
    }

    #[test]
    fn test_merge_many_unmatched_payload_becomes_new_entity() {
        let marshaller = Marshaller::new(endpoint());
        let raws = vec![payload(&[("id", Value::Int(9)), ("title", Value::from("x"))])];
        let merged = marshaller
            .merge_many(Vec::new(), &raws, &MarshalOptions::default())
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get("id"), Some(&Value::Int(9)));
        assert!(merged[0].is_new());
    }
}

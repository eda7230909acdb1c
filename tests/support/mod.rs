//! Shared fixtures: an in-memory webservice serving canned rows per
//! endpoint alias, and a configurable endpoint built on the public
//! traits.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use tether_orm::prelude::*;
use tether_query::{AssociationMap, ExecuteResult};

/// Serves canned rows keyed by endpoint alias and records every call.
pub struct FixtureWebservice {
    fixtures: Mutex<IndexMap<String, Vec<Row>>>,
    calls: Mutex<Vec<(String, Conditions)>>,
}

impl FixtureWebservice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fixtures: Mutex::new(IndexMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn load(&self, alias: &str, rows: Vec<Row>) {
        self.fixtures.lock().insert(alias.to_string(), rows);
    }

    pub fn calls_for(&self, alias: &str) -> usize {
        self.calls.lock().iter().filter(|(a, _)| a == alias).count()
    }

    pub fn last_conditions_for(&self, alias: &str) -> Option<Conditions> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(a, _)| a == alias)
            .map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl Webservice for FixtureWebservice {
    async fn execute(&self, query: &Query) -> QueryResult<ExecuteResult> {
        let alias = query.endpoint().alias().to_string();
        self.calls
            .lock()
            .push((alias.clone(), query.clauses().where_.clone()));
        if query.clauses().action != Action::Read {
            return Ok(ExecuteResult::Affected(1));
        }
        let rows = self
            .fixtures
            .lock()
            .get(&alias)
            .cloned()
            .unwrap_or_default();
        Ok(ExecuteResult::Collection(ResultSet::new(rows)))
    }

    async fn describe(&self, _endpoint: &str) -> QueryResult<Schema> {
        Ok(Schema::new([], ["id"]))
    }
}

/// An endpoint wired to a [`FixtureWebservice`].
pub struct TestEndpoint {
    alias: String,
    primary_key: Vec<String>,
    webservice: Arc<FixtureWebservice>,
    associations: Arc<AssociationMap>,
    validator: Option<Arc<dyn Validator>>,
}

impl TestEndpoint {
    pub fn new(alias: &str, webservice: Arc<FixtureWebservice>) -> Self {
        Self {
            alias: alias.to_string(),
            primary_key: vec!["id".to_string()],
            webservice,
            associations: Arc::new(AssociationMap::new()),
            validator: None,
        }
    }

    pub fn with_primary_key(mut self, fields: &[&str]) -> Self {
        self.primary_key = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_associations(mut self, associations: AssociationMap) -> Self {
        self.associations = Arc::new(associations);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn arc(self) -> Arc<dyn Endpoint> {
        Arc::new(self)
    }
}

#[async_trait]
impl Endpoint for TestEndpoint {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn primary_key(&self) -> Vec<String> {
        self.primary_key.clone()
    }

    fn webservice(&self) -> Arc<dyn Webservice> {
        self.webservice.clone()
    }

    fn associations(&self) -> Arc<AssociationMap> {
        Arc::clone(&self.associations)
    }

    fn default_validator(&self) -> Option<Arc<dyn Validator>> {
        self.validator.clone()
    }
}

pub fn row(fields: &[(&str, Value)]) -> Row {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

//! Shared test doubles: a canned-response webservice and a configurable
//! endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tether_core::{Entity, Row, Schema, Validator, Value};

use crate::associations::AssociationMap;
use crate::conditions::Conditions;
use crate::error::QueryResult;
use crate::query::Query;
use crate::result::ResultSet;
use crate::traits::{Endpoint, ExecuteResult, Webservice};

/// Wrap rows as the collection result a read returns.
pub(crate) fn rows_result(rows: Vec<Row>) -> ExecuteResult {
    ExecuteResult::Collection(ResultSet::new(rows))
}

/// A webservice returning the same canned result for every call, while
/// recording call count and the conditions of the last executed query.
pub(crate) struct MockWebservice {
    result: ExecuteResult,
    calls: AtomicUsize,
    last_conditions: Mutex<Option<Conditions>>,
}

impl MockWebservice {
    pub(crate) fn returning(result: ExecuteResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
            last_conditions: Mutex::new(None),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_conditions(&self) -> Option<Conditions> {
        self.last_conditions.lock().clone()
    }
}

#[async_trait]
impl Webservice for MockWebservice {
    async fn execute(&self, query: &Query) -> QueryResult<ExecuteResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_conditions.lock() = Some(query.clauses().where_.clone());
        Ok(self.result.clone())
    }

    async fn describe(&self, _endpoint: &str) -> QueryResult<Schema> {
        Ok(Schema::new([], ["id"]))
    }
}

type BeforeFindFn = Box<dyn Fn(&mut Query) + Send + Sync>;

/// A configurable endpoint double. `save` stamps the configured id onto
/// the entity's first primary key field; `save` and `delete` both log
/// the entities they see.
pub(crate) struct MockEndpoint {
    alias: String,
    primary_key: Vec<String>,
    webservice: Arc<MockWebservice>,
    associations: Arc<AssociationMap>,
    before_find: Option<BeforeFindFn>,
    validator: Option<Arc<dyn Validator>>,
    save_id: Option<Value>,
    saved: Arc<Mutex<Vec<Entity>>>,
    deleted: Arc<Mutex<Vec<Entity>>>,
}

impl MockEndpoint {
    pub(crate) fn new(alias: &str, webservice: Arc<MockWebservice>) -> Self {
        Self {
            alias: alias.to_string(),
            primary_key: vec!["id".to_string()],
            webservice,
            associations: Arc::new(AssociationMap::new()),
            before_find: None,
            validator: None,
            save_id: None,
            saved: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn with_primary_key(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    #[allow(dead_code)]
    pub(crate) fn with_associations(mut self, associations: Arc<AssociationMap>) -> Self {
        self.associations = associations;
        self
    }

    pub(crate) fn with_before_find(
        mut self,
        listener: impl Fn(&mut Query) + Send + Sync + 'static,
    ) -> Self {
        self.before_find = Some(Box::new(listener));
        self
    }

    pub(crate) fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub(crate) fn with_save_id(mut self, id: Value) -> Self {
        self.save_id = Some(id);
        self
    }

    #[allow(dead_code)]
    pub(crate) fn saved_log(&self) -> Arc<Mutex<Vec<Entity>>> {
        Arc::clone(&self.saved)
    }

    pub(crate) fn deleted_log(&self) -> Arc<Mutex<Vec<Entity>>> {
        Arc::clone(&self.deleted)
    }

    pub(crate) fn arc(self) -> Arc<dyn Endpoint> {
        Arc::new(self)
    }
}

#[async_trait]
impl Endpoint for MockEndpoint {
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

    fn dispatch_before_find(&self, query: &mut Query) {
        if let Some(listener) = &self.before_find {
            listener(query);
        }
    }

    async fn save(&self, mut entity: Entity) -> QueryResult<Entity> {
        if let (Some(id), Some(pk)) = (&self.save_id, self.primary_key.first()) {
            entity.set(pk.clone(), id.clone());
        }
        entity.set_new(false);
        entity.clean();
        self.saved.lock().push(entity.clone());
        Ok(entity)
    }

    async fn delete(&self, entity: Entity) -> QueryResult<bool> {
        self.deleted.lock().push(entity);
        Ok(true)
    }
}

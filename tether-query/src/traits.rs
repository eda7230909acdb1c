//! Collaborator contracts: the backend executor and the endpoint facade.
//!
//! The engine is implementable against these two seams. A [`Webservice`]
//! turns one query into raw data with a single opaque call; an
//! [`Endpoint`] is a named, addressable collection of records on a
//! backend (the non-SQL analogue of a table), exposing exactly what the
//! query and marshalling layers need: alias, primary key, finder
//! dispatch, the before-find event seam, validators, and persistence for
//! association cascades.

use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{Entity, Row, Schema, Validator};

use crate::associations::AssociationMap;
use crate::error::{QueryError, QueryResult};
use crate::query::Query;
use crate::result::ResultSet;

/// The raw value a backend returns for one executed query.
///
/// Which variant comes back depends on the query's action: reads produce
/// a [`ResultSet`] (or a single record), mutations produce a success flag
/// or an affected-row count.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    /// Success flag for a mutation.
    Success(bool),
    /// Number of records affected by a mutation.
    Affected(u64),
    /// A single record.
    Record(Row),
    /// A collection of records.
    Collection(ResultSet),
}

impl ExecuteResult {
    /// Interpret this result as fetched rows plus an optional total.
    pub fn into_rows(self) -> (Vec<Row>, Option<u64>) {
        match self {
            Self::Collection(rs) => rs.into_parts(),
            Self::Record(row) => (vec![row], None),
            Self::Success(_) | Self::Affected(_) => (Vec::new(), None),
        }
    }
}

/// The backend-execution contract: one opaque call per query.
///
/// No retry or partial-result semantics are assumed; failures propagate
/// to the caller unchanged.
#[async_trait]
pub trait Webservice: Send + Sync {
    /// Execute a query and return its raw result.
    async fn execute(&self, query: &Query) -> QueryResult<ExecuteResult>;

    /// Describe the schema of a named endpoint.
    async fn describe(&self, endpoint: &str) -> QueryResult<Schema>;
}

/// The endpoint facade the engine queries through.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// The endpoint's alias, e.g. `"Articles"`.
    fn alias(&self) -> &str;

    /// The endpoint's primary key field(s).
    fn primary_key(&self) -> Vec<String>;

    /// The webservice this endpoint executes against.
    fn webservice(&self) -> Arc<dyn Webservice>;

    /// Associations declared on this endpoint.
    fn associations(&self) -> Arc<AssociationMap> {
        Arc::new(AssociationMap::new())
    }

    /// The validator used when marshalling with `validate = true`.
    fn default_validator(&self) -> Option<Arc<dyn Validator>> {
        None
    }

    /// Look up a named validator set.
    fn validator(&self, name: &str) -> Option<Arc<dyn Validator>> {
        if name == "default" {
            self.default_validator()
        } else {
            None
        }
    }

    /// The before-find event seam. Listeners may mutate the query's own
    /// clauses (e.g. inject a default filter); the query guarantees this
    /// fires at most once per instance.
    fn dispatch_before_find(&self, _query: &mut Query) {}

    /// Dispatch a named finder, customizing and returning the query.
    ///
    /// The `"all"` finder is always available and returns the query
    /// unchanged; unknown finders are a configuration error.
    fn call_finder(&self, name: &str, query: Query, _options: &Row) -> QueryResult<Query> {
        match name {
            "all" | "" => Ok(query),
            other => Err(QueryError::configuration(format!(
                "unknown finder `{}` on endpoint `{}`",
                other,
                self.alias()
            ))),
        }
    }

    /// Persist one entity. Used by association save cascades; endpoints
    /// that are read-only may leave the default.
    async fn save(&self, _entity: Entity) -> QueryResult<Entity> {
        Err(QueryError::configuration(format!(
            "endpoint `{}` does not implement save",
            self.alias()
        )))
    }

    /// Delete one entity with full callbacks. Used by association delete
    /// cascades when `cascade_callbacks` is set.
    async fn delete(&self, _entity: Entity) -> QueryResult<bool> {
        Err(QueryError::configuration(format!(
            "endpoint `{}` does not implement delete",
            self.alias()
        )))
    }
}

//! # tether-query
//!
//! Query building, association resolution, and payload marshalling for
//! the Tether ORM.
//!
//! This crate provides the backend-agnostic query engine:
//! - Fluent, lazily-executed queries over a clause model (`where`,
//!   `order`, `select`, `set`, pagination)
//! - A two-trait backend seam: [`Webservice`] executes queries,
//!   [`Endpoint`] names a collection of records and dispatches finders
//! - Associations (`belongs to`, `has one`, `has many`, `belongs to
//!   many`) with batched eager loading and result-map injection
//! - Payload marshalling into entities, with validation and
//!   merge-by-primary-key
//!
//! ## Conditions
//!
//! Condition trees mirror the map-shaped filters webservice backends
//! consume:
//!
//! ```rust
//! use tether_query::Conditions;
//!
//! let mut conditions = Conditions::eq("published", true);
//! conditions.merge(Conditions::in_list("author_id", [1i64, 2, 3]));
//! assert_eq!(conditions.len(), 2);
//! ```
//!
//! ## Queries
//!
//! A [`Query`] is bound to one [`Endpoint`] and stays unexecuted until a
//! result is demanded; the result is cached until a clause changes:
//!
//! ```rust,ignore
//! let mut query = Query::new(articles)
//!     .where_clause(Conditions::eq("published", true), false)
//!     .order_by([("created", SortOrder::Desc)], false)
//!     .contain("Authors", ContainOptions::default());
//!
//! let articles = query.all().await?;
//! let again = query.all().await?; // served from cache
//! ```
//!
//! ## Marshalling
//!
//! A [`Marshaller`] turns raw payload maps into entities through the
//! endpoint's validators:
//!
//! ```rust,ignore
//! let marshaller = Marshaller::new(articles);
//! let entity = marshaller.one(&payload, &MarshalOptions::default())?;
//! if entity.has_errors() {
//!     // rejected values live in entity.invalid(), not in its fields
//! }
//! ```

pub mod associations;
pub mod clause;
pub mod conditions;
pub mod error;
pub mod marshaller;
#[cfg(test)]
pub(crate) mod mock;
pub mod query;
pub mod registry;
pub mod result;
pub mod traits;

pub use associations::{
    collect_keys, Association, AssociationCore, AssociationMap, AssociationType, AttachOptions,
    BelongsTo, BelongsToMany, ContainOptions, EagerLoadOptions, HasMany, HasOne, Injected,
    QueryBuilderFn, RowInjector, Strategy,
};
pub use clause::{Action, ClauseSet, SortOrder};
pub use conditions::{ConditionNode, Conditions, AND, OR};
pub use error::{QueryError, QueryResult};
pub use marshaller::{MarshalOptions, Marshaller, Validate};
pub use query::{FormatMode, Mapper, Query, Reducer, ResultFormatter};
pub use registry::EndpointRegistry;
pub use result::ResultSet;
pub use traits::{Endpoint, ExecuteResult, Webservice};

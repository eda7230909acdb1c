//! # Tether
//!
//! A backend-agnostic, relational-style data-access layer for webservice
//! endpoints.
//!
//! Tether lets application code issue declarative queries (create/read/
//! update/delete, filtering, ordering, paging, field selection) against
//! remote or local data sources that are not SQL databases, and compose
//! relationships between record collections the way a relational ORM
//! composes table joins, without ever emitting SQL.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether_orm::prelude::*;
//!
//! let registry = Arc::new(EndpointRegistry::new());
//! let articles = registry.get("Articles").unwrap();
//!
//! let mut query = Query::new(articles)
//!     .read()
//!     .where_clause(Conditions::eq("published", true), false)
//!     .order_by([("created", SortOrder::Desc)], false)
//!     .contain("Author", ContainOptions::default());
//!
//! let results = query.all().await?;
//! for row in &results {
//!     println!("{:?}", row.get("title"));
//! }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Core value model: values, rows, entities, validation, schema.
pub mod core {
    pub use tether_core::*;
}

/// Query building, associations, and marshalling.
pub mod query {
    pub use tether_query::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{Entity, Row, Schema, Validator, Value};
    pub use crate::query::{
        Action, Association, ClauseSet, Conditions, ContainOptions, Endpoint, EndpointRegistry,
        ExecuteResult, Marshaller, Query, QueryError, QueryResult, ResultSet, SortOrder,
        Webservice,
    };
}

// Re-export key types at the crate root
pub use tether_core::{Entity, Row, Value};
pub use tether_query::{Query, QueryError, QueryResult};

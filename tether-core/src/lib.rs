//! # tether-core
//!
//! Value model for the Tether data-access layer.
//!
//! This crate is the leaf of the workspace: the dynamic [`Value`] type
//! exchanged with webservice backends, ordered associative records
//! ([`Row`]) with deep-merge semantics, the [`Entity`] property bag with
//! dirty tracking and validation error maps, the [`Validator`] trait run
//! during marshalling, and the [`Schema`] description a backend reports
//! for an endpoint.
//!
//! ## Rows and merging
//!
//! ```rust
//! use tether_core::{Row, Value};
//!
//! let mut row = Row::new();
//! row.insert("title", "Hello");
//! row.insert("tags", Value::from(vec!["a"]));
//!
//! let mut update = Row::new();
//! update.insert("tags", Value::from(vec!["b"]));
//!
//! // Lists concatenate, scalars replace.
//! row.deep_merge(update);
//! assert_eq!(row.get("tags"), Some(&Value::from(vec!["a", "b"])));
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod entity;
mod row;
mod schema;
mod validate;
mod value;

pub use entity::Entity;
pub use row::Row;
pub use schema::{Column, ColumnType, Schema};
pub use validate::{Rule, RuleSet, ValidationErrors, Validator};
pub use value::Value;

//! Error types for query building, association resolution, and marshalling.
//!
//! All errors are raised synchronously at the call that detects them;
//! nothing is deferred or batched. Backend failures are wrapped in
//! [`QueryError::Backend`] and propagated unchanged; this layer adds no
//! retry, backoff, or suppression. Validation failures during marshalling
//! are *not* errors: they are recorded on the entity's error map.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised by the query/association engine.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A clause was used in a disallowed action context, e.g. `set()`
    /// on a read query.
    #[error("invalid query state: {0}")]
    InvalidQueryState(String),

    /// An argument was out of range or inconsistent, e.g. `page(0)` or
    /// mismatched foreign/binding key cardinality.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No record matched a lookup that requires one. Raised only by
    /// `first_or_fail`-style calls, never by plain `first`.
    #[error("record not found in endpoint `{endpoint}`")]
    RecordNotFound {
        /// Alias of the endpoint that was queried.
        endpoint: String,
    },

    /// An operation was asked of a strategy that does not support it,
    /// e.g. an eager load on an attach-time strategy.
    #[error("unimplemented strategy: {0}")]
    UnimplementedStrategy(String),

    /// Misconfiguration detected at use time, e.g. an unknown validator
    /// name or a containment referencing an undeclared association.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A failure reported by the webservice backend, propagated as-is.
    #[error("webservice error: {0}")]
    Backend(String),
}

impl QueryError {
    /// Create an invalid-query-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidQueryState(message.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a record-not-found error for an endpoint.
    pub fn not_found(endpoint: impl Into<String>) -> Self {
        Self::RecordNotFound {
            endpoint: endpoint.into(),
        }
    }

    /// Create an unimplemented-strategy error.
    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::UnimplementedStrategy(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Check if this is a record-not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}

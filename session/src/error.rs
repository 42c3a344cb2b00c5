//! Session error types.

use duality_mutation::ErrorKind;
use duality_query::QueryError;
use duality_schema::SchemaError;
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Query error.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// The table definition is malformed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Mutation error.
    #[error("mutation error: {0}")]
    Mutation(#[from] duality_mutation::MutationError),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(#[from] duality_transaction::TransactionError),

    /// The client's etag does not match the current row.
    #[error("precondition failed: expected etag {expected}, current etag is {actual}")]
    PreconditionFailed { expected: String, actual: String },

    /// Invalid configuration.
    #[error("invalid session configuration: {message}")]
    Config { message: String },
}

impl SessionError {
    pub fn precondition_failed(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Classify the error for the REST layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Mutation(e) => e.kind(),
            Self::Query(QueryError::InvalidFilter { .. } | QueryError::MixedFilter) => ErrorKind::Input,
            Self::Query(_) | Self::Schema(_) | Self::Transaction(_) => ErrorKind::Database,
            Self::PreconditionFailed { .. } => ErrorKind::Precondition,
            Self::Config { .. } => ErrorKind::Input,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

//! Query error types.

use duality_core::SqlError;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while building or running a document query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid field filter path: {path}")]
    InvalidFilter { path: String },

    #[error("Field filter mixes included and excluded paths")]
    MixedFilter,

    #[error("Invalid document returned for {table}: {message}")]
    InvalidDocument { table: String, message: String },

    #[error(transparent)]
    Sql(#[from] SqlError),
}

impl QueryError {
    pub fn invalid_filter(path: impl Into<String>) -> Self {
        Self::InvalidFilter { path: path.into() }
    }

    pub fn invalid_document(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            table: table.into(),
            message: message.into(),
        }
    }
}

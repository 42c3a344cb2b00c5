//! Mutation error types.

use duality_core::SqlError;
use duality_schema::SchemaError;
use thiserror::Error;

/// Result type for mutation operations.
pub type MutationResult<T> = Result<T, MutationError>;

/// Coarse classification for mapping errors to client responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or inconsistent document.
    Input,
    /// The view does not allow the requested change.
    Policy,
    /// A precondition on the current row state failed.
    Precondition,
    /// Error reported by the database.
    Database,
}

/// Errors that can occur while validating, planning or running a mutation.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Invalid value for {table}.{column}: expected {expected}, got {actual}")]
    InvalidType {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Document for {table} must be an object, got {actual}")]
    InvalidDocument { table: String, actual: String },

    #[error("Missing field: {field} in {table}")]
    MissingField { table: String, field: String },

    #[error("Unknown field: {field} in {table}")]
    UnknownField { table: String, field: String },

    #[error("Duplicate key {key} in {table}")]
    DuplicateKey { table: String, key: String },

    #[error("Value of {table}.{column} does not match the parent key")]
    ForeignKeyMismatch { table: String, column: String },

    #[error("Cannot set {table}.{column} to null")]
    NullNotAllowed { table: String, column: String },

    #[error("Inserting into {table} is not allowed")]
    NoInsert { table: String },

    #[error("Updating {table} is not allowed")]
    NoUpdate { table: String },

    #[error("Deleting from {table} is not allowed")]
    NoDelete { table: String },

    #[error("Cannot change primary key {table}.{column}")]
    ImmutableId { table: String, column: String },

    #[error("Cannot change {table}.{column}")]
    NotUpdatable { table: String, column: String },

    #[error("Cannot change nested object {table}")]
    ImmutableField { table: String },

    #[error("Row not found in {table}")]
    RowNotFound { table: String },

    #[error("Row in {table} belongs to another owner or parent")]
    RowNotAccessible { table: String },

    #[error("Operation on {table} already executed")]
    AlreadyExecuted { table: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Sql(#[from] SqlError),
}

impl MutationError {
    pub fn invalid_type(
        table: impl Into<String>,
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidType {
            table: table.into(),
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_document(table: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidDocument {
            table: table.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            table: table.into(),
            field: field.into(),
        }
    }

    pub fn unknown_field(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            table: table.into(),
            field: field.into(),
        }
    }

    pub fn duplicate_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn foreign_key_mismatch(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ForeignKeyMismatch {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn null_not_allowed(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::NullNotAllowed {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn no_insert(table: impl Into<String>) -> Self {
        Self::NoInsert { table: table.into() }
    }

    pub fn no_update(table: impl Into<String>) -> Self {
        Self::NoUpdate { table: table.into() }
    }

    pub fn no_delete(table: impl Into<String>) -> Self {
        Self::NoDelete { table: table.into() }
    }

    pub fn immutable_id(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ImmutableId {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn not_updatable(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::NotUpdatable {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn immutable_field(table: impl Into<String>) -> Self {
        Self::ImmutableField { table: table.into() }
    }

    pub fn row_not_found(table: impl Into<String>) -> Self {
        Self::RowNotFound { table: table.into() }
    }

    pub fn row_not_accessible(table: impl Into<String>) -> Self {
        Self::RowNotAccessible { table: table.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidType { .. }
            | Self::InvalidDocument { .. }
            | Self::MissingField { .. }
            | Self::UnknownField { .. }
            | Self::DuplicateKey { .. }
            | Self::ForeignKeyMismatch { .. }
            | Self::NullNotAllowed { .. } => ErrorKind::Input,
            Self::NoInsert { .. }
            | Self::NoUpdate { .. }
            | Self::NoDelete { .. }
            | Self::ImmutableId { .. }
            | Self::NotUpdatable { .. }
            | Self::ImmutableField { .. }
            | Self::RowNotAccessible { .. } => ErrorKind::Policy,
            Self::RowNotFound { .. } => ErrorKind::Precondition,
            Self::AlreadyExecuted { .. } | Self::Schema(_) | Self::Sql(_) => ErrorKind::Database,
        }
    }
}

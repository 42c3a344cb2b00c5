//! SQL execution error types.

use thiserror::Error;

/// MySQL `ER_ROW_IS_REFERENCED`.
pub const ER_ROW_IS_REFERENCED: u32 = 1217;
/// MySQL `ER_ROW_IS_REFERENCED_2`.
pub const ER_ROW_IS_REFERENCED_2: u32 = 1451;
/// MySQL `ER_LOCK_NOWAIT`.
pub const ER_LOCK_NOWAIT: u32 = 3572;

/// An error reported by the database while executing a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SQL error {code} ({sql_state}): {message}")]
pub struct SqlError {
    /// Server error code.
    pub code: u32,
    /// Five character SQLSTATE.
    pub sql_state: String,
    /// Server supplied message.
    pub message: String,
}

impl SqlError {
    pub fn new(code: u32, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }

    /// Error raised by the port itself rather than the server.
    pub fn client(message: impl Into<String>) -> Self {
        Self::new(2000, "HY000", message)
    }

    /// True when a DELETE or UPDATE was rejected because other rows still
    /// reference the row through a foreign key.
    pub fn is_fk_violation(&self) -> bool {
        self.code == ER_ROW_IS_REFERENCED || self.code == ER_ROW_IS_REFERENCED_2
    }

    /// True when a `NOWAIT` lock request found the row already locked.
    pub fn is_lock_conflict(&self) -> bool {
        self.code == ER_LOCK_NOWAIT
    }
}

/// Result type for SQL execution.
pub type SqlResult<T> = Result<T, SqlError>;

//! Transaction error types.

use duality_core::SqlError;
use thiserror::Error;

/// Transaction errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Transaction already committed or rolled back.
    #[error("transaction already finished: {state}")]
    AlreadyFinished { state: String },

    /// Error from the database while starting or ending the transaction.
    #[error(transparent)]
    Sql(#[from] SqlError),
}

impl TransactionError {
    pub fn already_finished(state: impl Into<String>) -> Self {
        Self::AlreadyFinished {
            state: state.into(),
        }
    }
}

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

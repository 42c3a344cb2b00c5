//! Duality Transaction
//!
//! Scope a unit of work to one database transaction.
//!
//! Responsibilities:
//! - Implement BEGIN (optionally with a consistent snapshot)/COMMIT/ROLLBACK
//! - Roll back on every exit path that did not commit, including drop

mod error;
mod guard;

pub use error::{TransactionError, TransactionResult};
pub use guard::{Transaction, TransactionState};

//! Duality Tests
//!
//! Support code for the integration tests under `tests/`.
//!
//! # Module Structure
//!
//! - `scripted` - `SqlSession` double answering statements by substring
//! - `fixtures` - Table definitions shared by the scenarios

mod scripted;

pub use duality_mutation::SequenceUuid;
pub use scripted::{Reply, ScriptedSession};

/// Everything a scenario usually needs.
pub mod prelude {
    pub use crate::fixtures;
    pub use crate::{Reply, ScriptedSession, SequenceUuid};
    pub use duality_core::{PrimaryKeyColumnValues, RowOwnership, SqlError, SqlString, SqlValue};
    pub use duality_core::GroupOwnership;
    pub use duality_mutation::{ErrorKind, ExecContext, MutationError, Planner};
    pub use duality_query::{compute_checksum, extract_etag, ObjectFieldFilter};
    pub use duality_session::{DualitySession, SessionConfig, SessionError};
    pub use serde_json::json;
}

//! Duality Mutation
//!
//! Turn a JSON document into the statements that make the database match it.
//!
//! Responsibilities:
//! - Validate documents against the table definition
//! - Plan a tree of per-table operations in dependency order
//! - Propagate generated keys between parent and nested rows
//! - Cascade deletes into owned rows
//!
//! # Module Structure
//!
//! - `check` - Structural validation run before planning
//! - `planner` - Builds the operation tree for insert, update and delete
//! - `ops/` - Operation tree and the statement each node kind runs
//! - `input` - Paired new/old document views and array diffing
//! - `convert` - JSON to SQL literal conversion per column type
//! - `keygen` - UUID generation for reverse-UUID keys
//! - `error` - Error types for mutation failures
//! - `result` - Result types for mutation outcomes

mod check;
mod convert;
mod error;
mod input;
mod keygen;
mod ops;
mod planner;
mod result;

#[cfg(test)]
mod testing;

pub use check::{check_document, CheckMode, RESERVED_KEYS};
pub use convert::{json_type_name, to_sql_value};
pub use error::{ErrorKind, MutationError, MutationResult};
pub use input::{ArrayDiff, JsonInput};
pub use keygen::{reverse_uuid_bytes, RandomUuid, SequenceUuid, UuidGenerator};
pub use ops::{ColumnValue, ExecContext, OpId, OpKind, OperationNode, OperationTree};
pub use planner::Planner;
pub use result::MutationOutcome;

//! Mutation result types.

use duality_core::PrimaryKeyColumnValues;

/// Outcome of running an operation tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationOutcome {
    /// Key of the root row, including generated values.
    pub primary_key: PrimaryKeyColumnValues,
    /// Rows affected by every statement of the tree.
    pub affected_rows: u64,
}

use duality_core::SqlString;
use tracing::debug;

use super::{ExecContext, OpId, OperationTree};
use crate::error::{MutationError, MutationResult};

impl<'t> OperationTree<'t> {
    /// Fail unless the stored row already holds every submitted value.
    pub(crate) fn run_no_update_check(&mut self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<u64> {
        let node = &self.nodes[id.0];
        let table = node.table;

        let comparisons: Vec<SqlString> = node
            .values
            .iter()
            .filter(|v| !table.is_primary_key(&v.column))
            .map(|v| SqlString::new("! <=> ?").ident(&v.column).value(v.value.clone()))
            .collect();
        let unchanged = if comparisons.is_empty() {
            SqlString::new("TRUE")
        } else {
            SqlString::join(comparisons, " AND ")
        };

        let stmt = SqlString::new("SELECT (?) FROM !.! WHERE ?")
            .sql(&unchanged)
            .ident(&table.schema)
            .ident(&table.table)
            .sql(&self.full_condition(id));
        debug!(table = %table.full_name(), sql = %stmt, "query");

        let same = ctx
            .session
            .query_one(&stmt)?
            .and_then(|row| row.into_iter().next().flatten());
        match same.as_deref() {
            Some("1") => Ok(0),
            _ => Err(MutationError::ImmutableField {
                table: table.full_name(),
            }),
        }
    }
}

use duality_core::SqlString;
use tracing::debug;

use super::{execute, ColumnValue, ExecContext, OpId, OperationTree};
use crate::error::{MutationError, MutationResult};

impl<'t> OperationTree<'t> {
    pub(crate) fn run_update(&mut self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<u64> {
        let node = &self.nodes[id.0];
        let table = node.table;
        let condition = self.full_condition(id);

        // Columns the view may not change must still hold the submitted value.
        let fixed: Vec<&ColumnValue> = node
            .values
            .iter()
            .filter(|v| v.not_updatable && !table.is_primary_key(&v.column))
            .collect();
        if !fixed.is_empty() {
            let checks = SqlString::join(
                fixed
                    .iter()
                    .map(|v| SqlString::new("! <=> ?").ident(&v.column).value(v.value.clone())),
                ", ",
            );
            let stmt = SqlString::new("SELECT ? FROM !.! WHERE ?")
                .sql(&checks)
                .ident(&table.schema)
                .ident(&table.table)
                .sql(&condition);
            debug!(table = %table.full_name(), sql = %stmt, "query");
            // A row that cannot be read cannot confirm the stored values.
            let row = ctx.session.query_one(&stmt)?.unwrap_or_default();
            for (i, value) in fixed.iter().enumerate() {
                if row.get(i).and_then(|v| v.as_deref()) != Some("1") {
                    return Err(MutationError::not_updatable(table.full_name(), &value.column));
                }
            }
        }

        let assignments: Vec<SqlString> = node
            .values
            .iter()
            .filter(|v| !v.not_updatable && !table.is_primary_key(&v.column))
            .map(|v| SqlString::new("! = ?").ident(&v.column).value(v.value.clone()))
            .collect();
        if assignments.is_empty() {
            return Ok(0);
        }

        let stmt = SqlString::new("UPDATE !.! SET ? WHERE ?")
            .ident(&table.schema)
            .ident(&table.table)
            .sql(&SqlString::join(assignments, ", "))
            .sql(&condition);
        execute(ctx, table, node.kind.name(), &stmt)
    }
}

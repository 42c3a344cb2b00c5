use duality_core::SqlString;

use super::{execute, ExecContext, OpId, OperationTree};
use crate::error::MutationResult;

impl<'t> OperationTree<'t> {
    pub(crate) fn run_delete(&mut self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<u64> {
        let node = &self.nodes[id.0];
        let table = node.table;
        let stmt = SqlString::new("DELETE FROM !.! WHERE ?")
            .ident(&table.schema)
            .ident(&table.table)
            .sql(&self.full_condition(id));
        execute(ctx, table, node.kind.name(), &stmt)
    }

    /// Detach rows from their parent by clearing the foreign key.
    pub(crate) fn run_abandon(&mut self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<u64> {
        let node = &self.nodes[id.0];
        let table = node.table;
        let Some(fk) = node.via else {
            return Ok(0);
        };
        let assignments = SqlString::join(
            fk.other_columns().map(|c| SqlString::new("! = NULL").ident(c)),
            ", ",
        );
        let stmt = SqlString::new("UPDATE !.! SET ? WHERE ?")
            .ident(&table.schema)
            .ident(&table.table)
            .sql(&assignments)
            .sql(&self.full_condition(id));
        execute(ctx, table, "abandon", &stmt)
    }
}

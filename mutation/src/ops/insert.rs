use duality_core::{SqlError, SqlString, SqlValue};
use duality_schema::{IdGeneration, Table};
use tracing::{debug, trace};

use super::{execute, ident_list, ExecContext, OpId, OpKind, OperationTree};
use crate::error::{MutationError, MutationResult};
use crate::keygen::reverse_uuid_bytes;

impl<'t> OperationTree<'t> {
    pub(crate) fn run_insert(&mut self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<u64> {
        let table = self.nodes[id.0].table;
        let generated = table
            .generated_id_column()
            .filter(|c| !self.nodes[id.0].has_value(&c.name));

        if let Some(column) = generated.filter(|c| c.id_generation == IdGeneration::ReverseUuid) {
            let key = reverse_uuid_bytes(ctx.uuid.generate());
            trace!(table = %table.full_name(), column = %column.name, "generated key");
            self.on_value(id, &column.name, SqlValue::Binary(key.to_vec()), false);
            self.notify_pk_resolved(id);
        }

        if self.nodes[id.0].kind == OpKind::Upsert {
            self.check_upsert_target(id, ctx)?;
        }

        let stmt = self.insert_statement(id);
        let op = self.nodes[id.0].kind.name();
        let affected = execute(ctx, table, op, &stmt)?;

        if let Some(column) = generated.filter(|c| c.id_generation == IdGeneration::AutoIncrement) {
            let stmt = SqlString::new("SELECT LAST_INSERT_ID()");
            debug!(table = %table.full_name(), sql = %stmt, "query");
            let text = ctx
                .session
                .query_one(&stmt)?
                .and_then(|row| row.into_iter().next().flatten())
                .ok_or_else(|| SqlError::client("LAST_INSERT_ID() returned no value"))?;
            let value = parse_insert_id(&text)
                .ok_or_else(|| SqlError::client(format!("Invalid LAST_INSERT_ID() value: {text}")))?;
            self.on_value(id, &column.name, value, false);
            self.notify_pk_resolved(id);
        }

        Ok(affected)
    }

    /// Lock the row an upsert would overwrite and fail unless it passes
    /// the node's guard. A missing row is a plain insert.
    fn check_upsert_target(&self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<()> {
        let node = &self.nodes[id.0];
        let Some(guard) = self.upsert_guard(id) else {
            return Ok(());
        };
        if !node.has_complete_key() {
            return Ok(());
        }
        let table = node.table;
        let stmt = SqlString::new("SELECT ? FROM !.! WHERE ? FOR UPDATE")
            .sql(&guard)
            .ident(&table.schema)
            .ident(&table.table)
            .sql(&node.primary_key.to_condition(None));
        debug!(table = %table.full_name(), sql = %stmt, "upsert target");
        let Some(row) = ctx.session.query_one(&stmt)? else {
            return Ok(());
        };
        match row.first().and_then(|v| v.as_deref()) {
            Some("1") => Ok(()),
            _ => Err(MutationError::row_not_accessible(table.full_name())),
        }
    }

    fn insert_statement(&self, id: OpId) -> SqlString {
        let node = &self.nodes[id.0];
        let table = node.table;
        let columns = ident_list(node.values.iter().map(|v| v.column.as_str()));
        let values = SqlString::join(
            node.values
                .iter()
                .map(|v| SqlString::new("?").value(v.value.clone())),
            ", ",
        );
        let mut stmt = SqlString::new("INSERT INTO !.! (?) VALUES (?)")
            .ident(&table.schema)
            .ident(&table.table)
            .sql(&columns)
            .sql(&values);

        if node.kind == OpKind::Upsert {
            stmt.append_sql(&SqlString::new(" AS `new` ON DUPLICATE KEY UPDATE "))
                .append_sql(&upsert_assignments(table, node.values.iter().filter(|v| !v.not_updatable).map(|v| v.column.as_str())));
        }
        stmt
    }
}

/// `` `c` = `new`.`c` `` for every column an upsert may overwrite. Falls back
/// to a no-op assignment of the first key column.
fn upsert_assignments<'c>(table: &Table, columns: impl Iterator<Item = &'c str>) -> SqlString {
    let assign = |c: &str| SqlString::new("! = `new`.!").ident(c).ident(c);
    let owner = table.row_owner_column().map(|c| c.name.as_str());
    let assignments: Vec<SqlString> = columns
        .filter(|c| !table.is_primary_key(c) && Some(*c) != owner)
        .filter(|c| {
            table
                .get_column(c)
                .map(|col| table.is_column_updatable(col))
                .unwrap_or(true)
        })
        .map(assign)
        .collect();

    if assignments.is_empty() {
        let first = table
            .primary_key_columns()
            .first()
            .map(|c| c.name.as_str())
            .unwrap_or_default();
        return assign(first);
    }
    SqlString::join(assignments, ", ")
}

fn parse_insert_id(text: &str) -> Option<SqlValue> {
    text.parse::<i64>()
        .map(SqlValue::Int)
        .or_else(|_| text.parse::<u64>().map(SqlValue::UInt))
        .ok()
}

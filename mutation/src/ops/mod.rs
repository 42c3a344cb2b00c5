//! Operation tree.
//!
//! Each node is one pending statement against one table. Nodes live in an
//! arena and refer to each other by `OpId`. Running a node runs its `before`
//! children, then its own statement, then its `after` children.
//!
//! Nodes whose key is generated by the database hand it to dependent nodes
//! once known: children referencing the node wait in `pending_fk_to_parent`,
//! a parent referencing a child waits in `pending_referenced`. Both slots are
//! drained when read, so a key is delivered at most once.

mod delete;
mod insert;
mod no_update;
mod update;

use duality_core::{
    and_all, PrimaryKeyColumnValues, RowOwnership, SqlSession, SqlString, SqlValue,
};
use duality_schema::{Column, ForeignKeyReference, Table};
use tracing::{debug, trace};

use crate::error::{MutationError, MutationResult};
use crate::keygen::UuidGenerator;
use crate::result::MutationOutcome;

/// Index of a node in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(usize);

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Insert,
    /// Insert, or update the non-key columns if the key already exists.
    Upsert,
    Update,
    /// Update of the row referencing the parent, identified through the
    /// parent rather than its own key.
    UpdateReferencing,
    /// Update against a table that allows none; ignored.
    NoUpdateIgnore,
    /// Update against a table that allows none; fails if it would change
    /// anything.
    NoUpdateError,
    Delete,
    DeleteMany { filter: SqlString },
    /// Rows referencing the parent. With `abandon` the foreign key is set to
    /// NULL instead.
    DeleteReferencing { abandon: bool },
    /// Rows referencing the parent except those with a key in `keep`.
    ConditionalDelete {
        keep: Vec<PrimaryKeyColumnValues>,
        abandon: bool,
    },
    /// Validation only, never executed.
    Check,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Upsert => "upsert",
            OpKind::Update => "update",
            OpKind::UpdateReferencing => "update_referencing",
            OpKind::NoUpdateIgnore => "no_update_ignore",
            OpKind::NoUpdateError => "no_update_error",
            OpKind::Delete => "delete",
            OpKind::DeleteMany { .. } => "delete_many",
            OpKind::DeleteReferencing { .. } => "delete_referencing",
            OpKind::ConditionalDelete { .. } => "conditional_delete",
            OpKind::Check => "check",
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, OpKind::Insert | OpKind::Upsert)
    }

    pub fn is_update(&self) -> bool {
        matches!(
            self,
            OpKind::Update | OpKind::UpdateReferencing | OpKind::NoUpdateIgnore | OpKind::NoUpdateError
        )
    }
}

/// A column assignment collected for a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    pub column: String,
    pub value: SqlValue,
    /// Verified against the stored row instead of assigned.
    pub not_updatable: bool,
}

#[derive(Debug)]
pub struct OperationNode<'t> {
    kind: OpKind,
    table: &'t Table,
    parent: Option<OpId>,
    /// Reference from the parent's table to this node's table.
    via: Option<&'t ForeignKeyReference>,
    ownership: RowOwnership,
    values: Vec<ColumnValue>,
    primary_key: PrimaryKeyColumnValues,
    before: Vec<OpId>,
    after: Vec<OpId>,
    pending_fk_to_parent: Option<&'t ForeignKeyReference>,
    pending_referenced: Vec<(OpId, &'t ForeignKeyReference)>,
    executed: bool,
}

impl<'t> OperationNode<'t> {
    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn table(&self) -> &'t Table {
        self.table
    }

    pub fn parent(&self) -> Option<OpId> {
        self.parent
    }

    pub fn values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|v| v.column == column)
            .map(|v| &v.value)
    }

    pub fn primary_key(&self) -> &PrimaryKeyColumnValues {
        &self.primary_key
    }

    pub fn before(&self) -> &[OpId] {
        &self.before
    }

    pub fn after(&self) -> &[OpId] {
        &self.after
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn is_waiting_for_parent(&self) -> bool {
        self.pending_fk_to_parent.is_some()
    }

    /// True when every primary key column has a value.
    pub fn has_complete_key(&self) -> bool {
        self.table
            .primary_key_columns()
            .iter()
            .all(|c| self.primary_key.get(&c.name).map(|v| !v.is_null()).unwrap_or(false))
    }

    fn has_value(&self, column: &str) -> bool {
        self.primary_key
            .get(column)
            .or_else(|| self.value(column))
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }
}

/// What a tree runs against.
pub struct ExecContext<'c> {
    pub session: &'c mut dyn SqlSession,
    pub uuid: &'c dyn UuidGenerator,
}

impl<'c> ExecContext<'c> {
    pub fn new(session: &'c mut dyn SqlSession, uuid: &'c dyn UuidGenerator) -> Self {
        Self { session, uuid }
    }
}

#[derive(Debug, Default)]
pub struct OperationTree<'t> {
    nodes: Vec<OperationNode<'t>>,
    root: Option<OpId>,
    /// Table whose rows could be neither deleted nor abandoned by a cascade.
    undeletable_fk: Option<String>,
}

impl<'t> OperationTree<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node. Inserts get the owner column set to the principal;
    /// other nodes get it as part of their key when it is a key column.
    pub fn add(
        &mut self,
        kind: OpKind,
        table: &'t Table,
        parent: Option<OpId>,
        via: Option<&'t ForeignKeyReference>,
        principal: &RowOwnership,
    ) -> OpId {
        let ownership = principal.for_column(
            table
                .row_owner_column()
                .map(|c| c.name.as_str())
                .unwrap_or(""),
        );
        let id = OpId(self.nodes.len());
        let owner = ownership
            .owner_column()
            .map(str::to_string)
            .zip(ownership.insert_value());
        let is_insert = kind.is_insert();
        self.nodes.push(OperationNode {
            kind,
            table,
            parent,
            via,
            ownership,
            values: Vec::new(),
            primary_key: PrimaryKeyColumnValues::new(),
            before: Vec::new(),
            after: Vec::new(),
            pending_fk_to_parent: None,
            pending_referenced: Vec::new(),
            executed: false,
        });

        if let Some((column, value)) = owner {
            if is_insert {
                self.on_value(id, &column, value, false);
            } else if table.is_primary_key(&column) && !value.is_null() {
                self.nodes[id.0].primary_key.insert(column, value);
            }
        }
        id
    }

    pub fn set_root(&mut self, id: OpId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<OpId> {
        self.root
    }

    pub fn node(&self, id: OpId) -> &OperationNode<'t> {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (OpId, &OperationNode<'t>)> {
        self.nodes.iter().enumerate().map(|(i, n)| (OpId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Key of the root row.
    pub fn primary_key(&self) -> PrimaryKeyColumnValues {
        self.root
            .map(|id| self.nodes[id.0].primary_key.clone())
            .unwrap_or_default()
    }

    pub fn attach_before(&mut self, parent: OpId, child: OpId) {
        self.nodes[parent.0].before.push(child);
    }

    pub fn attach_after(&mut self, parent: OpId, child: OpId) {
        self.nodes[parent.0].after.push(child);
    }

    pub fn undeletable_fk(&self) -> Option<&str> {
        self.undeletable_fk.as_deref()
    }

    pub fn mark_undeletable(&mut self, table: &Table) {
        if self.undeletable_fk.is_none() {
            self.undeletable_fk = Some(table.full_name());
        }
    }

    /// Record a column value. A column set twice keeps the last value.
    pub fn on_value(&mut self, id: OpId, column: &str, value: SqlValue, not_updatable: bool) {
        let node = &mut self.nodes[id.0];
        if node.table.is_primary_key(column) {
            node.primary_key.insert(column, value.clone());
        }
        match node.values.iter_mut().find(|v| v.column == column) {
            Some(existing) => {
                existing.value = value;
                existing.not_updatable = not_updatable;
            }
            None => node.values.push(ColumnValue {
                column: column.to_string(),
                value,
                not_updatable,
            }),
        }
    }

    /// Called for a column the document omits.
    ///
    /// An update by key must know every key column, from the document, its
    /// parent or the principal.
    pub fn on_no_value(&mut self, id: OpId, column: &Column) -> MutationResult<()> {
        let node = &self.nodes[id.0];
        if node.kind != OpKind::Update || !column.is_primary || column.is_row_owner {
            return Ok(());
        }
        let from_parent = node
            .via
            .map(|fk| fk.other_columns().any(|c| c == column.name))
            .unwrap_or(false);
        if from_parent || node.primary_key.contains(&column.name) {
            return Ok(());
        }
        Err(MutationError::immutable_id(node.table.full_name(), &column.name))
    }

    /// Known value of a column: key first, then collected values.
    pub(crate) fn value_of(&self, id: OpId, column: &str) -> Option<SqlValue> {
        let node = &self.nodes[id.0];
        node.primary_key
            .get(column)
            .or_else(|| node.value(column))
            .filter(|v| !v.is_null())
            .cloned()
    }

    fn values_of<'c>(&self, id: OpId, columns: impl Iterator<Item = &'c str>) -> Option<Vec<SqlValue>> {
        columns.map(|c| self.value_of(id, c)).collect()
    }

    /// `child` holds a foreign key `fk` pointing at `parent`.
    pub fn on_referencing_row(&mut self, parent: OpId, fk: &'t ForeignKeyReference, child: OpId) {
        match self.values_of(parent, fk.this_columns()) {
            Some(values) => self.resolve_fk_to_parent(child, fk, values),
            None => self.nodes[child.0].pending_fk_to_parent = Some(fk),
        }
    }

    /// `parent` holds a foreign key `fk` pointing at `child`.
    pub fn on_referenced_row(&mut self, parent: OpId, fk: &'t ForeignKeyReference, child: OpId) {
        match self.values_of(child, fk.other_columns()) {
            Some(values) => self.resolve_referenced(parent, fk, values),
            None => self.nodes[parent.0].pending_referenced.push((child, fk)),
        }
    }

    fn resolve_fk_to_parent(&mut self, child: OpId, fk: &ForeignKeyReference, values: Vec<SqlValue>) {
        for ((_, other_col), value) in fk.column_mapping.iter().zip(values) {
            trace!(table = %self.nodes[child.0].table.full_name(), column = %other_col, value = %value, "fk to parent resolved");
            self.on_value(child, other_col, value, false);
        }
    }

    fn resolve_referenced(&mut self, parent: OpId, fk: &ForeignKeyReference, values: Vec<SqlValue>) {
        for ((this_col, _), value) in fk.column_mapping.iter().zip(values) {
            trace!(table = %self.nodes[parent.0].table.full_name(), column = %this_col, value = %value, "referenced key resolved");
            self.on_value(parent, this_col, value, false);
        }
    }

    /// Deliver a waiting foreign key to `child` now that `parent` has a key.
    fn on_parent_pk_resolved(&mut self, parent: OpId, child: OpId) {
        let Some(fk) = self.nodes[child.0].pending_fk_to_parent.take() else {
            return;
        };
        match self.values_of(parent, fk.this_columns()) {
            Some(values) => self.resolve_fk_to_parent(child, fk, values),
            None => self.nodes[child.0].pending_fk_to_parent = Some(fk),
        }
    }

    /// Called once a node's generated key is known.
    pub(crate) fn notify_pk_resolved(&mut self, id: OpId) {
        let node = &self.nodes[id.0];
        let children: Vec<OpId> = node.before.iter().chain(&node.after).copied().collect();
        for child in children {
            self.on_parent_pk_resolved(id, child);
        }

        let Some(parent) = self.nodes[id.0].parent else {
            return;
        };
        let pending = std::mem::take(&mut self.nodes[parent.0].pending_referenced);
        let (ready, still_waiting): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|(child, _)| *child == id);
        self.nodes[parent.0].pending_referenced = still_waiting;
        for (child, fk) in ready {
            match self.values_of(child, fk.other_columns()) {
                Some(values) => self.resolve_referenced(parent, fk, values),
                None => self.nodes[parent.0].pending_referenced.push((child, fk)),
            }
        }
    }

    /// Condition identifying the node's rows, without ownership.
    pub(crate) fn row_condition(&self, id: OpId) -> Option<SqlString> {
        let node = &self.nodes[id.0];
        match &node.kind {
            OpKind::DeleteMany { filter } => Some(filter.clone()),
            OpKind::ConditionalDelete { keep, .. } => {
                let link = self.parent_link(id)?;
                if keep.is_empty() {
                    return Some(link);
                }
                let key_columns = ident_list(node.table.primary_key_columns().iter().map(|c| c.name.as_str()));
                let keys = SqlString::join(keep.iter().map(|k| k.to_tuple()), ", ");
                and_all([
                    Some(link),
                    Some(SqlString::new("NOT ((?) IN (?))").sql(&key_columns).sql(&keys)),
                ])
            }
            _ if node.has_complete_key() => Some(node.primary_key.to_condition(None)),
            _ => self.parent_link(id),
        }
    }

    /// Row condition ANDed with the ownership predicate. A node without a
    /// row condition matches nothing.
    pub(crate) fn full_condition(&self, id: OpId) -> SqlString {
        let condition = self
            .row_condition(id)
            .unwrap_or_else(|| SqlString::new("FALSE"));
        self.nodes[id.0]
            .ownership
            .and_filter(None, Some(condition.clone()))
            .unwrap_or(condition)
    }

    /// Condition an existing row must meet before an upsert may overwrite
    /// it: owned by the principal and, for rows holding a foreign key to the
    /// parent, already linked to that parent.
    pub(crate) fn upsert_guard(&self, id: OpId) -> Option<SqlString> {
        let node = &self.nodes[id.0];
        let link = match (node.parent, node.via) {
            (Some(parent), Some(fk)) if fk.is_referencing_this(self.nodes[parent.0].table) => {
                self.parent_link(id)
            }
            _ => None,
        };
        and_all([link, node.ownership.predicate(None)])
    }

    /// Rows of the node's table referencing its parent's rows.
    fn parent_link(&self, id: OpId) -> Option<SqlString> {
        let node = &self.nodes[id.0];
        let (parent, fk) = (node.parent?, node.via?);

        if let Some(values) = self.values_of(parent, fk.this_columns()) {
            return Some(SqlString::join(
                fk.other_columns()
                    .zip(values)
                    .map(|(column, value)| SqlString::new("! = ?").ident(column).value(value)),
                " AND ",
            ));
        }

        let parent_table = self.nodes[parent.0].table;
        Some(
            SqlString::new("(?) IN (SELECT ? FROM !.! WHERE ?)")
                .sql(&ident_list(fk.other_columns()))
                .sql(&ident_list(fk.this_columns()))
                .ident(&parent_table.schema)
                .ident(&parent_table.table)
                .sql(&self.full_condition(parent)),
        )
    }

    /// Run the whole tree.
    pub fn run(&mut self, ctx: &mut ExecContext<'_>) -> MutationResult<MutationOutcome> {
        let Some(root) = self.root else {
            return Ok(MutationOutcome::default());
        };
        let affected_rows = self.run_node(root, ctx).map_err(|e| self.remap_error(e))?;
        Ok(MutationOutcome {
            primary_key: self.nodes[root.0].primary_key.clone(),
            affected_rows,
        })
    }

    fn remap_error(&self, error: MutationError) -> MutationError {
        match (error, &self.undeletable_fk) {
            (MutationError::Sql(e), Some(table)) if e.is_fk_violation() => {
                debug!(table = %table, error = %e, "foreign key violation on undeletable rows");
                MutationError::no_delete(table)
            }
            (error, _) => error,
        }
    }

    fn run_node(&mut self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<u64> {
        let node = &mut self.nodes[id.0];
        if node.executed {
            return Err(MutationError::AlreadyExecuted {
                table: node.table.full_name(),
            });
        }
        node.executed = true;
        let before = node.before.clone();
        let after = node.after.clone();

        let mut affected = 0;
        for child in before {
            affected += self.run_node(child, ctx)?;
        }
        affected += self.run_own(id, ctx)?;
        for child in after {
            affected += self.run_node(child, ctx)?;
        }
        Ok(affected)
    }

    fn run_own(&mut self, id: OpId, ctx: &mut ExecContext<'_>) -> MutationResult<u64> {
        match self.nodes[id.0].kind.clone() {
            OpKind::Insert | OpKind::Upsert => self.run_insert(id, ctx),
            OpKind::Update | OpKind::UpdateReferencing => self.run_update(id, ctx),
            OpKind::NoUpdateError => self.run_no_update_check(id, ctx),
            OpKind::NoUpdateIgnore | OpKind::Check => Ok(0),
            OpKind::DeleteReferencing { abandon: true }
            | OpKind::ConditionalDelete { abandon: true, .. } => self.run_abandon(id, ctx),
            OpKind::Delete
            | OpKind::DeleteMany { .. }
            | OpKind::DeleteReferencing { abandon: false }
            | OpKind::ConditionalDelete { abandon: false, .. } => self.run_delete(id, ctx),
        }
    }
}

/// Execute a statement on behalf of a node.
fn execute(ctx: &mut ExecContext<'_>, table: &Table, op: &str, stmt: &SqlString) -> MutationResult<u64> {
    debug!(table = %table.full_name(), op, sql = %stmt, "execute");
    Ok(ctx.session.execute(stmt)?)
}

/// `` `a`, `b` ``
fn ident_list<'c>(columns: impl Iterator<Item = &'c str>) -> SqlString {
    SqlString::join(columns.map(|c| SqlString::new("!").ident(c)), ", ")
}

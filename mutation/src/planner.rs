//! Dependency graph builder.
//!
//! Walks a document against its table definition and produces the operation
//! tree that makes the database match it. Columns are processed key first,
//! then the remaining columns, then references, so a node's key is known as
//! early as possible for propagation to nested nodes.

use duality_core::{PrimaryKeyColumnValues, RowOwnership, SqlString, SqlValue};
use duality_schema::{validate, Column, Field, ForeignKeyReference, Table};
use serde_json::Value;
use tracing::debug;

use crate::convert::{same_value, to_sql_value};
use crate::error::{MutationError, MutationResult};
use crate::input::JsonInput;
use crate::ops::{OpId, OpKind, OperationTree};

/// Plans mutations on behalf of one principal.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    principal: RowOwnership,
}

impl Planner {
    pub fn new(principal: RowOwnership) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &RowOwnership {
        &self.principal
    }

    /// Insert `doc` and everything nested in it.
    pub fn plan_insert<'t>(&self, table: &'t Table, doc: &Value) -> MutationResult<OperationTree<'t>> {
        validate(table)?;
        if !table.crud.insert {
            return Err(MutationError::no_insert(table.full_name()));
        }
        let mut tree = OperationTree::new();
        let root = tree.add(OpKind::Insert, table, None, None, &self.principal);
        tree.set_root(root);
        self.process_object(&mut tree, root, table, JsonInput::new_only(doc))?;
        debug!(table = %table.full_name(), nodes = tree.len(), "planned insert");
        Ok(tree)
    }

    /// Make the row identified by `pk` match `new`.
    ///
    /// `old` is the current document when known; it lets nested arrays be
    /// diffed element by element. With `upsert` the root row is created if it
    /// does not exist.
    pub fn plan_update<'t>(
        &self,
        table: &'t Table,
        pk: &PrimaryKeyColumnValues,
        new: &Value,
        old: Option<&Value>,
        upsert: bool,
    ) -> MutationResult<OperationTree<'t>> {
        validate(table)?;
        if upsert && !table.crud.insert {
            return Err(MutationError::no_insert(table.full_name()));
        }
        if !table.crud.update {
            return Err(MutationError::no_update(table.full_name()));
        }
        self.check_key_unchanged(table, pk, new)?;

        let kind = if upsert { OpKind::Upsert } else { OpKind::Update };
        let mut tree = OperationTree::new();
        let root = tree.add(kind, table, None, None, &self.principal);
        tree.set_root(root);
        for (column, value) in pk.iter() {
            tree.on_value(root, column, value.clone(), false);
        }
        let input = match old {
            Some(old) => JsonInput::with_old(new, old),
            None => JsonInput::new_only(new),
        };
        self.process_object(&mut tree, root, table, input)?;
        debug!(table = %table.full_name(), nodes = tree.len(), upsert, "planned update");
        Ok(tree)
    }

    /// Delete the row identified by `pk` and the rows owned by it.
    pub fn plan_delete<'t>(&self, table: &'t Table, pk: &PrimaryKeyColumnValues) -> MutationResult<OperationTree<'t>> {
        validate(table)?;
        if !table.crud.delete {
            return Err(MutationError::no_delete(table.full_name()));
        }
        let mut tree = OperationTree::new();
        let root = tree.add(OpKind::Delete, table, None, None, &self.principal);
        tree.set_root(root);
        for (column, value) in pk.iter() {
            tree.on_value(root, column, value.clone(), false);
        }
        self.cascade_delete(&mut tree, root, table);
        Ok(tree)
    }

    /// Delete every row matching `filter` and the rows owned by them.
    pub fn plan_delete_where<'t>(&self, table: &'t Table, filter: SqlString) -> MutationResult<OperationTree<'t>> {
        validate(table)?;
        if !table.crud.delete {
            return Err(MutationError::no_delete(table.full_name()));
        }
        let mut tree = OperationTree::new();
        let root = tree.add(OpKind::DeleteMany { filter }, table, None, None, &self.principal);
        tree.set_root(root);
        self.cascade_delete(&mut tree, root, table);
        Ok(tree)
    }

    /// A document may neither omit nor change a key column of the row it
    /// addresses.
    fn check_key_unchanged(&self, table: &Table, pk: &PrimaryKeyColumnValues, new: &Value) -> MutationResult<()> {
        for field in table.fields.iter().filter(|f| f.enabled) {
            let Some(column) = field.as_column().filter(|c| c.is_primary && !c.is_row_owner) else {
                continue;
            };
            let immutable = || MutationError::immutable_id(table.full_name(), &column.name);
            let value = match new.get(&field.name) {
                Some(v) if !v.is_null() => to_sql_value(table, column, v)?,
                _ => return Err(immutable()),
            };
            match pk.get(&column.name) {
                Some(current) if same_value(current, &value) => {}
                _ => return Err(immutable()),
            }
        }
        Ok(())
    }

    fn process_object<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        table: &'t Table,
        input: JsonInput<'_>,
    ) -> MutationResult<()> {
        let enabled = || table.fields.iter().filter(|f| f.enabled);
        let keys = enabled().filter(|f| f.as_column().map(|c| c.is_primary).unwrap_or(false));
        let others = enabled().filter(|f| f.as_column().map(|c| !c.is_primary).unwrap_or(false));

        for field in keys.chain(others) {
            if let Some(column) = field.as_column() {
                self.process_column(tree, id, table, field, column, &input)?;
            }
        }
        for field in enabled() {
            if let Some(fk) = field.as_reference() {
                self.process_reference(tree, id, table, field, fk, &input)?;
            }
        }
        Ok(())
    }

    fn process_column<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        table: &'t Table,
        field: &Field,
        column: &'t Column,
        input: &JsonInput<'_>,
    ) -> MutationResult<()> {
        // Owner values come from the principal, generated values from the server.
        if column.is_row_owner || (column.is_generated && !column.is_primary) {
            return Ok(());
        }
        match input.find(&field.name).new_value() {
            None => tree.on_no_value(id, column),
            Some(Value::Null) if column.is_primary && column.is_auto_generated() => Ok(()),
            Some(value) => {
                let value = to_sql_value(table, column, value)?;
                let not_updatable = tree.node(id).kind() != &OpKind::Insert && !table.is_column_updatable(column);
                tree.on_value(id, &column.name, value, not_updatable);
                Ok(())
            }
        }
    }

    fn process_reference<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        table: &'t Table,
        field: &Field,
        fk: &'t ForeignKeyReference,
        input: &JsonInput<'_>,
    ) -> MutationResult<()> {
        if fk.unnest {
            self.process_unnested(tree, id, table, fk, input)
        } else if fk.to_many {
            self.process_to_many(tree, id, field, fk, input.find(&field.name))
        } else if fk.is_referencing_this(table) {
            self.process_referencing_one(tree, id, field, fk, input.find(&field.name))
        } else {
            self.process_referenced_one(tree, id, field, fk, input.find(&field.name))
        }
    }

    /// Fields of an unnested object live at this level; only the key it
    /// contributes to this row's foreign key is written.
    fn process_unnested<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        table: &'t Table,
        fk: &'t ForeignKeyReference,
        input: &JsonInput<'_>,
    ) -> MutationResult<()> {
        let Some(new) = input.new_value() else {
            return Ok(());
        };
        for (this_col, other_col) in &fk.column_mapping {
            let Some(value) = column_value_in(&fk.table, new, other_col)? else {
                continue;
            };
            let not_updatable = tree.node(id).kind() != &OpKind::Insert
                && table
                    .get_column(this_col)
                    .map(|c| !table.is_column_updatable(c))
                    .unwrap_or(false);
            tree.on_value(id, this_col, value, not_updatable);
        }
        Ok(())
    }

    /// This row holds the foreign key pointing at the nested row.
    fn process_referenced_one<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        field: &Field,
        fk: &'t ForeignKeyReference,
        member: JsonInput<'_>,
    ) -> MutationResult<()> {
        let child_table: &'t Table = &fk.table;
        if member.new_is_null() {
            for column in fk.this_columns() {
                tree.on_value(id, column, SqlValue::Null, false);
            }
            return Ok(());
        }
        let Some(new) = member.new_value().filter(|v| v.is_object()) else {
            return Ok(());
        };

        let new_key = row_key(child_table, new, &[], &self.principal)?;
        let old_key = match member.old_value().filter(|v| v.is_object()) {
            Some(old) => row_key(child_table, old, &[], &self.principal)?,
            None => None,
        };
        let parent_inserts = tree.node(id).kind().is_insert();

        let child = match (new_key, old_key) {
            (None, None) => {
                if !child_table.crud.insert {
                    return Err(MutationError::no_insert(child_table.full_name()));
                }
                let child = tree.add(OpKind::Insert, child_table, Some(id), Some(fk), &self.principal);
                tree.attach_before(id, child);
                child
            }
            (Some(key), old_key)
                if child_table.crud.insert
                    && (parent_inserts || (member.has_old_view() && old_key.as_ref() != Some(&key))) =>
            {
                let child = tree.add(OpKind::Upsert, child_table, Some(id), Some(fk), &self.principal);
                set_key(tree, child, &key);
                tree.attach_before(id, child);
                child
            }
            (new_key, old_key) => {
                let key = new_key.or(old_key).unwrap_or_default();
                let child = tree.add(update_kind(child_table, field), child_table, Some(id), Some(fk), &self.principal);
                set_key(tree, child, &key);
                tree.attach_after(id, child);
                child
            }
        };

        self.process_object(tree, child, child_table, member)?;
        tree.on_referenced_row(id, fk, child);
        Ok(())
    }

    /// The nested row holds a foreign key pointing back at this row.
    fn process_referencing_one<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        field: &Field,
        fk: &'t ForeignKeyReference,
        member: JsonInput<'_>,
    ) -> MutationResult<()> {
        let child_table: &'t Table = &fk.table;
        let parent_kind = tree.node(id).kind().clone();

        if member.new_is_null() {
            let had_row = !member.has_old_view() || member.has_old();
            if parent_kind != OpKind::Insert && had_row {
                let child = self.add_delete_referencing(tree, id, fk)?;
                tree.attach_before(id, child);
            }
            return Ok(());
        }
        let Some(new) = member.new_value().filter(|v| v.is_object()) else {
            return Ok(());
        };

        let kind = if parent_kind.is_insert() {
            if !child_table.crud.insert {
                return Err(MutationError::no_insert(child_table.full_name()));
            }
            if parent_kind == OpKind::Upsert {
                OpKind::Upsert
            } else {
                OpKind::Insert
            }
        } else {
            let fill = parent_fill(tree, id, fk);
            let key_known = row_key(child_table, new, &fill, &self.principal)?.is_some();
            match (member.has_old_view(), member.has_old()) {
                (true, false) if child_table.crud.insert => OpKind::Insert,
                (true, false) => return Err(MutationError::no_insert(child_table.full_name())),
                (true, true) if !child_table.crud.update => update_kind(child_table, field),
                (true, true) if key_known => OpKind::Update,
                (true, true) => OpKind::UpdateReferencing,
                (false, _) if key_known && child_table.crud.insert => OpKind::Upsert,
                (false, _) if child_table.crud.update => OpKind::UpdateReferencing,
                (false, _) => update_kind(child_table, field),
            }
        };

        let child = tree.add(kind, child_table, Some(id), Some(fk), &self.principal);
        tree.on_referencing_row(id, fk, child);
        self.process_object(tree, child, child_table, member)?;
        tree.attach_after(id, child);
        Ok(())
    }

    fn process_to_many<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        field: &Field,
        fk: &'t ForeignKeyReference,
        member: JsonInput<'_>,
    ) -> MutationResult<()> {
        let child_table: &'t Table = &fk.table;
        let Some(Value::Array(items)) = member.new_value() else {
            return Ok(());
        };
        let fill = parent_fill(tree, id, fk);
        let key_of = |v: &Value| row_key(child_table, v, &fill, &self.principal);

        if tree.node(id).kind().is_insert() {
            for item in items {
                let key = key_of(item)?;
                self.add_new_element(tree, id, fk, key, JsonInput::new_only(item))?;
            }
            return Ok(());
        }

        if !member.has_old_view() {
            let mut keep = Vec::new();
            for item in items {
                if let Some(key) = key_of(item)? {
                    keep.push(key);
                }
            }
            if child_table.crud.delete || child_table.crud.update {
                let abandon = !child_table.crud.delete;
                let stale = tree.add(
                    OpKind::ConditionalDelete { keep, abandon },
                    child_table,
                    Some(id),
                    Some(fk),
                    &self.principal,
                );
                if !abandon {
                    self.cascade_delete(tree, stale, child_table);
                }
                tree.attach_before(id, stale);
            }
            for item in items {
                let key = key_of(item)?;
                match key {
                    Some(key) if !child_table.crud.insert => {
                        let child = tree.add(update_kind(child_table, field), child_table, Some(id), Some(fk), &self.principal);
                        set_key(tree, child, &key);
                        tree.on_referencing_row(id, fk, child);
                        self.process_object(tree, child, child_table, JsonInput::new_only(item))?;
                        tree.attach_after(id, child);
                    }
                    key => self.add_new_element(tree, id, fk, key, JsonInput::new_only(item))?,
                }
            }
            return Ok(());
        }

        let diff = member.sort_old(|v| key_of(v).ok().flatten());
        for old in diff.missing_from_new.iter().copied() {
            let Some(key) = key_of(old)? else {
                continue;
            };
            let kind = if child_table.crud.delete {
                OpKind::Delete
            } else if child_table.crud.update {
                OpKind::DeleteReferencing { abandon: true }
            } else {
                return Err(MutationError::no_delete(child_table.full_name()));
            };
            let removed = tree.add(kind.clone(), child_table, Some(id), Some(fk), &self.principal);
            set_key(tree, removed, &key);
            if kind == OpKind::Delete {
                self.cascade_delete(tree, removed, child_table);
            }
            tree.attach_before(id, removed);
        }

        for pair in diff.pairs {
            let new = pair.new_value().unwrap_or(&Value::Null);
            let key = key_of(new)?;
            if pair.has_old() {
                let kind = if child_table.crud.update {
                    OpKind::Update
                } else {
                    update_kind(child_table, field)
                };
                let child = tree.add(kind, child_table, Some(id), Some(fk), &self.principal);
                set_key(tree, child, &key.unwrap_or_default());
                tree.on_referencing_row(id, fk, child);
                self.process_object(tree, child, child_table, pair)?;
                tree.attach_after(id, child);
            } else {
                self.add_new_element(tree, id, fk, key, pair)?;
            }
        }
        Ok(())
    }

    /// Insert a new array element, or upsert it when its key is explicit.
    fn add_new_element<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        fk: &'t ForeignKeyReference,
        key: Option<PrimaryKeyColumnValues>,
        input: JsonInput<'_>,
    ) -> MutationResult<()> {
        let child_table: &'t Table = &fk.table;
        if !child_table.crud.insert {
            return Err(MutationError::no_insert(child_table.full_name()));
        }
        let kind = match &key {
            Some(_) if child_table.crud.update => OpKind::Upsert,
            _ => OpKind::Insert,
        };
        let child = tree.add(kind, child_table, Some(id), Some(fk), &self.principal);
        tree.on_referencing_row(id, fk, child);
        self.process_object(tree, child, child_table, input)?;
        tree.attach_after(id, child);
        Ok(())
    }

    /// Delete (or detach) the row referencing `id` through `fk`.
    fn add_delete_referencing<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        fk: &'t ForeignKeyReference,
    ) -> MutationResult<OpId> {
        let child_table: &'t Table = &fk.table;
        if !child_table.crud.delete && !child_table.crud.update {
            return Err(MutationError::no_delete(child_table.full_name()));
        }
        let abandon = !child_table.crud.delete;
        let child = tree.add(
            OpKind::DeleteReferencing { abandon },
            child_table,
            Some(id),
            Some(fk),
            &self.principal,
        );
        if !abandon {
            self.cascade_delete(tree, child, child_table);
        }
        Ok(child)
    }

    /// Remove or detach every row referencing the rows of `id`, deepest
    /// first.
    fn cascade_delete<'t>(&self, tree: &mut OperationTree<'t>, id: OpId, table: &'t Table) {
        for field in table.fields.iter().filter(|f| f.enabled) {
            let Some(fk) = field.as_reference() else {
                continue;
            };
            if fk.unnest || !fk.is_referencing_this(table) {
                continue;
            }
            let child_table: &'t Table = &fk.table;
            if child_table.crud.delete {
                let child = tree.add(
                    OpKind::DeleteReferencing { abandon: false },
                    child_table,
                    Some(id),
                    Some(fk),
                    &self.principal,
                );
                self.cascade_delete(tree, child, child_table);
                tree.attach_before(id, child);
            } else if child_table.crud.update {
                let child = tree.add(
                    OpKind::DeleteReferencing { abandon: true },
                    child_table,
                    Some(id),
                    Some(fk),
                    &self.principal,
                );
                tree.attach_before(id, child);
            } else {
                tree.mark_undeletable(child_table);
            }
        }
    }
}

/// Kind of node for an existing nested row in a table that may not be
/// updated, or that is updated through its key.
fn update_kind(table: &Table, field: &Field) -> OpKind {
    if table.crud.update {
        OpKind::Update
    } else if field.no_check {
        OpKind::NoUpdateIgnore
    } else {
        OpKind::NoUpdateError
    }
}

fn set_key(tree: &mut OperationTree<'_>, id: OpId, key: &PrimaryKeyColumnValues) {
    for (column, value) in key.iter() {
        tree.on_value(id, column, value.clone(), false);
    }
}

/// Values of the parent's columns a child inherits through `fk`, keyed by
/// the child's column.
fn parent_fill(tree: &OperationTree<'_>, id: OpId, fk: &ForeignKeyReference) -> Vec<(String, SqlValue)> {
    fk.column_mapping
        .iter()
        .filter_map(|(this_col, other_col)| tree.value_of(id, this_col).map(|v| (other_col.clone(), v)))
        .collect()
}

/// The complete primary key of a row of `table` described by `obj`, or None
/// if some key column is unknown.
fn row_key(
    table: &Table,
    obj: &Value,
    fill: &[(String, SqlValue)],
    principal: &RowOwnership,
) -> MutationResult<Option<PrimaryKeyColumnValues>> {
    let mut key = PrimaryKeyColumnValues::new();
    for column in table.primary_key_columns() {
        let value = if column.is_row_owner {
            principal.user_id().cloned()
        } else {
            match column_value_in(table, obj, &column.name)? {
                Some(value) => Some(value),
                None => fill
                    .iter()
                    .find(|(c, _)| *c == column.name)
                    .map(|(_, v)| v.clone()),
            }
        };
        match value {
            Some(value) => key.insert(column.name.as_str(), value),
            None => return Ok(None),
        }
    }
    Ok(Some(key))
}

/// Value of `column` in an object of `table`, looking through unnested
/// references whose key supplies it.
fn column_value_in(table: &Table, obj: &Value, column: &str) -> MutationResult<Option<SqlValue>> {
    if let Some(field) = table.get_column_field(column).filter(|f| f.enabled) {
        if let (Some(col), Some(value)) = (field.as_column(), obj.get(&field.name)) {
            if !value.is_null() {
                return to_sql_value(table, col, value).map(Some);
            }
        }
    }
    for fk in table
        .fields
        .iter()
        .filter(|f| f.enabled)
        .filter_map(Field::as_reference)
        .filter(|fk| fk.unnest)
    {
        if let Some((_, other_col)) = fk.column_mapping.iter().find(|(this, _)| this == column) {
            if let Some(value) = column_value_in(&fk.table, obj, other_col)? {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

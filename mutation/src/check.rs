//! Structural validation of documents before planning.
//!
//! The walk records values into `Check` nodes of an operation tree, which
//! never execute, so key capture and propagation work exactly as they do
//! when planning.

use duality_core::{PrimaryKeyColumnValues, RowOwnership};
use duality_schema::{Column, Field, FieldKind, ForeignKeyReference, Table};
use serde_json::{Map, Value};

use crate::convert::{json_type_name, same_value, to_sql_value};
use crate::error::{MutationError, MutationResult};
use crate::ops::{OpId, OpKind, OperationTree};

/// Document keys that are never mapped to columns.
pub const RESERVED_KEYS: [&str; 2] = ["_metadata", "links"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    Insert,
    /// Every checked column must be present.
    Update,
}

/// Validate `doc` against `table`, reporting the first defect in field
/// declaration order.
pub fn check_document(
    table: &Table,
    doc: &Value,
    mode: CheckMode,
    principal: &RowOwnership,
) -> MutationResult<()> {
    if !doc.is_object() {
        return Err(MutationError::invalid_document(table.full_name(), json_type_name(doc)));
    }
    let checker = Checker { mode, principal };
    let mut tree = OperationTree::new();
    let root = tree.add(OpKind::Check, table, None, None, principal);
    tree.set_root(root);
    checker.check_object(&mut tree, root, table, doc, None)
}

struct Checker<'p> {
    mode: CheckMode,
    principal: &'p RowOwnership,
}

impl<'p> Checker<'p> {
    fn check_object<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        table: &'t Table,
        obj: &Value,
        fk_to_parent: Option<&ForeignKeyReference>,
    ) -> MutationResult<()> {
        let empty = Map::new();
        let map = obj.as_object().unwrap_or(&empty);
        let mut consumed: Vec<&'t str> = Vec::new();
        self.check_fields(tree, id, table, map, fk_to_parent, false, &mut consumed)?;

        match map
            .keys()
            .find(|k| !consumed.contains(&k.as_str()) && !RESERVED_KEYS.contains(&k.as_str()))
        {
            Some(key) => Err(MutationError::unknown_field(table.full_name(), key)),
            None => Ok(()),
        }
    }

    /// Check the fields of `table` found in `map`. Unnested tables share the
    /// map and the set of consumed keys with their parent.
    #[allow(clippy::too_many_arguments)]
    fn check_fields<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        table: &'t Table,
        map: &Map<String, Value>,
        fk_to_parent: Option<&ForeignKeyReference>,
        optional: bool,
        consumed: &mut Vec<&'t str>,
    ) -> MutationResult<()> {
        for field in table.fields.iter().filter(|f| f.enabled) {
            consumed.push(&field.name);
            match &field.kind {
                FieldKind::Column(column) => {
                    let value = map.get(&field.name);
                    self.check_column(tree, id, table, field, column, value, fk_to_parent, optional)?;
                }
                FieldKind::Reference(fk) if fk.unnest => {
                    let child_table: &'t Table = &fk.table;
                    let child = tree.add(OpKind::Check, child_table, Some(id), Some(fk), self.principal);
                    let key_omitted = child_table.primary_key_columns().iter().all(|c| {
                        child_table
                            .get_column_field(&c.name)
                            .and_then(|f| map.get(&f.name))
                            .map(Value::is_null)
                            .unwrap_or(true)
                    });
                    self.check_fields(tree, child, child_table, map, None, key_omitted, consumed)?;
                }
                FieldKind::Reference(fk) => {
                    self.check_reference(tree, id, table, field, fk, map.get(&field.name))?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_column(
        &self,
        tree: &mut OperationTree<'_>,
        id: OpId,
        table: &Table,
        field: &Field,
        column: &Column,
        value: Option<&Value>,
        fk_to_parent: Option<&ForeignKeyReference>,
        optional: bool,
    ) -> MutationResult<()> {
        match value {
            Some(Value::Null) => {
                if column.not_null && !column.is_auto_generated() && !column.is_row_owner {
                    return Err(MutationError::null_not_allowed(table.full_name(), &column.name));
                }
                Ok(())
            }
            Some(value) => {
                let value = to_sql_value(table, column, value)?;
                if !column.is_row_owner {
                    tree.on_value(id, &column.name, value, false);
                }
                Ok(())
            }
            None => {
                let from_parent = fk_to_parent
                    .map(|fk| fk.other_columns().any(|c| c == column.name))
                    .unwrap_or(false);
                let excused = optional || column.is_row_owner || from_parent;
                let is_root = tree.node(id).parent().is_none();
                let required = if column.is_primary {
                    !(excused || column.is_auto_generated() || (self.mode == CheckMode::Update && is_root))
                } else {
                    self.mode == CheckMode::Update && field.is_checked() && !excused && !column.is_generated
                };
                if required {
                    return Err(MutationError::missing_field(table.full_name(), &field.name));
                }
                Ok(())
            }
        }
    }

    fn check_reference<'t>(
        &self,
        tree: &mut OperationTree<'t>,
        id: OpId,
        table: &'t Table,
        field: &Field,
        fk: &'t ForeignKeyReference,
        value: Option<&Value>,
    ) -> MutationResult<()> {
        let child_table: &'t Table = &fk.table;
        let wrong_type = |expected: &str, actual: &Value| {
            MutationError::invalid_type(table.full_name(), &field.name, expected, json_type_name(actual))
        };

        match value {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Array(items)) if fk.to_many => {
                let mut seen: Vec<PrimaryKeyColumnValues> = Vec::new();
                for item in items {
                    if !item.is_object() {
                        return Err(wrong_type("object", item));
                    }
                    let child = tree.add(OpKind::Check, child_table, Some(id), Some(fk), self.principal);
                    tree.on_referencing_row(id, fk, child);
                    self.check_object(tree, child, child_table, item, Some(fk))?;
                    check_parent_key(tree, id, child, fk)?;

                    let node = tree.node(child);
                    if node.has_complete_key() {
                        let key = node.primary_key().clone();
                        if seen.contains(&key) {
                            return Err(MutationError::duplicate_key(
                                child_table.full_name(),
                                key.to_path_segment(),
                            ));
                        }
                        seen.push(key);
                    }
                }
                Ok(())
            }
            Some(other) if fk.to_many => Err(wrong_type("array", other)),
            Some(obj @ Value::Object(_)) => {
                let child = tree.add(OpKind::Check, child_table, Some(id), Some(fk), self.principal);
                if fk.is_referencing_this(table) {
                    self.check_object(tree, child, child_table, obj, Some(fk))?;
                    check_parent_key(tree, id, child, fk)
                } else {
                    self.check_object(tree, child, child_table, obj, None)
                }
            }
            Some(other) => Err(wrong_type("object", other)),
        }
    }
}

/// Foreign key columns a nested row supplies must match the parent's key.
fn check_parent_key(
    tree: &OperationTree<'_>,
    parent: OpId,
    child: OpId,
    fk: &ForeignKeyReference,
) -> MutationResult<()> {
    for (this_col, other_col) in &fk.column_mapping {
        let parent_value = tree.value_of(parent, this_col);
        let child_value = tree.node(child).value(other_col).filter(|v| !v.is_null());
        if let (Some(expected), Some(actual)) = (parent_value, child_value) {
            if !same_value(&expected, actual) {
                return Err(MutationError::foreign_key_mismatch(fk.table.full_name(), other_col));
            }
        }
    }
    Ok(())
}

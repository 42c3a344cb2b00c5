//! JSON query builder.
//!
//! Composes a single SELECT whose first output column is the whole nested
//! document of a row, built with `JSON_OBJECT`/`JSON_ARRAYAGG` and
//! correlated subqueries. The root table is aliased `t0`; nested tables get
//! `t1`, `t2`, ... in walk order.
//!
//! Array elements are aggregated in primary key order so that the same rows
//! always produce the same document.

use duality_core::{and_all, column_ref, PrimaryKeyColumnValues, RowOwnership, SqlString, SqlValue};
use duality_schema::{Column, ColumnType, FieldKind, ForeignKeyReference, Table};

use crate::filter::ObjectFieldFilter;

/// Alias of the root table in every generated statement.
pub const ROOT_ALIAS: &str = "t0";

/// Row window for list reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub limit: u64,
    pub offset: u64,
}

pub struct JsonQueryBuilder<'a> {
    filter: &'a ObjectFieldFilter,
    ownership: &'a RowOwnership,
    encode_bigints_as_strings: bool,
    lock: bool,
    next_alias: usize,
}

impl<'a> JsonQueryBuilder<'a> {
    /// `ownership` carries the principal; it is bound to each table's own
    /// owner column while walking.
    pub fn new(filter: &'a ObjectFieldFilter, ownership: &'a RowOwnership) -> Self {
        Self {
            filter,
            ownership,
            encode_bigints_as_strings: false,
            lock: false,
            next_alias: 0,
        }
    }

    pub fn encode_bigints_as_strings(mut self, enabled: bool) -> Self {
        self.encode_bigints_as_strings = enabled;
        self
    }

    /// Lock the selected rows with `FOR UPDATE NOWAIT`.
    pub fn for_update(mut self) -> Self {
        self.lock = true;
        self
    }

    /// Select the document of the row identified by `pk`.
    pub fn select_one(&mut self, table: &Table, pk: &PrimaryKeyColumnValues) -> SqlString {
        let condition = if pk.is_empty() {
            None
        } else {
            Some(pk.to_condition(Some(ROOT_ALIAS)))
        };
        self.select(table, condition, None)
    }

    /// Select documents of every row matching `filter`, which refers to the
    /// root table through the alias `t0`.
    pub fn select_many(
        &mut self,
        table: &Table,
        filter: Option<SqlString>,
        limit: Option<Limit>,
    ) -> SqlString {
        self.select(table, filter, limit)
    }

    fn select(&mut self, table: &Table, filter: Option<SqlString>, limit: Option<Limit>) -> SqlString {
        self.next_alias = 0;
        let alias = self.alias();
        let mut joins = Vec::new();
        let object = self.object(table, &alias, "", &mut joins);

        let mut stmt = SqlString::new("SELECT ?").sql(&object);
        for column in table.primary_key_columns() {
            stmt.append_sql(&SqlString::new(", ?").sql(&key_projection(&alias, column)));
        }
        stmt.append_sql(&SqlString::new(" FROM !.! !").ident(&table.schema).ident(&table.table).ident(&alias));
        for join in &joins {
            stmt.append_sql(&SqlString::new(" ?").sql(join));
        }

        let ownership = self.ownership_for(table);
        if let Some(condition) = ownership.and_filter(Some(&alias), filter) {
            stmt.append_sql(&SqlString::new(" WHERE ?").sql(&condition));
        }
        if limit.is_some() {
            let order = SqlString::join(
                table
                    .primary_key_columns()
                    .into_iter()
                    .map(|c| column_ref(Some(&alias), &c.name)),
                ", ",
            );
            stmt.append_sql(&SqlString::new(" ORDER BY ?").sql(&order));
        }
        if let Some(limit) = limit {
            stmt.append_sql(
                &SqlString::new(" LIMIT ? OFFSET ?")
                    .value(limit.limit)
                    .value(limit.offset),
            );
        }
        if self.lock {
            stmt.append_sql(&SqlString::new(" FOR UPDATE NOWAIT"));
        }
        stmt
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn ownership_for(&self, table: &Table) -> RowOwnership {
        self.ownership
            .for_column(table.row_owner_column().map(|c| c.name.as_str()).unwrap_or(""))
    }

    /// `JSON_OBJECT(...)` for the row of `table` at `alias`. Unnested
    /// references add LEFT JOINs to `joins`.
    fn object(&mut self, table: &Table, alias: &str, prefix: &str, joins: &mut Vec<SqlString>) -> SqlString {
        let mut pairs = Vec::new();
        self.members(table, alias, prefix, joins, &mut pairs);
        SqlString::new("JSON_OBJECT(?)").sql(&SqlString::join(pairs, ", "))
    }

    fn members(
        &mut self,
        table: &Table,
        alias: &str,
        prefix: &str,
        joins: &mut Vec<SqlString>,
        pairs: &mut Vec<SqlString>,
    ) {
        for field in table.fields.iter().filter(|f| f.enabled) {
            match &field.kind {
                FieldKind::Reference(reference) if reference.unnest => {
                    let child_alias = self.alias();
                    let on = and_all([
                        Some(join_condition(reference, alias, &child_alias)),
                        self.ownership_for(&reference.table).predicate(Some(&child_alias)),
                    ])
                    .unwrap_or_else(|| SqlString::new("TRUE"));
                    joins.push(
                        SqlString::new("LEFT JOIN !.! ! ON ?")
                            .ident(&reference.table.schema)
                            .ident(&reference.table.table)
                            .ident(&child_alias)
                            .sql(&on),
                    );
                    self.members(&reference.table, &child_alias, prefix, joins, pairs);
                }
                FieldKind::Reference(reference) => {
                    if !self.filter.is_included(prefix, &field.name) {
                        continue;
                    }
                    let path = join_path(prefix, &field.name);
                    let nested = self.nested(reference, alias, &path);
                    pairs.push(SqlString::new("?, ?").value(field.name.as_str()).sql(&nested));
                }
                FieldKind::Column(column) => {
                    if !self.filter.is_included(prefix, &field.name) {
                        continue;
                    }
                    let value = self.projection(alias, column);
                    pairs.push(SqlString::new("?, ?").value(field.name.as_str()).sql(&value));
                }
            }
        }
    }

    fn nested(&mut self, reference: &ForeignKeyReference, parent_alias: &str, path: &str) -> SqlString {
        let child = &reference.table;
        let alias = self.alias();
        let mut joins = Vec::new();
        let object = self.object(child, &alias, path, &mut joins);

        let mut from = SqlString::new("FROM !.! !").ident(&child.schema).ident(&child.table).ident(&alias);
        for join in &joins {
            from.append_sql(&SqlString::new(" ?").sql(join));
        }
        let condition = self
            .ownership_for(child)
            .and_filter(Some(&alias), Some(join_condition(reference, parent_alias, &alias)))
            .unwrap_or_else(|| SqlString::new("TRUE"));

        if reference.to_many {
            let keys = child.primary_key_columns();
            let order = if keys.is_empty() {
                SqlString::new("NULL")
            } else {
                SqlString::join(keys.iter().map(|c| column_ref(Some(&alias), &c.name)), ", ")
            };
            // Without a LIMIT MySQL may drop the ORDER BY of a derived table.
            SqlString::new(
                "COALESCE((SELECT JSON_ARRAYAGG(`j`.`doc`) FROM \
                 (SELECT ? AS `doc` ? WHERE ? ORDER BY ? LIMIT 18446744073709551615) `j`), JSON_ARRAY())",
            )
            .sql(&object)
            .sql(&from)
            .sql(&condition)
            .sql(&order)
        } else {
            SqlString::new("COALESCE((SELECT ? ? WHERE ? LIMIT 1), JSON_OBJECT())")
                .sql(&object)
                .sql(&from)
                .sql(&condition)
        }
    }

    /// Type specific projection of a column value into JSON.
    fn projection(&self, alias: &str, column: &Column) -> SqlString {
        let col = column_ref(Some(alias), &column.name);
        match column.column_type {
            ColumnType::Boolean => SqlString::new(
                "IF(? IS NULL, NULL, IF(? IS TRUE, CAST(TRUE AS JSON), CAST(FALSE AS JSON)))",
            )
            .sql(&col)
            .sql(&col),
            ColumnType::Binary => SqlString::new("TO_BASE64(?)").sql(&col),
            ColumnType::Geometry => SqlString::new("ST_AsGeoJSON(?)").sql(&col),
            ColumnType::Integer if self.encode_bigints_as_strings && column.is_bigint() => {
                SqlString::new("CAST(? AS CHAR)").sql(&col)
            }
            ColumnType::Double if self.encode_bigints_as_strings => {
                SqlString::new("CAST(? AS CHAR)").sql(&col)
            }
            _ => col,
        }
    }
}

/// Plain text projection of a key column, used to build resource links.
fn key_projection(alias: &str, column: &Column) -> SqlString {
    let col = column_ref(Some(alias), &column.name);
    match column.column_type {
        ColumnType::Binary => SqlString::new("HEX(?)").sql(&col),
        _ => col,
    }
}

/// `child.c1 = parent.p1 AND ...` for a reference mapping.
fn join_condition(reference: &ForeignKeyReference, parent_alias: &str, child_alias: &str) -> SqlString {
    SqlString::join(
        reference.column_mapping.iter().map(|(this_col, other_col)| {
            SqlString::new("? = ?")
                .sql(&column_ref(Some(child_alias), other_col))
                .sql(&column_ref(Some(parent_alias), this_col))
        }),
        " AND ",
    )
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Literal for a key column value read back as text.
pub fn key_value(column: &Column, text: &str) -> SqlValue {
    match column.column_type {
        ColumnType::Integer => text
            .parse::<i64>()
            .map(SqlValue::Int)
            .or_else(|_| text.parse::<u64>().map(SqlValue::UInt))
            .unwrap_or_else(|_| SqlValue::String(text.to_string())),
        ColumnType::Binary => hex::decode(text)
            .map(SqlValue::Binary)
            .unwrap_or_else(|_| SqlValue::String(text.to_string())),
        _ => SqlValue::String(text.to_string()),
    }
}

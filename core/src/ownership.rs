//! Row ownership predicates.
//!
//! A table may declare a row-owner column. Every statement that reads or
//! modifies such a table is restricted to rows the current principal may see:
//! rows it owns, rows owned by users reporting to it (user hierarchy), or
//! unowned rows shared with one of its groups (group ownership).

use crate::sql::{and_all, column_ref, SqlString, SqlValue};

/// Comparison applied to a group's hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
}

impl MatchOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            MatchOp::Less => "<",
            MatchOp::LessOrEqual => "<=",
            MatchOp::Equal => "=",
            MatchOp::GreaterOrEqual => ">=",
            MatchOp::Greater => ">",
        }
    }
}

/// Rows whose `column` holds a group the principal belongs to, directly or
/// through the group hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOwnership {
    pub column: String,
    pub hierarchy_id: SqlValue,
    pub level: u32,
    pub op: MatchOp,
}

impl GroupOwnership {
    pub fn new(column: impl Into<String>, hierarchy_id: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            hierarchy_id: hierarchy_id.into(),
            level: 0,
            op: MatchOp::GreaterOrEqual,
        }
    }

    pub fn with_level(mut self, op: MatchOp, level: u32) -> Self {
        self.op = op;
        self.level = level;
        self
    }

    fn predicate(&self, alias: Option<&str>, user_id: &SqlValue, tables: &MetadataTables) -> SqlString {
        let mut pred = SqlString::new(
            "? IN (WITH RECURSIVE `grp` (`id`, `lvl`) AS (\
             SELECT `ug`.!, 0 FROM !.! `ug` WHERE `ug`.! = ? \
             UNION ALL SELECT `h`.!, `grp`.`lvl` + 1 FROM !.! `h` JOIN `grp` ON `h`.! = `grp`.`id` \
             WHERE `h`.! = ?) \
             SELECT `grp`.`id` FROM `grp` WHERE `grp`.`lvl` ",
        )
        .sql(&column_ref(alias, &self.column))
        .ident("user_group_id")
        .ident(&tables.schema)
        .ident(&tables.user_has_group)
        .ident("user_id")
        .value(user_id.clone())
        .ident("parent_group_id")
        .ident(&tables.schema)
        .ident(&tables.group_hierarchy)
        .ident("user_group_id")
        .ident("group_hierarchy_type_id")
        .value(self.hierarchy_id.clone());
        pred.append(self.op.as_sql()).append(" ?)");
        pred.value(SqlValue::Int(self.level as i64))
    }
}

/// Names of the metadata tables holding users, groups and their hierarchies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTables {
    pub schema: String,
    pub user_hierarchy: String,
    pub user_has_group: String,
    pub group_hierarchy: String,
}

impl Default for MetadataTables {
    fn default() -> Self {
        Self {
            schema: "mysql_rest_service_metadata".to_string(),
            user_hierarchy: "mrs_user_hierarchy".to_string(),
            user_has_group: "mrs_user_has_group".to_string(),
            group_hierarchy: "mrs_user_group_hierarchy".to_string(),
        }
    }
}

/// Ownership restriction for one table and one principal.
///
/// An empty owner column disables the restriction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowOwnership {
    owner_column: String,
    user_id: Option<SqlValue>,
    user_hierarchy: bool,
    group_ownership: Vec<GroupOwnership>,
    tables: MetadataTables,
}

impl RowOwnership {
    /// Ownership context for a principal; bind it to a table with
    /// [`RowOwnership::for_column`].
    pub fn new(user_id: Option<SqlValue>) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    /// No restriction at all.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_user_hierarchy(mut self) -> Self {
        self.user_hierarchy = true;
        self
    }

    pub fn with_group(mut self, group: GroupOwnership) -> Self {
        self.group_ownership.push(group);
        self
    }

    pub fn with_metadata_tables(mut self, tables: MetadataTables) -> Self {
        self.tables = tables;
        self
    }

    /// The same principal applied to a table whose owner column is `column`.
    pub fn for_column(&self, column: &str) -> Self {
        Self {
            owner_column: column.to_string(),
            ..self.clone()
        }
    }

    pub fn enabled(&self) -> bool {
        !self.owner_column.is_empty()
    }

    pub fn owner_column(&self) -> Option<&str> {
        if self.enabled() {
            Some(&self.owner_column)
        } else {
            None
        }
    }

    pub fn user_id(&self) -> Option<&SqlValue> {
        self.user_id.as_ref()
    }

    /// Value stored in the owner column on INSERT.
    pub fn insert_value(&self) -> Option<SqlValue> {
        self.owner_column()
            .map(|_| self.user_id.clone().unwrap_or(SqlValue::Null))
    }

    /// Boolean predicate restricting rows of the table, or None when disabled.
    pub fn predicate(&self, alias: Option<&str>) -> Option<SqlString> {
        let owner = column_ref(alias, self.owner_column()?);

        let Some(user_id) = &self.user_id else {
            return Some(SqlString::new("? IS NULL").sql(&owner));
        };

        let user_pred = if self.user_hierarchy {
            SqlString::new(
                "? IN (WITH RECURSIVE `usr` (`id`) AS (SELECT ? \
                 UNION SELECT `h`.! FROM !.! `h` JOIN `usr` ON `h`.! = `usr`.`id`) \
                 SELECT `usr`.`id` FROM `usr`)",
            )
            .sql(&owner)
            .value(user_id.clone())
            .ident("user_id")
            .ident(&self.tables.schema)
            .ident(&self.tables.user_hierarchy)
            .ident("reporting_to_user_id")
        } else {
            SqlString::new("? = ?").sql(&owner).value(user_id.clone())
        };

        if self.group_ownership.is_empty() {
            return Some(user_pred);
        }

        let groups = SqlString::join(
            self.group_ownership
                .iter()
                .map(|g| g.predicate(alias, user_id, &self.tables).parenthesized()),
            " OR ",
        );
        Some(
            SqlString::new("(? OR (? IS NULL AND (?)))")
                .sql(&user_pred)
                .sql(&owner)
                .sql(&groups),
        )
    }

    /// AND the ownership predicate with a caller supplied condition.
    pub fn and_filter(&self, alias: Option<&str>, filter: Option<SqlString>) -> Option<SqlString> {
        and_all([filter, self.predicate(alias)])
    }
}

//! Primary key values of a single row.

use indexmap::IndexMap;

use crate::sql::{column_ref, SqlString, SqlValue};

/// Ordered mapping of primary key column name to SQL literal.
///
/// The mapping may be partial while a row's key is still being generated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryKeyColumnValues {
    values: IndexMap<String, SqlValue>,
}

impl PrimaryKeyColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value. Setting a column twice keeps the last value.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.values.insert(column.into(), value);
    }

    /// Builder-style `insert`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// True if every listed column has a value.
    pub fn covers<'c>(&self, columns: impl IntoIterator<Item = &'c str>) -> bool {
        columns.into_iter().all(|c| self.values.contains_key(c))
    }

    /// `col1 = v1 AND col2 = v2 ...`, optionally qualified by a table alias.
    pub fn to_condition(&self, alias: Option<&str>) -> SqlString {
        SqlString::join(
            self.values
                .iter()
                .map(|(column, value)| {
                    SqlString::new("? = ?")
                        .sql(&column_ref(alias, column))
                        .value(value.clone())
                }),
            " AND ",
        )
    }

    /// `(v1, v2, ...)` in column order.
    pub fn to_tuple(&self) -> SqlString {
        let values = SqlString::join(
            self.values.values().map(|v| SqlString::new("?").value(v.clone())),
            ", ",
        );
        values.parenthesized()
    }

    /// Comma separated plain values, used for resource links.
    pub fn to_path_segment(&self) -> String {
        self.values
            .values()
            .map(|v| v.to_plain())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<K: Into<String>> FromIterator<(K, SqlValue)> for PrimaryKeyColumnValues {
    fn from_iter<T: IntoIterator<Item = (K, SqlValue)>>(iter: T) -> Self {
        let mut pk = Self::new();
        for (k, v) in iter {
            pk.insert(k, v);
        }
        pk
    }
}

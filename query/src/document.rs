//! Reading documents through a SQL session.

use duality_core::{PrimaryKeyColumnValues, Row, RowOwnership, SqlSession, SqlString};
use duality_schema::Table;
use serde_json::{json, Value};
use tracing::debug;

use crate::builder::{key_value, JsonQueryBuilder, Limit};
use crate::error::{QueryError, QueryResult};
use crate::etag::{compute_checksum, embed_etag};
use crate::filter::ObjectFieldFilter;

/// How documents are shaped when read.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub filter: ObjectFieldFilter,
    /// Add `_metadata.etag`.
    pub etag: bool,
    pub encode_bigints_as_strings: bool,
    /// Add `links` with a self link under this base URL.
    pub links_base_url: Option<String>,
}

/// A document read from the database together with its primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub primary_key: PrimaryKeyColumnValues,
    pub value: Value,
}

pub struct DocumentReader<'a> {
    table: &'a Table,
    ownership: &'a RowOwnership,
    options: &'a ReadOptions,
}

impl<'a> DocumentReader<'a> {
    pub fn new(table: &'a Table, ownership: &'a RowOwnership, options: &'a ReadOptions) -> Self {
        Self {
            table,
            ownership,
            options,
        }
    }

    /// Read the row identified by `pk`, or None if it does not exist or is
    /// not visible to the principal.
    pub fn read_one(
        &self,
        session: &mut dyn SqlSession,
        pk: &PrimaryKeyColumnValues,
    ) -> QueryResult<Option<Document>> {
        let all = ObjectFieldFilter::all();
        let mut builder = JsonQueryBuilder::new(self.read_filter(&all), self.ownership)
            .encode_bigints_as_strings(self.options.encode_bigints_as_strings);
        let stmt = builder.select_one(self.table, pk);
        debug!(table = %self.table.full_name(), sql = %stmt, "read one");

        match session.query_one(&stmt)? {
            Some(row) => self.decorate(row).map(Some),
            None => Ok(None),
        }
    }

    /// Read every visible row matching `filter`, which refers to the root
    /// table as `t0`.
    pub fn read_many(
        &self,
        session: &mut dyn SqlSession,
        filter: Option<SqlString>,
        limit: Option<Limit>,
    ) -> QueryResult<Vec<Document>> {
        let all = ObjectFieldFilter::all();
        let mut builder = JsonQueryBuilder::new(self.read_filter(&all), self.ownership)
            .encode_bigints_as_strings(self.options.encode_bigints_as_strings);
        let stmt = builder.select_many(self.table, filter, limit);
        debug!(table = %self.table.full_name(), sql = %stmt, "read many");

        let mut rows = Vec::new();
        session.query(&stmt, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        rows.into_iter().map(|row| self.decorate(row)).collect()
    }

    /// Read and lock the current state of a row with `FOR UPDATE NOWAIT`.
    ///
    /// The document is neither filtered nor decorated, so its checksum can
    /// be compared with a client supplied etag.
    pub fn lock_current(
        &self,
        session: &mut dyn SqlSession,
        pk: &PrimaryKeyColumnValues,
    ) -> QueryResult<Option<Value>> {
        let all = ObjectFieldFilter::all();
        let mut builder = JsonQueryBuilder::new(&all, self.ownership)
            .encode_bigints_as_strings(self.options.encode_bigints_as_strings)
            .for_update();
        let stmt = builder.select_one(self.table, pk);
        debug!(table = %self.table.full_name(), sql = %stmt, "lock current row");

        match session.query_one(&stmt)? {
            Some(row) => self.parse(row.first().cloned().flatten()).map(Some),
            None => Ok(None),
        }
    }

    /// Checksums cover the unfiltered document, so with etags enabled the
    /// filter is applied in memory after reading.
    fn read_filter<'f>(&'f self, all: &'f ObjectFieldFilter) -> &'f ObjectFieldFilter {
        if self.options.etag {
            all
        } else {
            &self.options.filter
        }
    }

    fn parse(&self, text: Option<String>) -> QueryResult<Value> {
        let text = text.ok_or_else(|| {
            QueryError::invalid_document(self.table.full_name(), "document column is NULL")
        })?;
        serde_json::from_str(&text)
            .map_err(|e| QueryError::invalid_document(self.table.full_name(), e.to_string()))
    }

    fn decorate(&self, mut row: Row) -> QueryResult<Document> {
        let keys = row.split_off(1.min(row.len()));
        let mut value = self.parse(row.into_iter().next().flatten())?;

        let mut primary_key = PrimaryKeyColumnValues::new();
        for (column, text) in self.table.primary_key_columns().into_iter().zip(keys) {
            if let Some(text) = text {
                primary_key.insert(column.name.clone(), key_value(column, &text));
            }
        }

        if self.options.etag {
            let etag = compute_checksum(self.table, &value);
            self.options.filter.prune(&mut value);
            embed_etag(&mut value, &etag);
        }
        if let (Some(base), Value::Object(members)) = (&self.options.links_base_url, &mut value) {
            let href = format!("{}/{}", base.trim_end_matches('/'), primary_key.to_path_segment());
            members.insert("links".to_string(), json!([{"rel": "self", "href": href}]));
        }

        Ok(Document { primary_key, value })
    }
}

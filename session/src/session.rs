//! Per-request duality session.

use duality_core::{PrimaryKeyColumnValues, RowOwnership, SqlSession, SqlString};
use duality_mutation::{
    check_document, CheckMode, ExecContext, MutationError, MutationOutcome, Planner, RandomUuid,
    UuidGenerator,
};
use duality_query::{
    compute_checksum, extract_etag, Document, DocumentReader, Limit, ObjectFieldFilter,
    ReadOptions,
};
use duality_schema::{validate, Table};
use duality_transaction::Transaction;
use serde_json::Value;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// Reads and writes duality view documents for one principal.
///
/// Every write runs in its own transaction that is committed only after the
/// whole operation tree succeeded.
pub struct DualitySession<'s> {
    session: &'s mut dyn SqlSession,
    config: SessionConfig,
    ownership: RowOwnership,
    filter: ObjectFieldFilter,
    uuid: Box<dyn UuidGenerator + 's>,
}

impl<'s> DualitySession<'s> {
    pub fn new(session: &'s mut dyn SqlSession, config: SessionConfig, ownership: RowOwnership) -> Self {
        Self {
            session,
            config,
            ownership,
            filter: ObjectFieldFilter::all(),
            uuid: Box::new(RandomUuid),
        }
    }

    /// Restrict the fields returned by reads.
    pub fn with_field_filter(mut self, filter: ObjectFieldFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the source of reverse-UUID keys.
    pub fn with_uuid_generator(mut self, uuid: impl UuidGenerator + 's) -> Self {
        self.uuid = Box::new(uuid);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ownership(&self) -> &RowOwnership {
        &self.ownership
    }

    /// Read one document, or None when the row is missing or not visible.
    #[tracing::instrument(level = "debug", skip(self, table, pk), fields(table = %table.full_name()))]
    pub fn get(&mut self, table: &Table, pk: &PrimaryKeyColumnValues) -> SessionResult<Option<Document>> {
        validate(table)?;
        let options = self.read_options();
        let reader = DocumentReader::new(table, &self.ownership, &options);
        Ok(reader.read_one(&mut *self.session, pk)?)
    }

    /// Read the documents matching `filter`, which refers to the root table
    /// as `t0`. `offset` only applies when a read limit is configured.
    #[tracing::instrument(level = "debug", skip(self, table, filter), fields(table = %table.full_name()))]
    pub fn list(
        &mut self,
        table: &Table,
        filter: Option<SqlString>,
        offset: u64,
    ) -> SessionResult<Vec<Document>> {
        validate(table)?;
        let options = self.read_options();
        let limit = self.config.read_limit.map(|limit| Limit { limit, offset });
        let reader = DocumentReader::new(table, &self.ownership, &options);
        Ok(reader.read_many(&mut *self.session, filter, limit)?)
    }

    /// Insert a document with all of its nested rows.
    #[tracing::instrument(level = "debug", skip(self, table, doc), fields(table = %table.full_name()))]
    pub fn insert(&mut self, table: &Table, doc: &Value) -> SessionResult<MutationOutcome> {
        validate(table)?;
        check_document(table, doc, CheckMode::Insert, &self.ownership)?;
        let planner = Planner::new(self.ownership.clone());
        let mut tree = planner.plan_insert(table, doc)?;

        let mut tx = Transaction::begin(&mut *self.session, self.config.consistent_snapshot)?;
        let outcome = tree.run(&mut ExecContext::new(tx.session()?, &*self.uuid))?;
        tx.commit()?;

        debug!(primary_key = %outcome.primary_key.to_path_segment(), rows = outcome.affected_rows, "inserted");
        Ok(outcome)
    }

    /// Make the row identified by `pk` match `doc`.
    ///
    /// The current row is locked first. When etags are enabled and the
    /// document carries one, it must match the checksum of the current row.
    #[tracing::instrument(level = "debug", skip(self, table, pk, doc), fields(table = %table.full_name()))]
    pub fn update(
        &mut self,
        table: &Table,
        pk: &PrimaryKeyColumnValues,
        doc: &Value,
    ) -> SessionResult<MutationOutcome> {
        validate(table)?;
        check_document(table, doc, CheckMode::Update, &self.ownership)?;
        let options = self.read_options();
        let reader = DocumentReader::new(table, &self.ownership, &options);
        let planner = Planner::new(self.ownership.clone());

        let mut tx = Transaction::begin(&mut *self.session, self.config.consistent_snapshot)?;
        let current = reader.lock_current(tx.session()?, pk)?;
        let mut tree = match &current {
            Some(current) => {
                if self.config.etag {
                    check_etag(table, doc, current)?;
                }
                planner.plan_update(table, pk, doc, Some(current), false)?
            }
            None if self.config.upsert_on_update => planner.plan_update(table, pk, doc, None, true)?,
            None => return Err(MutationError::row_not_found(table.full_name()).into()),
        };
        let outcome = tree.run(&mut ExecContext::new(tx.session()?, &*self.uuid))?;
        tx.commit()?;

        debug!(rows = outcome.affected_rows, upsert = current.is_none(), "updated");
        Ok(outcome)
    }

    /// Delete the row identified by `pk` and the rows it owns.
    #[tracing::instrument(level = "debug", skip(self, table, pk), fields(table = %table.full_name()))]
    pub fn delete(&mut self, table: &Table, pk: &PrimaryKeyColumnValues) -> SessionResult<MutationOutcome> {
        let options = self.read_options();
        let reader = DocumentReader::new(table, &self.ownership, &options);
        let planner = Planner::new(self.ownership.clone());
        let mut tree = planner.plan_delete(table, pk)?;

        let mut tx = Transaction::begin(&mut *self.session, self.config.consistent_snapshot)?;
        if reader.lock_current(tx.session()?, pk)?.is_none() {
            return Err(MutationError::row_not_found(table.full_name()).into());
        }
        let outcome = tree.run(&mut ExecContext::new(tx.session()?, &*self.uuid))?;
        tx.commit()?;

        debug!(rows = outcome.affected_rows, "deleted");
        Ok(outcome)
    }

    /// Delete every visible row matching `filter`, written against the
    /// unaliased root table, and the rows they own.
    #[tracing::instrument(level = "debug", skip(self, table, filter), fields(table = %table.full_name()))]
    pub fn delete_where(&mut self, table: &Table, filter: SqlString) -> SessionResult<MutationOutcome> {
        let planner = Planner::new(self.ownership.clone());
        let mut tree = planner.plan_delete_where(table, filter)?;

        let mut tx = Transaction::begin(&mut *self.session, self.config.consistent_snapshot)?;
        let outcome = tree.run(&mut ExecContext::new(tx.session()?, &*self.uuid))?;
        tx.commit()?;

        debug!(rows = outcome.affected_rows, "deleted matching rows");
        Ok(outcome)
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            filter: self.filter.clone(),
            etag: self.config.etag,
            encode_bigints_as_strings: self.config.encode_bigints_as_strings,
            links_base_url: self.config.links_base_url.clone(),
        }
    }
}

/// A document without an etag is applied unconditionally.
fn check_etag(table: &Table, doc: &Value, current: &Value) -> SessionResult<()> {
    let Some(expected) = extract_etag(doc) else {
        return Ok(());
    };
    let actual = compute_checksum(table, current);
    if expected != actual {
        return Err(SessionError::precondition_failed(expected, actual));
    }
    Ok(())
}

//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;

use duality_core::{Row, SqlResult, SqlSession, SqlString};

/// Records every statement; replies to queries from a queue.
#[derive(Debug, Default)]
pub struct RecordingSession {
    statements: Vec<String>,
    rows: VecDeque<SqlResult<Option<Row>>>,
    executes: VecDeque<SqlResult<u64>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `query_one` returns this row.
    pub fn reply_row(mut self, row: Row) -> Self {
        self.rows.push_back(Ok(Some(row)));
        self
    }

    /// Next `query_one` finds nothing.
    pub fn reply_no_row(mut self) -> Self {
        self.rows.push_back(Ok(None));
        self
    }

    /// Next `execute` returns this result.
    pub fn reply_execute(mut self, result: SqlResult<u64>) -> Self {
        self.executes.push_back(result);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.clone()
    }
}

impl SqlSession for RecordingSession {
    fn execute(&mut self, stmt: &SqlString) -> SqlResult<u64> {
        self.statements.push(stmt.to_string());
        self.executes.pop_front().unwrap_or(Ok(1))
    }

    fn query_one(&mut self, stmt: &SqlString) -> SqlResult<Option<Row>> {
        self.statements.push(stmt.to_string());
        self.rows.pop_front().unwrap_or(Ok(None))
    }

    fn query(
        &mut self,
        stmt: &SqlString,
        _on_row: &mut dyn FnMut(Row) -> SqlResult<()>,
    ) -> SqlResult<()> {
        self.statements.push(stmt.to_string());
        Ok(())
    }
}

//! SQL execution port.

use crate::error::SqlResult;
use crate::sql::SqlString;

/// A result row; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// A connection to the database, exclusively owned for the duration of one
/// request.
///
/// Every call blocks until the server answered. Transaction control has
/// default implementations on top of `execute`.
pub trait SqlSession {
    /// Execute a statement and return the number of affected rows.
    fn execute(&mut self, stmt: &SqlString) -> SqlResult<u64>;

    /// Run a query and return its first row, if any.
    fn query_one(&mut self, stmt: &SqlString) -> SqlResult<Option<Row>>;

    /// Run a query and stream every row to `on_row`.
    fn query(
        &mut self,
        stmt: &SqlString,
        on_row: &mut dyn FnMut(Row) -> SqlResult<()>,
    ) -> SqlResult<()>;

    /// Start a transaction.
    fn begin(&mut self, consistent_snapshot: bool) -> SqlResult<()> {
        let stmt = if consistent_snapshot {
            SqlString::new("START TRANSACTION WITH CONSISTENT SNAPSHOT")
        } else {
            SqlString::new("START TRANSACTION")
        };
        self.execute(&stmt).map(|_| ())
    }

    fn commit(&mut self) -> SqlResult<()> {
        self.execute(&SqlString::new("COMMIT")).map(|_| ())
    }

    fn rollback(&mut self) -> SqlResult<()> {
        self.execute(&SqlString::new("ROLLBACK")).map(|_| ())
    }
}

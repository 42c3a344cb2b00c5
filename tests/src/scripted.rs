//! Scripted SQL session.

use duality_core::{Row, SqlError, SqlResult, SqlSession, SqlString};

/// What the database answers to a statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    Error(SqlError),
}

impl Reply {
    /// A single row of text values.
    pub fn row(values: &[&str]) -> Self {
        Self::Rows(vec![values.iter().map(|v| Some(v.to_string())).collect()])
    }

    /// A document row as returned by the document query: the JSON text
    /// followed by the primary key values.
    pub fn document(doc: &serde_json::Value, keys: &[&str]) -> Self {
        let mut row = vec![Some(doc.to_string())];
        row.extend(keys.iter().map(|k| Some(k.to_string())));
        Self::Rows(vec![row])
    }

    pub fn no_rows() -> Self {
        Self::Rows(Vec::new())
    }
}

#[derive(Debug)]
struct Rule {
    needle: String,
    reply: Reply,
    once: bool,
    used: bool,
}

/// Records every statement and answers from rules matched by substring.
///
/// Rules are tried in the order they were added. A `once` rule is consumed
/// by its first match. Unmatched writes affect one row; unmatched queries
/// return nothing.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    rules: Vec<Rule>,
    statements: Vec<String>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every statement containing `needle` with `reply`.
    pub fn on(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply,
            once: false,
            used: false,
        });
        self
    }

    /// Answer the next statement containing `needle` with `reply`.
    pub fn once(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply,
            once: true,
            used: false,
        });
        self
    }

    /// Every statement in execution order.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Statements other than transaction control and reads.
    pub fn writes(&self) -> Vec<&str> {
        self.statements
            .iter()
            .map(String::as_str)
            .filter(|s| !is_transaction_control(s) && !s.starts_with("SELECT"))
            .collect()
    }

    /// Number of statements containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.statements.iter().filter(|s| s.contains(needle)).count()
    }

    fn record(&mut self, stmt: &SqlString) -> Option<Reply> {
        let text = stmt.to_string();
        let reply = self
            .rules
            .iter_mut()
            .find(|rule| !rule.used && text.contains(&rule.needle))
            .map(|rule| {
                rule.used = rule.once;
                rule.reply.clone()
            });
        self.statements.push(text);
        reply
    }
}

fn is_transaction_control(stmt: &str) -> bool {
    stmt.starts_with("START TRANSACTION") || stmt == "COMMIT" || stmt == "ROLLBACK"
}

impl SqlSession for ScriptedSession {
    fn execute(&mut self, stmt: &SqlString) -> SqlResult<u64> {
        match self.record(stmt) {
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Rows(rows)) => Ok(rows.len() as u64),
            Some(Reply::Error(e)) => Err(e),
            None => Ok(1),
        }
    }

    fn query_one(&mut self, stmt: &SqlString) -> SqlResult<Option<Row>> {
        match self.record(stmt) {
            Some(Reply::Rows(rows)) => Ok(rows.into_iter().next()),
            Some(Reply::Error(e)) => Err(e),
            Some(Reply::Affected(_)) | None => Ok(None),
        }
    }

    fn query(
        &mut self,
        stmt: &SqlString,
        on_row: &mut dyn FnMut(Row) -> SqlResult<()>,
    ) -> SqlResult<()> {
        match self.record(stmt) {
            Some(Reply::Rows(rows)) => rows.into_iter().try_for_each(on_row),
            Some(Reply::Error(e)) => Err(e),
            Some(Reply::Affected(_)) | None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_rules_are_consumed_in_order() {
        // GIVEN
        let mut session = ScriptedSession::new()
            .once("LAST_INSERT_ID", Reply::row(&["10"]))
            .once("LAST_INSERT_ID", Reply::row(&["11"]));
        let stmt = SqlString::new("SELECT LAST_INSERT_ID()");

        // WHEN
        let first = session.query_one(&stmt).unwrap();
        let second = session.query_one(&stmt).unwrap();
        let third = session.query_one(&stmt).unwrap();

        // THEN
        assert_eq!(first, Some(vec![Some("10".to_string())]));
        assert_eq!(second, Some(vec![Some("11".to_string())]));
        assert_eq!(third, None);
        assert_eq!(session.count("LAST_INSERT_ID"), 3);
    }

    #[test]
    fn test_writes_skip_control_and_reads() {
        let mut session = ScriptedSession::new().on("DELETE", Reply::Affected(0));

        session.execute(&SqlString::new("START TRANSACTION")).unwrap();
        let deleted = session.execute(&SqlString::new("DELETE FROM `t`")).unwrap();
        session.query_one(&SqlString::new("SELECT 1")).unwrap();
        session.execute(&SqlString::new("COMMIT")).unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(session.writes(), vec!["DELETE FROM `t`"]);
    }
}

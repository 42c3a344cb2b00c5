//! SQL statement text with escaped placeholders.
//!
//! Statements are written as format strings where `?` stands for an escaped
//! literal (or a pre-built SQL fragment) and `!` stands for an escaped
//! identifier. Placeholders are filled left to right:
//!
//! ```
//! use duality_core::SqlString;
//!
//! let stmt = SqlString::new("SELECT ! FROM !.! WHERE ! = ?")
//!     .ident("name")
//!     .ident("shop")
//!     .ident("customer")
//!     .ident("id")
//!     .value(42i64);
//! assert_eq!(stmt.as_str(), "SELECT `name` FROM `shop`.`customer` WHERE `id` = 42");
//! ```
//!
//! Format strings must therefore not contain `?` or `!` as plain text; use
//! `<>` instead of `!=`.

use std::fmt;

/// A literal value that can be embedded in SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean, rendered as TRUE/FALSE.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer (e.g. `LAST_INSERT_ID()`).
    UInt(u64),
    /// Double precision float.
    Double(f64),
    /// Character data, rendered as an escaped string literal.
    String(String),
    /// Binary data, rendered as a hex literal.
    Binary(Vec<u8>),
    /// Pre-rendered SQL expression, inserted verbatim.
    Expr(String),
}

impl SqlValue {
    /// Returns true if this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render the value as SQL text.
    pub fn to_sql(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::UInt(u) => u.to_string(),
            SqlValue::Double(d) if d.is_finite() => d.to_string(),
            SqlValue::Double(_) => "NULL".to_string(),
            SqlValue::String(s) => quote_string(s),
            SqlValue::Binary(bytes) => format!("X'{}'", hex::encode(bytes)),
            SqlValue::Expr(expr) => expr.clone(),
        }
    }

    /// Render the value for use in a URL path segment or diagnostic.
    ///
    /// Strings are not quoted; binary values are hex encoded.
    pub fn to_plain(&self) -> String {
        match self {
            SqlValue::String(s) => s.clone(),
            SqlValue::Binary(bytes) => hex::encode(bytes),
            SqlValue::Null => "null".to_string(),
            SqlValue::Bool(b) => b.to_string(),
            other => other.to_sql(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Double(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Binary(v)
    }
}

/// Quote and escape a string literal the way MySQL expects.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote an identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// SQL statement text under construction.
#[derive(Debug, Clone, Default)]
pub struct SqlString {
    text: String,
    /// Byte offset where the next placeholder search starts.
    cursor: usize,
}

impl SqlString {
    /// Create a statement from a format string.
    pub fn new(format: &str) -> Self {
        Self {
            text: format.to_string(),
            cursor: 0,
        }
    }

    /// Fill the next `?` with an escaped literal.
    pub fn value(mut self, value: impl Into<SqlValue>) -> Self {
        let rendered = value.into().to_sql();
        self.fill('?', &rendered);
        self
    }

    /// Fill the next `!` with a quoted identifier.
    pub fn ident(mut self, name: &str) -> Self {
        let quoted = quote_identifier(name);
        self.fill('!', &quoted);
        self
    }

    /// Fill the next `?` with an already built fragment.
    pub fn sql(mut self, fragment: &SqlString) -> Self {
        self.fill('?', fragment.as_str());
        self
    }

    /// # Panics
    ///
    /// When no placeholder is left or the next one is of the other kind.
    fn fill(&mut self, expected: char, replacement: &str) {
        let Some(pos) = self.text[self.cursor..]
            .find(['?', '!'])
            .map(|offset| offset + self.cursor)
        else {
            panic!("no placeholder left in `{}`", self.text);
        };
        assert_eq!(
            self.text.as_bytes()[pos] as char,
            expected,
            "placeholder mismatch in `{}`",
            self.text
        );
        self.text.replace_range(pos..pos + 1, replacement);
        self.cursor = pos + replacement.len();
    }

    /// Append more format text; its placeholders can be filled afterwards.
    pub fn append(&mut self, format: &str) -> &mut Self {
        self.text.push_str(format);
        self
    }

    /// Append a finished fragment. Placeholders before the end of the
    /// fragment are no longer fillable.
    pub fn append_sql(&mut self, fragment: &SqlString) -> &mut Self {
        self.text.push_str(fragment.as_str());
        self.cursor = self.text.len();
        self
    }

    /// Join finished fragments with a separator.
    pub fn join<I>(parts: I, separator: &str) -> SqlString
    where
        I: IntoIterator<Item = SqlString>,
    {
        let mut out = SqlString::default();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.text.push_str(separator);
            }
            out.text.push_str(part.as_str());
        }
        out.cursor = out.text.len();
        out
    }

    /// Wrap the fragment in parentheses.
    pub fn parenthesized(&self) -> SqlString {
        SqlString::new("(?)").sql(self)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl PartialEq for SqlString {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for SqlString {}

impl fmt::Display for SqlString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Reference a column, optionally qualified by a table alias.
pub fn column_ref(alias: Option<&str>, column: &str) -> SqlString {
    match alias {
        Some(alias) => SqlString::new("!.!").ident(alias).ident(column),
        None => SqlString::new("!").ident(column),
    }
}

/// AND together all present conditions. Returns None when there are none.
pub fn and_all<I>(conditions: I) -> Option<SqlString>
where
    I: IntoIterator<Item = Option<SqlString>>,
{
    let parts: Vec<SqlString> = conditions
        .into_iter()
        .flatten()
        .filter(|c| !c.is_empty())
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(SqlString::join(parts.iter().map(|p| p.parenthesized()), " AND ")),
    }
}

//! Field filters selecting which members of a document are returned.
//!
//! A filter is a list of dotted paths. Either every path is prefixed with
//! `!` (exclusive mode) or none is (inclusive mode).

use regex_lite::Regex;
use serde_json::Value;

use crate::error::{QueryError, QueryResult};

/// Members that are never filtered away.
pub const RESERVED_KEYS: [&str; 2] = ["_metadata", "links"];

const PATH_PATTERN: &str = r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FilterMode {
    #[default]
    All,
    Include,
    Exclude,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFieldFilter {
    mode: FilterMode,
    paths: Vec<String>,
}

impl ObjectFieldFilter {
    /// A filter that lets everything through.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a list of paths. An empty list selects everything.
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> QueryResult<Self> {
        let pattern = Regex::new(PATH_PATTERN).map_err(|e| QueryError::invalid_filter(e.to_string()))?;
        let mut filter = Self::default();
        for raw in paths {
            let raw = raw.as_ref().trim();
            let (mode, path) = match raw.strip_prefix('!') {
                Some(rest) => (FilterMode::Exclude, rest),
                None => (FilterMode::Include, raw),
            };
            if !pattern.is_match(path) {
                return Err(QueryError::invalid_filter(raw));
            }
            if filter.mode != FilterMode::All && filter.mode != mode {
                return Err(QueryError::MixedFilter);
            }
            filter.mode = mode;
            filter.paths.push(path.to_string());
        }
        Ok(filter)
    }

    pub fn is_all(&self) -> bool {
        self.mode == FilterMode::All
    }

    /// Whether `field` nested under `prefix` (dotted, may be empty) is
    /// emitted.
    pub fn is_included(&self, prefix: &str, field: &str) -> bool {
        if prefix.is_empty() {
            self.is_path_included(field)
        } else {
            self.is_path_included(&format!("{prefix}.{field}"))
        }
    }

    pub fn is_path_included(&self, path: &str) -> bool {
        match self.mode {
            FilterMode::All => true,
            FilterMode::Include => self.paths.iter().any(|entry| {
                entry == path || is_ancestor(entry, path) || is_ancestor(path, entry)
            }),
            FilterMode::Exclude => !self
                .paths
                .iter()
                .any(|entry| entry == path || is_ancestor(entry, path)),
        }
    }

    /// Remove members the filter does not select from an already read
    /// document.
    pub fn prune(&self, doc: &mut Value) {
        if self.is_all() {
            return;
        }
        self.prune_at("", doc, true);
    }

    fn prune_at(&self, prefix: &str, value: &mut Value, root: bool) {
        match value {
            Value::Object(members) => {
                members.retain(|key, _| {
                    (root && RESERVED_KEYS.contains(&key.as_str())) || self.is_included(prefix, key)
                });
                for (key, member) in members.iter_mut() {
                    if root && RESERVED_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    self.prune_at(&path, member, false);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.prune_at(prefix, item, false);
                }
            }
            _ => {}
        }
    }
}

/// True if `ancestor` is a strict dotted prefix of `path`.
fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

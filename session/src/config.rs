//! Session configuration.

use serde::Deserialize;

use crate::error::{SessionError, SessionResult};

/// Options for a duality session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Start transactions `WITH CONSISTENT SNAPSHOT`
    pub consistent_snapshot: bool,
    /// Render BIGINT columns as JSON strings
    pub encode_bigints_as_strings: bool,
    /// Embed `_metadata.etag` on reads and check it on updates
    pub etag: bool,
    /// Create the root row when an update finds none
    pub upsert_on_update: bool,
    /// Base URL for `links` self references
    pub links_base_url: Option<String>,
    /// Maximum number of documents returned by a list
    pub read_limit: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            consistent_snapshot: true,
            encode_bigints_as_strings: false,
            etag: true,
            upsert_on_update: false,
            links_base_url: None,
            read_limit: Some(25),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object; omitted options keep their defaults.
    pub fn from_json(text: &str) -> SessionResult<Self> {
        serde_json::from_str(text).map_err(|e| SessionError::config(e.to_string()))
    }

    pub fn with_consistent_snapshot(mut self, enabled: bool) -> Self {
        self.consistent_snapshot = enabled;
        self
    }

    pub fn with_encode_bigints_as_strings(mut self, enabled: bool) -> Self {
        self.encode_bigints_as_strings = enabled;
        self
    }

    pub fn with_etag(mut self, enabled: bool) -> Self {
        self.etag = enabled;
        self
    }

    pub fn with_upsert_on_update(mut self, enabled: bool) -> Self {
        self.upsert_on_update = enabled;
        self
    }

    pub fn with_links_base_url(mut self, url: impl Into<String>) -> Self {
        self.links_base_url = Some(url.into());
        self
    }

    pub fn with_read_limit(mut self, limit: Option<u64>) -> Self {
        self.read_limit = limit;
        self
    }
}

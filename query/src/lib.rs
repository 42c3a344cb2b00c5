//! Duality Query
//!
//! Read path of a duality view.
//!
//! Responsibilities:
//! - Compose one SQL statement materializing a nested JSON document
//! - Apply field filters and row ownership to every nested level
//! - Compute and embed document checksums (ETags)
//! - Decorate documents with resource links

mod builder;
mod document;
mod error;
mod etag;
mod filter;

pub use builder::{key_value, JsonQueryBuilder, Limit, ROOT_ALIAS};
pub use document::{Document, DocumentReader, ReadOptions};
pub use error::{QueryError, QueryResult};
pub use etag::{compute_checksum, embed_etag, extract_etag};
pub use filter::{ObjectFieldFilter, RESERVED_KEYS};

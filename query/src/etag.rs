//! Document checksums used as ETags.
//!
//! The digest covers every checked field of the document in schema
//! declaration order. Values are hashed with a one byte type tag so that
//! `1`, `1.0`, `"1"` and `true` never collide, and numbers are hashed in
//! their binary form rather than as decimal text.
//!
//! Nested arrays are row sets: each element is digested on its own and the
//! element digests are hashed in sorted order, so element order never
//! changes the checksum.

use duality_schema::{ColumnType, FieldKind, Table};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Compute the hex encoded SHA-256 checksum of `doc`.
pub fn compute_checksum(table: &Table, doc: &Value) -> String {
    let mut hasher = Sha256::new();
    if let Value::Object(members) = doc {
        feed_object(&mut hasher, table, members);
    }
    hex::encode(hasher.finalize())
}

fn feed_object(hasher: &mut Sha256, table: &Table, members: &Map<String, Value>) {
    for field in table.fields.iter().filter(|f| f.is_checked()) {
        match &field.kind {
            FieldKind::Reference(reference) if reference.unnest => {
                feed_object(hasher, &reference.table, members);
            }
            FieldKind::Reference(reference) => {
                let Some(value) = members.get(&field.name) else {
                    continue;
                };
                hasher.update(field.name.as_bytes());
                hasher.update(b":");
                match value {
                    Value::Object(child) => feed_object(hasher, &reference.table, child),
                    Value::Array(items) => {
                        let mut digests: Vec<_> = items
                            .iter()
                            .filter_map(Value::as_object)
                            .map(|child| {
                                let mut element = Sha256::new();
                                feed_object(&mut element, &reference.table, child);
                                element.finalize()
                            })
                            .collect();
                        digests.sort_unstable();
                        hasher.update(b"A");
                        for digest in digests {
                            hasher.update(digest);
                        }
                    }
                    other => feed_scalar(hasher, other, false),
                }
            }
            FieldKind::Column(column) => {
                let Some(value) = members.get(&field.name) else {
                    continue;
                };
                hasher.update(field.name.as_bytes());
                hasher.update(b":");
                feed_scalar(hasher, value, column.column_type == ColumnType::Json);
            }
        }
    }
}

fn feed_scalar(hasher: &mut Sha256, value: &Value, as_json: bool) {
    match value {
        Value::Null => hasher.update(b"N"),
        _ if as_json => {
            hasher.update(b"J");
            hasher.update(value.to_string().as_bytes());
        }
        Value::Bool(b) => {
            hasher.update(b"B");
            hasher.update([*b as u8]);
        }
        Value::String(s) => {
            hasher.update(b"S");
            hasher.update(s.as_bytes());
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                hasher.update(b"I");
                hasher.update(i.to_le_bytes());
            } else if let Some(u) = n.as_u64() {
                hasher.update(b"U");
                hasher.update(u.to_le_bytes());
            } else {
                hasher.update(b"D");
                hasher.update(n.as_f64().unwrap_or(f64::NAN).to_le_bytes());
            }
        }
        // Structured values in non-JSON columns, e.g. GeoJSON.
        Value::Array(_) | Value::Object(_) => {
            hasher.update(b"J");
            hasher.update(value.to_string().as_bytes());
        }
    }
}

/// Store `etag` as `_metadata.etag`.
pub fn embed_etag(doc: &mut Value, etag: &str) {
    let Value::Object(members) = doc else {
        return;
    };
    let metadata = members
        .entry("_metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(metadata) = metadata {
        metadata.insert("etag".to_string(), Value::String(etag.to_string()));
    }
}

/// The client supplied `_metadata.etag`, if any.
pub fn extract_etag(doc: &Value) -> Option<&str> {
    doc.get("_metadata")?.get("etag")?.as_str()
}

// Content fingerprints (ETags) for stored documents.
//
// The digest covers only non-computed fields: every top-level key starting
// with `_` is server-owned and excluded. Object keys are sorted at every
// level before hashing so the same logical document always yields the same
// digest, independent of how the map was built.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Prefix marking a server-owned (computed) field.
pub const COMPUTED_PREFIX: char = '_';

/// Whether a top-level key is server-owned.
pub fn is_computed(key: &str) -> bool {
    key.starts_with(COMPUTED_PREFIX)
}

/// Return a copy of `fields` without computed keys.
pub fn strip_computed(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(key, _)| !is_computed(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Compute the base64 SHA-256 fingerprint of a document's content.
///
/// Computed fields are skipped here as well, so passing a full stored
/// document and passing its stripped body produce the same digest.
pub fn compute(fields: &Map<String, Value>) -> String {
    let mut canonical = String::new();
    write_canonical_object(fields.iter().filter(|(key, _)| !is_computed(key)), &mut canonical);
    STANDARD.encode(Sha256::digest(canonical.as_bytes()))
}

/// Canonical JSON text for a value: sorted keys, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map.iter(), out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars and strings use serde_json's encoding, which is stable.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
    out: &mut String,
) {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

    out.push('{');
    for (index, (key, value)) in entries.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}

// Stored document layout and the create/merge transitions.
//
// A stored document is a JSON object holding user fields plus three
// computed fields:
//   _id            store identifier, immutable
//   _createdAt     RFC 3339 UTC timestamp, set once
//   _lastModified  RFC 3339 UTC timestamp, null until the first update

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::fingerprint::strip_computed;
use crate::id::DocumentId;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "_createdAt";
pub const LAST_MODIFIED_FIELD: &str = "_lastModified";

/// JSON object holding a document's fields.
pub type Fields = Map<String, Value>;

/// Truncate to the millisecond precision timestamps are stored with.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the stored form of a newly created document.
pub fn new_document(id: &DocumentId, body: &Fields, created_at: DateTime<Utc>) -> Fields {
    let mut stored = strip_computed(body);
    stored.insert(ID_FIELD.into(), Value::String(id.to_string()));
    stored.insert(CREATED_AT_FIELD.into(), Value::String(format_timestamp(created_at)));
    stored.insert(LAST_MODIFIED_FIELD.into(), Value::Null);
    stored
}

/// Merge `body` over the stored document's user fields.
///
/// Request values win on key collision. `_id` and `_createdAt` are carried
/// over from `stored`; `_lastModified` is set to `modified_at`.
pub fn merge_update(stored: &Fields, body: &Fields, modified_at: DateTime<Utc>) -> Fields {
    let mut merged = strip_computed(stored);
    for (key, value) in strip_computed(body) {
        merged.insert(key, value);
    }
    for key in [ID_FIELD, CREATED_AT_FIELD] {
        if let Some(value) = stored.get(key) {
            merged.insert(key.into(), value.clone());
        }
    }
    merged.insert(LAST_MODIFIED_FIELD.into(), Value::String(format_timestamp(modified_at)));
    merged
}

pub fn created_at(stored: &Fields) -> Option<DateTime<Utc>> {
    timestamp_field(stored, CREATED_AT_FIELD)
}

pub fn last_modified(stored: &Fields) -> Option<DateTime<Utc>> {
    timestamp_field(stored, LAST_MODIFIED_FIELD)
}

/// The validator advertised as `Last-Modified`: last update, else creation.
pub fn effective_modified(stored: &Fields) -> Option<DateTime<Utc>> {
    last_modified(stored).or_else(|| created_at(stored))
}

/// Next modification time: `now`, bumped so it is strictly later than both
/// the previous modification and the creation time.
pub fn next_modified(stored: &Fields, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_millis(now);
    match effective_modified(stored) {
        Some(previous) if now <= previous => previous + Duration::milliseconds(1),
        _ => now,
    }
}

fn timestamp_field(stored: &Fields, key: &str) -> Option<DateTime<Utc>> {
    stored
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}

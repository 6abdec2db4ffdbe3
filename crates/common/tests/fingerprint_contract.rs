use docgate_common::document::{merge_update, new_document, now_millis, Fields};
use docgate_common::fingerprint::{compute, strip_computed};
use docgate_common::id::DocumentId;
use serde_json::{json, Value};

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn create_path_etag_is_reproducible_from_stored_document() {
    // Clients may send computed-looking keys; they must not leak into the tag.
    let body = object(json!({"name": "a", "_createdAt": "bogus", "nested": {"b": 2, "a": 1}}));
    let advertised = compute(&strip_computed(&body));

    let stored = new_document(&DocumentId::generate(), &body, now_millis());

    assert_eq!(compute(&stored), advertised);
}

#[test]
fn update_path_etag_matches_merged_content() {
    let stored =
        new_document(&DocumentId::generate(), &object(json!({"name": "a", "n": 1})), now_millis());
    let merged = merge_update(&stored, &object(json!({"name": "b"})), now_millis());

    assert_eq!(compute(&merged), compute(&object(json!({"n": 1, "name": "b"}))));
    assert_ne!(compute(&merged), compute(&stored));
}

#[test]
fn identical_update_keeps_etag() {
    let stored = new_document(&DocumentId::generate(), &object(json!({"name": "a"})), now_millis());
    let merged = merge_update(&stored, &object(json!({"name": "a"})), now_millis());

    assert_eq!(compute(&merged), compute(&stored));
}

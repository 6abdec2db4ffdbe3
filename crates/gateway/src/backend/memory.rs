// In-process document store.
//
// Collections are ordered by id so unsorted listings come back in the same
// order the PostgreSQL backend uses (`ORDER BY id`).

use std::collections::{BTreeMap, HashMap};

use docgate_common::{
    document::{Fields, LAST_MODIFIED_FIELD},
    filter::{ListFilter, Page},
    id::DocumentId,
};
use serde_json::Value;

#[derive(Default)]
pub struct MemoryStore {
    collections: HashMap<String, BTreeMap<DocumentId, Fields>>,
}

impl MemoryStore {
    pub fn clear(&mut self) {
        self.collections.clear();
    }
}

pub fn find(store: &MemoryStore, collection: &str, id: &DocumentId) -> Option<Fields> {
    store.collections.get(collection).and_then(|docs| docs.get(id)).cloned()
}

pub fn insert(store: &mut MemoryStore, collection: &str, id: &DocumentId, document: &Fields) -> bool {
    let docs = store.collections.entry(collection.to_owned()).or_default();
    if docs.contains_key(id) {
        return false;
    }
    docs.insert(id.clone(), document.clone());
    true
}

pub fn replace_if_unmodified(
    store: &mut MemoryStore,
    collection: &str,
    id: &DocumentId,
    expected_last_modified: &Value,
    document: &Fields,
) -> bool {
    let Some(current) = store.collections.get_mut(collection).and_then(|docs| docs.get_mut(id))
    else {
        return false;
    };
    if current.get(LAST_MODIFIED_FIELD) != Some(expected_last_modified) {
        return false;
    }
    *current = document.clone();
    true
}

pub fn delete(store: &mut MemoryStore, collection: &str, id: &DocumentId) -> bool {
    store.collections.get_mut(collection).is_some_and(|docs| docs.remove(id).is_some())
}

pub fn list(store: &MemoryStore, collection: &str, filter: &ListFilter, page: Page) -> Vec<Fields> {
    let Some(docs) = store.collections.get(collection) else {
        return Vec::new();
    };

    let mut matching: Vec<Fields> =
        docs.values().filter(|doc| filter.matches(doc)).cloned().collect();
    // Stable: ties keep id order.
    matching.sort_by(|a, b| filter.compare(a, b));

    page.apply(matching)
}

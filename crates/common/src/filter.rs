// List filters: `{query, projection, options}` and limit/skip paging.
//
// The filter arrives as client JSON, so every part is validated against an
// explicit shape. Unknown top-level keys, non-object parts, mixed projections
// and unknown options are rejected instead of being passed to a backend.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::Fields;
use crate::fingerprint::{canonical_json, is_computed};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter is not valid JSON of shape {{query, projection, options}}: {0}")]
    Malformed(String),

    #[error("filter.{0} must be an object")]
    NotAnObject(&'static str),

    #[error("filter.projection.{0} must be 0, 1, true or false")]
    InvalidProjectionValue(String),

    #[error("filter.projection cannot mix inclusion and exclusion")]
    MixedProjection,

    #[error("filter.options.{0} is not a supported option")]
    UnknownOption(String),

    #[error("filter.options.sort.{0} must be 1 or -1")]
    InvalidSortDirection(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFilter {
    #[serde(default)]
    query: Value,
    #[serde(default)]
    projection: Value,
    #[serde(default)]
    options: Value,
}

/// Which fields a listed document keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Keep the named fields; computed fields are always kept.
    Include(BTreeSet<String>),
    /// Drop the named fields.
    Exclude(BTreeSet<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// A validated list filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    /// Documents must contain this object (JSONB `@>` semantics).
    pub query: Fields,
    pub projection: Projection,
    /// Applied in order; keys are ordered lexicographically by field name.
    pub sort: Vec<SortKey>,
}

impl ListFilter {
    /// Parse the URL-decoded `filter` query parameter.
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let raw: RawFilter =
            serde_json::from_str(raw).map_err(|e| FilterError::Malformed(e.to_string()))?;

        let query = object_or_empty(raw.query, "query")?;
        let projection = parse_projection(object_or_empty(raw.projection, "projection")?)?;
        let sort = parse_options(object_or_empty(raw.options, "options")?)?;

        Ok(Self { query, projection, sort })
    }

    pub fn matches(&self, document: &Fields) -> bool {
        self.query.iter().all(|(key, needle)| {
            document.get(key).is_some_and(|value| json_contains(value, needle))
        })
    }

    /// Order two documents by the sort keys.
    pub fn compare(&self, a: &Fields, b: &Fields) -> Ordering {
        for key in &self.sort {
            let ordering = compare_jsonb(a.get(&key.field), b.get(&key.field));
            let ordering = match key.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub fn project(&self, document: Fields) -> Fields {
        match &self.projection {
            Projection::All => document,
            Projection::Include(fields) => document
                .into_iter()
                .filter(|(key, _)| is_computed(key) || fields.contains(key))
                .collect(),
            Projection::Exclude(fields) => {
                document.into_iter().filter(|(key, _)| !fields.contains(key)).collect()
            }
        }
    }
}

fn object_or_empty(value: Value, part: &'static str) -> Result<Map<String, Value>, FilterError> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        _ => Err(FilterError::NotAnObject(part)),
    }
}

fn parse_projection(raw: Map<String, Value>) -> Result<Projection, FilterError> {
    let mut include = BTreeSet::new();
    let mut exclude = BTreeSet::new();

    for (field, flag) in raw {
        let keep = match flag {
            Value::Bool(keep) => keep,
            Value::Number(n) if n.as_i64() == Some(1) => true,
            Value::Number(n) if n.as_i64() == Some(0) => false,
            _ => return Err(FilterError::InvalidProjectionValue(field)),
        };
        if keep {
            include.insert(field);
        } else {
            exclude.insert(field);
        }
    }

    match (include.is_empty(), exclude.is_empty()) {
        (true, true) => Ok(Projection::All),
        (false, true) => Ok(Projection::Include(include)),
        (true, false) => Ok(Projection::Exclude(exclude)),
        (false, false) => Err(FilterError::MixedProjection),
    }
}

fn parse_options(options: Map<String, Value>) -> Result<Vec<SortKey>, FilterError> {
    let mut sort = Vec::new();

    for (option, value) in options {
        if option != "sort" {
            return Err(FilterError::UnknownOption(option));
        }
        for (field, direction) in object_or_empty(value, "options.sort")? {
            let direction = match direction.as_i64() {
                Some(1) => SortDirection::Ascending,
                Some(-1) => SortDirection::Descending,
                _ => return Err(FilterError::InvalidSortDirection(field)),
            };
            sort.push(SortKey { field, direction });
        }
    }

    sort.sort_by(|a, b| a.field.cmp(&b.field));
    Ok(sort)
}

/// JSONB containment: does `haystack` contain `needle`?
pub fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(have), Value::Object(want)) => want
            .iter()
            .all(|(key, value)| have.get(key).is_some_and(|inner| json_contains(inner, value))),
        (Value::Array(have), Value::Array(want)) => {
            want.iter().all(|value| have.iter().any(|inner| json_contains(inner, value)))
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// Order values the way PostgreSQL orders `jsonb`. A missing value sorts after
/// every present one, so it comes last ascending and first descending.
pub fn compare_jsonb(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()).then_with(|| {
            a.iter()
                .zip(b)
                .map(|(x, y)| compare_values(x, y))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(a_map), Value::Object(b_map)) => a_map
            .len()
            .cmp(&b_map.len())
            .then_with(|| canonical_json(a).cmp(&canonical_json(b))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Limit/skip paging. `0` means unbounded (limit) or no skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub skip: u64,
}

impl Page {
    /// Parse raw `limit`/`skip` query values. Absent, negative or unparseable
    /// values become 0.
    pub fn parse(limit: Option<&str>, skip: Option<&str>) -> Self {
        Self { limit: parse_count(limit), skip: parse_count(skip) }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let skipped = items.into_iter().skip(usize::try_from(self.skip).unwrap_or(usize::MAX));
        match self.limit {
            0 => skipped.collect(),
            limit => skipped.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect(),
        }
    }
}

fn parse_count(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok()).map_or(0, |n| n.max(0).unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn empty_filter_defaults() {
        let filter = ListFilter::parse("{}").unwrap();
        assert_eq!(filter, ListFilter::default());
    }

    #[test]
    fn null_parts_default_to_empty() {
        let filter = ListFilter::parse(r#"{"query": null, "projection": null}"#).unwrap();
        assert!(filter.query.is_empty());
        assert_eq!(filter.projection, Projection::All);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let err = ListFilter::parse(r#"{"where": {}}"#).unwrap_err();
        assert!(matches!(err, FilterError::Malformed(_)));
    }

    #[test]
    fn rejects_non_object_parts() {
        assert_eq!(
            ListFilter::parse(r#"{"query": [1]}"#).unwrap_err(),
            FilterError::NotAnObject("query")
        );
        assert_eq!(
            ListFilter::parse(r#"{"options": "x"}"#).unwrap_err(),
            FilterError::NotAnObject("options")
        );
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(ListFilter::parse("name=a").unwrap_err(), FilterError::Malformed(_)));
    }

    #[test]
    fn rejects_mixed_projection() {
        assert_eq!(
            ListFilter::parse(r#"{"projection": {"a": 1, "b": 0}}"#).unwrap_err(),
            FilterError::MixedProjection
        );
    }

    #[test]
    fn rejects_bad_projection_flag() {
        assert_eq!(
            ListFilter::parse(r#"{"projection": {"a": "yes"}}"#).unwrap_err(),
            FilterError::InvalidProjectionValue("a".into())
        );
    }

    #[test]
    fn rejects_unknown_option() {
        assert_eq!(
            ListFilter::parse(r#"{"options": {"hint": "idx"}}"#).unwrap_err(),
            FilterError::UnknownOption("hint".into())
        );
    }

    #[test]
    fn rejects_bad_sort_direction() {
        assert_eq!(
            ListFilter::parse(r#"{"options": {"sort": {"age": 2}}}"#).unwrap_err(),
            FilterError::InvalidSortDirection("age".into())
        );
    }

    #[test]
    fn query_matches_by_containment() {
        let filter =
            ListFilter::parse(r#"{"query": {"name": "a", "meta": {"tag": "x"}}}"#).unwrap();

        assert!(filter.matches(&object(json!({"name": "a", "meta": {"tag": "x", "n": 1}}))));
        assert!(!filter.matches(&object(json!({"name": "a", "meta": {"tag": "y"}}))));
        assert!(!filter.matches(&object(json!({"meta": {"tag": "x"}}))));
    }

    #[test]
    fn nested_array_needs_array_needle() {
        let doc = object(json!({"tags": ["x", "y"]}));

        let scalar = ListFilter::parse(r#"{"query": {"tags": "x"}}"#).unwrap();
        assert!(!scalar.matches(&doc));

        let array = ListFilter::parse(r#"{"query": {"tags": ["x"]}}"#).unwrap();
        assert!(array.matches(&doc));
    }

    #[test]
    fn array_containment() {
        assert!(json_contains(&json!(["a", "b", "c"]), &json!(["c", "a"])));
        // A bare scalar only matches a scalar, as with `@>` on a nested key.
        assert!(!json_contains(&json!(["a", "b"]), &json!("b")));
        assert!(!json_contains(&json!(["a", "b"]), &json!(["z"])));
        assert!(json_contains(&json!(1.0), &json!(1)));
    }

    #[test]
    fn inclusion_projection_keeps_computed_fields() {
        let filter = ListFilter::parse(r#"{"projection": {"name": 1}}"#).unwrap();
        let projected =
            filter.project(object(json!({"_id": "x", "name": "a", "secret": "s"})));
        assert_eq!(Value::Object(projected), json!({"_id": "x", "name": "a"}));
    }

    #[test]
    fn exclusion_projection_drops_fields() {
        let filter = ListFilter::parse(r#"{"projection": {"secret": false}}"#).unwrap();
        let projected =
            filter.project(object(json!({"_id": "x", "name": "a", "secret": "s"})));
        assert_eq!(Value::Object(projected), json!({"_id": "x", "name": "a"}));
    }

    #[test]
    fn sort_orders_by_keys() {
        let filter = ListFilter::parse(r#"{"options": {"sort": {"age": -1}}}"#).unwrap();
        let young = object(json!({"age": 20}));
        let old = object(json!({"age": 40}));
        assert_eq!(filter.compare(&old, &young), Ordering::Less);
    }

    #[test]
    fn sort_keys_are_lexicographic() {
        let filter =
            ListFilter::parse(r#"{"options": {"sort": {"b": 1, "a": -1}}}"#).unwrap();
        let fields: Vec<_> = filter.sort.iter().map(|k| k.field.as_str()).collect();
        assert_eq!(fields, ["a", "b"]);
    }

    #[test]
    fn jsonb_type_ordering() {
        let ordered = [json!(null), json!("z"), json!(1), json!(false), json!([]), json!({})];
        for pair in ordered.windows(2) {
            assert_eq!(compare_jsonb(Some(&pair[0]), Some(&pair[1])), Ordering::Less);
        }
        assert_eq!(compare_jsonb(None, Some(&json!({}))), Ordering::Greater);
    }

    #[test]
    fn page_zero_means_unbounded() {
        let page = Page::parse(None, Some(""));
        assert_eq!(page, Page { limit: 0, skip: 0 });
        assert_eq!(page.apply(vec![1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn page_applies_skip_then_limit() {
        let page = Page::parse(Some("2"), Some("1"));
        assert_eq!(page.apply(vec![1, 2, 3, 4]), vec![2, 3]);
    }

    #[test]
    fn page_coerces_negative_and_garbage_to_zero() {
        assert_eq!(Page::parse(Some("-1"), None), Page { limit: 0, skip: 0 });
        assert_eq!(Page::parse(Some("5"), Some("abc")), Page { limit: 5, skip: 0 });
        assert_eq!(Page::parse(Some("2.5"), Some(" 3 ")), Page { limit: 0, skip: 3 });
    }
}

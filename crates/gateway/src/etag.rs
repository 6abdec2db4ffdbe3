// ETag formatting, If-Match comparison and Last-Modified headers.
//
// Fingerprints are carried on the wire as strong entity tags (`"<digest>"`).
// Incoming If-Match values are compared after stripping whitespace, a `W/`
// prefix and surrounding quotes; `*` matches any existing document and a
// comma-separated list matches if any member does.

use axum::{
    http::{
        header::{ETAG, IF_MATCH, LAST_MODIFIED},
        HeaderMap, HeaderValue,
    },
    response::Response,
};
use chrono::{DateTime, Utc};

use crate::error::GatewayError;

/// Validators advertised for a document: its ETag and Last-Modified time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validators {
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Validators {
    pub fn new(fingerprint: &str, last_modified: Option<DateTime<Utc>>) -> Self {
        Self { etag: format_etag(fingerprint), last_modified }
    }

    /// Insert `ETag` and `Last-Modified` into a successful response.
    pub fn apply(&self, response: &mut Response) {
        if let Ok(value) = HeaderValue::from_str(&self.etag) {
            response.headers_mut().insert(ETAG, value);
        }
        if let Some(at) = self.last_modified {
            if let Ok(value) = HeaderValue::from_str(&http_date(at)) {
                response.headers_mut().insert(LAST_MODIFIED, value);
            }
        }
    }

    /// Carry the same headers on a rejected write.
    pub fn attach(&self, error: GatewayError) -> GatewayError {
        let error = error.with_header(ETAG, &self.etag);
        match self.last_modified {
            Some(at) => error.with_header(LAST_MODIFIED, &http_date(at)),
            None => error,
        }
    }
}

/// Quote a fingerprint as a strong entity tag.
pub fn format_etag(fingerprint: &str) -> String {
    format!("\"{fingerprint}\"")
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Read the optional If-Match header.
pub fn extract_if_match(headers: &HeaderMap) -> Result<Option<&str>, GatewayError> {
    headers
        .get(IF_MATCH)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| GatewayError::validation("If-Match header is not valid utf-8"))
        })
        .transpose()
}

/// Compare an If-Match header value against the current fingerprint.
pub fn etag_matches(if_match: &str, current_fingerprint: &str) -> bool {
    if if_match.trim() == "*" {
        return true;
    }
    let current = normalize_etag(current_fingerprint);
    if_match.split(',').any(|candidate| normalize_etag(candidate) == current)
}

/// Strip optional `W/` prefix and surrounding quotes from an etag value.
pub fn normalize_etag(value: &str) -> &str {
    let trimmed = value.trim();
    let without_weak = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    without_weak.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(without_weak)
}

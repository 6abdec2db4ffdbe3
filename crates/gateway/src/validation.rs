// Input validation helpers.
//
// - `ValidatedJson<T>` extractor: content-type check + serde, with
//   structured VALIDATION_FAILED responses.
// - Path/query parameter checks shared by the database and collection
//   handlers.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use docgate_common::{document::Fields, id::DocumentId};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::GatewayError;

/// Maximum REST request body in bytes (1 MiB).
pub const MAX_REST_BODY_BYTES: usize = 1024 * 1024;

const MAX_NAME_CHARS: usize = 120;

/// A JSON body extractor that returns a structured `GatewayError` on failure.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(GatewayError::validation(message).with_details(details).into_response())
            }
        }
    }
}

fn classify_json_rejection(rejection: &JsonRejection) -> (String, Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => {
            (format!("invalid JSON payload: {e}"), json!({ "kind": "data_error" }))
        }
        JsonRejection::JsonSyntaxError(e) => {
            (format!("malformed JSON: {e}"), json!({ "kind": "syntax_error" }))
        }
        JsonRejection::MissingJsonContentType(_) => (
            "expected Content-Type: application/json".to_string(),
            json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) => {
            (format!("request body error: {e}"), json!({ "kind": "body_error" }))
        }
        other => (format!("request body error: {other}"), json!({ "kind": "unknown" })),
    }
}

/// Require a document body to be a JSON object.
pub fn require_object(body: Value) -> Result<Fields, GatewayError> {
    match body {
        Value::Object(fields) => Ok(fields),
        _ => Err(GatewayError::validation("document body must be a JSON object")),
    }
}

/// Validate a database or collection name taken from the path.
pub fn require_name<'a>(value: &'a str, what: &'static str) -> Result<&'a str, GatewayError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::validation(format!("{what} is required"))
            .with_details(json!({ "field": what })));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(GatewayError::validation(format!(
            "{what} must not exceed {MAX_NAME_CHARS} characters"
        ))
        .with_details(json!({ "field": what })));
    }
    Ok(trimmed)
}

/// Parse a document id path segment; malformed ids are a 400.
pub fn require_document_id(raw: &str) -> Result<DocumentId, GatewayError> {
    DocumentId::parse(raw).map_err(|e| {
        GatewayError::validation(format!("'{raw}' is not a valid document id: {e}"))
            .with_details(json!({ "field": "id" }))
    })
}

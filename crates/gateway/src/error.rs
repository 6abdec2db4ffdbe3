use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    ConnectionNotFound,
    DocumentNotFound,
    NotFound,
    Conflict,
    PreconditionFailed,
    ConnectFailed,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ConnectionNotFound => "CONNECTION_NOT_FOUND",
            Self::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::ConnectFailed => "CONNECT_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::ConnectionNotFound => StatusCode::NOT_FOUND,
            Self::DocumentNotFound => StatusCode::NOT_FOUND,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::ConnectFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a client may usefully resend the request (after re-reading
    /// the resource, for the precondition codes).
    pub const fn retryable(self) -> bool {
        matches!(
            self,
            Self::Conflict | Self::PreconditionFailed | Self::ConnectFailed | Self::InternalError
        )
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::ConnectionNotFound => "no live connection for this database",
            Self::DocumentNotFound => "document not found",
            Self::NotFound => "Not Found",
            Self::Conflict => "document already exists; resubmit with an If-Match header",
            Self::PreconditionFailed => "If-Match does not match the current document",
            Self::ConnectFailed => "could not connect to the database",
            Self::InternalError => "internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayError {
    code: ErrorCode,
    message: String,
    details: Value,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: json!({}), headers: Vec::new() }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Attach a response header; values that are not valid header text are skipped.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.push((name, value));
        }
        self
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let request_id = current_request_id();
        let status = self.code.status();

        let mut response = (
            status,
            Json(json!({
                "status": status.as_u16(),
                "code": self.code.as_str(),
                "message": self.message,
                "retryable": self.code.retryable(),
                "timestamp": timestamp(),
                "request_id": request_id.clone(),
                "details": self.details,
            })),
        )
            .into_response();

        for (name, value) in self.headers {
            response.headers_mut().insert(name, value);
        }
        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

/// ISO-8601 timestamp carried by every JSON response body.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::to_bytes,
        http::{header::ETAG, StatusCode},
        response::IntoResponse,
    };
    use serde_json::Value;

    use super::{with_request_id_scope, ErrorCode, GatewayError};

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        serde_json::from_slice(&body).expect("error response body should be valid json")
    }

    #[tokio::test]
    async fn gateway_error_uses_scoped_request_id() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            GatewayError::from_code(ErrorCode::InternalError).into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let parsed = body_json(response).await;

        assert_eq!(parsed["status"], 500);
        assert_eq!(parsed["code"], "INTERNAL_ERROR");
        assert_eq!(parsed["retryable"], true);
        assert_eq!(parsed["request_id"], "req-scoped-123");
        assert_eq!(parsed["details"], serde_json::json!({}));
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn status_mapping_covers_taxonomy() {
        assert_eq!(ErrorCode::ValidationFailed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::ConnectionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DocumentNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::PreconditionFailed.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(ErrorCode::ConnectFailed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn attached_headers_are_emitted() {
        let response = GatewayError::from_code(ErrorCode::Conflict)
            .with_header(ETAG, "\"abc\"")
            .into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers().get(ETAG).unwrap(), "\"abc\"");
    }

    #[tokio::test]
    async fn custom_details_are_preserved() {
        let response = GatewayError::validation("bad filter")
            .with_details(serde_json::json!({ "parameter": "filter" }))
            .into_response();
        let parsed = body_json(response).await;
        assert_eq!(parsed["details"]["parameter"], "filter");
        assert_eq!(parsed["message"], "bad filter");
    }

    #[tokio::test]
    async fn unknown_route_error_keeps_plain_message() {
        let response = with_request_id_scope("req-route-456".to_owned(), async {
            GatewayError::from_code(ErrorCode::NotFound).into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-route-456");
        let parsed = body_json(response).await;
        assert_eq!(parsed["code"], "NOT_FOUND");
        assert_eq!(parsed["message"], "Not Found");
        assert_eq!(parsed["request_id"], "req-route-456");
    }
}

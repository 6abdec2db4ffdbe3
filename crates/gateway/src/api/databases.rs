// Connection endpoints: connect, disconnect and list.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::error::{timestamp, GatewayError};
use crate::registry::ConnectionSummary;
use crate::validation::require_name;

const CONNECTED: &str = "CONNECTED";
const DISCONNECTED: &str = "DISCONNECTED";

#[derive(Deserialize)]
pub struct ConnectQuery {
    pub uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    /// Alias of the connection.
    pub name: String,
    pub status: &'static str,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionList {
    pub items: Vec<ConnectionSummary>,
    pub count: usize,
    pub message: String,
    pub timestamp: String,
}

pub async fn connect(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> Result<Json<ConnectionStatus>, GatewayError> {
    let database = require_name(&name, "database name")?;
    let alias = state.registry.connect(database, query.uri.as_deref().unwrap_or_default()).await?;

    Ok(Json(ConnectionStatus {
        name: alias,
        status: CONNECTED,
        message: format!("connected to database '{database}'"),
        timestamp: timestamp(),
    }))
}

pub async fn disconnect(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ConnectionStatus>, GatewayError> {
    let database = require_name(&name, "database name")?;
    let alias = state.registry.disconnect(database).await?;

    Ok(Json(ConnectionStatus {
        name: alias,
        status: DISCONNECTED,
        message: format!("disconnected from database '{database}'"),
        timestamp: timestamp(),
    }))
}

pub async fn list(State(state): State<ApiState>) -> Json<ConnectionList> {
    let items = state.registry.list().await;
    let message = match items.len() {
        1 => "1 live connection".to_owned(),
        n => format!("{n} live connections"),
    };
    Json(ConnectionList { count: items.len(), items, message, timestamp: timestamp() })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::BackendOptions;
    use crate::registry::ConnectionRegistry;

    fn test_router() -> Router {
        crate::api::router(Arc::new(ConnectionRegistry::new(BackendOptions::default())))
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn connect_returns_alias_and_status() {
        let resp = test_router()
            .oneshot(request("POST", "/databases/inventory?uri=memory%3A%2F%2Flocal"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "CONNECTED");
        assert_eq!(body["name"].as_str().unwrap().split('-').count(), 2);
        assert!(body["message"].as_str().unwrap().contains("inventory"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn connect_without_uri_is_400() {
        let resp = test_router().oneshot(request("POST", "/databases/inventory")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "uri");
    }

    #[tokio::test]
    async fn connect_with_unsupported_scheme_is_400() {
        let resp = test_router()
            .oneshot(request("POST", "/databases/inventory?uri=ftp%3A%2F%2Fhost"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disconnect_returns_same_alias() {
        let app = test_router();
        let resp = app
            .clone()
            .oneshot(request("POST", "/databases/inventory?uri=memory://"))
            .await
            .unwrap();
        let alias = body_json(resp).await["name"].clone();

        let resp = app.clone().oneshot(request("DELETE", "/databases/inventory")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "DISCONNECTED");
        assert_eq!(body["name"], alias);

        let resp = app.oneshot(request("DELETE", "/databases/inventory")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["code"], "CONNECTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn list_reports_live_connections() {
        let app = test_router();
        for name in ["beta", "alpha"] {
            let resp = app
                .clone()
                .oneshot(request("POST", &format!("/databases/{name}?uri=memory://")))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = app.oneshot(request("GET", "/databases")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["message"], "2 live connections");
        assert!(body["timestamp"].is_string());
        assert_eq!(body["items"][0]["database"], "alpha");
        assert_eq!(body["items"][1]["database"], "beta");
        assert_eq!(body["items"][0]["backend"], "memory");
    }
}

// REST API for the gateway.
//
// Routes:
//   GET    /databases                                  list live connections
//   POST   /databases/{name}?uri=...                   connect
//   DELETE /databases/{name}                           disconnect
//   PUT    /databases/{db}/collections/{coll}          create (generated id)
//   GET    /databases/{db}/collections/{coll}          list (filter, limit, skip)
//   PUT    /databases/{db}/collections/{coll}/{id}     conditional upsert (If-Match)
//   GET    /databases/{db}/collections/{coll}/{id}     get single
//   DELETE /databases/{db}/collections/{coll}/{id}     delete

pub mod collections;
pub mod databases;

use std::sync::Arc;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};

use crate::error::{ErrorCode, GatewayError};
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ConnectionRegistry>,
}

pub fn router(registry: Arc<ConnectionRegistry>) -> Router {
    let state = ApiState { registry };

    Router::new()
        .route("/databases", get(databases::list))
        .route("/databases/{name}", post(databases::connect).delete(databases::disconnect))
        .route(
            "/databases/{db}/collections/{coll}",
            put(collections::create).get(collections::list),
        )
        .route(
            "/databases/{db}/collections/{coll}/{id}",
            put(collections::upsert).get(collections::get).delete(collections::delete),
        )
        .with_state(state)
}

/// Fallback for unmatched routes.
pub async fn not_found() -> Response {
    GatewayError::from_code(ErrorCode::NotFound).into_response()
}

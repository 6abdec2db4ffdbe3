// Collection document endpoints.
//
// Writes follow optimistic concurrency: a PUT that would change an existing
// document must carry an If-Match equal to the document's current ETag.
// Without one the write is a 409, with a stale one a 412. The replace itself
// is a compare-and-swap on `_lastModified`, so two writers holding the same
// ETag cannot both succeed.

use axum::{
    extract::{Path, Query, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use docgate_common::{
    document::{
        effective_modified, merge_update, new_document, next_modified, now_millis, Fields,
        LAST_MODIFIED_FIELD,
    },
    filter::{FilterError, ListFilter, Page},
    fingerprint::{self, strip_computed},
    id::DocumentId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::ApiState;
use crate::backend::Backend;
use crate::error::{timestamp, ErrorCode, GatewayError};
use crate::etag::{etag_matches, extract_if_match, Validators};
use crate::validation::{require_document_id, require_name, require_object, ValidatedJson};

// ── Request / Response types ───────────────────────────────────────

#[derive(Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

#[derive(Serialize)]
struct ItemsEnvelope {
    items: Vec<Fields>,
    count: usize,
    message: String,
    timestamp: String,
}

impl ItemsEnvelope {
    fn listed(items: Vec<Fields>) -> Self {
        let message = match items.len() {
            1 => "1 document".to_owned(),
            n => format!("{n} documents"),
        };
        Self::with_message(items, message)
    }

    fn with_message(items: Vec<Fields>, message: impl Into<String>) -> Self {
        Self { count: items.len(), items, message: message.into(), timestamp: timestamp() }
    }
}

#[derive(Serialize)]
struct CreatedEnvelope {
    message: String,
    id: String,
    timestamp: String,
}

/// The database/collection pair a request addresses, with its live handle.
struct Target<'a> {
    backend: Backend,
    database: &'a str,
    collection: &'a str,
}

impl Target<'_> {
    /// Log a backend failure with its context and hide the detail from the client.
    fn failure(
        &self,
        operation: &'static str,
        id: &DocumentId,
        error: anyhow::Error,
    ) -> GatewayError {
        error!(
            database = self.database,
            collection = self.collection,
            document_id = %id,
            operation,
            error = ?error,
            "backend operation failed"
        );
        GatewayError::from_code(ErrorCode::InternalError)
    }

    fn location(&self, id: &DocumentId) -> String {
        format!("/databases/{}/collections/{}/{id}", self.database, self.collection)
    }
}

// ── Handlers ───────────────────────────────────────────────────────

/// `PUT /databases/{db}/collections/{coll}`: always a create.
pub async fn create(
    State(state): State<ApiState>,
    Path((db, coll)): Path<(String, String)>,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<Value>,
) -> Result<Response, GatewayError> {
    write(&state, &db, &coll, None, &headers, body).await
}

/// `PUT /databases/{db}/collections/{coll}/{id}`: create if absent, else a
/// conditional update.
pub async fn upsert(
    State(state): State<ApiState>,
    Path((db, coll, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<Value>,
) -> Result<Response, GatewayError> {
    write(&state, &db, &coll, Some(&id), &headers, body).await
}

pub async fn list(
    State(state): State<ApiState>,
    Path((db, coll)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Response, GatewayError> {
    let database = require_name(&db, "database name")?;
    let collection = require_name(&coll, "collection name")?;
    let filter = match query.filter.as_deref().map(str::trim) {
        None | Some("") => ListFilter::default(),
        Some(raw) => ListFilter::parse(raw).map_err(|e| invalid_parameter("filter", e))?,
    };
    let page = Page::parse(query.limit.as_deref(), query.skip.as_deref());

    let backend = state.registry.lookup(database).await?;
    let items = backend.list(collection, &filter, page).await.map_err(|error| {
        error!(database, collection, error = ?error, "backend list failed");
        GatewayError::from_code(ErrorCode::InternalError)
    })?;

    Ok(Json(ItemsEnvelope::listed(items)).into_response())
}

pub async fn get(
    State(state): State<ApiState>,
    Path((db, coll, id)): Path<(String, String, String)>,
) -> Result<Response, GatewayError> {
    let database = require_name(&db, "database name")?;
    let collection = require_name(&coll, "collection name")?;
    let id = require_document_id(&id)?;

    let target = Target { backend: state.registry.lookup(database).await?, database, collection };
    let found =
        target.backend.find(collection, &id).await.map_err(|e| target.failure("find", &id, e))?;

    let Some(document) = found else {
        let envelope = ItemsEnvelope::with_message(Vec::new(), "document not found");
        return Ok((StatusCode::NOT_FOUND, Json(envelope)).into_response());
    };

    let validators = validators_for(&document);
    let envelope = ItemsEnvelope::with_message(vec![document], "document found");
    let mut response = Json(envelope).into_response();
    validators.apply(&mut response);
    Ok(response)
}

pub async fn delete(
    State(state): State<ApiState>,
    Path((db, coll, id)): Path<(String, String, String)>,
) -> Result<StatusCode, GatewayError> {
    let database = require_name(&db, "database name")?;
    let collection = require_name(&coll, "collection name")?;
    let id = require_document_id(&id)?;

    let target = Target { backend: state.registry.lookup(database).await?, database, collection };
    let deleted =
        target.backend.delete(collection, &id).await.map_err(|e| target.failure("delete", &id, e))?;

    if !deleted {
        return Err(GatewayError::from_code(ErrorCode::DocumentNotFound));
    }

    info!(database, collection, document_id = %id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Conditional write ──────────────────────────────────────────────

async fn write(
    state: &ApiState,
    db: &str,
    coll: &str,
    raw_id: Option<&str>,
    headers: &HeaderMap,
    body: Value,
) -> Result<Response, GatewayError> {
    let database = require_name(db, "database name")?;
    let collection = require_name(coll, "collection name")?;
    let id = raw_id.map(require_document_id).transpose()?;
    let body = strip_computed(&require_object(body)?);
    let if_match = extract_if_match(headers)?;

    let target = Target { backend: state.registry.lookup(database).await?, database, collection };

    let Some(id) = id else {
        return create_document(&target, DocumentId::generate(), &body).await;
    };

    let existing =
        target.backend.find(collection, &id).await.map_err(|e| target.failure("find", &id, e))?;
    match existing {
        None => create_document(&target, id, &body).await,
        Some(stored) => update_document(&target, id, &stored, &body, if_match).await,
    }
}

async fn create_document(
    target: &Target<'_>,
    id: DocumentId,
    body: &Fields,
) -> Result<Response, GatewayError> {
    let created_at = now_millis();
    let document = new_document(&id, body, created_at);

    let inserted = target
        .backend
        .insert(target.collection, &id, &document)
        .await
        .map_err(|e| target.failure("insert", &id, e))?;

    if !inserted {
        // Another request created the same id between our read and insert.
        debug!(
            database = target.database,
            collection = target.collection,
            document_id = %id,
            "create lost to concurrent insert"
        );
        return Err(rejection(target, &id, ErrorCode::Conflict).await);
    }

    info!(
        database = target.database,
        collection = target.collection,
        document_id = %id,
        "document created"
    );

    let mut response = (
        StatusCode::CREATED,
        Json(CreatedEnvelope {
            message: format!("document created in '{}'", target.collection),
            id: id.to_string(),
            timestamp: timestamp(),
        }),
    )
        .into_response();
    Validators::new(&fingerprint::compute(body), Some(created_at)).apply(&mut response);
    if let Ok(location) = HeaderValue::from_str(&target.location(&id)) {
        response.headers_mut().insert(LOCATION, location);
    }

    Ok(response)
}

async fn update_document(
    target: &Target<'_>,
    id: DocumentId,
    stored: &Fields,
    body: &Fields,
    if_match: Option<&str>,
) -> Result<Response, GatewayError> {
    let current = fingerprint::compute(stored);
    let validators = Validators::new(&current, effective_modified(stored));

    let Some(if_match) = if_match else {
        debug!(
            database = target.database,
            collection = target.collection,
            document_id = %id,
            "update without If-Match"
        );
        return Err(validators.attach(GatewayError::from_code(ErrorCode::Conflict)));
    };
    if !etag_matches(if_match, &current) {
        debug!(
            database = target.database,
            collection = target.collection,
            document_id = %id,
            "stale If-Match"
        );
        return Err(validators.attach(GatewayError::from_code(ErrorCode::PreconditionFailed)));
    }

    let modified_at = next_modified(stored, now_millis());
    let merged = merge_update(stored, body, modified_at);
    let expected = stored.get(LAST_MODIFIED_FIELD).cloned().unwrap_or(Value::Null);

    let replaced = target
        .backend
        .replace_if_unmodified(target.collection, &id, &expected, &merged)
        .await
        .map_err(|e| target.failure("replace", &id, e))?;

    if !replaced {
        debug!(
            database = target.database,
            collection = target.collection,
            document_id = %id,
            "update lost to concurrent write"
        );
        return Err(rejection(target, &id, ErrorCode::PreconditionFailed).await);
    }

    info!(
        database = target.database,
        collection = target.collection,
        document_id = %id,
        last_modified = %modified_at,
        "document updated"
    );

    let mut response = StatusCode::NO_CONTENT.into_response();
    Validators::new(&fingerprint::compute(&merged), Some(modified_at)).apply(&mut response);
    Ok(response)
}

/// A rejected write after a lost race, carrying the validators of whatever
/// is stored now. Without a readable document the error goes out bare.
async fn rejection(target: &Target<'_>, id: &DocumentId, code: ErrorCode) -> GatewayError {
    let error = GatewayError::from_code(code);
    match target.backend.find(target.collection, id).await {
        Ok(Some(fresh)) => validators_for(&fresh).attach(error),
        Ok(None) => error,
        Err(e) => {
            target.failure("find", id, e);
            error
        }
    }
}

fn validators_for(stored: &Fields) -> Validators {
    Validators::new(&fingerprint::compute(stored), effective_modified(stored))
}

fn invalid_parameter(parameter: &'static str, error: FilterError) -> GatewayError {
    GatewayError::validation(error.to_string()).with_details(json!({ "parameter": parameter }))
}

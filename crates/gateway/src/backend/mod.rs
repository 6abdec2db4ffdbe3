// Backend document stores reachable through the connection registry.
//
// The URI scheme picks the store:
//   postgres:// | postgresql://  → sqlx pool, documents kept as JSONB rows
//   memory://                    → in-process store (tests, local development)
//
// Every call is bounded by `BackendOptions::operation_timeout`; a timeout is
// reported as an ordinary backend error.

pub mod memory;
pub mod postgres;

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use docgate_common::{
    document::Fields,
    filter::{ListFilter, Page},
    id::DocumentId,
};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::RwLock;
use url::Url;

use crate::config::BackendOptions;
use memory::MemoryStore;

/// Why a connection could not be opened.
#[derive(Debug)]
pub enum ConnectError {
    /// The URI cannot be used at all (unparseable or unsupported scheme).
    InvalidUri(String),
    /// The backend was unreachable or failed its liveness probe.
    Failed(anyhow::Error),
}

/// A live handle to one backend database.
#[derive(Clone)]
pub struct Backend {
    store: Store,
    operation_timeout: Duration,
}

#[derive(Clone)]
enum Store {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryStore>>),
}

impl Backend {
    /// Open a handle for `database` and verify it answers a ping.
    ///
    /// On a failed probe the handle is closed before returning.
    pub async fn connect(
        database: &str,
        uri: &str,
        options: &BackendOptions,
    ) -> Result<Self, ConnectError> {
        let parsed = Url::parse(uri)
            .map_err(|e| ConnectError::InvalidUri(format!("connection URI is not a valid URL: {e}")))?;

        let backend = match parsed.scheme() {
            "postgres" | "postgresql" => {
                let pool = postgres::connect(database, uri, options).await?;
                Self { store: Store::Postgres(pool), operation_timeout: options.operation_timeout }
            }
            "memory" => Self::memory(options.operation_timeout),
            other => {
                return Err(ConnectError::InvalidUri(format!(
                    "unsupported connection scheme '{other}' (expected postgres:// or memory://)"
                )))
            }
        };

        let probe = async {
            backend.ping().await?;
            backend.prepare().await
        };
        if let Err(error) = probe.await {
            if let Err(close_error) = backend.close().await {
                tracing::warn!(database, error = ?close_error, "failed to close handle after failed probe");
            }
            return Err(ConnectError::Failed(error));
        }

        Ok(backend)
    }

    /// A fresh in-process backend.
    pub fn memory(operation_timeout: Duration) -> Self {
        Self {
            store: Store::Memory(Arc::new(RwLock::new(MemoryStore::default()))),
            operation_timeout,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.store {
            Store::Postgres(_) => "postgres",
            Store::Memory(_) => "memory",
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.bounded("ping", async {
            match &self.store {
                Store::Postgres(pool) => postgres::ping(pool).await,
                Store::Memory(_) => Ok(()),
            }
        })
        .await
    }

    /// Create backing tables if the store needs them.
    async fn prepare(&self) -> Result<()> {
        self.bounded("prepare", async {
            match &self.store {
                Store::Postgres(pool) => postgres::ensure_schema(pool).await,
                Store::Memory(_) => Ok(()),
            }
        })
        .await
    }

    pub async fn close(&self) -> Result<()> {
        self.bounded("close", async {
            match &self.store {
                Store::Postgres(pool) => {
                    pool.close().await;
                    Ok(())
                }
                Store::Memory(store) => {
                    store.write().await.clear();
                    Ok(())
                }
            }
        })
        .await
    }

    pub async fn find(&self, collection: &str, id: &DocumentId) -> Result<Option<Fields>> {
        self.bounded("find", async {
            match &self.store {
                Store::Postgres(pool) => postgres::find(pool, collection, id).await,
                Store::Memory(store) => Ok(memory::find(&*store.read().await, collection, id)),
            }
        })
        .await
    }

    /// Insert a new document. Returns `false` if the id is already taken.
    pub async fn insert(&self, collection: &str, id: &DocumentId, document: &Fields) -> Result<bool> {
        self.bounded("insert", async {
            match &self.store {
                Store::Postgres(pool) => postgres::insert(pool, collection, id, document).await,
                Store::Memory(store) => {
                    Ok(memory::insert(&mut *store.write().await, collection, id, document))
                }
            }
        })
        .await
    }

    /// Replace a document only if its stored `_lastModified` still equals
    /// `expected_last_modified`. Returns `false` when nothing was replaced.
    pub async fn replace_if_unmodified(
        &self,
        collection: &str,
        id: &DocumentId,
        expected_last_modified: &Value,
        document: &Fields,
    ) -> Result<bool> {
        self.bounded("replace", async {
            match &self.store {
                Store::Postgres(pool) => {
                    postgres::replace_if_unmodified(pool, collection, id, expected_last_modified, document)
                        .await
                }
                Store::Memory(store) => Ok(memory::replace_if_unmodified(
                    &mut *store.write().await,
                    collection,
                    id,
                    expected_last_modified,
                    document,
                )),
            }
        })
        .await
    }

    /// Delete a document. Returns `false` if it did not exist.
    pub async fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool> {
        self.bounded("delete", async {
            match &self.store {
                Store::Postgres(pool) => postgres::delete(pool, collection, id).await,
                Store::Memory(store) => Ok(memory::delete(&mut *store.write().await, collection, id)),
            }
        })
        .await
    }

    /// Matching documents, sorted and paged, with the projection applied.
    pub async fn list(&self, collection: &str, filter: &ListFilter, page: Page) -> Result<Vec<Fields>> {
        let documents = self
            .bounded("list", async {
                match &self.store {
                    Store::Postgres(pool) => postgres::list(pool, collection, filter, page).await,
                    Store::Memory(store) => Ok(memory::list(&*store.read().await, collection, filter, page)),
                }
            })
            .await?;

        Ok(documents.into_iter().map(|document| filter.project(document)).collect())
    }

    async fn bounded<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.operation_timeout, call).await.map_err(|_| {
            anyhow!("backend {operation} timed out after {}ms", self.operation_timeout.as_millis())
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> BackendOptions {
        BackendOptions::default()
    }

    fn object(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn memory_scheme_connects() {
        let backend = Backend::connect("inventory", "memory://local", &options()).await.unwrap();
        assert_eq!(backend.kind(), "memory");
        backend.ping().await.unwrap();
    }

    #[tokio::test]
    async fn unsupported_scheme_is_invalid_uri() {
        let result = Backend::connect("inventory", "mongodb://localhost:27017", &options()).await;
        assert!(matches!(result, Err(ConnectError::InvalidUri(_))));
    }

    #[tokio::test]
    async fn unparseable_uri_is_invalid_uri() {
        let result = Backend::connect("inventory", "not a uri", &options()).await;
        assert!(matches!(result, Err(ConnectError::InvalidUri(_))));
    }

    #[tokio::test]
    async fn insert_find_replace_delete() {
        let backend = Backend::memory(Duration::from_secs(1));
        let id = DocumentId::generate();
        let doc = object(json!({"_id": id.as_str(), "_lastModified": null, "name": "a"}));

        assert!(backend.insert("items", &id, &doc).await.unwrap());
        assert!(!backend.insert("items", &id, &doc).await.unwrap());
        assert_eq!(backend.find("items", &id).await.unwrap(), Some(doc.clone()));
        assert_eq!(backend.find("other", &id).await.unwrap(), None);

        let updated = object(json!({"_id": id.as_str(), "_lastModified": "t1", "name": "b"}));
        assert!(!backend.replace_if_unmodified("items", &id, &json!("t0"), &updated).await.unwrap());
        assert!(backend.replace_if_unmodified("items", &id, &Value::Null, &updated).await.unwrap());
        assert_eq!(backend.find("items", &id).await.unwrap(), Some(updated));

        assert!(backend.delete("items", &id).await.unwrap());
        assert!(!backend.delete("items", &id).await.unwrap());
    }

    #[tokio::test]
    async fn list_applies_projection() {
        let backend = Backend::memory(Duration::from_secs(1));
        let id = DocumentId::generate();
        let doc = object(json!({"_id": id.as_str(), "name": "a", "secret": "s"}));
        backend.insert("items", &id, &doc).await.unwrap();

        let filter = ListFilter::parse(r#"{"projection": {"secret": 0}}"#).unwrap();
        let items = backend.list("items", &filter, Page::default()).await.unwrap();

        assert_eq!(items, vec![object(json!({"_id": id.as_str(), "name": "a"}))]);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let backend = Backend::memory(Duration::from_millis(10));
        let result = backend
            .bounded("sleep", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        let error = result.unwrap_err();
        assert!(error.to_string().contains("timed out"));
    }
}

// Connection registry: database name → live backend handle + alias.
//
// All mutation goes through one write lock, held across the close of any
// handle being removed so a handle is never closed twice. Disconnect removes
// an entry only after its handle closed cleanly; a failed close leaves the
// entry registered so the caller can retry.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::alias;
use crate::backend::{Backend, ConnectError};
use crate::config::BackendOptions;
use crate::error::{ErrorCode, GatewayError};

struct NamedConnection {
    alias: String,
    backend: Backend,
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConnectionSummary {
    pub database: String,
    pub name: String,
    pub backend: &'static str,
}

#[derive(Debug)]
pub enum RegistryError {
    MissingField(&'static str),
    InvalidUri(String),
    NotFound(String),
    ConnectFailed(anyhow::Error),
    CloseFailed(anyhow::Error),
}

impl From<RegistryError> for GatewayError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::MissingField(field) => {
                GatewayError::validation(format!("{field} is required"))
                    .with_details(serde_json::json!({ "field": field }))
            }
            RegistryError::InvalidUri(message) => GatewayError::validation(message),
            RegistryError::NotFound(database) => GatewayError::new(
                ErrorCode::ConnectionNotFound,
                format!("no live connection for database '{database}'"),
            ),
            // Backend detail stays in the logs.
            RegistryError::ConnectFailed(_) => GatewayError::from_code(ErrorCode::ConnectFailed),
            RegistryError::CloseFailed(_) => GatewayError::new(
                ErrorCode::InternalError,
                "failed to close the connection; it is still registered",
            ),
        }
    }
}

pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, NamedConnection>>,
    options: BackendOptions,
}

impl ConnectionRegistry {
    pub fn new(options: BackendOptions) -> Self {
        Self { entries: RwLock::new(HashMap::new()), options }
    }

    /// Open and ping a backend, then register it under `database`.
    ///
    /// Returns the generated alias. An existing entry under the same name is
    /// replaced and its handle closed.
    pub async fn connect(&self, database: &str, uri: &str) -> Result<String, RegistryError> {
        let database = required(database, "database name")?;
        let uri = required(uri, "uri")?;

        let backend = Backend::connect(database, uri, &self.options).await.map_err(|error| {
            match error {
                ConnectError::InvalidUri(message) => RegistryError::InvalidUri(message),
                ConnectError::Failed(error) => {
                    warn!(database, error = ?error, "database connect failed");
                    RegistryError::ConnectFailed(error)
                }
            }
        })?;

        let alias = alias::generate();
        let kind = backend.kind();

        let mut entries = self.entries.write().await;
        let replaced = entries.insert(
            database.to_owned(),
            NamedConnection { alias: alias.clone(), backend },
        );
        if let Some(previous) = replaced {
            if let Err(error) = previous.backend.close().await {
                warn!(
                    database,
                    alias = %previous.alias,
                    error = ?error,
                    "failed to close replaced connection"
                );
            } else {
                info!(database, alias = %previous.alias, "replaced connection closed");
            }
        }
        drop(entries);

        info!(database, alias = %alias, backend = kind, "database connected");
        Ok(alias)
    }

    /// Close and unregister `database`, returning its alias.
    pub async fn disconnect(&self, database: &str) -> Result<String, RegistryError> {
        let database = required(database, "database name")?;

        let mut entries = self.entries.write().await;
        let entry =
            entries.get(database).ok_or_else(|| RegistryError::NotFound(database.to_owned()))?;

        if let Err(error) = entry.backend.close().await {
            warn!(database, alias = %entry.alias, error = ?error, "database close failed");
            return Err(RegistryError::CloseFailed(error));
        }

        let alias = entries.remove(database).map(|entry| entry.alias).unwrap_or_default();
        info!(database, alias = %alias, "database disconnected");
        Ok(alias)
    }

    /// Handle for one request's use.
    pub async fn lookup(&self, database: &str) -> Result<Backend, RegistryError> {
        self.entries
            .read()
            .await
            .get(database)
            .map(|entry| entry.backend.clone())
            .ok_or_else(|| RegistryError::NotFound(database.to_owned()))
    }

    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let entries = self.entries.read().await;
        let mut summaries: Vec<_> = entries
            .iter()
            .map(|(database, entry)| ConnectionSummary {
                database: database.clone(),
                name: entry.alias.clone(),
                backend: entry.backend.kind(),
            })
            .collect();
        summaries.sort_by(|a, b| a.database.cmp(&b.database));
        summaries
    }

    /// Close every connection; used on shutdown.
    pub async fn close_all(&self) {
        let mut entries = self.entries.write().await;
        for (database, entry) in entries.drain() {
            match entry.backend.close().await {
                Ok(()) => {
                    info!(database = %database, alias = %entry.alias, "connection closed on shutdown")
                }
                Err(error) => warn!(
                    database = %database,
                    alias = %entry.alias,
                    error = ?error,
                    "failed to close connection on shutdown"
                ),
            }
        }
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, RegistryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RegistryError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

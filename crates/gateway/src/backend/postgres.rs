// PostgreSQL document store.
//
// Documents live in one JSONB table per database:
//
//   docgate_documents(collection TEXT, id TEXT, body JSONB, PRIMARY KEY (collection, id))
//
// `body` holds the full stored document including its computed fields.

use anyhow::{Context, Result};
use docgate_common::{
    document::Fields,
    filter::{ListFilter, Page, SortDirection},
    id::DocumentId,
};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};

use super::ConnectError;
use crate::config::BackendOptions;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS docgate_documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body JSONB NOT NULL,
        PRIMARY KEY (collection, id)
    )
"#;

/// Open a pool. When the URI names no database, `database` is used.
pub async fn connect(
    database: &str,
    uri: &str,
    options: &BackendOptions,
) -> Result<PgPool, ConnectError> {
    let mut connect_options = uri
        .parse::<PgConnectOptions>()
        .map_err(|e| ConnectError::InvalidUri(format!("invalid PostgreSQL connection URI: {e}")))?;
    if connect_options.get_database().is_none() {
        connect_options = connect_options.database(database);
    }

    PgPoolOptions::new()
        .max_connections(options.max_connections)
        .acquire_timeout(options.acquire_timeout)
        .connect_with(connect_options)
        .await
        .context("failed to connect to PostgreSQL")
        .map_err(ConnectError::Failed)
}

pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("PostgreSQL ping failed")?;

    Ok(())
}

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(CREATE_TABLE)
        .execute(pool)
        .await
        .context("failed to create docgate_documents table")?;

    Ok(())
}

pub async fn find(pool: &PgPool, collection: &str, id: &DocumentId) -> Result<Option<Fields>> {
    let row = sqlx::query_scalar::<_, Json<Fields>>(
        "SELECT body FROM docgate_documents WHERE collection = $1 AND id = $2",
    )
    .bind(collection)
    .bind(id.as_str())
    .fetch_optional(pool)
    .await
    .context("failed to fetch document")?;

    Ok(row.map(|Json(body)| body))
}

pub async fn insert(
    pool: &PgPool,
    collection: &str,
    id: &DocumentId,
    document: &Fields,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        INSERT INTO docgate_documents (collection, id, body)
        VALUES ($1, $2, $3)
        ON CONFLICT (collection, id) DO NOTHING
        "#,
    )
    .bind(collection)
    .bind(id.as_str())
    .bind(Json(document))
    .execute(pool)
    .await
    .context("failed to insert document")?
    .rows_affected();

    Ok(affected == 1)
}

pub async fn replace_if_unmodified(
    pool: &PgPool,
    collection: &str,
    id: &DocumentId,
    expected_last_modified: &Value,
    document: &Fields,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE docgate_documents
        SET body = $3
        WHERE collection = $1
          AND id = $2
          AND body -> '_lastModified' = $4
        "#,
    )
    .bind(collection)
    .bind(id.as_str())
    .bind(Json(document))
    .bind(Json(expected_last_modified))
    .execute(pool)
    .await
    .context("failed to replace document")?
    .rows_affected();

    Ok(affected == 1)
}

pub async fn delete(pool: &PgPool, collection: &str, id: &DocumentId) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM docgate_documents WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id.as_str())
        .execute(pool)
        .await
        .context("failed to delete document")?
        .rows_affected();

    Ok(affected > 0)
}

pub async fn list(
    pool: &PgPool,
    collection: &str,
    filter: &ListFilter,
    page: Page,
) -> Result<Vec<Fields>> {
    let mut query = build_list_query(collection, filter, page);
    let rows = query
        .build_query_scalar::<Json<Fields>>()
        .fetch_all(pool)
        .await
        .context("failed to list documents")?;

    Ok(rows.into_iter().map(|Json(body)| body).collect())
}

fn build_list_query<'a>(
    collection: &'a str,
    filter: &ListFilter,
    page: Page,
) -> QueryBuilder<'a, Postgres> {
    let mut query = QueryBuilder::new("SELECT body FROM docgate_documents WHERE collection = ");
    query.push_bind(collection);

    if !filter.query.is_empty() {
        query.push(" AND body @> ");
        query.push_bind(Json(filter.query.clone()));
    }

    query.push(" ORDER BY ");
    for key in &filter.sort {
        query.push("body -> ");
        query.push_bind(key.field.clone());
        query.push(match key.direction {
            SortDirection::Ascending => " ASC, ",
            SortDirection::Descending => " DESC, ",
        });
    }
    query.push("id ASC");

    if page.limit > 0 {
        query.push(" LIMIT ");
        query.push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX));
    }
    if page.skip > 0 {
        query.push(" OFFSET ");
        query.push_bind(i64::try_from(page.skip).unwrap_or(i64::MAX));
    }

    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_without_filter_orders_by_id() {
        let query = build_list_query("people", &ListFilter::default(), Page::default());
        assert_eq!(
            query.sql(),
            "SELECT body FROM docgate_documents WHERE collection = $1 ORDER BY id ASC"
        );
    }

    #[test]
    fn list_query_binds_filter_sort_and_page() {
        let filter = ListFilter::parse(
            r#"{"query": {"team": "red"}, "options": {"sort": {"age": -1, "name": 1}}}"#,
        )
        .unwrap();
        let query = build_list_query("people", &filter, Page { limit: 10, skip: 5 });

        assert_eq!(
            query.sql(),
            "SELECT body FROM docgate_documents WHERE collection = $1 AND body @> $2 \
             ORDER BY body -> $3 DESC, body -> $4 ASC, id ASC LIMIT $5 OFFSET $6"
        );
    }

    #[tokio::test]
    async fn invalid_uri_is_rejected_before_connecting() {
        let result =
            connect("inventory", "postgres://user@host:notaport/db", &BackendOptions::default()).await;
        assert!(matches!(result, Err(ConnectError::InvalidUri(_))));
    }
}

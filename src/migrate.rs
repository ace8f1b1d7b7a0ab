//! Schema for the two persisted namespaces.
//!
//! Review sets and vector indexes live in separate table groups of the
//! same SQLite file. Each group is created on first use; every statement
//! is `IF NOT EXISTS`, so the calls are idempotent.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file and both namespaces (`rh init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_review_namespace(&pool).await?;
    ensure_index_namespace(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn ensure_review_namespace(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_sets (
            place_id TEXT PRIMARY KEY,
            reviews_json TEXT NOT NULL,
            review_count INTEGER NOT NULL,
            pages INTEGER NOT NULL,
            fetched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn ensure_index_namespace(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_indexes (
            place_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            doc_count INTEGER NOT NULL,
            source_hash TEXT NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            place_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL,
            PRIMARY KEY (place_id, ordinal),
            FOREIGN KEY (place_id) REFERENCES review_indexes(place_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

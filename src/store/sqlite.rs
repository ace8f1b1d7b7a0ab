//! SQLite-backed [`Store`] implementation.
//!
//! Review sets are stored as one JSON document per place in
//! `review_sets`. An index is a header row in `review_indexes` plus one
//! row per entry in `index_entries`, with vectors as little-endian f32
//! BLOBs. Each artifact is written inside a single transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::index::{IndexEntry, VectorIndex};
use crate::migrate;
use crate::models::{PlaceId, ReviewSet};

use super::{CachedReviews, PlaceSummary, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn ensure_review_namespace(&self) -> Result<()> {
        migrate::ensure_review_namespace(&self.pool).await
    }

    async fn load_reviews(&self, place_id: &PlaceId) -> Result<Option<CachedReviews>> {
        let row = sqlx::query(
            "SELECT reviews_json, pages, fetched_at FROM review_sets WHERE place_id = ?",
        )
        .bind(place_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let json: String = row.get("reviews_json");
        let reviews: ReviewSet = serde_json::from_str(&json)
            .with_context(|| format!("corrupt cached review set for {}", place_id))?;
        let pages: i64 = row.get("pages");

        Ok(Some(CachedReviews {
            reviews,
            pages: pages as u32,
            fetched_at: row.get("fetched_at"),
        }))
    }

    async fn save_reviews(&self, place_id: &PlaceId, cached: &CachedReviews) -> Result<bool> {
        let json = serde_json::to_string(&cached.reviews)?;

        let result = sqlx::query(
            r#"
            INSERT INTO review_sets (place_id, reviews_json, review_count, pages, fetched_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(place_id) DO NOTHING
            "#,
        )
        .bind(place_id.as_str())
        .bind(&json)
        .bind(cached.reviews.len() as i64)
        .bind(cached.pages as i64)
        .bind(cached.fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn ensure_index_namespace(&self) -> Result<()> {
        migrate::ensure_index_namespace(&self.pool).await
    }

    async fn load_index(&self, place_id: &PlaceId) -> Result<Option<VectorIndex>> {
        let header = sqlx::query(
            "SELECT model, dims, source_hash, built_at FROM review_indexes WHERE place_id = ?",
        )
        .bind(place_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT text, vector FROM index_entries WHERE place_id = ? ORDER BY ordinal ASC",
        )
        .bind(place_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                IndexEntry {
                    text: row.get("text"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        let dims: i64 = header.get("dims");
        Ok(Some(VectorIndex {
            place_id: place_id.clone(),
            model: header.get("model"),
            dims: dims as usize,
            source_hash: header.get("source_hash"),
            built_at: header.get("built_at"),
            entries,
        }))
    }

    async fn save_index(&self, index: &VectorIndex) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO review_indexes (place_id, model, dims, doc_count, source_hash, built_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(place_id) DO NOTHING
            "#,
        )
        .bind(index.place_id.as_str())
        .bind(&index.model)
        .bind(index.dims as i64)
        .bind(index.len() as i64)
        .bind(&index.source_hash)
        .bind(index.built_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for (ordinal, entry) in index.entries.iter().enumerate() {
            sqlx::query(
                "INSERT INTO index_entries (place_id, ordinal, text, vector) VALUES (?, ?, ?, ?)",
            )
            .bind(index.place_id.as_str())
            .bind(ordinal as i64)
            .bind(&entry.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_place(&self, place_id: &PlaceId, include_reviews: bool) -> Result<bool> {
        self.ensure_review_namespace().await?;
        self.ensure_index_namespace().await?;

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;

        removed += sqlx::query("DELETE FROM index_entries WHERE place_id = ?")
            .bind(place_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        removed += sqlx::query("DELETE FROM review_indexes WHERE place_id = ?")
            .bind(place_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if include_reviews {
            removed += sqlx::query("DELETE FROM review_sets WHERE place_id = ?")
                .bind(place_id.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn list_places(&self) -> Result<Vec<PlaceSummary>> {
        self.ensure_review_namespace().await?;
        self.ensure_index_namespace().await?;

        let rows = sqlx::query(
            r#"
            SELECT r.place_id, r.review_count, r.pages, r.fetched_at,
                   i.doc_count, i.model
            FROM review_sets r
            LEFT JOIN review_indexes i ON i.place_id = r.place_id
            ORDER BY r.place_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw_id: String = row.get("place_id");
                let doc_count: Option<i64> = row.get("doc_count");
                let model: Option<String> = row.get("model");
                Ok(PlaceSummary {
                    place_id: PlaceId::new(raw_id)?,
                    review_count: row.get("review_count"),
                    pages: row.get("pages"),
                    fetched_at: row.get("fetched_at"),
                    index: doc_count.zip(model),
                })
            })
            .collect()
    }
}

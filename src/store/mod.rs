//! Storage abstraction for Review Harness.
//!
//! The [`Store`] trait covers the two persisted namespaces the pipeline
//! needs: cached review sets and built vector indexes, both keyed by
//! [`PlaceId`]. Backends:
//!
//! - [`sqlite::SqliteStore`]: durable, one SQLite file (used by the CLI).
//! - [`memory::InMemoryStore`]: process-local, for tests and ephemeral use.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::index::VectorIndex;
use crate::models::{PlaceId, ReviewSet};

/// A cached review set with its fetch metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedReviews {
    pub reviews: ReviewSet,
    /// Number of page requests the fetch issued.
    pub pages: u32,
    /// Unix timestamp of the fetch.
    pub fetched_at: i64,
}

/// Per-place overview used by `rh stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSummary {
    pub place_id: PlaceId,
    pub review_count: i64,
    pub pages: i64,
    pub fetched_at: i64,
    /// `(doc_count, model)` when an index exists.
    pub index: Option<(i64, String)>,
}

/// Abstract storage backend.
///
/// Writes are insert-if-absent: the first artifact persisted for a place
/// wins and later writes report `false` without modifying it. A write is
/// all-or-nothing, so readers never observe a partial artifact.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_review_namespace`](Store::ensure_review_namespace) | Create the review namespace if absent |
/// | [`load_reviews`](Store::load_reviews) | Read a cached review set |
/// | [`save_reviews`](Store::save_reviews) | Persist a review set if none exists |
/// | [`ensure_index_namespace`](Store::ensure_index_namespace) | Create the index namespace if absent |
/// | [`load_index`](Store::load_index) | Read a persisted index |
/// | [`save_index`](Store::save_index) | Persist an index if none exists |
/// | [`delete_place`](Store::delete_place) | Remove a place's index (and optionally reviews) |
/// | [`list_places`](Store::list_places) | Summaries of all cached places |
#[async_trait]
pub trait Store: Send + Sync {
    async fn ensure_review_namespace(&self) -> Result<()>;

    async fn load_reviews(&self, place_id: &PlaceId) -> Result<Option<CachedReviews>>;

    /// Returns `true` if the set was written, `false` if one already existed.
    async fn save_reviews(&self, place_id: &PlaceId, cached: &CachedReviews) -> Result<bool>;

    async fn ensure_index_namespace(&self) -> Result<()>;

    async fn load_index(&self, place_id: &PlaceId) -> Result<Option<VectorIndex>>;

    /// Returns `true` if the index was written, `false` if one already existed.
    async fn save_index(&self, index: &VectorIndex) -> Result<bool>;

    /// Delete the index for a place, and its cached reviews when
    /// `include_reviews` is set. Returns whether anything was removed.
    async fn delete_place(&self, place_id: &PlaceId, include_reviews: bool) -> Result<bool>;

    async fn list_places(&self) -> Result<Vec<PlaceSummary>>;
}

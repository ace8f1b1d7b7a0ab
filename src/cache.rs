//! Durable read-through cache of review sets.
//!
//! [`ReviewCache`] sits in front of [`ReviewFetcher`]. Cached sets never
//! expire and are never refreshed: once a place has been fetched, later
//! selections read the stored set verbatim, even if the place has since
//! been reviewed again. There is no eviction.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;

use crate::errors::CacheIoError;
use crate::fetcher::ReviewFetcher;
use crate::locks::KeyedLocks;
use crate::models::{PlaceId, ReviewSet};
use crate::store::{CachedReviews, Store};

/// Result of a read-through lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub reviews: ReviewSet,
    /// `true` when served from the store without a fetch.
    pub hit: bool,
    /// Pages requested from upstream when the set was fetched.
    pub pages: u32,
    /// Upstream error that truncated the fetch, if one happened.
    pub upstream_error: Option<String>,
}

pub struct ReviewCache {
    store: Arc<dyn Store>,
    fetcher: ReviewFetcher,
    min_count: usize,
    locks: KeyedLocks,
    namespace: OnceCell<()>,
}

impl ReviewCache {
    pub fn new(store: Arc<dyn Store>, fetcher: ReviewFetcher, min_count: usize) -> Self {
        Self {
            store,
            fetcher,
            min_count,
            locks: KeyedLocks::new(),
            namespace: OnceCell::new(),
        }
    }

    /// Create the review namespace if it does not exist. Idempotent.
    pub async fn ensure_namespace(&self) -> Result<()> {
        self.namespace
            .get_or_try_init(|| async { self.store.ensure_review_namespace().await })
            .await?;
        Ok(())
    }

    /// Return the cached set for `place_id`, if any.
    pub async fn get(&self, place_id: &PlaceId) -> Result<Option<ReviewSet>> {
        Ok(self.load(place_id).await?.map(|c| c.reviews))
    }

    /// Persist `reviews` for `place_id`.
    ///
    /// A place keeps the first set stored for it; putting a second set is
    /// a no-op.
    pub async fn put(&self, place_id: &PlaceId, reviews: ReviewSet) -> Result<()> {
        let pages = reviews.iter().map(|r| r.page).max().unwrap_or(0);
        self.persist(place_id, reviews, pages).await?;
        Ok(())
    }

    /// Return the cached set, fetching and persisting it on a miss.
    ///
    /// Partial results after a mid-pagination upstream error are cached
    /// like complete ones. A fetch that fails before collecting anything
    /// caches nothing and returns the [`UpstreamError`](crate::errors::UpstreamError).
    pub async fn get_or_fetch(&self, place_id: &PlaceId) -> Result<CacheLookup> {
        let _guard = self.locks.lock(place_id).await;

        if let Some(cached) = self.load(place_id).await? {
            tracing::debug!(place = %place_id, reviews = cached.reviews.len(), "review cache hit");
            return Ok(CacheLookup {
                reviews: cached.reviews,
                hit: true,
                pages: cached.pages,
                upstream_error: None,
            });
        }

        tracing::info!(place = %place_id, min_count = self.min_count, "review cache miss; fetching");
        let outcome = self.fetcher.fetch(place_id, self.min_count).await?;
        let stored = self
            .persist(place_id, outcome.reviews, outcome.pages)
            .await?;

        Ok(CacheLookup {
            reviews: stored.reviews,
            hit: false,
            pages: stored.pages,
            upstream_error: outcome.upstream_error,
        })
    }

    async fn load(&self, place_id: &PlaceId) -> Result<Option<CachedReviews>> {
        self.ensure_namespace()
            .await
            .map_err(|e| cache_io(place_id, e))?;
        self.store
            .load_reviews(place_id)
            .await
            .map_err(|e| cache_io(place_id, e))
    }

    /// Store a set and return whichever set is persisted afterwards.
    async fn persist(
        &self,
        place_id: &PlaceId,
        reviews: ReviewSet,
        pages: u32,
    ) -> Result<CachedReviews> {
        self.ensure_namespace()
            .await
            .map_err(|e| cache_io(place_id, e))?;

        let cached = CachedReviews {
            reviews,
            pages,
            fetched_at: chrono::Utc::now().timestamp(),
        };
        let inserted = self
            .store
            .save_reviews(place_id, &cached)
            .await
            .map_err(|e| cache_io(place_id, e))?;

        if inserted {
            tracing::debug!(place = %place_id, reviews = cached.reviews.len(), "review set cached");
            return Ok(cached);
        }

        tracing::debug!(place = %place_id, "review set already cached; keeping the stored one");
        match self.load(place_id).await? {
            Some(existing) => Ok(existing),
            None => Err(cache_io(
                place_id,
                anyhow::anyhow!("review insert was skipped but no set is cached"),
            )),
        }
    }
}

fn cache_io(place_id: &PlaceId, source: anyhow::Error) -> anyhow::Error {
    CacheIoError {
        place_id: place_id.clone(),
        source,
    }
    .into()
}

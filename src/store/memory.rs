//! In-memory [`Store`] implementation for testing and ephemeral sessions.
//!
//! Uses `HashMap`s behind `std::sync::RwLock` for thread safety. Each
//! write replaces or inserts a whole value under one lock, so readers see
//! either the old state or the complete new artifact.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::index::VectorIndex;
use crate::models::PlaceId;

use super::{CachedReviews, PlaceSummary, Store};

/// In-memory store for tests and ephemeral use.
pub struct InMemoryStore {
    reviews: RwLock<HashMap<PlaceId, CachedReviews>>,
    indexes: RwLock<HashMap<PlaceId, VectorIndex>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            reviews: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ensure_review_namespace(&self) -> Result<()> {
        Ok(())
    }

    async fn load_reviews(&self, place_id: &PlaceId) -> Result<Option<CachedReviews>> {
        let reviews = self.reviews.read().map_err(|_| poisoned())?;
        Ok(reviews.get(place_id).cloned())
    }

    async fn save_reviews(&self, place_id: &PlaceId, cached: &CachedReviews) -> Result<bool> {
        let mut reviews = self.reviews.write().map_err(|_| poisoned())?;
        if reviews.contains_key(place_id) {
            return Ok(false);
        }
        reviews.insert(place_id.clone(), cached.clone());
        Ok(true)
    }

    async fn ensure_index_namespace(&self) -> Result<()> {
        Ok(())
    }

    async fn load_index(&self, place_id: &PlaceId) -> Result<Option<VectorIndex>> {
        let indexes = self.indexes.read().map_err(|_| poisoned())?;
        Ok(indexes.get(place_id).cloned())
    }

    async fn save_index(&self, index: &VectorIndex) -> Result<bool> {
        let mut indexes = self.indexes.write().map_err(|_| poisoned())?;
        if indexes.contains_key(&index.place_id) {
            return Ok(false);
        }
        indexes.insert(index.place_id.clone(), index.clone());
        Ok(true)
    }

    async fn delete_place(&self, place_id: &PlaceId, include_reviews: bool) -> Result<bool> {
        let mut removed = self
            .indexes
            .write()
            .map_err(|_| poisoned())?
            .remove(place_id)
            .is_some();
        if include_reviews {
            removed |= self
                .reviews
                .write()
                .map_err(|_| poisoned())?
                .remove(place_id)
                .is_some();
        }
        Ok(removed)
    }

    async fn list_places(&self) -> Result<Vec<PlaceSummary>> {
        let reviews = self.reviews.read().map_err(|_| poisoned())?;
        let indexes = self.indexes.read().map_err(|_| poisoned())?;

        let mut summaries: Vec<PlaceSummary> = reviews
            .iter()
            .map(|(place_id, cached)| PlaceSummary {
                place_id: place_id.clone(),
                review_count: cached.reviews.len() as i64,
                pages: cached.pages as i64,
                fetched_at: cached.fetched_at,
                index: indexes
                    .get(place_id)
                    .map(|idx| (idx.len() as i64, idx.model.clone())),
            })
            .collect();
        summaries.sort_by(|a, b| a.place_id.cmp(&b.place_id));
        Ok(summaries)
    }
}

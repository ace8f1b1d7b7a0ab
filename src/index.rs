//! Vector index over review texts, and its read-through builder.
//!
//! A [`VectorIndex`] is an immutable, brute-force nearest-neighbour index
//! over the embedded text of one place's reviews. [`IndexBuilder`] loads a
//! persisted index when one exists and otherwise builds, persists, and
//! returns a new one. Indexes never expire and are never updated in place;
//! `rh forget <place>` removes one so the next selection rebuilds it.

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::embedding::{cosine_similarity, embed_all, EmbeddingProvider};
use crate::errors::IndexIoError;
use crate::locks::KeyedLocks;
use crate::models::{PlaceId, ReviewSet};
use crate::store::Store;

/// One indexed review text and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub vector: Vec<f32>,
}

/// A review snippet returned from a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSnippet {
    /// Position of the entry in the index (insertion order).
    pub ordinal: usize,
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    pub place_id: PlaceId,
    /// Embedding model the entries were produced with.
    pub model: String,
    pub dims: usize,
    /// SHA-256 over the indexed texts, in order.
    pub source_hash: String,
    pub built_at: i64,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` entries most similar to `query`, best first.
    ///
    /// Ties are broken by insertion order. A zero-document index returns
    /// an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredSnippet> {
        let mut scored: Vec<ScoredSnippet> = self
            .entries
            .iter()
            .enumerate()
            .map(|(ordinal, entry)| ScoredSnippet {
                ordinal,
                text: entry.text.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        scored.truncate(k);
        scored
    }
}

/// Hash the ordered text list an index is built from.
pub fn source_hash(texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for text in texts {
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Read-through builder for persisted [`VectorIndex`]es.
pub struct IndexBuilder {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    locks: KeyedLocks,
    namespace: OnceCell<()>,
}

impl IndexBuilder {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size,
            locks: KeyedLocks::new(),
            namespace: OnceCell::new(),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Create the index namespace if it does not exist. Idempotent.
    pub async fn ensure_namespace(&self) -> Result<()> {
        self.namespace
            .get_or_try_init(|| async { self.store.ensure_index_namespace().await })
            .await?;
        Ok(())
    }

    /// Load the persisted index for `place_id`, if any.
    pub async fn load(&self, place_id: &PlaceId) -> Result<Option<VectorIndex>> {
        self.ensure_namespace()
            .await
            .map_err(|e| index_io(place_id, e))?;
        let index = self
            .store
            .load_index(place_id)
            .await
            .map_err(|e| index_io(place_id, e))?;

        if let Some(ref idx) = index {
            let stale =
                idx.model != self.embedder.model_name() || idx.dims != self.embedder.dims();
            if !idx.is_empty() && stale {
                bail!(
                    "index for {} was built with {} ({} dims) but the active embedding model is {} ({} dims); \
                     run `rh forget {}` to rebuild it",
                    place_id,
                    idx.model,
                    idx.dims,
                    self.embedder.model_name(),
                    self.embedder.dims(),
                    place_id
                );
            }
        }
        Ok(index)
    }

    /// Return the persisted index for `place_id`, building it on a miss.
    ///
    /// On a hit neither `supplier` nor the embedding model is invoked.
    /// On a miss the supplier's reviews are filtered to those with text,
    /// embedded, and persisted. If another writer persisted an index for
    /// the same place first, that index is returned instead.
    pub async fn get_or_build<F, Fut>(&self, place_id: &PlaceId, supplier: F) -> Result<VectorIndex>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ReviewSet>>,
    {
        let _guard = self.locks.lock(place_id).await;

        if let Some(index) = self.load(place_id).await? {
            tracing::debug!(place = %place_id, docs = index.len(), "vector index loaded from store");
            return Ok(index);
        }

        let reviews = supplier().await?;
        let index = self.build(place_id, &reviews).await?;

        let inserted = self
            .store
            .save_index(&index)
            .await
            .map_err(|e| index_io(place_id, e))?;

        if inserted {
            tracing::info!(
                place = %place_id,
                docs = index.len(),
                reviews = reviews.len(),
                model = %index.model,
                "vector index built"
            );
            return Ok(index);
        }

        tracing::debug!(place = %place_id, "vector index already persisted by another writer");
        match self.load(place_id).await? {
            Some(existing) => Ok(existing),
            None => Err(index_io(
                place_id,
                anyhow::anyhow!("index insert was skipped but no index is persisted"),
            )),
        }
    }

    async fn build(&self, place_id: &PlaceId, reviews: &ReviewSet) -> Result<VectorIndex> {
        let texts: Vec<String> = reviews
            .iter()
            .filter_map(|r| r.indexable_text())
            .map(str::to_string)
            .collect();

        let vectors = if texts.is_empty() {
            tracing::warn!(place = %place_id, "no review text to index; building an empty index");
            Vec::new()
        } else {
            embed_all(self.embedder.as_ref(), &texts, self.batch_size).await?
        };

        let hash = source_hash(&texts);
        let entries = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| IndexEntry { text, vector })
            .collect();

        Ok(VectorIndex {
            place_id: place_id.clone(),
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            source_hash: hash,
            built_at: chrono::Utc::now().timestamp(),
            entries,
        })
    }
}

fn index_io(place_id: &PlaceId, source: anyhow::Error) -> anyhow::Error {
    IndexIoError {
        place_id: place_id.clone(),
        source,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Review;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps each text to a 3-dim vector of keyword hits.
    struct KeywordEmbedder {
        model: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.contains("parking") as u8 as f32,
                        t.contains("food") as u8 as f32,
                        0.1,
                    ]
                })
                .collect())
        }
    }

    fn review(page: u32, text: Option<&str>) -> Review {
        Review {
            page,
            author_name: "tester".into(),
            author_profile_link: None,
            author_thumbnail: None,
            rating: Some(4.0),
            date: None,
            text: text.map(str::to_string),
            images: None,
            is_local_guide: None,
        }
    }

    fn embedder(model: &'static str) -> Arc<KeywordEmbedder> {
        Arc::new(KeywordEmbedder {
            model,
            calls: AtomicUsize::new(0),
        })
    }

    fn builder() -> (IndexBuilder, Arc<KeywordEmbedder>) {
        let embedder = embedder("keyword-test");
        let builder = IndexBuilder::new(Arc::new(InMemoryStore::new()), embedder.clone(), 16);
        (builder, embedder)
    }

    #[test]
    fn test_search_orders_by_similarity_then_ordinal() {
        let index = VectorIndex {
            place_id: PlaceId::new("p").unwrap(),
            model: "m".into(),
            dims: 2,
            source_hash: String::new(),
            built_at: 0,
            entries: vec![
                IndexEntry {
                    text: "far".into(),
                    vector: vec![0.0, 1.0],
                },
                IndexEntry {
                    text: "near-a".into(),
                    vector: vec![1.0, 0.0],
                },
                IndexEntry {
                    text: "near-b".into(),
                    vector: vec![2.0, 0.0],
                },
            ],
        };
        let hits = index.search(&[1.0, 0.0], 2);
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["near-a", "near-b"]);
    }

    #[test]
    fn test_source_hash_is_order_sensitive() {
        let a = source_hash(&["x".to_string(), "y".to_string()]);
        let b = source_hash(&["y".to_string(), "x".to_string()]);
        assert_ne!(a, b);
        assert_eq!(a, source_hash(&["x".to_string(), "y".to_string()]));
    }

    #[tokio::test]
    async fn test_build_skips_reviews_without_text() {
        let (builder, _) = builder();
        let place = PlaceId::new("p1").unwrap();
        let index = builder
            .get_or_build(&place, || async {
                Ok(vec![
                    review(1, Some("Huge parking lot")),
                    review(1, None),
                    review(2, Some("Food was cold")),
                ])
            })
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dims, 3);

        let hits = index.search(&[1.0, 0.0, 0.1], 1);
        assert_eq!(hits[0].text, "Huge parking lot");
    }

    #[tokio::test]
    async fn test_second_call_skips_supplier_and_embedder() {
        let (builder, embedder) = builder();
        let place = PlaceId::new("p1").unwrap();
        let counter = AtomicUsize::new(0);
        let supplied = &counter;

        for _ in 0..2 {
            builder
                .get_or_build(&place, || async move {
                    supplied.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![review(1, Some("parking is easy"))])
                })
                .await
                .unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_index_from_other_model_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let place = PlaceId::new("p1").unwrap();

        let old = IndexBuilder::new(store.clone(), embedder("bge-large-en-v1.5"), 16);
        old.get_or_build(&place, || async { Ok(vec![review(1, Some("parking is easy"))]) })
            .await
            .unwrap();

        // Same dims, different model: vectors are not comparable.
        let new_embedder = embedder("gte-large-en-v1.5");
        let new = IndexBuilder::new(store, new_embedder.clone(), 16);
        let err = new
            .get_or_build(&place, || async { Ok(vec![review(1, Some("parking is easy"))]) })
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bge-large-en-v1.5"));
        assert!(msg.contains("rh forget p1"));
        assert_eq!(new_embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_null_text_builds_empty_index() {
        let (builder, embedder) = builder();
        let place = PlaceId::new("quiet").unwrap();
        let index = builder
            .get_or_build(&place, || async { Ok(vec![review(1, None), review(1, None)]) })
            .await
            .unwrap();

        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0], 4).is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

        // The empty index is persisted like any other.
        assert!(builder.load(&place).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_supplier_error_persists_nothing() {
        let (builder, _) = builder();
        let place = PlaceId::new("broken").unwrap();
        let result = builder
            .get_or_build(&place, || async { Err(anyhow::anyhow!("upstream down")) })
            .await;
        assert!(result.is_err());
        assert!(builder.load(&place).await.unwrap().is_none());
    }
}

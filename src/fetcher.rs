//! Bounded, best-effort review pagination.
//!
//! [`ReviewFetcher::fetch`] requests pages sequentially, tagging each
//! review with a 1-based page counter. After each page two predicates are
//! checked, in order:
//!
//! 1. **exhausted**: the page carries no next-page token;
//! 2. **satisfied**: at least `min_count` reviews have been collected.
//!
//! Either one stops the loop, so a fetch never collects every page of a
//! popular place. An error on any page stops the loop immediately; if
//! reviews were already collected they are returned with the error noted
//! on the [`FetchOutcome`], otherwise the fetch fails with
//! [`UpstreamError`]. There is no retry and no rate limiting.

use std::sync::Arc;

use anyhow::Result;

use crate::errors::UpstreamError;
use crate::models::{PlaceId, ReviewSet};
use crate::source::ReviewSource;

/// Default number of reviews after which pagination stops.
pub const DEFAULT_MIN_COUNT: usize = 50;

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub reviews: ReviewSet,
    /// Number of page requests issued.
    pub pages: u32,
    /// Set when an upstream error cut the fetch short after some reviews
    /// were collected.
    pub upstream_error: Option<String>,
}

impl FetchOutcome {
    pub fn is_partial(&self) -> bool {
        self.upstream_error.is_some()
    }
}

pub struct ReviewFetcher {
    source: Arc<dyn ReviewSource>,
}

impl ReviewFetcher {
    pub fn new(source: Arc<dyn ReviewSource>) -> Self {
        Self { source }
    }

    pub async fn fetch(&self, place_id: &PlaceId, min_count: usize) -> Result<FetchOutcome> {
        let mut reviews = ReviewSet::new();
        let mut token: Option<String> = None;
        let mut page: u32 = 0;

        loop {
            page += 1;

            let error = match self.source.fetch_page(place_id, token.as_deref()).await {
                Ok(response) if response.error.is_none() => {
                    let count = response.reviews.len();
                    reviews.extend(response.reviews.into_iter().map(|r| r.into_review(page)));
                    tracing::debug!(
                        place = %place_id,
                        page,
                        count,
                        total = reviews.len(),
                        "fetched review page"
                    );

                    match response.next_page_token {
                        None => break,
                        Some(_) if reviews.len() >= min_count => break,
                        Some(next) => {
                            token = Some(next);
                            continue;
                        }
                    }
                }
                Ok(response) => response.error.unwrap_or_default(),
                Err(e) => format!("{:#}", e),
            };

            if reviews.is_empty() {
                return Err(UpstreamError {
                    place_id: place_id.clone(),
                    page,
                    message: error,
                }
                .into());
            }

            tracing::warn!(
                place = %place_id,
                page,
                collected = reviews.len(),
                error = %error,
                "review source failed mid-pagination; keeping partial results"
            );
            return Ok(FetchOutcome {
                reviews,
                pages: page,
                upstream_error: Some(error),
            });
        }

        Ok(FetchOutcome {
            reviews,
            pages: page,
            upstream_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ReviewPage, SourceReview};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves pre-scripted pages in order and records the tokens it saw.
    struct ScriptedSource {
        pages: Mutex<Vec<Result<ReviewPage>>>,
        seen_tokens: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<ReviewPage>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into_iter().rev().collect()),
                seen_tokens: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> usize {
            self.seen_tokens.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReviewSource for ScriptedSource {
        async fn fetch_page(&self, _: &PlaceId, token: Option<&str>) -> Result<ReviewPage> {
            self.seen_tokens
                .lock()
                .unwrap()
                .push(token.map(str::to_string));
            self.pages
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more scripted pages")))
        }
    }

    fn page(n: usize, next: Option<&str>) -> Result<ReviewPage> {
        Ok(ReviewPage {
            reviews: (0..n)
                .map(|i| SourceReview {
                    author_name: format!("user-{}", i),
                    text: (i % 3 != 0).then(|| format!("review {}", i)),
                    ..SourceReview::default()
                })
                .collect(),
            next_page_token: next.map(str::to_string),
            error: None,
        })
    }

    fn error_page(msg: &str) -> Result<ReviewPage> {
        Ok(ReviewPage {
            error: Some(msg.to_string()),
            ..ReviewPage::default()
        })
    }

    fn place() -> PlaceId {
        PlaceId::new("ChIJ-test").unwrap()
    }

    #[tokio::test]
    async fn test_stops_on_exhaustion_below_min_count() {
        let source = ScriptedSource::new(vec![page(5, Some("A")), page(5, None)]);
        let out = ReviewFetcher::new(source.clone())
            .fetch(&place(), 50)
            .await
            .unwrap();

        assert_eq!(out.reviews.len(), 10);
        assert_eq!(out.pages, 2);
        assert!(!out.is_partial());
        assert_eq!(
            *source.seen_tokens.lock().unwrap(),
            vec![None, Some("A".to_string())]
        );
    }

    #[tokio::test]
    async fn test_single_large_page() {
        let source = ScriptedSource::new(vec![page(60, None)]);
        let out = ReviewFetcher::new(source.clone())
            .fetch(&place(), 50)
            .await
            .unwrap();

        assert_eq!(out.reviews.len(), 60);
        assert_eq!(source.requests(), 1);
    }

    #[tokio::test]
    async fn test_stops_once_min_count_reached() {
        let source = ScriptedSource::new(vec![
            page(20, Some("p2")),
            page(20, Some("p3")),
            page(20, Some("p4")),
            page(20, None),
        ]);
        let out = ReviewFetcher::new(source.clone())
            .fetch(&place(), 50)
            .await
            .unwrap();

        assert_eq!(out.reviews.len(), 60);
        assert_eq!(source.requests(), 3);
    }

    #[tokio::test]
    async fn test_size_bounds_across_min_counts() {
        for min_count in [1usize, 7, 10, 11, 25, 40] {
            let source = ScriptedSource::new(vec![
                page(10, Some("b")),
                page(10, Some("c")),
                page(10, None),
            ]);
            let out = ReviewFetcher::new(source.clone())
                .fetch(&place(), min_count)
                .await
                .unwrap();
            let total_available = 30;

            assert!(out.reviews.len() >= min_count.min(total_available));
            assert!(out.reviews.len() <= total_available);
            // No request is issued after the threshold is met.
            assert_eq!(source.requests(), min_count.div_ceil(10).min(3));
        }
    }

    #[tokio::test]
    async fn test_error_after_first_page_returns_partial() {
        let source = ScriptedSource::new(vec![page(20, Some("p2")), error_page("quota exceeded")]);
        let out = ReviewFetcher::new(source.clone())
            .fetch(&place(), 50)
            .await
            .unwrap();

        assert_eq!(out.reviews.len(), 20);
        assert_eq!(out.upstream_error.as_deref(), Some("quota exceeded"));
        assert_eq!(source.requests(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_after_first_page_returns_partial() {
        let source = ScriptedSource::new(vec![
            page(20, Some("p2")),
            Err(anyhow::anyhow!("connection reset")),
        ]);
        let out = ReviewFetcher::new(source).fetch(&place(), 50).await.unwrap();
        assert_eq!(out.reviews.len(), 20);
        assert!(out.upstream_error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_error_on_first_page_is_upstream_error() {
        let source = ScriptedSource::new(vec![error_page("Invalid API key.")]);
        let err = ReviewFetcher::new(source).fetch(&place(), 50).await.unwrap_err();
        let upstream = err.downcast_ref::<UpstreamError>().unwrap();
        assert_eq!(upstream.page, 1);
        assert_eq!(upstream.message, "Invalid API key.");
    }

    #[tokio::test]
    async fn test_place_without_reviews_yields_empty_set() {
        let source = ScriptedSource::new(vec![page(0, None)]);
        let out = ReviewFetcher::new(source).fetch(&place(), 50).await.unwrap();
        assert!(out.reviews.is_empty());
        assert!(!out.is_partial());
    }

    #[tokio::test]
    async fn test_pages_are_tagged_monotonically() {
        let source = ScriptedSource::new(vec![page(3, Some("x")), page(2, Some("y")), page(4, None)]);
        let out = ReviewFetcher::new(source).fetch(&place(), 50).await.unwrap();
        let pages: Vec<u32> = out.reviews.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 1, 1, 2, 2, 3, 3, 3, 3]);
    }
}

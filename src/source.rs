//! Review source abstraction and the SerpApi Google Maps Reviews client.
//!
//! A [`ReviewSource`] returns one page of reviews per call. Pagination
//! state is an opaque token handed back in [`ReviewPage::next_page_token`];
//! the fetcher passes it to the next call unchanged.
//!
//! # SerpApi
//!
//! [`SerpApiSource`] calls `GET {base_url}/search.json` with the
//! `google_maps_reviews` engine. A page has a successor only when the
//! response carries both `serpapi_pagination.next` and
//! `serpapi_pagination.next_page_token`; the query parameters of the
//! `next` URL are merged into the following request.
//!
//! The API key is read from the environment variable named by
//! `fetch.api_key_env` (default `SERPAPI_API_KEY`).

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::FetchConfig;
use crate::models::{PlaceId, Review};

/// A review as reported by the source, before page tagging.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceReview {
    pub author_name: String,
    pub author_profile_link: Option<String>,
    pub author_thumbnail: Option<String>,
    pub rating: Option<f64>,
    pub date: Option<String>,
    pub text: Option<String>,
    pub images: Option<Vec<String>>,
    pub is_local_guide: Option<bool>,
}

impl SourceReview {
    pub fn into_review(self, page: u32) -> Review {
        Review {
            page,
            author_name: self.author_name,
            author_profile_link: self.author_profile_link,
            author_thumbnail: self.author_thumbnail,
            rating: self.rating,
            date: self.date,
            text: self.text,
            images: self.images,
            is_local_guide: self.is_local_guide,
        }
    }
}

/// One page of a review listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPage {
    pub reviews: Vec<SourceReview>,
    /// Present when another page can be requested.
    pub next_page_token: Option<String>,
    /// Error reported by the source for this page.
    pub error: Option<String>,
}

/// A paginated source of place reviews.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Fetch one page. `page_token` is `None` for the first page.
    ///
    /// Transport failures are returned as `Err`; errors reported in the
    /// response body are returned in [`ReviewPage::error`]. The fetcher
    /// treats both as terminal for the current fetch.
    async fn fetch_page(&self, place_id: &PlaceId, page_token: Option<&str>) -> Result<ReviewPage>;
}

/// SerpApi `google_maps_reviews` client.
pub struct SerpApiSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl SerpApiSource {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!("{} environment variable not set", config.api_key_env)
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            language: config.language.clone(),
        })
    }

    fn query_params(
        &self,
        place_id: &PlaceId,
        page_token: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        params.insert("engine".to_string(), "google_maps_reviews".to_string());
        params.insert("hl".to_string(), self.language.clone());
        params.insert("place_id".to_string(), place_id.as_str().to_string());
        params.insert("no_cache".to_string(), "true".to_string());

        if let Some(next) = page_token {
            let next_url = url::Url::parse(next)
                .with_context(|| format!("invalid SerpApi pagination URL: {}", next))?;
            for (k, v) in next_url.query_pairs() {
                params.insert(k.into_owned(), v.into_owned());
            }
        }

        params.insert("api_key".to_string(), self.api_key.clone());
        Ok(params)
    }
}

#[async_trait]
impl ReviewSource for SerpApiSource {
    async fn fetch_page(&self, place_id: &PlaceId, page_token: Option<&str>) -> Result<ReviewPage> {
        let params = self.query_params(place_id, page_token)?;

        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&params)
            .send()
            .await
            .with_context(|| format!("SerpApi request failed for place {}", place_id))?;

        let status = response.status();
        let body = response.text().await?;
        let json: Value = match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(_) if !status.is_success() => {
                return Ok(ReviewPage {
                    error: Some(format!("SerpApi HTTP {}: {}", status, body.trim())),
                    ..ReviewPage::default()
                });
            }
            Err(e) => return Err(e).context("SerpApi returned invalid JSON"),
        };

        let mut page = parse_serpapi_page(&json);
        if page.error.is_none() && !status.is_success() {
            page.error = Some(format!("SerpApi HTTP {}", status));
        }
        Ok(page)
    }
}

/// Stands in for a source that could not be configured.
///
/// Lets cached places be served without upstream credentials; any actual
/// fetch fails with the configuration error.
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ReviewSource for UnavailableSource {
    async fn fetch_page(&self, _: &PlaceId, _: Option<&str>) -> Result<ReviewPage> {
        anyhow::bail!("review source unavailable: {}", self.reason)
    }
}

/// Parse a SerpApi `google_maps_reviews` response body.
pub fn parse_serpapi_page(json: &Value) -> ReviewPage {
    if let Some(err) = json.get("error") {
        let message = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return ReviewPage {
            error: Some(message),
            ..ReviewPage::default()
        };
    }

    let reviews = json
        .get("reviews")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_serpapi_review).collect())
        .unwrap_or_default();

    let pagination = json.get("serpapi_pagination");
    let next = pagination
        .and_then(|p| p.get("next"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let has_token = pagination
        .and_then(|p| p.get("next_page_token"))
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());

    ReviewPage {
        reviews,
        next_page_token: next.filter(|_| has_token).map(str::to_string),
        error: None,
    }
}

fn parse_serpapi_review(item: &Value) -> SourceReview {
    let user = item.get("user");
    let user_str = |key: &str| {
        user.and_then(|u| u.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    SourceReview {
        author_name: user_str("name").unwrap_or_default(),
        author_profile_link: user_str("link"),
        author_thumbnail: user_str("thumbnail"),
        rating: item.get("rating").and_then(Value::as_f64),
        date: item.get("date").and_then(Value::as_str).map(str::to_string),
        text: item
            .get("snippet")
            .and_then(Value::as_str)
            .map(str::to_string),
        images: item.get("images").and_then(Value::as_array).map(|imgs| {
            imgs.iter()
                .filter_map(|i| {
                    i.as_str()
                        .or_else(|| i.get("thumbnail").and_then(Value::as_str))
                        .map(str::to_string)
                })
                .collect()
        }),
        is_local_guide: user
            .and_then(|u| u.get("local_guide"))
            .and_then(Value::as_bool),
    }
}

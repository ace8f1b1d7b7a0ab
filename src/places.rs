//! Place-name suggestions via the Google Places Autocomplete API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PlacesConfig;
use crate::models::{PlaceId, PlaceSuggestion};

#[async_trait]
pub trait PlaceLookup: Send + Sync {
    /// Suggestions for `input`, in the order the provider ranks them.
    async fn suggest(&self, input: &str) -> Result<Vec<PlaceSuggestion>>;
}

pub struct GooglePlacesLookup {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    types: String,
    countries: Vec<String>,
}

impl GooglePlacesLookup {
    pub fn new(config: &PlacesConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            types: config.types.clone(),
            countries: config.countries.clone(),
        })
    }

    fn query_params(&self, input: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("input", input.to_string()),
            ("types", self.types.clone()),
        ];
        if !self.countries.is_empty() {
            let components = self
                .countries
                .iter()
                .map(|cc| format!("country:{}", cc))
                .collect::<Vec<_>>()
                .join("|");
            params.push(("components", components));
        }
        params.push(("key", self.api_key.clone()));
        params
    }
}

#[async_trait]
impl PlaceLookup for GooglePlacesLookup {
    async fn suggest(&self, input: &str) -> Result<Vec<PlaceSuggestion>> {
        if input.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(format!("{}/autocomplete/json", self.base_url))
            .query(&self.query_params(input))
            .send()
            .await
            .context("Places autocomplete request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Places API error {}: {}", status, body);
        }

        let body: AutocompleteResponse = response
            .json()
            .await
            .context("invalid Places autocomplete response")?;
        parse_autocomplete(body)
    }
}

#[derive(Debug, Deserialize)]
struct AutocompleteResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    description: String,
    place_id: String,
}

fn parse_autocomplete(body: AutocompleteResponse) -> Result<Vec<PlaceSuggestion>> {
    match body.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(Vec::new()),
        other => bail!(
            "Places API returned {}: {}",
            other,
            body.error_message.unwrap_or_default()
        ),
    }

    body.predictions
        .into_iter()
        .map(|p| {
            Ok(PlaceSuggestion {
                display_name: p.description,
                place_id: PlaceId::new(p.place_id)?,
            })
        })
        .collect()
}

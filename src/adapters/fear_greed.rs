//! Fear & Greed index client (alternative.me)

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::ports::MarketDataError;

pub const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/?limit=1";

#[derive(Debug, Deserialize)]
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
}

#[derive(Debug, Clone)]
pub struct FearGreedClient {
    http: Client,
    url: String,
}

impl FearGreedClient {
    pub fn new() -> Result<Self, MarketDataError> {
        Self::with_url(FEAR_GREED_URL)
    }

    pub fn with_url(url: &str) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MarketDataError::RestError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Latest 0-100 index value
    pub async fn fetch_index(&self) -> Result<f64, MarketDataError> {
        let body = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MarketDataError::RestError(e.to_string()))?
            .text()
            .await
            .map_err(|e| MarketDataError::RestError(e.to_string()))?;

        parse_index(&body)
    }
}

/// Fetch the current index with a default client
pub async fn fetch_fear_and_greed() -> Result<f64, MarketDataError> {
    FearGreedClient::new()?.fetch_index().await
}

/// Extract the index from an alternative.me `fng` response
pub fn parse_index(body: &str) -> Result<f64, MarketDataError> {
    let response: FngResponse =
        serde_json::from_str(body).map_err(|e| MarketDataError::ParseError(e.to_string()))?;

    let entry = response
        .data
        .first()
        .ok_or_else(|| MarketDataError::ParseError("empty fear & greed response".into()))?;

    let value: f64 = entry
        .value
        .parse()
        .map_err(|e| MarketDataError::ParseError(format!("fear & greed value '{}': {}", entry.value, e)))?;

    if !(0.0..=100.0).contains(&value) {
        return Err(MarketDataError::ParseError(format!("fear & greed value out of range: {}", value)));
    }
    Ok(value)
}

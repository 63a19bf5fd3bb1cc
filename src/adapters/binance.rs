//! Binance public market data
//!
//! Unsigned klines endpoint only. Account balances need signed requests,
//! which this client does not make.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::domain::TimeFrame;
use crate::ports::{DataProvider, MarketDataError, Ohlcv};

pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";

/// Binance caps a klines request at 1000 rows
pub const MAX_KLINES: u32 = 1000;

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub limit: u32,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BINANCE_URL.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            limit: 500,
        }
    }
}

/// Klines client for the Binance spot REST API
#[derive(Debug, Clone)]
pub struct BinanceDataProvider {
    config: BinanceConfig,
    http: Client,
}

impl BinanceDataProvider {
    pub fn new(base_url: &str) -> Result<Self, MarketDataError> {
        Self::with_config(BinanceConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..BinanceConfig::default()
        })
    }

    pub fn with_config(config: BinanceConfig) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketDataError::RestError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: Option<DateTime<Utc>>,
    ) -> Result<Vec<Vec<Value>>, MarketDataError> {
        let url = format!("{}/api/v3/klines", self.config.base_url);
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", timeframe.binance_interval().to_string()),
            ("limit", self.config.limit.min(MAX_KLINES).to_string()),
        ];
        if let Some(start) = start {
            query.push(("startTime", start.timestamp_millis().to_string()));
        }

        let mut last_error = None;
        for attempt in 0..self.config.max_retries.max(1) {
            let response = match self.http.get(&url).query(&query).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(MarketDataError::RestError(e.to_string()));
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                tracing::warn!(
                    "Binance returned {}, backing off for {:?} (attempt {}/{})",
                    status,
                    backoff,
                    attempt + 1,
                    self.config.max_retries
                );
                last_error = Some(MarketDataError::RestError(format!("HTTP {}", status)));
                tokio::time::sleep(backoff).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(MarketDataError::RestError(format!("API error {}: {}", status, body)));
            }

            return response
                .json()
                .await
                .map_err(|e| MarketDataError::ParseError(format!("Failed to parse klines: {}", e)));
        }

        Err(last_error.unwrap_or_else(|| MarketDataError::RestError("Max retries exceeded".into())))
    }
}

/// Convert one kline row `[open_time, open, high, low, close, volume, ...]`
pub fn parse_kline(row: &[Value]) -> Result<Ohlcv, MarketDataError> {
    if row.len() < 6 {
        return Err(MarketDataError::ParseError(format!("kline has {} fields", row.len())));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| MarketDataError::ParseError("kline open time is not an integer".into()))?;
    let timestamp = DateTime::from_timestamp_millis(open_time)
        .ok_or_else(|| MarketDataError::ParseError(format!("kline open time out of range: {}", open_time)))?;

    // Prices come back as decimal strings
    let number = |i: usize| -> Result<f64, MarketDataError> {
        match &row[i] {
            Value::String(s) => s
                .parse::<f64>()
                .map_err(|e| MarketDataError::ParseError(format!("kline field {}: {}", i, e))),
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| MarketDataError::ParseError(format!("kline field {} not finite", i))),
            other => Err(MarketDataError::ParseError(format!("kline field {}: {}", i, other))),
        }
    };

    Ok(Ohlcv::new(timestamp, number(1)?, number(2)?, number(3)?, number(4)?, number(5)?))
}

#[async_trait]
impl DataProvider for BinanceDataProvider {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: Option<DateTime<Utc>>,
    ) -> Result<Vec<Ohlcv>, MarketDataError> {
        let rows = self.get_klines(symbol, timeframe, start).await?;
        let bars = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Fetched {} {} bars for {}", bars.len(), timeframe, symbol);
        Ok(bars)
    }

    async fn get_balance(&self, coin: &str) -> Result<f64, MarketDataError> {
        Err(MarketDataError::Unsupported(format!(
            "balance of {} needs signed Binance requests",
            coin
        )))
    }
}

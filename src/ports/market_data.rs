//! Market data port
//!
//! OHLCV bars and the provider trait the live loop pulls them from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TimeFrame;

/// Market data error type
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("REST API error: {0}")]
    RestError(String),

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// One open/high/low/close/volume bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Ohlcv {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// True range against the previous close
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(prev) => hl.max((self.high - prev).abs()).max((self.low - prev).abs()),
            None => hl,
        }
    }
}

/// Source of historical and recent market data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Bars for `symbol` on `timeframe`, oldest first, optionally from `start`
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: Option<DateTime<Utc>>,
    ) -> Result<Vec<Ohlcv>, MarketDataError>;

    /// Free balance of `coin` on the account backing this provider
    async fn get_balance(&self, coin: &str) -> Result<f64, MarketDataError>;
}

//! Notification port

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{MarketRegime, TimeFrame, TradeResult, TradeSetup};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Notifier not configured")]
    NotConfigured,
}

/// Outbound alerts about trades and regime changes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_trade(&self, setup: &TradeSetup, result: &TradeResult) -> Result<(), NotifyError>;

    async fn notify_regime_change(
        &self,
        pair: &str,
        timeframe: TimeFrame,
        previous: MarketRegime,
        current: MarketRegime,
        confidence: f64,
    ) -> Result<(), NotifyError>;
}

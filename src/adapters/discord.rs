//! Discord webhook notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::domain::{MarketRegime, TimeFrame, TradeResult, TradeSetup};
use crate::ports::{Notifier, NotifyError};

#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Delivery(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    async fn send_message(&self, content: &str) -> Result<(), NotifyError> {
        if !self.is_configured() {
            tracing::debug!("Discord webhook not configured, skipping notification");
            return Err(NotifyError::NotConfigured);
        }

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!("Discord returned {}: {}", status, body)));
        }

        tracing::debug!("Discord notification sent");
        Ok(())
    }
}

/// Message body for an executed trade
pub fn format_trade(setup: &TradeSetup, result: &TradeResult) -> String {
    let mut lines = vec![
        format!("**{} - {}** [{}]", setup.side, setup.pair, setup.timeframe),
        format!("Regime: {} (confidence: {:.0}%)", setup.regime, setup.confidence * 100.0),
        format!("Price: {:.2}", result.price),
        format!("Quantity: {:.6}", result.quantity),
    ];
    if setup.stop_loss > 0.0 {
        lines.push(format!("SL: {:.2}", setup.stop_loss));
    }
    if setup.take_profit > 0.0 {
        lines.push(format!("TP: {:.2}", setup.take_profit));
    }
    if setup.risk_reward_ratio > 0.0 {
        lines.push(format!("R:R = {:.2}", setup.risk_reward_ratio));
    }
    lines.push(format!("Portfolio: {:.2}", result.total_portfolio_value));
    lines.join("\n")
}

pub fn format_regime_change(
    pair: &str,
    timeframe: TimeFrame,
    previous: MarketRegime,
    current: MarketRegime,
    confidence: f64,
) -> String {
    format!(
        "**Regime Change - {}** [{}]\n{} -> {} (confidence: {:.0}%)",
        pair,
        timeframe,
        previous,
        current,
        confidence * 100.0
    )
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify_trade(&self, setup: &TradeSetup, result: &TradeResult) -> Result<(), NotifyError> {
        self.send_message(&format_trade(setup, result)).await
    }

    async fn notify_regime_change(
        &self,
        pair: &str,
        timeframe: TimeFrame,
        previous: MarketRegime,
        current: MarketRegime,
        confidence: f64,
    ) -> Result<(), NotifyError> {
        self.send_message(&format_regime_change(pair, timeframe, previous, current, confidence))
            .await
    }
}

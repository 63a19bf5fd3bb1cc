//! Decision Engine
//!
//! Folds indicator signals into a trend score and an overall signal, and
//! carries the regime-naive baseline trade policy.

use chrono::{DateTime, Utc};

use super::params::{ProtectionConfig, RiskProfileConfig};
use crate::domain::{
    min_tradable_quantity, IndicatorResult, MarketContext, MarketRegime, PortfolioState, Signal,
    TimeFrame, TradeSetup, MIN_NOTIONAL,
};

/// Indicators that contribute to the trend score
pub const SCORING_INDICATORS: [&str; 9] = [
    "adi",
    "bollinger",
    "ema",
    "macd",
    "rsi",
    "sma",
    "stoch_rsi",
    "volume",
    "fear_and_greed",
];

/// Converts indicator results into a market context and baseline trades
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    risk_profile: RiskProfileConfig,
    protection: ProtectionConfig,
}

impl DecisionEngine {
    pub fn new(risk_profile: RiskProfileConfig, protection: ProtectionConfig) -> Self {
        Self {
            risk_profile,
            protection,
        }
    }

    pub fn risk_profile(&self) -> &RiskProfileConfig {
        &self.risk_profile
    }

    /// Score the indicator results, timestamped now
    pub fn compute_market_context(
        &self,
        results: Vec<IndicatorResult>,
        regime: MarketRegime,
        regime_confidence: f64,
    ) -> MarketContext {
        self.compute_market_context_at(results, regime, regime_confidence, Utc::now())
    }

    /// Score the indicator results with an explicit timestamp.
    ///
    /// Only scoring indicators vote: bullish/oversold +1, bearish/overbought -1.
    pub fn compute_market_context_at(
        &self,
        results: Vec<IndicatorResult>,
        regime: MarketRegime,
        regime_confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> MarketContext {
        let trend_score = trend_score(&results);
        let signal = match trend_score {
            s if s > 0 => Signal::Bullish,
            s if s < 0 => Signal::Bearish,
            _ => Signal::Neutral,
        };

        let regime_confidence = if regime_confidence.is_finite() {
            regime_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        MarketContext {
            regime,
            regime_confidence,
            trend_score,
            signal,
            indicators: results,
            timestamp,
        }
    }

    /// Baseline policy: buy a bullish score, sell the position on a bearish one
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        context: &MarketContext,
        pair: &str,
        current_price: f64,
        fiat_amount: f64,
        crypto_amount: f64,
        trade_in_progress: bool,
        timeframe: TimeFrame,
    ) -> Option<TradeSetup> {
        if !(current_price.is_finite() && current_price > 0.0) {
            tracing::warn!("No trade: invalid price {}", current_price);
            return None;
        }

        let profile = self.risk_profile.profile();

        if context.signal == Signal::Bullish
            && context.trend_score > 0
            && !trade_in_progress
            && fiat_amount > MIN_NOTIONAL
        {
            let quantity = fiat_amount * self.risk_profile.risk_per_trade / current_price;
            let stop_loss = current_price * (1.0 - self.protection.sl_level);
            let take_profit = current_price * (1.0 + self.protection.tp1_level);

            return Some(TradeSetup::buy(
                pair,
                current_price,
                quantity,
                stop_loss,
                take_profit,
                profile,
                timeframe,
                context.regime,
                context.regime_confidence,
            ));
        }

        if context.signal == Signal::Bearish
            && context.trend_score < 0
            && trade_in_progress
            && crypto_amount > min_tradable_quantity(current_price)
        {
            return Some(TradeSetup::sell(
                pair,
                current_price,
                crypto_amount,
                profile,
                timeframe,
                context.regime,
                context.regime_confidence,
            ));
        }

        tracing::info!(
            "No trade opportunity (score={}, signal={})",
            context.trend_score,
            context.signal
        );
        None
    }

    /// `evaluate` driven by a portfolio snapshot
    pub fn evaluate_portfolio(
        &self,
        context: &MarketContext,
        portfolio: &PortfolioState,
        timeframe: TimeFrame,
    ) -> Option<TradeSetup> {
        self.evaluate(
            context,
            &portfolio.pair,
            portfolio.current_price,
            portfolio.fiat_amount,
            portfolio.crypto_amount,
            portfolio.trade_in_progress,
            timeframe,
        )
    }
}

/// Bullish votes minus bearish votes of the scoring indicators
pub fn trend_score(results: &[IndicatorResult]) -> i32 {
    results
        .iter()
        .filter(|r| SCORING_INDICATORS.contains(&r.name.as_str()))
        .map(|r| {
            if r.is_bullish() {
                1
            } else if r.is_bearish() {
                -1
            } else {
                0
            }
        })
        .sum()
}

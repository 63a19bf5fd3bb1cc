//! Bear Market Strategy
//!
//! Defensive: closes an open position as soon as the market confirms the
//! downtrend, and only opens a small long on a strong reversal with a tight
//! stop, a quick target and at least 2:1 reward to risk.

use super::{valid_price, Strategy, StrategyParams};
use crate::domain::{
    min_tradable_quantity, risk_reward, MarketContext, MarketRegime, PortfolioState, Signal, TimeFrame,
    TradeSetup, MIN_NOTIONAL,
};

/// Trend score below which an open position is closed
const EXIT_TREND_SCORE: i32 = -1;
/// Trend score above which a reversal long is considered
const REVERSAL_TREND_SCORE: i32 = 2;
const MIN_RISK_REWARD: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct BearMarketStrategy {
    params: StrategyParams,
    timeframe: TimeFrame,
}

impl Default for BearMarketStrategy {
    fn default() -> Self {
        Self::new(StrategyParams::bear(), TimeFrame::Daily)
    }
}

impl BearMarketStrategy {
    pub fn new(params: StrategyParams, timeframe: TimeFrame) -> Self {
        Self { params, timeframe }
    }
}

impl Strategy for BearMarketStrategy {
    fn name(&self) -> &'static str {
        "bear_market"
    }

    fn target_regime(&self) -> MarketRegime {
        MarketRegime::Bear
    }

    fn evaluate(&self, context: &MarketContext, portfolio: &PortfolioState) -> Option<TradeSetup> {
        let price = valid_price(portfolio.current_price)?;

        // Closing comes first
        if portfolio.trade_in_progress
            && portfolio.crypto_amount > min_tradable_quantity(price)
            && context.signal == Signal::Bearish
            && context.trend_score < EXIT_TREND_SCORE
        {
            tracing::info!("Bear strategy: closing position (defensive)");
            return Some(TradeSetup::sell(
                &portfolio.pair,
                price,
                portfolio.crypto_amount,
                portfolio.risk_profile,
                self.timeframe,
                MarketRegime::Bear,
                context.regime_confidence,
            ));
        }

        if portfolio.trade_in_progress
            || portfolio.fiat_amount <= MIN_NOTIONAL
            || context.trend_score <= REVERSAL_TREND_SCORE
        {
            return None;
        }

        let quantity = portfolio.fiat_amount * self.params.risk_per_trade / price;
        let stop_loss = price * (1.0 - self.params.sl_level);
        let take_profit = price * (1.0 + self.params.tp_level);
        let rr = risk_reward(price, stop_loss, take_profit, quantity);

        if rr < MIN_RISK_REWARD || quantity <= 0.0 {
            tracing::debug!("Bear strategy: reversal skipped, R:R {:.2}", rr);
            return None;
        }

        Some(TradeSetup::buy(
            &portfolio.pair,
            price,
            quantity,
            stop_loss,
            take_profit,
            portfolio.risk_profile,
            self.timeframe,
            MarketRegime::Bear,
            context.regime_confidence,
        ))
    }
}

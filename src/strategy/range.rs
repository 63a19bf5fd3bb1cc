//! Range Strategy
//!
//! Mean reversion inside a sideways market: buy close to support when the
//! Bollinger reading is weak, sell close to resistance when it is strong.

use super::{valid_price, Strategy, StrategyParams};
use crate::domain::{
    min_tradable_quantity, MarketContext, MarketRegime, PortfolioState, Signal, TimeFrame, TradeSetup,
    MIN_NOTIONAL,
};
use crate::indicators::support_resistance::{RESISTANCE, SUPPORT};

/// Distance from a level that still counts as "at" the level
const LEVEL_PROXIMITY: f64 = 0.02;

#[derive(Debug, Clone)]
pub struct RangeStrategy {
    params: StrategyParams,
    timeframe: TimeFrame,
}

impl Default for RangeStrategy {
    fn default() -> Self {
        Self::new(StrategyParams::range(), TimeFrame::Daily)
    }
}

impl RangeStrategy {
    pub fn new(params: StrategyParams, timeframe: TimeFrame) -> Self {
        Self { params, timeframe }
    }
}

impl Strategy for RangeStrategy {
    fn name(&self) -> &'static str {
        "range_market"
    }

    fn target_regime(&self) -> MarketRegime {
        MarketRegime::Range
    }

    fn evaluate(&self, context: &MarketContext, portfolio: &PortfolioState) -> Option<TradeSetup> {
        let price = valid_price(portfolio.current_price)?;

        let levels = context.indicator("support_resistance");
        let support = levels.and_then(|r| r.number(SUPPORT));
        let resistance = levels.and_then(|r| r.number(RESISTANCE));
        let bollinger = context.indicator("bollinger").map(|r| r.signal);

        let weak_band = matches!(bollinger, Some(Signal::Oversold | Signal::Bearish));
        let near_support = support.is_some_and(|s| price <= s * (1.0 + LEVEL_PROXIMITY));

        if !portfolio.trade_in_progress
            && portfolio.fiat_amount > MIN_NOTIONAL
            && weak_band
            && near_support
        {
            let quantity = portfolio.fiat_amount * self.params.risk_per_trade / price;
            let stop_loss = price * (1.0 - self.params.sl_level);
            let band_target = price * (1.0 + self.params.tp_level);
            let take_profit = resistance.unwrap_or(band_target).min(band_target);

            if quantity <= 0.0 {
                return None;
            }

            tracing::info!("Range strategy: buying near support ({:.2})", price);
            return Some(TradeSetup::buy(
                &portfolio.pair,
                price,
                quantity,
                stop_loss,
                take_profit,
                portfolio.risk_profile,
                self.timeframe,
                MarketRegime::Range,
                context.regime_confidence,
            ));
        }

        let strong_band = matches!(bollinger, Some(Signal::Overbought | Signal::Bullish));
        let near_resistance = resistance.is_some_and(|r| price >= r * (1.0 - LEVEL_PROXIMITY));

        if portfolio.trade_in_progress
            && portfolio.crypto_amount > min_tradable_quantity(price)
            && strong_band
            && near_resistance
        {
            tracing::info!("Range strategy: selling near resistance ({:.2})", price);
            return Some(TradeSetup::sell(
                &portfolio.pair,
                price,
                portfolio.crypto_amount,
                portfolio.risk_profile,
                self.timeframe,
                MarketRegime::Range,
                context.regime_confidence,
            ));
        }

        None
    }
}

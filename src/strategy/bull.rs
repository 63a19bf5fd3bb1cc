//! Bull Market Strategy
//!
//! Trend following: buys bullish confirmation with a wide stop and a wide
//! target, and sizes up on pullbacks to the 38.2% Fibonacci retracement.
//! No exit logic; the stop-loss and take-profit set at entry close the trade.

use super::{valid_price, Strategy, StrategyParams};
use crate::domain::{MarketContext, MarketRegime, PortfolioState, Signal, TimeFrame, TradeSetup, MIN_NOTIONAL};
use crate::indicators::fibonacci::RETRACEMENT_LEVELS;

/// Price may sit this far above the 38.2% level and still count as a pullback
const FIB_PROXIMITY: f64 = 1.02;
/// Size multiplier for a pullback entry
const FIB_SIZE_BOOST: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct BullMarketStrategy {
    params: StrategyParams,
    timeframe: TimeFrame,
}

impl Default for BullMarketStrategy {
    fn default() -> Self {
        Self::new(StrategyParams::bull(), TimeFrame::Daily)
    }
}

impl BullMarketStrategy {
    pub fn new(params: StrategyParams, timeframe: TimeFrame) -> Self {
        Self { params, timeframe }
    }

    /// 38.2% retracement of the first Fibonacci reading, if any
    fn fib_382(context: &MarketContext) -> Option<f64> {
        context
            .indicator("fibonacci")?
            .levels(RETRACEMENT_LEVELS)?
            .get("38.2%")
            .copied()
    }
}

impl Strategy for BullMarketStrategy {
    fn name(&self) -> &'static str {
        "bull_market"
    }

    fn target_regime(&self) -> MarketRegime {
        MarketRegime::Bull
    }

    fn evaluate(&self, context: &MarketContext, portfolio: &PortfolioState) -> Option<TradeSetup> {
        if context.signal != Signal::Bullish || context.trend_score <= 0 {
            return None;
        }
        if portfolio.trade_in_progress || portfolio.fiat_amount <= MIN_NOTIONAL {
            return None;
        }
        let price = valid_price(portfolio.current_price)?;

        let mut quantity = portfolio.fiat_amount * self.params.risk_per_trade / price;
        let stop_loss = price * (1.0 - self.params.sl_level);
        let take_profit = price * (1.0 + self.params.tp_level);

        if let Some(fib) = Self::fib_382(context).filter(|level| *level > 0.0) {
            if price <= fib * FIB_PROXIMITY {
                tracing::info!("Bull entry near Fibonacci 38.2% level ({:.2})", fib);
                quantity *= FIB_SIZE_BOOST;
            }
        }

        if quantity <= 0.0 {
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
            MarketRegime::Bull,
            context.regime_confidence,
        ))
    }
}

//! Strategy Layer - Regime detection, signal aggregation and specialist strategies
//!
//! - `MarketRegimeDetector`: classifies BULL / BEAR / RANGE / UNKNOWN from
//!   trend strength, choppiness and EMA alignment
//! - `DecisionEngine`: folds indicator signals into a trend score, plus the
//!   regime-naive baseline trade policy
//! - `Strategy`: regime specialists (`BullMarketStrategy`,
//!   `BearMarketStrategy`, `RangeStrategy`) turning a market context and a
//!   portfolio into a candidate trade

pub mod params;
pub mod regime;
pub mod decision;
pub mod bull;
pub mod bear;
pub mod range;

pub use params::{ParamsError, ProtectionConfig, RiskProfileConfig, StrategyParams};
pub use regime::MarketRegimeDetector;
pub use decision::{DecisionEngine, SCORING_INDICATORS};
pub use bull::BullMarketStrategy;
pub use bear::BearMarketStrategy;
pub use range::RangeStrategy;

use crate::domain::{MarketContext, MarketRegime, PortfolioState, TradeSetup};

/// Regime confidence a strategy needs before it may act
pub const MIN_ACTIVATION_CONFIDENCE: f64 = 0.3;

/// A regime-specialist rule set
#[cfg_attr(test, mockall::automock)]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The regime this strategy is designed for
    fn target_regime(&self) -> MarketRegime;

    /// Candidate trade for this cycle, if any
    fn evaluate(&self, context: &MarketContext, portfolio: &PortfolioState) -> Option<TradeSetup>;

    /// Whether the strategy may run for the detected regime
    fn should_activate(&self, regime: MarketRegime, confidence: f64) -> bool {
        regime == self.target_regime() && confidence > MIN_ACTIVATION_CONFIDENCE
    }
}

/// Price-based guard shared by the strategies: no trading on a bad quote
pub(crate) fn valid_price(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

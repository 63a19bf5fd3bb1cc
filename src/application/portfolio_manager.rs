//! Portfolio Manager
//!
//! Routes each cycle to the strategy registered for the detected regime
//! (or to the baseline decision engine) and writes executed trades back
//! into the portfolio. The only place consecutive-loss state changes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{MarketContext, MarketRegime, OrderSide, PortfolioState, TimeFrame, TradeResult, TradeSetup};
use crate::strategy::{
    BearMarketStrategy, BullMarketStrategy, DecisionEngine, RangeStrategy, Strategy, StrategyParams,
};

/// Which decision path answers `PortfolioManager::evaluate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingPolicy {
    /// Regime specialists behind the activation gate
    #[serde(rename = "regime")]
    RegimeRouted,
    /// Regime-naive trend-score policy of the decision engine
    #[default]
    Baseline,
}

impl fmt::Display for TradingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingPolicy::RegimeRouted => f.write_str("regime"),
            TradingPolicy::Baseline => f.write_str("baseline"),
        }
    }
}

impl FromStr for TradingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regime" | "regime_routed" => Ok(TradingPolicy::RegimeRouted),
            "baseline" => Ok(TradingPolicy::Baseline),
            other => Err(format!("unknown policy '{}'", other)),
        }
    }
}

/// Regime-to-strategy routing for one (pair, timeframe)
pub struct PortfolioManager {
    strategies: BTreeMap<MarketRegime, Box<dyn Strategy>>,
    decision: DecisionEngine,
    policy: TradingPolicy,
    timeframe: TimeFrame,
    current_regime: MarketRegime,
    regime_confidence: f64,
}

impl PortfolioManager {
    /// Manager with the three built-in regime strategies
    pub fn new(decision: DecisionEngine, policy: TradingPolicy, timeframe: TimeFrame) -> Self {
        let mut manager = Self::empty(decision, policy, timeframe);
        manager.register(
            MarketRegime::Bull,
            Box::new(BullMarketStrategy::new(StrategyParams::bull(), timeframe)),
        );
        manager.register(
            MarketRegime::Bear,
            Box::new(BearMarketStrategy::new(StrategyParams::bear(), timeframe)),
        );
        manager.register(
            MarketRegime::Range,
            Box::new(RangeStrategy::new(StrategyParams::range(), timeframe)),
        );
        manager
    }

    /// Manager without any regime strategy
    pub fn empty(decision: DecisionEngine, policy: TradingPolicy, timeframe: TimeFrame) -> Self {
        Self {
            strategies: BTreeMap::new(),
            decision,
            policy,
            timeframe,
            current_regime: MarketRegime::Unknown,
            regime_confidence: 0.0,
        }
    }

    /// Route `regime` to `strategy`, replacing any previous one
    pub fn register(&mut self, regime: MarketRegime, strategy: Box<dyn Strategy>) {
        tracing::debug!("Registered {} strategy for {} regime", strategy.name(), regime);
        self.strategies.insert(regime, strategy);
    }

    pub fn policy(&self) -> TradingPolicy {
        self.policy
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    /// Regime of the last evaluated cycle
    pub fn current_regime(&self) -> MarketRegime {
        self.current_regime
    }

    pub fn regime_confidence(&self) -> f64 {
        self.regime_confidence
    }

    /// Candidate trade for this cycle under the configured policy
    pub fn evaluate(&mut self, context: &MarketContext, portfolio: &PortfolioState) -> Option<TradeSetup> {
        self.current_regime = context.regime;
        self.regime_confidence = context.regime_confidence;

        match self.policy {
            TradingPolicy::Baseline => self.decision.evaluate_portfolio(context, portfolio, self.timeframe),
            TradingPolicy::RegimeRouted => self.route(context, portfolio),
        }
    }

    fn route(&self, context: &MarketContext, portfolio: &PortfolioState) -> Option<TradeSetup> {
        let Some(strategy) = self.strategies.get(&context.regime) else {
            tracing::info!("No strategy for regime {}, holding", context.regime);
            return None;
        };

        if !strategy.should_activate(context.regime, context.regime_confidence) {
            tracing::info!(
                "Strategy {} not confident enough ({:.2})",
                strategy.name(),
                context.regime_confidence
            );
            return None;
        }

        tracing::info!(
            "Activating {} strategy (regime={}, confidence={:.2})",
            strategy.name(),
            context.regime,
            context.regime_confidence
        );
        strategy.evaluate(context, portfolio)
    }

    /// Apply an executed trade to the portfolio.
    ///
    /// Returns the realised P&L of a SELL closing a tracked entry.
    pub fn update_after_trade(&self, portfolio: &mut PortfolioState, result: &TradeResult) -> Option<f64> {
        if !result.success {
            tracing::warn!("Ignoring failed trade: {}", result);
            return None;
        }

        portfolio.fiat_amount = result.fiat_after.max(0.0);
        portfolio.crypto_amount = result.crypto_after.max(0.0);
        portfolio.trade_in_progress = result.trade_in_progress;

        match result.side {
            OrderSide::Buy => {
                portfolio.entry_price = Some(result.price);
                None
            }
            OrderSide::Sell => {
                let pnl = portfolio.entry_price.map(|entry| (result.price - entry) * result.quantity);
                match pnl {
                    Some(pnl) if pnl < 0.0 => {
                        portfolio.consecutive_losses += 1;
                        tracing::warn!(
                            "Trade loss detected ({:.2}). Consecutive losses: {}",
                            pnl,
                            portfolio.consecutive_losses
                        );
                    }
                    _ => portfolio.consecutive_losses = 0,
                }
                if !result.trade_in_progress {
                    portfolio.entry_price = None;
                }
                pnl
            }
        }
    }
}

impl fmt::Debug for PortfolioManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategies: Vec<(&MarketRegime, &str)> =
            self.strategies.iter().map(|(regime, s)| (regime, s.name())).collect();
        f.debug_struct("PortfolioManager")
            .field("policy", &self.policy)
            .field("timeframe", &self.timeframe)
            .field("strategies", &strategies)
            .field("current_regime", &self.current_regime)
            .field("regime_confidence", &self.regime_confidence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IndicatorResult, RiskProfile, Signal};
    use crate::strategy::MockStrategy;
    use chrono::Utc;

    fn create_test_context(regime: MarketRegime, confidence: f64, signal: Signal, score: i32) -> MarketContext {
        MarketContext {
            regime,
            regime_confidence: confidence,
            trend_score: score,
            signal,
            indicators: vec![IndicatorResult::new("rsi", signal, 50.0)],
            timestamp: Utc::now(),
        }
    }

    fn create_test_setup(side: OrderSide) -> TradeSetup {
        match side {
            OrderSide::Buy => TradeSetup::buy(
                "BTCUSDT",
                100.0,
                1.0,
                97.0,
                115.0,
                RiskProfile::Safe,
                TimeFrame::Daily,
                MarketRegime::Bull,
                0.9,
            ),
            OrderSide::Sell => TradeSetup::sell(
                "BTCUSDT",
                100.0,
                1.0,
                RiskProfile::Safe,
                TimeFrame::Daily,
                MarketRegime::Bull,
                0.9,
            ),
        }
    }

    fn filled(side: OrderSide, price: f64, quantity: f64, fiat_after: f64, crypto_after: f64) -> TradeResult {
        TradeResult {
            success: true,
            side,
            pair: "BTCUSDT".to_string(),
            price,
            quantity,
            fiat_after,
            crypto_after,
            total_portfolio_value: fiat_after + crypto_after * price,
            trade_in_progress: side == OrderSide::Buy,
            stop_loss: None,
            take_profit: None,
            risk_reward_ratio: None,
            order_id: None,
            stop_loss_order_id: None,
            take_profit_order_id: None,
            error: None,
        }
    }

    fn mock_strategy(regime: MarketRegime, calls: usize) -> MockStrategy {
        let mut strategy = MockStrategy::new();
        strategy.expect_name().return_const("mock");
        strategy
            .expect_should_activate()
            .returning(move |r, c| r == regime && c > 0.3);
        strategy
            .expect_evaluate()
            .times(calls)
            .returning(|_, _| Some(create_test_setup(OrderSide::Buy)));
        strategy
    }

    #[test]
    fn test_routes_to_regime_strategy() {
        let mut manager = PortfolioManager::empty(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        manager.register(MarketRegime::Bull, Box::new(mock_strategy(MarketRegime::Bull, 1)));

        let context = create_test_context(MarketRegime::Bull, 0.8, Signal::Neutral, 0);
        let portfolio = PortfolioState::new("BTCUSDT", 1000.0, 0.0, 100.0);

        assert!(manager.evaluate(&context, &portfolio).is_some());
        assert_eq!(manager.current_regime(), MarketRegime::Bull);
        assert_eq!(manager.regime_confidence(), 0.8);
    }

    #[test]
    fn test_activation_gate_blocks_strategy() {
        let mut manager = PortfolioManager::empty(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        manager.register(MarketRegime::Bull, Box::new(mock_strategy(MarketRegime::Bull, 0)));

        let context = create_test_context(MarketRegime::Bull, 0.2, Signal::Bullish, 5);
        let portfolio = PortfolioState::new("BTCUSDT", 1000.0, 0.0, 100.0);
        assert!(manager.evaluate(&context, &portfolio).is_none());
    }

    #[test]
    fn test_unknown_regime_holds() {
        let mut manager = PortfolioManager::new(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        let context = create_test_context(MarketRegime::Unknown, 1.0, Signal::Bullish, 5);
        let portfolio = PortfolioState::new("BTCUSDT", 1000.0, 0.0, 100.0);

        assert!(manager.evaluate(&context, &portfolio).is_none());
        assert_eq!(manager.current_regime(), MarketRegime::Unknown);
    }

    #[test]
    fn test_baseline_ignores_regime() {
        let mut manager = PortfolioManager::new(DecisionEngine::default(), TradingPolicy::Baseline, TimeFrame::Weekly);
        let context = create_test_context(MarketRegime::Unknown, 0.0, Signal::Bullish, 2);
        let portfolio = PortfolioState::new("BTCUSDT", 1000.0, 0.0, 100.0);

        let setup = manager.evaluate(&context, &portfolio).unwrap();
        assert_eq!(setup.side, OrderSide::Buy);
        assert_eq!(setup.timeframe, TimeFrame::Weekly);
    }

    #[test]
    fn test_update_after_buy_records_entry() {
        let manager = PortfolioManager::new(DecisionEngine::default(), TradingPolicy::Baseline, TimeFrame::Daily);
        let mut portfolio = PortfolioState::new("BTCUSDT", 1000.0, 0.0, 100.0);

        let pnl = manager.update_after_trade(&mut portfolio, &filled(OrderSide::Buy, 100.0, 2.0, 800.0, 2.0));
        assert_eq!(pnl, None);
        assert_eq!(portfolio.fiat_amount, 800.0);
        assert_eq!(portfolio.crypto_amount, 2.0);
        assert!(portfolio.trade_in_progress);
        assert_eq!(portfolio.entry_price, Some(100.0));
    }

    #[test]
    fn test_consecutive_losses_tracked_on_sells() {
        let manager = PortfolioManager::new(DecisionEngine::default(), TradingPolicy::Baseline, TimeFrame::Daily);
        let mut portfolio = PortfolioState::new("BTCUSDT", 1000.0, 0.0, 100.0);

        for round in 1..=3 {
            manager.update_after_trade(&mut portfolio, &filled(OrderSide::Buy, 100.0, 1.0, 900.0, 1.0));
            let pnl = manager.update_after_trade(&mut portfolio, &filled(OrderSide::Sell, 90.0, 1.0, 990.0, 0.0));
            assert_eq!(pnl, Some(-10.0));
            assert_eq!(portfolio.consecutive_losses, round);
            assert_eq!(portfolio.entry_price, None);
            assert!(!portfolio.trade_in_progress);
        }

        // A winner resets the streak
        manager.update_after_trade(&mut portfolio, &filled(OrderSide::Buy, 100.0, 1.0, 890.0, 1.0));
        let pnl = manager.update_after_trade(&mut portfolio, &filled(OrderSide::Sell, 110.0, 1.0, 1000.0, 0.0));
        assert_eq!(pnl, Some(10.0));
        assert_eq!(portfolio.consecutive_losses, 0);
    }

    #[test]
    fn test_failed_trade_leaves_portfolio_untouched() {
        let manager = PortfolioManager::new(DecisionEngine::default(), TradingPolicy::Baseline, TimeFrame::Daily);
        let mut portfolio = PortfolioState::new("BTCUSDT", 1000.0, 0.0, 100.0);
        let before = portfolio.clone();

        let mut result = filled(OrderSide::Buy, 100.0, 2.0, 0.0, 0.0);
        result.success = false;
        result.error = Some("rejected".to_string());

        assert_eq!(manager.update_after_trade(&mut portfolio, &result), None);
        assert_eq!(portfolio, before);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("regime".parse::<TradingPolicy>(), Ok(TradingPolicy::RegimeRouted));
        assert_eq!("Baseline".parse::<TradingPolicy>(), Ok(TradingPolicy::Baseline));
        assert!("random".parse::<TradingPolicy>().is_err());
        assert_eq!(TradingPolicy::RegimeRouted.to_string(), "regime");
    }
}

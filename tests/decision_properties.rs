//! Decision Layer Property Tests
//!
//! Verifies the contracts the trading core guarantees regardless of data:
//! 1. Regime classification of trending and oscillating series
//! 2. Position sizing and stop-loss placement
//! 3. Guard clauses of the decision engine and the regime strategies
//! 4. Portfolio write-back after executed trades

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use regime_pilot::application::{PortfolioManager, TradingPolicy};
use regime_pilot::domain::{
    IndicatorResult, MarketContext, MarketRegime, OrderSide, PortfolioState, RiskManager, RiskProfile, Signal,
    TimeFrame, TradeResult,
};
use regime_pilot::ports::Ohlcv;
use regime_pilot::strategy::{
    BullMarketStrategy, DecisionEngine, MarketRegimeDetector, ProtectionConfig, RiskProfileConfig, Strategy,
};

// ============================================================================
// Test Fixtures
// ============================================================================

fn timestamp(i: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(1_600_000_000 + i as i64 * 3_600, 0).unwrap()
}

fn bars_from_closes(closes: &[f64]) -> Vec<Ohlcv> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Ohlcv::new(timestamp(i), c, c + 1.0, c - 1.0, c, 1000.0))
        .collect()
}

/// Drift of +/-1 per bar with small seeded noise
fn trending(n: usize, drift: f64, seed: u64) -> Vec<Ohlcv> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = if drift < 0.0 { 100.0 + n as f64 } else { 100.0 };
    let closes: Vec<f64> = (0..n)
        .map(|i| start + drift * i as f64 + rng.gen_range(-0.2..0.2))
        .collect();
    bars_from_closes(&closes)
}

fn oscillating(n: usize) -> Vec<Ohlcv> {
    let closes: Vec<f64> = (0..n)
        .map(|i| 150.0 + 3.0 * (i as f64 * std::f64::consts::FRAC_PI_2).sin())
        .collect();
    bars_from_closes(&closes)
}

fn maximally_bullish_context() -> MarketContext {
    let indicators = ["adi", "bollinger", "ema", "macd", "sma", "stoch_rsi", "volume"]
        .iter()
        .map(|name| IndicatorResult::new(*name, Signal::Bullish, 1.0))
        .chain(std::iter::once(IndicatorResult::new("rsi", Signal::Oversold, 25.0)))
        .collect();
    DecisionEngine::default().compute_market_context(indicators, MarketRegime::Bull, 1.0)
}

fn risk_manager(risk_per_trade: f64, max_leverage: f64) -> RiskManager {
    RiskManager::new(
        RiskProfileConfig {
            name: "custom".to_string(),
            risk_per_trade,
            max_leverage,
            max_position_pct: 0.10,
        },
        ProtectionConfig::default(),
    )
}

// ============================================================================
// Test Module: Regime detection
// ============================================================================

mod regime_detection {
    use super::*;

    /// Test: A steady rally is a confident bull market
    #[test]
    fn test_uptrend_is_bull() {
        let (regime, confidence) = MarketRegimeDetector::default().detect_bars(&trending(150, 1.0, 1));
        assert_eq!(regime, MarketRegime::Bull);
        assert!(confidence > 0.5, "confidence {}", confidence);
    }

    /// Test: A steady decline is a confident bear market
    #[test]
    fn test_downtrend_is_bear() {
        let (regime, confidence) = MarketRegimeDetector::default().detect_bars(&trending(150, -1.0, 2));
        assert_eq!(regime, MarketRegime::Bear);
        assert!(confidence > 0.5, "confidence {}", confidence);
    }

    /// Test: Oscillation is never read as a confident trend
    #[test]
    fn test_oscillation_not_confident_trend() {
        let detector = MarketRegimeDetector::default();
        for n in [60, 120, 240] {
            let (regime, confidence) = detector.detect_bars(&oscillating(n));
            let confident_trend =
                matches!(regime, MarketRegime::Bull | MarketRegime::Bear) && confidence > 0.6;
            assert!(!confident_trend, "{} bars read as {} ({})", n, regime, confidence);
        }
    }

    /// Test: Too little history is UNKNOWN
    #[test]
    fn test_short_history_unknown() {
        let (regime, confidence) = MarketRegimeDetector::default().detect_bars(&trending(10, 1.0, 3));
        assert_eq!(regime, MarketRegime::Unknown);
        assert_eq!(confidence, 0.0);
    }

    /// Test: Higher timeframes dominate the vote
    #[test]
    fn test_multi_timeframe_vote() {
        let mut bars = BTreeMap::new();
        bars.insert(TimeFrame::Monthly, trending(150, 1.0, 4));
        bars.insert(TimeFrame::Weekly, trending(150, 1.0, 5));
        bars.insert(TimeFrame::Scalping, trending(150, -1.0, 6));

        let (regime, confidence) = MarketRegimeDetector::default().detect_multi_timeframe(&bars);
        assert_eq!(regime, MarketRegime::Bull);
        assert!(confidence > 0.0 && confidence <= 1.0);
    }
}

// ============================================================================
// Test Module: Risk management
// ============================================================================

mod risk_management {
    use super::*;

    #[test]
    fn test_position_size_and_loss_reduction() {
        let risk = risk_manager(0.02, 1.0);
        let mut portfolio = PortfolioState::new("BTCUSDT", 10_000.0, 0.0, 50_000.0);

        let size = risk.compute_position_size(&portfolio, 50_000.0);
        assert_relative_eq!(size, 0.004, epsilon = 0.001);

        portfolio.consecutive_losses = 3;
        let reduced = risk.compute_position_size(&portfolio, 50_000.0);
        assert_relative_eq!(reduced, 0.002, epsilon = 0.0005);
    }

    #[test]
    fn test_stop_loss_placement() {
        assert_eq!(risk_manager(0.02, 1.0).compute_stop_loss(50_000.0, OrderSide::Buy), 49_000.0);

        let leveraged = RiskManager::new(
            RiskProfileConfig::for_profile(RiskProfile::AggressiveLeverage),
            ProtectionConfig::default(),
        );
        let stop = leveraged.compute_stop_loss(50_000.0, OrderSide::Buy);
        assert!(stop > 47_250.0, "stop {} too close to liquidation", stop);
    }

    /// Test: A wide stop under high leverage is pulled in above the liquidation buffer
    #[test]
    fn test_wide_stop_clamped_under_leverage() {
        let protection = ProtectionConfig {
            sl_level: 0.5,
            ..ProtectionConfig::default()
        };
        let leveraged = RiskManager::new(RiskProfileConfig::for_profile(RiskProfile::AggressiveLeverage), protection);
        let stop = leveraged.compute_stop_loss(50_000.0, OrderSide::Buy);
        assert!(stop >= 47_250.0);
        assert!(stop < 50_000.0);
    }
}

// ============================================================================
// Test Module: Decision guards
// ============================================================================

mod decision_guards {
    use super::*;

    #[test]
    fn test_no_baseline_buy_with_five_or_less_fiat() {
        let engine = DecisionEngine::default();
        let context = maximally_bullish_context();
        assert!(context.trend_score > 0);

        for fiat in [0.0, 1.0, 5.0] {
            assert!(engine
                .evaluate(&context, "BTCUSDT", 100.0, fiat, 0.0, false, TimeFrame::Daily)
                .is_none());
        }
        assert!(engine
            .evaluate(&context, "BTCUSDT", 100.0, 5.01, 0.0, false, TimeFrame::Daily)
            .is_some());
    }

    #[test]
    fn test_bull_strategy_waits_for_open_trade() {
        let strategy = BullMarketStrategy::default();
        let context = maximally_bullish_context();

        let mut portfolio = PortfolioState::new("BTCUSDT", 10_000.0, 0.0, 100.0);
        assert!(strategy.evaluate(&context, &portfolio).is_some());

        portfolio.trade_in_progress = true;
        assert!(strategy.evaluate(&context, &portfolio).is_none());
    }

    /// Test: Routing with no strategy for the regime holds
    #[test]
    fn test_unregistered_regime_holds() {
        let mut manager =
            PortfolioManager::empty(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        let context = maximally_bullish_context();
        let portfolio = PortfolioState::new("BTCUSDT", 10_000.0, 0.0, 100.0);

        assert!(manager.evaluate(&context, &portfolio).is_none());
        assert_eq!(manager.current_regime(), MarketRegime::Bull);
    }
}

// ============================================================================
// Test Module: Portfolio write-back
// ============================================================================

mod write_back {
    use super::*;

    fn fill(side: OrderSide, price: f64, quantity: f64, fiat_after: f64, crypto_after: f64) -> TradeResult {
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

    /// Test: Three losing round trips reach the risk reduction threshold
    #[test]
    fn test_losses_accumulate_then_reset() {
        let manager = PortfolioManager::new(DecisionEngine::default(), TradingPolicy::Baseline, TimeFrame::Daily);
        let mut portfolio = PortfolioState::new("BTCUSDT", 1_000.0, 0.0, 100.0);

        for _ in 0..3 {
            manager.update_after_trade(&mut portfolio, &fill(OrderSide::Buy, 100.0, 1.0, 900.0, 1.0));
            let pnl = manager.update_after_trade(&mut portfolio, &fill(OrderSide::Sell, 90.0, 1.0, 990.0, 0.0));
            assert_eq!(pnl, Some(-10.0));
        }
        assert_eq!(portfolio.consecutive_losses, 3);
        assert!(!portfolio.trade_in_progress);

        manager.update_after_trade(&mut portfolio, &fill(OrderSide::Buy, 100.0, 1.0, 890.0, 1.0));
        assert!(portfolio.trade_in_progress);
        let pnl = manager.update_after_trade(&mut portfolio, &fill(OrderSide::Sell, 120.0, 1.0, 1010.0, 0.0));
        assert_eq!(pnl, Some(20.0));
        assert_eq!(portfolio.consecutive_losses, 0);
        assert_eq!(portfolio.entry_price, None);
    }

    #[test]
    fn test_failed_result_changes_nothing() {
        let manager = PortfolioManager::new(DecisionEngine::default(), TradingPolicy::Baseline, TimeFrame::Daily);
        let mut portfolio = PortfolioState::new("BTCUSDT", 1_000.0, 0.0, 100.0);
        let before = portfolio.clone();

        let mut failed = fill(OrderSide::Buy, 100.0, 1.0, 900.0, 1.0);
        failed.success = false;
        failed.error = Some("rejected".to_string());

        assert_eq!(manager.update_after_trade(&mut portfolio, &failed), None);
        assert_eq!(portfolio, before);
    }
}

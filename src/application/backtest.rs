//! Backtest Engine
//!
//! Replays the decision pipeline bar by bar over historical OHLCV data:
//! indicators are computed once on the full series, then every bar from
//! `min_bars` on is analysed through a growing prefix window so no bar can
//! see the future.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::portfolio_manager::{PortfolioManager, TradingPolicy};
use crate::adapters::csv_data::read_ohlcv_csv;
use crate::domain::{
    MarketRegime, OrderSide, PortfolioState, RiskManager, TimeFrame, TradeResult, TradeSetup,
};
use crate::indicators::IndicatorEngine;
use crate::ports::{Frame, MarketDataError, Ohlcv};
use crate::strategy::{DecisionEngine, MarketRegimeDetector, ProtectionConfig, RiskProfileConfig};

/// Bars skipped before the first evaluation so indicators are warmed up
pub const DEFAULT_MIN_BARS: usize = 200;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Failed to load market data: {0}")]
    Data(#[from] MarketDataError),
}

/// One simulated fill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestTrade {
    pub bar: usize,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub regime: MarketRegime,
    /// Realised P&L, sells only
    pub pnl: Option<f64>,
}

/// Summary of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub trades: Vec<BacktestTrade>,
}

impl BacktestResult {
    pub fn pnl(&self) -> f64 {
        self.final_capital - self.initial_capital
    }

    pub fn pnl_pct(&self) -> f64 {
        if self.initial_capital == 0.0 {
            return 0.0;
        }
        self.pnl() / self.initial_capital * 100.0
    }

    /// Fraction of closed trades that made money
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        f64::from(self.winning_trades) / f64::from(self.total_trades)
    }

    /// Fixed-format multi-line report
    pub fn summary(&self) -> String {
        format!(
            "=== Backtest Results ===\n\
             Initial Capital: {}\n\
             Final Capital:   {}\n\
             PnL:             {} ({:+.2}%)\n\
             Total Trades:    {}\n\
             Win Rate:        {:.1}%\n\
             Winning:         {}\n\
             Losing:          {}\n",
            money(self.initial_capital),
            money(self.final_capital),
            money(self.pnl()),
            self.pnl_pct(),
            self.total_trades,
            self.win_rate() * 100.0,
            self.winning_trades,
            self.losing_trades,
        )
    }
}

impl fmt::Display for BacktestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// `$1,234.56` / `$-1,234.56`
fn money(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("${}{}.{}", sign, grouped, frac_part)
}

/// Bar-by-bar replay of indicators, regime detection, policy and risk checks
pub struct BacktestEngine {
    indicators: IndicatorEngine,
    detector: MarketRegimeDetector,
    decision: DecisionEngine,
    risk: RiskManager,
    policy: TradingPolicy,
    pair: String,
    timeframe: TimeFrame,
    min_bars: usize,
}

impl Default for BacktestEngine {
    fn default() -> Self {
        Self::new(RiskProfileConfig::default(), ProtectionConfig::default())
    }
}

impl BacktestEngine {
    /// Uses the indicators that need no external data
    pub fn new(risk_profile: RiskProfileConfig, protection: ProtectionConfig) -> Self {
        Self {
            indicators: IndicatorEngine::fast(),
            detector: MarketRegimeDetector::default(),
            decision: DecisionEngine::new(risk_profile.clone(), protection.clone()),
            risk: RiskManager::new(risk_profile, protection),
            policy: TradingPolicy::Baseline,
            pair: "BTCUSDT".to_string(),
            timeframe: TimeFrame::Daily,
            min_bars: DEFAULT_MIN_BARS,
        }
    }

    pub fn with_policy(mut self, policy: TradingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_min_bars(mut self, min_bars: usize) -> Self {
        self.min_bars = min_bars;
        self
    }

    pub fn with_pair(mut self, pair: &str) -> Self {
        self.pair = pair.to_string();
        self
    }

    pub fn with_timeframe(mut self, timeframe: TimeFrame) -> Self {
        self.timeframe = timeframe;
        self
    }

    pub fn with_truncate(mut self, decimals: u32) -> Self {
        self.risk = self.risk.with_truncate(decimals);
        self
    }

    pub fn with_indicators(mut self, indicators: IndicatorEngine) -> Self {
        self.indicators = indicators;
        self
    }

    /// Read `timestamp,open,high,low,close,volume` rows
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Ohlcv>, BacktestError> {
        Ok(read_ohlcv_csv(path)?)
    }

    /// Replay `bars` starting from the given balances
    pub fn run(&self, bars: &[Ohlcv], initial_fiat: f64, initial_crypto: f64) -> BacktestResult {
        let mut frame = Frame::new(bars.to_vec());
        self.indicators.compute_all(&mut frame);
        if let Err(e) = self.detector.prepare(&mut frame) {
            tracing::warn!("Regime indicators failed: {}", e);
        }

        let first_price = bars
            .get(self.min_bars.min(bars.len().saturating_sub(1)))
            .map(|b| b.close)
            .unwrap_or(0.0);
        let last_price = bars.last().map(|b| b.close).unwrap_or(0.0);

        let mut manager = PortfolioManager::new(self.decision.clone(), self.policy, self.timeframe);
        let mut portfolio = PortfolioState::new(&self.pair, initial_fiat, initial_crypto, first_price)
            .with_risk_profile(self.risk.profile().profile());
        let initial_capital = portfolio.total_value();

        let mut ledger = Ledger::default();

        tracing::info!(
            "Backtest {} {} over {} bars (policy={}, min_bars={})",
            self.pair,
            self.timeframe,
            bars.len(),
            self.policy,
            self.min_bars
        );

        for i in self.min_bars..bars.len() {
            let bar = &bars[i];
            let window = frame.window(i + 1);
            portfolio.current_price = bar.close;

            let results = self.indicators.analyze_all(&window);
            let (regime, confidence) = self.detector.detect(&window);
            let context = self
                .decision
                .compute_market_context_at(results, regime, confidence, bar.timestamp);

            let Some(setup) = manager
                .evaluate(&context, &portfolio)
                .and_then(|setup| self.risk.prepare_trade(setup, &portfolio))
            else {
                continue;
            };
            let Some(result) = simulate_fill(&setup, &portfolio, bar.close) else {
                continue;
            };

            let pnl = manager.update_after_trade(&mut portfolio, &result);
            ledger.record(i, &result, regime, pnl);
        }

        let final_capital = portfolio.fiat_amount + portfolio.crypto_amount * last_price;
        let result = BacktestResult {
            initial_capital,
            final_capital,
            total_trades: ledger.total,
            winning_trades: ledger.winning,
            losing_trades: ledger.losing,
            trades: ledger.trades,
        };

        tracing::info!(
            "Backtest finished: {} trades, PnL {:.2} ({:+.2}%)",
            result.total_trades,
            result.pnl(),
            result.pnl_pct()
        );
        result
    }
}

/// Fill a setup at `price`. BUYs must be affordable; SELLs are clamped to holdings.
fn simulate_fill(setup: &TradeSetup, portfolio: &PortfolioState, price: f64) -> Option<TradeResult> {
    let (quantity, fiat_after, crypto_after) = match setup.side {
        OrderSide::Buy => {
            let cost = setup.quantity * price;
            if cost > portfolio.fiat_amount {
                tracing::debug!("Skipping buy: cost {:.2} exceeds fiat {:.2}", cost, portfolio.fiat_amount);
                return None;
            }
            (
                setup.quantity,
                portfolio.fiat_amount - cost,
                portfolio.crypto_amount + setup.quantity,
            )
        }
        OrderSide::Sell => {
            let quantity = setup.quantity.min(portfolio.crypto_amount);
            if quantity <= 0.0 {
                return None;
            }
            (
                quantity,
                portfolio.fiat_amount + quantity * price,
                portfolio.crypto_amount - quantity,
            )
        }
    };

    tracing::debug!("Simulated fill: {} {:.6} @ {:.2}", setup.side, quantity, price);

    Some(TradeResult {
        success: true,
        side: setup.side,
        pair: setup.pair.clone(),
        price,
        quantity,
        fiat_after,
        crypto_after,
        total_portfolio_value: fiat_after + crypto_after * price,
        trade_in_progress: setup.side == OrderSide::Buy,
        stop_loss: (setup.side == OrderSide::Buy).then_some(setup.stop_loss),
        take_profit: (setup.side == OrderSide::Buy).then_some(setup.take_profit),
        risk_reward_ratio: (setup.side == OrderSide::Buy).then_some(setup.risk_reward_ratio),
        order_id: None,
        stop_loss_order_id: None,
        take_profit_order_id: None,
        error: None,
    })
}

#[derive(Default)]
struct Ledger {
    total: u32,
    winning: u32,
    losing: u32,
    trades: Vec<BacktestTrade>,
}

impl Ledger {
    fn record(&mut self, bar: usize, result: &TradeResult, regime: MarketRegime, pnl: Option<f64>) {
        if result.side == OrderSide::Sell {
            self.total += 1;
            // Break-even counts as a loss
            if pnl.is_some_and(|p| p > 0.0) {
                self.winning += 1;
            } else {
                self.losing += 1;
            }
        }
        self.trades.push(BacktestTrade {
            bar,
            side: result.side,
            price: result.price,
            quantity: result.quantity,
            regime,
            pnl: if result.side == OrderSide::Sell { pnl } else { None },
        });
    }
}

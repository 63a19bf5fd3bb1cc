//! Trading Orchestrator
//!
//! Runs the live loop for one (pair, timeframe): fetch bars, analyse,
//! detect the regime, ask the policy for a trade, size and validate it,
//! execute it and write the fill back into the portfolio this loop owns.
//! Entries are followed by resting stop-loss and take-profit orders.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Notify, RwLock};

use super::notifications::NotificationQueue;
use super::portfolio_manager::{PortfolioManager, TradingPolicy};
use crate::adapters::fear_greed::FearGreedClient;
use crate::domain::{
    min_tradable_quantity, MarketRegime, OrderSide, PortfolioState, RiskManager, TimeFrame, TradeResult,
    TradeSetup,
};
use crate::indicators::{FearAndGreed, IndicatorEngine};
use crate::ports::{DataProvider, ExchangeAdapter, Frame, OrderRequest};
use crate::strategy::{DecisionEngine, MarketRegimeDetector};

/// Bars required before the live loop evaluates anything
pub const DEFAULT_LIVE_MIN_BARS: usize = 50;

/// Balance drift below this is not treated as a protective fill
const PROTECTIVE_FILL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Market data error: {0}")]
    MarketDataError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
}

/// Status snapshot of one loop
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub pair: String,
    pub timeframe: TimeFrame,
    pub regime: MarketRegime,
    pub regime_confidence: f64,
    pub fiat_amount: f64,
    pub crypto_amount: f64,
    pub trade_in_progress: bool,
    pub consecutive_losses: u32,
    pub last_price: Option<f64>,
}

/// Live trading loop for a single pair and timeframe
pub struct TradingOrchestrator {
    timeframe: TimeFrame,
    fiat_symbol: String,
    crypto_symbol: String,
    data: Arc<dyn DataProvider>,
    exchange: Arc<dyn ExchangeAdapter>,
    notifications: Option<NotificationQueue>,
    sentiment: Option<FearGreedClient>,
    indicators: Arc<RwLock<IndicatorEngine>>,
    detector: MarketRegimeDetector,
    decision: DecisionEngine,
    risk: RiskManager,
    manager: Arc<RwLock<PortfolioManager>>,
    portfolio: Arc<RwLock<PortfolioState>>,
    last_price: Arc<RwLock<Option<f64>>>,
    /// Ids of the stop-loss / take-profit orders guarding the open position
    protective_orders: Arc<RwLock<Vec<String>>>,
    is_running: Arc<RwLock<bool>>,
    shutdown: Arc<Notify>,
    poll_interval: Duration,
    min_bars: usize,
}

impl TradingOrchestrator {
    /// Create a loop owning `portfolio`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        portfolio: PortfolioState,
        timeframe: TimeFrame,
        fiat_symbol: &str,
        crypto_symbol: &str,
        data: Arc<dyn DataProvider>,
        exchange: Arc<dyn ExchangeAdapter>,
        decision: DecisionEngine,
        risk: RiskManager,
        policy: TradingPolicy,
    ) -> Result<Self, OrchestratorError> {
        if portfolio.pair.is_empty() {
            return Err(OrchestratorError::ConfigError("pair cannot be empty".to_string()));
        }

        let manager = PortfolioManager::new(decision.clone(), policy, timeframe);

        Ok(Self {
            timeframe,
            fiat_symbol: fiat_symbol.to_string(),
            crypto_symbol: crypto_symbol.to_string(),
            data,
            exchange,
            notifications: None,
            sentiment: None,
            indicators: Arc::new(RwLock::new(IndicatorEngine::fast())),
            detector: MarketRegimeDetector::default(),
            decision,
            risk,
            manager: Arc::new(RwLock::new(manager)),
            portfolio: Arc::new(RwLock::new(portfolio)),
            last_price: Arc::new(RwLock::new(None)),
            protective_orders: Arc::new(RwLock::new(Vec::new())),
            is_running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
            poll_interval: Duration::from_secs(60),
            min_bars: DEFAULT_LIVE_MIN_BARS,
        })
    }

    /// Set custom poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_min_bars(mut self, min_bars: usize) -> Self {
        self.min_bars = min_bars;
        self
    }

    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    /// Feed the fear & greed index into each cycle
    pub fn with_sentiment(mut self, client: FearGreedClient) -> Self {
        self.sentiment = Some(client);
        self
    }

    /// Replace the portfolio manager (custom strategy routing)
    pub fn with_manager(mut self, manager: PortfolioManager) -> Self {
        self.manager = Arc::new(RwLock::new(manager));
        self
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    /// Run the loop until `stop` is called
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        *self.is_running.write().await = true;

        tracing::info!(
            "Starting {} orchestrator for {} - Poll interval: {:?}",
            self.timeframe,
            self.portfolio.read().await.pair,
            self.poll_interval
        );

        if let Err(e) = self.sync_balances().await {
            tracing::warn!("Balance sync failed, using configured capital: {}", e);
        }

        while *self.is_running.read().await {
            if let Err(e) = self.tick().await {
                tracing::error!("[{}] Tick error: {}", self.timeframe, e);
                // Continue running despite errors
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.shutdown.notified() => {}
            }
        }

        tracing::info!("{} orchestrator stopped", self.timeframe);
        Ok(())
    }

    /// Pull fiat and crypto balances from the exchange
    pub async fn sync_balances(&self) -> Result<(), OrchestratorError> {
        let fiat = self
            .exchange
            .get_balance(&self.fiat_symbol)
            .await
            .map_err(|e| OrchestratorError::ExecutionError(e.to_string()))?;
        let crypto = self
            .exchange
            .get_balance(&self.crypto_symbol)
            .await
            .map_err(|e| OrchestratorError::ExecutionError(e.to_string()))?;

        let mut portfolio = self.portfolio.write().await;
        portfolio.fiat_amount = fiat;
        portfolio.crypto_amount = crypto;
        tracing::info!(
            "Balances: {:.2} {} / {:.6} {}",
            fiat,
            self.fiat_symbol,
            crypto,
            self.crypto_symbol
        );
        Ok(())
    }

    /// Execute one trading cycle
    pub async fn tick(&self) -> Result<Option<TradeResult>, OrchestratorError> {
        let pair = self.portfolio.read().await.pair.clone();

        // 1. Market data
        let bars = self
            .data
            .fetch_ohlcv(&pair, self.timeframe, None)
            .await
            .map_err(|e| OrchestratorError::MarketDataError(e.to_string()))?;

        if bars.len() < self.min_bars {
            tracing::info!(
                "[{}] {} | Warming up ({}/{} bars)",
                self.timeframe,
                pair,
                bars.len(),
                self.min_bars
            );
            return Ok(None);
        }
        let Some(price) = bars.last().map(|b| b.close) else {
            return Ok(None);
        };
        let timestamp = bars.last().map(|b| b.timestamp).unwrap_or_else(chrono::Utc::now);

        // 2. Sentiment
        if let Some(client) = &self.sentiment {
            match client.fetch_index().await {
                Ok(index) => {
                    self.indicators
                        .write()
                        .await
                        .register(Box::new(FearAndGreed::with_index(index)));
                }
                Err(e) => tracing::warn!("Fear & greed unavailable: {}", e),
            }
        }

        // 3. Indicators, regime and context
        let mut frame = Frame::new(bars);
        let results = {
            let engine = self.indicators.read().await;
            engine.compute_all(&mut frame);
            engine.analyze_all(&frame.full())
        };
        if let Err(e) = self.detector.prepare(&mut frame) {
            tracing::warn!("Regime indicators failed: {}", e);
        }
        let (regime, confidence) = self.detector.detect(&frame.full());
        let context = self
            .decision
            .compute_market_context_at(results, regime, confidence, timestamp);

        *self.last_price.write().await = Some(price);

        // 4. Policy, risk, execution and write-back as one step
        let mut manager = self.manager.write().await;
        let mut portfolio = self.portfolio.write().await;
        portfolio.current_price = price;
        self.reconcile_protection(&manager, &mut portfolio, price).await;

        let previous = manager.current_regime();
        let setup = manager.evaluate(&context, &portfolio);

        if previous != regime {
            tracing::info!(
                "[{}] {} regime change: {} -> {} ({:.2})",
                self.timeframe,
                pair,
                previous,
                regime,
                confidence
            );
            if let Some(queue) = &self.notifications {
                queue.notify_regime_change(&pair, self.timeframe, previous, regime, confidence);
            }
        }

        let Some(setup) = setup else {
            tracing::info!(
                "[{}] {} ${:.2} | Regime: {} ({:.2}) | Score: {} | HOLD",
                self.timeframe,
                pair,
                price,
                regime,
                confidence,
                context.trend_score
            );
            return Ok(None);
        };

        let Some(setup) = self.risk.prepare_trade(setup, &portfolio) else {
            return Ok(None);
        };

        let result = self.execute(&setup, &portfolio).await?;
        manager.update_after_trade(&mut portfolio, &result);
        tracing::info!("[{}] {}", self.timeframe, result);

        if let Some(queue) = &self.notifications {
            queue.notify_trade(&setup, &result);
        }

        Ok(Some(result))
    }

    /// Place the order and describe the resulting balances
    async fn execute(&self, setup: &TradeSetup, portfolio: &PortfolioState) -> Result<TradeResult, OrchestratorError> {
        let quantity = match setup.side {
            OrderSide::Buy => setup.quantity,
            OrderSide::Sell => setup.quantity.min(portfolio.crypto_amount),
        };
        // Priced at the cycle close so a fill can be checked against the decision
        let request = OrderRequest::limit(setup.side, &setup.pair, quantity, setup.entry_price);

        tracing::info!("EXECUTING TRADE - {}", setup);

        let response = self
            .exchange
            .place_order(request)
            .await
            .map_err(|e| OrchestratorError::ExecutionError(e.to_string()))?;

        if !response.success {
            return Err(OrchestratorError::ExecutionError(format!(
                "order for {} was not filled",
                setup
            )));
        }

        let notional = response.filled_price * response.filled_quantity;
        let (fiat_after, crypto_after) = match setup.side {
            OrderSide::Buy => (
                portfolio.fiat_amount - notional,
                portfolio.crypto_amount + response.filled_quantity,
            ),
            OrderSide::Sell => (
                portfolio.fiat_amount + notional,
                portfolio.crypto_amount - response.filled_quantity,
            ),
        };
        let (fiat_after, crypto_after) = (fiat_after.max(0.0), crypto_after.max(0.0));
        let is_buy = setup.side == OrderSide::Buy;

        let (stop_loss_order_id, take_profit_order_id) = if is_buy {
            self.place_protection(setup, response.filled_quantity).await
        } else {
            self.cancel_protection(&setup.pair).await;
            (None, None)
        };

        Ok(TradeResult {
            success: true,
            side: setup.side,
            pair: setup.pair.clone(),
            price: response.filled_price,
            quantity: response.filled_quantity,
            fiat_after,
            crypto_after,
            total_portfolio_value: fiat_after + crypto_after * response.filled_price,
            trade_in_progress: is_buy,
            stop_loss: is_buy.then_some(setup.stop_loss),
            take_profit: is_buy.then_some(setup.take_profit),
            risk_reward_ratio: is_buy.then_some(setup.risk_reward_ratio),
            order_id: response.order_id,
            stop_loss_order_id,
            take_profit_order_id,
            error: None,
        })
    }

    /// Rest a stop-loss and a take-profit behind a filled entry.
    ///
    /// Sized by `sl_amount` / `tp1_amount` of the filled quantity. A rejected
    /// protective order is logged and leaves the entry in place.
    async fn place_protection(&self, setup: &TradeSetup, filled_quantity: f64) -> (Option<String>, Option<String>) {
        let protection = self.risk.protection();
        let stop = OrderRequest::stop_loss(
            &setup.pair,
            self.risk.truncate_quantity(protection.sl_amount * filled_quantity),
            setup.stop_loss,
        );
        let take = OrderRequest::take_profit(
            &setup.pair,
            self.risk.truncate_quantity(protection.tp1_amount * filled_quantity),
            setup.take_profit,
        );

        let stop_id = self.place_protective(stop).await;
        let take_id = self.place_protective(take).await;

        let mut open = self.protective_orders.write().await;
        open.clear();
        open.extend(stop_id.iter().chain(take_id.iter()).cloned());

        (stop_id, take_id)
    }

    async fn place_protective(&self, request: OrderRequest) -> Option<String> {
        if !(request.quantity > 0.0 && request.price.is_some_and(|p| p > 0.0)) {
            tracing::warn!(
                "[{}] Skipping {} order: quantity {} price {:?}",
                self.timeframe,
                request.order_type,
                request.quantity,
                request.price
            );
            return None;
        }

        let order_type = request.order_type;
        let price = request.price.unwrap_or_default();
        match self.exchange.place_order(request).await {
            Ok(response) if response.success => {
                tracing::info!(
                    "[{}] {} placed @ {:.2} ({:?})",
                    self.timeframe,
                    order_type,
                    price,
                    response.order_id
                );
                response.order_id
            }
            Ok(_) => {
                tracing::error!(
                    "[{}] {} @ {:.2} not accepted, position is unprotected",
                    self.timeframe,
                    order_type,
                    price
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    "[{}] {} @ {:.2} failed, position is unprotected: {}",
                    self.timeframe,
                    order_type,
                    price,
                    e
                );
                None
            }
        }
    }

    /// Write back fills of resting protective orders.
    ///
    /// Crypto missing from the exchange balance while a position is guarded was
    /// sold by a stop-loss or take-profit; the fill price follows from the fiat
    /// that came back.
    async fn reconcile_protection(&self, manager: &PortfolioManager, portfolio: &mut PortfolioState, price: f64) {
        if !portfolio.trade_in_progress || self.protective_orders.read().await.is_empty() {
            return;
        }

        let crypto = match self.exchange.get_balance(&self.crypto_symbol).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("[{}] Could not check protective fills: {}", self.timeframe, e);
                return;
            }
        };
        let sold = portfolio.crypto_amount - crypto;
        if sold <= PROTECTIVE_FILL_TOLERANCE {
            return;
        }
        let fiat = match self.exchange.get_balance(&self.fiat_symbol).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("[{}] Could not check protective fills: {}", self.timeframe, e);
                return;
            }
        };

        let still_open = crypto >= min_tradable_quantity(price);
        let result = TradeResult {
            success: true,
            side: OrderSide::Sell,
            pair: portfolio.pair.clone(),
            price: (fiat - portfolio.fiat_amount).max(0.0) / sold,
            quantity: sold,
            fiat_after: fiat,
            crypto_after: crypto,
            total_portfolio_value: fiat + crypto * price,
            trade_in_progress: still_open,
            stop_loss: None,
            take_profit: None,
            risk_reward_ratio: None,
            order_id: None,
            stop_loss_order_id: None,
            take_profit_order_id: None,
            error: None,
        };
        tracing::info!("[{}] Protective order filled: {}", self.timeframe, result);
        manager.update_after_trade(portfolio, &result);

        if !still_open {
            let pair = portfolio.pair.clone();
            self.cancel_protection(&pair).await;
        }
    }

    /// Cancel the protective orders left behind by a closed position
    async fn cancel_protection(&self, pair: &str) {
        let ids: Vec<String> = self.protective_orders.write().await.drain(..).collect();
        for id in ids {
            match self.exchange.cancel_order(pair, &id).await {
                Ok(_) => tracing::info!("[{}] Cancelled protective order {}", self.timeframe, id),
                Err(e) => tracing::warn!("[{}] Could not cancel protective order {}: {}", self.timeframe, id, e),
            }
        }
    }

    /// Stop the trading loop
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        self.shutdown.notify_one();
        tracing::info!("Stop signal sent to {} orchestrator", self.timeframe);
    }

    /// Get current status snapshot
    pub async fn status(&self) -> OrchestratorStatus {
        let manager = self.manager.read().await;
        let portfolio = self.portfolio.read().await;

        OrchestratorStatus {
            is_running: *self.is_running.read().await,
            pair: portfolio.pair.clone(),
            timeframe: self.timeframe,
            regime: manager.current_regime(),
            regime_confidence: manager.regime_confidence(),
            fiat_amount: portfolio.fiat_amount,
            crypto_amount: portfolio.crypto_amount,
            trade_in_progress: portfolio.trade_in_progress,
            consecutive_losses: portfolio.consecutive_losses,
            last_price: *self.last_price.read().await,
        }
    }

    /// Copy of the owned portfolio
    pub async fn portfolio(&self) -> PortfolioState {
        self.portfolio.read().await.clone()
    }
}

// Clones share state so a spawned loop can be stopped from outside
impl Clone for TradingOrchestrator {
    fn clone(&self) -> Self {
        Self {
            timeframe: self.timeframe,
            fiat_symbol: self.fiat_symbol.clone(),
            crypto_symbol: self.crypto_symbol.clone(),
            data: Arc::clone(&self.data),
            exchange: Arc::clone(&self.exchange),
            notifications: self.notifications.clone(),
            sentiment: self.sentiment.clone(),
            indicators: Arc::clone(&self.indicators),
            detector: self.detector.clone(),
            decision: self.decision.clone(),
            risk: self.risk.clone(),
            manager: Arc::clone(&self.manager),
            portfolio: Arc::clone(&self.portfolio),
            last_price: Arc::clone(&self.last_price),
            protective_orders: Arc::clone(&self.protective_orders),
            is_running: Arc::clone(&self.is_running),
            shutdown: Arc::clone(&self.shutdown),
            poll_interval: self.poll_interval,
            min_bars: self.min_bars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RiskProfile;
    use crate::indicators::fixtures;
    use crate::ports::execution::MockExchangeAdapter;
    use crate::ports::market_data::MockDataProvider;
    use crate::domain::OrderType;
    use crate::ports::{ExecutionError, MarketDataError, OrderResponse};
    use crate::strategy::{MockStrategy, ProtectionConfig, RiskProfileConfig};

    fn create_test_setup(side: OrderSide, quantity: f64) -> TradeSetup {
        match side {
            OrderSide::Buy => TradeSetup::buy(
                "BTCUSDT",
                219.0,
                quantity,
                200.0,
                250.0,
                RiskProfile::Safe,
                TimeFrame::Daily,
                MarketRegime::Bull,
                0.9,
            ),
            OrderSide::Sell => TradeSetup::sell(
                "BTCUSDT",
                219.0,
                quantity,
                RiskProfile::Safe,
                TimeFrame::Daily,
                MarketRegime::Bull,
                0.9,
            ),
        }
    }

    fn data_provider(bars: Vec<crate::ports::Ohlcv>) -> MockDataProvider {
        let mut data = MockDataProvider::new();
        data.expect_fetch_ohlcv()
            .returning(move |_, _, _| Ok(bars.clone()));
        data
    }

    fn bull_manager(setup: TradeSetup) -> PortfolioManager {
        let mut strategy = MockStrategy::new();
        strategy.expect_name().return_const("mock_bull");
        strategy.expect_should_activate().returning(|regime, _| regime == MarketRegime::Bull);
        strategy
            .expect_evaluate()
            .returning(move |_, _| Some(setup.clone()));

        let mut manager = PortfolioManager::empty(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        manager.register(MarketRegime::Bull, Box::new(strategy));
        manager
    }

    fn filled(req: &OrderRequest, order_id: &str) -> Result<OrderResponse, ExecutionError> {
        Ok(OrderResponse {
            success: true,
            order_id: Some(order_id.to_string()),
            filled_price: 100.0,
            filled_quantity: req.quantity,
        })
    }

    /// Risk limits wide enough to pass the mock setups through unchanged
    fn permissive_risk() -> RiskManager {
        let profile = RiskProfileConfig {
            name: "open".to_string(),
            risk_per_trade: 1.0,
            max_leverage: 1.0,
            max_position_pct: 1.0,
        };
        RiskManager::new(profile, ProtectionConfig::default())
    }

    fn create_test_orchestrator_with_risk(
        data: MockDataProvider,
        exchange: MockExchangeAdapter,
        portfolio: PortfolioState,
        risk: RiskManager,
    ) -> TradingOrchestrator {
        TradingOrchestrator::new(
            portfolio,
            TimeFrame::Daily,
            "USDT",
            "BTC",
            Arc::new(data),
            Arc::new(exchange),
            DecisionEngine::default(),
            risk,
            TradingPolicy::RegimeRouted,
        )
        .unwrap()
    }

    fn create_test_orchestrator(
        data: MockDataProvider,
        exchange: MockExchangeAdapter,
        portfolio: PortfolioState,
    ) -> TradingOrchestrator {
        create_test_orchestrator_with_risk(data, exchange, portfolio, permissive_risk())
    }

    /// Accept any stop-loss / take-profit order
    fn accept_protection(exchange: &mut MockExchangeAdapter) {
        exchange
            .expect_place_order()
            .withf(|req| req.is_protective())
            .returning(|req| filled(&req, "protect"));
    }

    #[tokio::test]
    async fn test_buy_is_executed_and_written_back() {
        let mut exchange = MockExchangeAdapter::new();
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::Limit && req.side == OrderSide::Buy && req.quantity == 2.0)
            .times(1)
            .returning(|req| filled(&req, "1"));
        exchange
            .expect_place_order()
            .withf(|req| {
                req.order_type == OrderType::StopLoss
                    && req.side == OrderSide::Sell
                    && req.quantity == 2.0
                    && req.price == Some(200.0)
            })
            .times(1)
            .returning(|req| filled(&req, "sl-1"));
        exchange
            .expect_place_order()
            .withf(|req| {
                req.order_type == OrderType::TakeProfit
                    && req.side == OrderSide::Sell
                    && req.quantity == 2.0
                    && req.price == Some(250.0)
            })
            .times(1)
            .returning(|req| filled(&req, "tp-1"));

        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(120)),
            exchange,
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
        )
        .with_manager(bull_manager(create_test_setup(OrderSide::Buy, 2.0)));

        let result = orchestrator.tick().await.unwrap().unwrap();
        assert!(result.success);
        assert_eq!(result.fiat_after, 800.0);
        assert_eq!(result.order_id.as_deref(), Some("1"));
        assert_eq!(result.stop_loss_order_id.as_deref(), Some("sl-1"));
        assert_eq!(result.take_profit_order_id.as_deref(), Some("tp-1"));

        let status = orchestrator.status().await;
        assert_eq!(status.regime, MarketRegime::Bull);
        assert_eq!(status.fiat_amount, 800.0);
        assert_eq!(status.crypto_amount, 2.0);
        assert!(status.trade_in_progress);
        assert!(status.last_price.is_some());
        assert_eq!(orchestrator.portfolio().await.entry_price, Some(100.0));
    }

    #[tokio::test]
    async fn test_protection_failure_keeps_entry() {
        let mut exchange = MockExchangeAdapter::new();
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::Limit)
            .times(1)
            .returning(|req| filled(&req, "1"));
        exchange
            .expect_place_order()
            .withf(|req| req.is_protective())
            .times(2)
            .returning(|_| Err(ExecutionError::Rejected("stop orders disabled".to_string())));

        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(120)),
            exchange,
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
        )
        .with_manager(bull_manager(create_test_setup(OrderSide::Buy, 2.0)));

        let result = orchestrator.tick().await.unwrap().unwrap();
        assert!(result.success);
        assert_eq!(result.stop_loss_order_id, None);
        assert_eq!(result.take_profit_order_id, None);
        assert_eq!(orchestrator.portfolio().await.crypto_amount, 2.0);
    }

    #[tokio::test]
    async fn test_exit_cancels_protection() {
        let mut strategy = MockStrategy::new();
        strategy.expect_name().return_const("mock_bull");
        strategy.expect_should_activate().returning(|regime, _| regime == MarketRegime::Bull);
        let entry = create_test_setup(OrderSide::Buy, 2.0);
        strategy
            .expect_evaluate()
            .times(1)
            .returning(move |_, _| Some(entry.clone()));
        let exit = create_test_setup(OrderSide::Sell, 2.0);
        strategy
            .expect_evaluate()
            .returning(move |_, _| Some(exit.clone()));
        let mut manager = PortfolioManager::empty(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        manager.register(MarketRegime::Bull, Box::new(strategy));

        let mut exchange = MockExchangeAdapter::new();
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::StopLoss)
            .returning(|req| filled(&req, "sl-1"));
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::TakeProfit)
            .returning(|req| filled(&req, "tp-1"));
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::Limit)
            .times(2)
            .returning(|req| filled(&req, "entry-or-exit"));
        exchange
            .expect_cancel_order()
            .withf(|pair, id| pair == "BTCUSDT" && (id == "sl-1" || id == "tp-1"))
            .times(2)
            .returning(|_, _| Ok(true));
        exchange
            .expect_get_balance()
            .withf(|coin| coin == "BTC")
            .returning(|_| Ok(2.0));

        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(120)),
            exchange,
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
        )
        .with_manager(manager);

        let entry = orchestrator.tick().await.unwrap().unwrap();
        assert_eq!(entry.side, OrderSide::Buy);
        let exit = orchestrator.tick().await.unwrap().unwrap();
        assert_eq!(exit.side, OrderSide::Sell);
        assert_eq!(exit.stop_loss_order_id, None);
        assert!(!orchestrator.portfolio().await.trade_in_progress);
        assert!(orchestrator.protective_orders.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_fill_closes_position() {
        let mut strategy = MockStrategy::new();
        strategy.expect_name().return_const("mock_bull");
        strategy.expect_should_activate().returning(|regime, _| regime == MarketRegime::Bull);
        let entry = create_test_setup(OrderSide::Buy, 2.0);
        strategy
            .expect_evaluate()
            .times(1)
            .returning(move |_, _| Some(entry.clone()));
        strategy.expect_evaluate().returning(|_, _| None);
        let mut manager = PortfolioManager::empty(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        manager.register(MarketRegime::Bull, Box::new(strategy));

        let mut exchange = MockExchangeAdapter::new();
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::Limit)
            .times(1)
            .returning(|req| filled(&req, "entry-1"));
        accept_protection(&mut exchange);
        // Stop sold the whole position at 95
        exchange
            .expect_get_balance()
            .withf(|coin| coin == "BTC")
            .returning(|_| Ok(0.0));
        exchange
            .expect_get_balance()
            .withf(|coin| coin == "USDT")
            .returning(|_| Ok(990.0));
        exchange
            .expect_cancel_order()
            .times(2)
            .returning(|_, _| Ok(true));

        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(120)),
            exchange,
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
        )
        .with_manager(manager);

        orchestrator.tick().await.unwrap().unwrap();
        assert!(orchestrator.portfolio().await.trade_in_progress);

        assert!(orchestrator.tick().await.unwrap().is_none());
        let portfolio = orchestrator.portfolio().await;
        assert!(!portfolio.trade_in_progress);
        assert_eq!(portfolio.crypto_amount, 0.0);
        assert_eq!(portfolio.fiat_amount, 990.0);
        assert_eq!(portfolio.consecutive_losses, 1);
        assert_eq!(portfolio.entry_price, None);
        assert!(orchestrator.protective_orders.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_paper_stop_written_back_next_cycle() {
        let mut strategy = MockStrategy::new();
        strategy.expect_name().return_const("mock_bull");
        strategy.expect_should_activate().returning(|regime, _| regime == MarketRegime::Bull);
        let entry = create_test_setup(OrderSide::Buy, 2.0);
        strategy
            .expect_evaluate()
            .times(1)
            .returning(move |_, _| Some(entry.clone()));
        strategy.expect_evaluate().returning(|_, _| None);
        let mut manager = PortfolioManager::empty(DecisionEngine::default(), TradingPolicy::RegimeRouted, TimeFrame::Daily);
        manager.register(MarketRegime::Bull, Box::new(strategy));

        let paper = Arc::new(crate::adapters::PaperExchange::new("USDT", "BTC", 1000.0, 0.0));
        let orchestrator = TradingOrchestrator::new(
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
            TimeFrame::Daily,
            "USDT",
            "BTC",
            Arc::new(data_provider(fixtures::uptrend(120))),
            paper.clone(),
            DecisionEngine::default(),
            permissive_risk(),
            TradingPolicy::RegimeRouted,
        )
        .unwrap()
        .with_manager(manager);

        let entry = orchestrator.tick().await.unwrap().unwrap();
        assert_eq!(paper.open_orders().await.len(), 2);
        assert!(entry.stop_loss_order_id.is_some());

        let fills = paper.mark(199.0).await;
        assert_eq!(fills.len(), 1);

        assert!(orchestrator.tick().await.unwrap().is_none());
        let portfolio = orchestrator.portfolio().await;
        assert!(!portfolio.trade_in_progress);
        assert_eq!(portfolio.consecutive_losses, 1);
        assert!((portfolio.fiat_amount - 962.0).abs() < 1e-9);
        assert!(paper.open_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_entry_halved_after_losing_streak() {
        let mut exchange = MockExchangeAdapter::new();
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::Limit && (req.quantity - 0.22831).abs() < 1e-9)
            .times(1)
            .returning(|req| filled(&req, "1"));
        accept_protection(&mut exchange);

        let mut portfolio = PortfolioState::new("BTCUSDT", 10_000.0, 0.0, 0.0);
        portfolio.consecutive_losses = 3;
        // Safe profile risks 1%, halved to 0.5% of 10k at ~219
        let orchestrator = create_test_orchestrator_with_risk(
            data_provider(fixtures::uptrend(120)),
            exchange,
            portfolio,
            RiskManager::new(RiskProfileConfig::default(), ProtectionConfig::default()),
        )
        .with_manager(bull_manager(create_test_setup(OrderSide::Buy, 2.0)));

        let result = orchestrator.tick().await.unwrap().unwrap();
        assert!((result.quantity - 0.22831).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_leveraged_stop_sent_inside_liquidation() {
        // x20: liquidation at 219 * 0.95, stop kept 5% inside it
        let safe_stop = 219.0 * 0.95 * 1.05;
        let mut exchange = MockExchangeAdapter::new();
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::Limit)
            .times(1)
            .returning(|req| filled(&req, "1"));
        exchange
            .expect_place_order()
            .withf(move |req| {
                req.order_type == OrderType::StopLoss && req.price.is_some_and(|p| (p - safe_stop).abs() < 1e-6)
            })
            .times(1)
            .returning(|req| filled(&req, "sl-1"));
        exchange
            .expect_place_order()
            .withf(|req| req.order_type == OrderType::TakeProfit && req.price == Some(250.0))
            .times(1)
            .returning(|req| filled(&req, "tp-1"));

        let leveraged = RiskProfileConfig {
            name: "x20".to_string(),
            risk_per_trade: 0.03,
            max_leverage: 20.0,
            max_position_pct: 0.10,
        };
        let orchestrator = create_test_orchestrator_with_risk(
            data_provider(fixtures::uptrend(120)),
            exchange,
            PortfolioState::new("BTCUSDT", 10_000.0, 0.0, 0.0),
            RiskManager::new(leveraged, ProtectionConfig::default()),
        )
        .with_manager(bull_manager(create_test_setup(OrderSide::Buy, 2.0)));

        let result = orchestrator.tick().await.unwrap().unwrap();
        let stop = result.stop_loss.unwrap();
        assert!(stop > 219.0 * 0.95, "stop {} at or below liquidation", stop);
        assert!(result.risk_reward_ratio.unwrap() >= 1.5);
    }

    #[tokio::test]
    async fn test_warming_up_skips_cycle() {
        let mut exchange = MockExchangeAdapter::new();
        exchange.expect_place_order().times(0);

        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(10)),
            exchange,
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
        );
        assert!(orchestrator.tick().await.unwrap().is_none());
        assert_eq!(orchestrator.status().await.last_price, None);
    }

    #[tokio::test]
    async fn test_data_failure_is_reported() {
        let mut data = MockDataProvider::new();
        data.expect_fetch_ohlcv()
            .returning(|_, _, _| Err(MarketDataError::RestError("timeout".to_string())));

        let orchestrator = create_test_orchestrator(
            data,
            MockExchangeAdapter::new(),
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
        );
        assert!(matches!(
            orchestrator.tick().await,
            Err(OrchestratorError::MarketDataError(_))
        ));
    }

    #[tokio::test]
    async fn test_order_failure_leaves_portfolio_untouched() {
        let mut exchange = MockExchangeAdapter::new();
        exchange
            .expect_place_order()
            .returning(|_| Err(ExecutionError::ApiError("503".to_string())));

        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(120)),
            exchange,
            PortfolioState::new("BTCUSDT", 1000.0, 0.0, 0.0),
        )
        .with_manager(bull_manager(create_test_setup(OrderSide::Buy, 2.0)));

        assert!(matches!(
            orchestrator.tick().await,
            Err(OrchestratorError::ExecutionError(_))
        ));
        let portfolio = orchestrator.portfolio().await;
        assert_eq!(portfolio.fiat_amount, 1000.0);
        assert!(!portfolio.trade_in_progress);
    }

    #[tokio::test]
    async fn test_rejected_setup_not_sent() {
        let mut exchange = MockExchangeAdapter::new();
        exchange.expect_place_order().times(0);

        // Broke portfolio: the risk check drops the buy
        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(120)),
            exchange,
            PortfolioState::new("BTCUSDT", 1.0, 0.0, 0.0),
        )
        .with_manager(bull_manager(create_test_setup(OrderSide::Buy, 2.0)));

        assert!(orchestrator.tick().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_balances() {
        let mut exchange = MockExchangeAdapter::new();
        exchange.expect_get_balance().returning(|coin| match coin {
            "USDT" => Ok(2500.0),
            _ => Ok(0.25),
        });

        let orchestrator = create_test_orchestrator(
            MockDataProvider::new(),
            exchange,
            PortfolioState::new("BTCUSDT", 0.0, 0.0, 0.0),
        );
        orchestrator.sync_balances().await.unwrap();

        let status = orchestrator.status().await;
        assert_eq!(status.fiat_amount, 2500.0);
        assert_eq!(status.crypto_amount, 0.25);
    }

    #[tokio::test]
    async fn test_stop_shared_between_clones() {
        let orchestrator = create_test_orchestrator(
            MockDataProvider::new(),
            MockExchangeAdapter::new(),
            PortfolioState::new("BTCUSDT", 0.0, 0.0, 0.0),
        )
        .with_poll_interval(Duration::from_secs(5));
        let other = orchestrator.clone();

        *orchestrator.is_running.write().await = true;
        other.stop().await;
        assert!(!orchestrator.status().await.is_running);
        assert_eq!(orchestrator.poll_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stop_interrupts_poll_sleep() {
        let mut exchange = MockExchangeAdapter::new();
        exchange.expect_get_balance().returning(|_| Ok(0.0));

        let orchestrator = create_test_orchestrator(
            data_provider(fixtures::uptrend(10)),
            exchange,
            PortfolioState::new("BTCUSDT", 0.0, 0.0, 0.0),
        )
        .with_poll_interval(Duration::from_secs(3600));
        let runner = orchestrator.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.stop().await;

        let joined = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(joined, Ok(Ok(Ok(())))), "loop still sleeping after stop");
    }

    #[test]
    fn test_empty_pair_rejected() {
        let result = TradingOrchestrator::new(
            PortfolioState::new("", 0.0, 0.0, 0.0),
            TimeFrame::Daily,
            "USDT",
            "BTC",
            Arc::new(MockDataProvider::new()),
            Arc::new(MockExchangeAdapter::new()),
            DecisionEngine::default(),
            RiskManager::new(RiskProfileConfig::default(), ProtectionConfig::default()),
            TradingPolicy::Baseline,
        );
        assert!(matches!(result, Err(OrchestratorError::ConfigError(_))));
    }
}

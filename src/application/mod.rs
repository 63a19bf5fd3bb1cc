pub mod backtest;
pub mod notifications;
pub mod orchestrator;
pub mod portfolio_manager;

pub use backtest::{BacktestEngine, BacktestError, BacktestResult, BacktestTrade, DEFAULT_MIN_BARS};
pub use notifications::{Notification, NotificationQueue};
pub use orchestrator::{OrchestratorError, OrchestratorStatus, TradingOrchestrator, DEFAULT_LIVE_MIN_BARS};
pub use portfolio_manager::{PortfolioManager, TradingPolicy};

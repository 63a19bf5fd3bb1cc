//! Domain Layer - Core types and risk rules of the regime pilot
//!
//! This module contains pure domain types and logic with no I/O.
//! All external interactions happen through the ports layer.
//!
//! - `signal`: indicator readings and their classification
//! - `regime`: market regimes, timeframes and the per-cycle market context
//! - `trade`: trade proposals and execution results
//! - `portfolio`: per-(pair, timeframe) balances and position flags
//! - `risk`: position sizing, stop-loss clamping and trade validation

pub mod signal;
pub mod regime;
pub mod trade;
pub mod portfolio;
pub mod risk;

pub use signal::{IndicatorResult, MetadataValue, Signal};
pub use regime::{MarketContext, MarketRegime, TimeFrame};
pub use trade::{risk_reward, OrderSide, OrderType, TradeResult, TradeSetup};
pub use portfolio::{min_tradable_quantity, PortfolioState, RiskProfile, MIN_NOTIONAL};
pub use risk::{RiskManager, RiskViolation, CONSECUTIVE_LOSS_THRESHOLD, RISK_REDUCTION_FACTOR};

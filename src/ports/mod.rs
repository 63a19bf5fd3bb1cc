//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Indicator collaborators (compute / analyze over a bar frame)
//! - Market data feeds (OHLCV, balances)
//! - Order execution
//! - Trade and regime notifications

pub mod indicator;
pub mod market_data;
pub mod execution;
pub mod notifier;

pub use indicator::{Frame, Indicator, IndicatorError, Window};
pub use market_data::{DataProvider, MarketDataError, Ohlcv};
pub use execution::{ExchangeAdapter, ExecutionError, OrderRequest, OrderResponse};
pub use notifier::{Notifier, NotifyError};

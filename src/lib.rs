//! Regime Pilot - regime-aware decision layer for crypto trading
//!
//! Classifies the market into bull, bear or range regimes, routes each
//! cycle to a strategy built for that regime, validates the proposal
//! against the configured risk profile and executes or backtests it.
//!
//! # Modules
//!
//! - `domain`: Core types and risk rules (MarketContext, TradeSetup, PortfolioState, RiskManager)
//! - `ports`: Trait abstractions (Indicator, DataProvider, ExchangeAdapter, Notifier)
//! - `indicators`: Technical indicator collaborators and the IndicatorEngine
//! - `strategy`: Regime detection, decision engine and regime strategies
//! - `application`: Portfolio manager, backtest engine and live orchestrator
//! - `adapters`: External implementations (Binance, CSV, paper exchange, Discord, CLI)
//! - `config`: Configuration loading and validation

pub mod domain;
pub mod ports;
pub mod indicators;
pub mod strategy;
pub mod application;
pub mod adapters;
pub mod config;

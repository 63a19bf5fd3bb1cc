//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Binance: public klines REST feed
//! - CSV: historical bars from files
//! - Paper: in-memory exchange
//! - Discord: webhook alerts
//! - Fear & Greed: sentiment index client
//! - CLI: Command-line interface handlers

pub mod binance;
pub mod cli;
pub mod csv_data;
pub mod discord;
pub mod fear_greed;
pub mod paper;

pub use binance::BinanceDataProvider;
pub use cli::CliApp;
pub use csv_data::{read_ohlcv_csv, CsvDataProvider};
pub use discord::DiscordNotifier;
pub use fear_greed::{fetch_fear_and_greed, FearGreedClient};
pub use paper::PaperExchange;

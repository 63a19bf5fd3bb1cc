//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    expand_path, load_config, AlertsSection, Config, ConfigError, DataSection, LoggingSection,
    RiskProfileSection, TradingSection,
};

//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::adapters::binance::DEFAULT_BINANCE_URL;
use crate::application::{TradingPolicy, DEFAULT_LIVE_MIN_BARS};
use crate::domain::risk::DEFAULT_TRUNCATE;
use crate::domain::{RiskProfile, TimeFrame};
use crate::strategy::{ProtectionConfig, RiskProfileConfig};

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub trading: TradingSection,
    #[serde(default)]
    pub protection: ProtectionConfig,
    /// Custom or overridden sizing profiles, keyed by profile name
    #[serde(default)]
    pub risk_profiles: BTreeMap<String, RiskProfileSection>,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub alerts: AlertsSection,
}

/// Trading configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSection {
    /// Exchange symbol, e.g. "BTCUSDT"
    pub pair_symbol: String,
    pub fiat_symbol: String,
    pub crypto_symbol: String,
    /// Starting fiat capital, split evenly across timeframes
    pub capital: f64,
    /// Quantity precision in decimals
    #[serde(default = "default_truncate")]
    pub truncate: u32,
    /// Name of the sizing profile to trade with
    #[serde(default = "default_risk_profile")]
    pub risk_profile: String,
    pub timeframes: Vec<TimeFrame>,
    #[serde(default = "default_policy")]
    pub policy: TradingPolicy,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,
}

fn default_truncate() -> u32 {
    DEFAULT_TRUNCATE
}

fn default_risk_profile() -> String {
    RiskProfile::Safe.as_str().to_string()
}

fn default_policy() -> TradingPolicy {
    TradingPolicy::RegimeRouted
}

fn default_poll_interval() -> u64 {
    60
}

fn default_min_bars() -> usize {
    DEFAULT_LIVE_MIN_BARS
}

/// One `[risk_profiles.<name>]` table
#[derive(Debug, Clone, Deserialize)]
pub struct RiskProfileSection {
    pub risk_per_trade: f64,
    pub max_leverage: f64,
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
}

fn default_max_position_pct() -> f64 {
    0.10
}

/// Market data configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    /// Public REST base URL for klines
    #[serde(default = "default_binance_url")]
    pub binance_url: String,
    /// Feed the fear & greed index into each cycle
    #[serde(default)]
    pub fear_and_greed: bool,
}

fn default_binance_url() -> String {
    DEFAULT_BINANCE_URL.to_string()
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            binance_url: default_binance_url(),
            fear_and_greed: false,
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Alerts configuration section (optional)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertsSection {
    /// Discord webhook URL
    #[serde(default)]
    pub discord_webhook_url: String,
}

impl AlertsSection {
    /// Webhook URL with environment variable fallback.
    /// DISCORD_WEBHOOK_URL is used when the config value is empty.
    pub fn get_discord_webhook_url(&self) -> Option<String> {
        if !self.discord_webhook_url.is_empty() {
            return Some(self.discord_webhook_url.clone());
        }
        std::env::var("DISCORD_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.is_empty())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Expand `~` and environment variables in a user supplied path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let trading = &self.trading;

        for (field, value) in [
            ("pair_symbol", &trading.pair_symbol),
            ("fiat_symbol", &trading.fiat_symbol),
            ("crypto_symbol", &trading.crypto_symbol),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationError(format!("{} cannot be empty", field)));
            }
        }

        // Paper fills and order requests are keyed by the joined symbols
        let joined = format!("{}{}", trading.crypto_symbol, trading.fiat_symbol);
        if trading.pair_symbol != joined {
            return Err(ConfigError::ValidationError(format!(
                "pair_symbol '{}' must equal crypto_symbol + fiat_symbol ('{}')",
                trading.pair_symbol, joined
            )));
        }

        if !(trading.capital.is_finite() && trading.capital >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "capital must be >= 0, got {}",
                trading.capital
            )));
        }

        if trading.truncate > 12 {
            return Err(ConfigError::ValidationError(format!(
                "truncate must be <= 12, got {}",
                trading.truncate
            )));
        }

        if trading.timeframes.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one timeframe is required".to_string(),
            ));
        }

        if trading.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }

        self.protection
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        for profile in self.profiles().values() {
            profile
                .validate()
                .map_err(|e| ConfigError::ValidationError(format!("risk profile {}: {}", profile.name, e)))?;
        }

        self.risk_profile_config()?;

        if self.data.binance_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "binance_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Built-in profiles overlaid with the configured ones
    pub fn profiles(&self) -> BTreeMap<String, RiskProfileConfig> {
        let mut profiles: BTreeMap<String, RiskProfileConfig> = [
            RiskProfile::Safe,
            RiskProfile::Aggressive,
            RiskProfile::SafeLeverage,
            RiskProfile::AggressiveLeverage,
        ]
        .into_iter()
        .map(|p| (p.as_str().to_string(), RiskProfileConfig::for_profile(p)))
        .collect();

        for (name, section) in &self.risk_profiles {
            profiles.insert(
                name.clone(),
                RiskProfileConfig {
                    name: name.clone(),
                    risk_per_trade: section.risk_per_trade,
                    max_leverage: section.max_leverage,
                    max_position_pct: section.max_position_pct,
                },
            );
        }
        profiles
    }

    /// The profile selected by `trading.risk_profile`
    pub fn risk_profile_config(&self) -> Result<RiskProfileConfig, ConfigError> {
        self.profiles()
            .remove(&self.trading.risk_profile)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "unknown risk_profile '{}'",
                    self.trading.risk_profile
                ))
            })
    }

    /// Fiat capital given to each timeframe's portfolio
    pub fn capital_per_timeframe(&self) -> f64 {
        self.trading.capital / self.trading.timeframes.len().max(1) as f64
    }
}

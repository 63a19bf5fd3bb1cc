//! Strategy Parameters
//!
//! Static risk and protection settings consumed by the risk manager,
//! the decision engine and the regime strategies. Loaded once, never
//! mutated by the trading core.

use serde::{Deserialize, Serialize};

use crate::domain::RiskProfile;

/// Risk parameters of one sizing profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfileConfig {
    pub name: String,
    /// Fraction of fiat risked per trade
    pub risk_per_trade: f64,
    pub max_leverage: f64,
    /// Maximum position value as a fraction of the portfolio
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
}

fn default_max_position_pct() -> f64 {
    0.10
}

impl Default for RiskProfileConfig {
    fn default() -> Self {
        Self::for_profile(RiskProfile::Safe)
    }
}

impl RiskProfileConfig {
    /// Built-in values for each named profile
    pub fn for_profile(profile: RiskProfile) -> Self {
        let (risk_per_trade, max_leverage) = match profile {
            RiskProfile::Safe => (0.01, 1.0),
            RiskProfile::Aggressive => (0.03, 1.0),
            RiskProfile::SafeLeverage => (0.01, 3.0),
            RiskProfile::AggressiveLeverage => (0.03, 10.0),
        };
        Self {
            name: profile.as_str().to_string(),
            risk_per_trade,
            max_leverage,
            max_position_pct: default_max_position_pct(),
        }
    }

    /// Profile enum matching `name`, falling back to `Safe` for custom names
    pub fn profile(&self) -> RiskProfile {
        self.name.parse().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade <= 1.0) {
            return Err(ParamsError::InvalidRiskPerTrade(self.risk_per_trade));
        }
        if !(self.max_leverage >= 1.0) {
            return Err(ParamsError::InvalidLeverage(self.max_leverage));
        }
        if !(self.max_position_pct > 0.0 && self.max_position_pct <= 1.0) {
            return Err(ParamsError::InvalidPositionPct(self.max_position_pct));
        }
        Ok(())
    }
}

/// Stop-loss and take-profit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Stop-loss distance as a fraction of entry
    pub sl_level: f64,
    /// Fraction of the position closed at the stop
    pub sl_amount: f64,
    /// First take-profit distance as a fraction of entry
    pub tp1_level: f64,
    pub tp1_amount: f64,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            sl_level: 0.02,
            sl_amount: 1.0,
            tp1_level: 0.10,
            tp1_amount: 1.0,
        }
    }
}

impl ProtectionConfig {
    pub fn validate(&self) -> Result<(), ParamsError> {
        for (field, value) in [
            ("sl_level", self.sl_level),
            ("sl_amount", self.sl_amount),
            ("tp1_level", self.tp1_level),
            ("tp1_amount", self.tp1_amount),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ParamsError::InvalidProtection(field, value));
            }
        }
        Ok(())
    }
}

/// Sizing and protection used by one regime strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub risk_per_trade: f64,
    pub sl_level: f64,
    pub tp_level: f64,
}

impl StrategyParams {
    /// Trend following: more risk, wide stop, wide target
    pub fn bull() -> Self {
        Self {
            risk_per_trade: 0.02,
            sl_level: 0.03,
            tp_level: 0.15,
        }
    }

    /// Defensive: small size, tight stop, quick target
    pub fn bear() -> Self {
        Self {
            risk_per_trade: 0.01,
            sl_level: 0.015,
            tp_level: 0.05,
        }
    }

    /// Mean reversion between support and resistance
    pub fn range() -> Self {
        Self {
            risk_per_trade: 0.015,
            sl_level: 0.02,
            tp_level: 0.04,
        }
    }

    pub fn with_risk_per_trade(mut self, risk_per_trade: f64) -> Self {
        self.risk_per_trade = risk_per_trade;
        self
    }
}

/// Parameter validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("Invalid risk per trade: {0} (must be 0 < risk <= 1)")]
    InvalidRiskPerTrade(f64),
    #[error("Invalid max leverage: {0} (must be >= 1)")]
    InvalidLeverage(f64),
    #[error("Invalid max position: {0} (must be 0 < pct <= 1)")]
    InvalidPositionPct(f64),
    #[error("Invalid protection {0}: {1} (must be 0 < value <= 1)")]
    InvalidProtection(&'static str, f64),
}

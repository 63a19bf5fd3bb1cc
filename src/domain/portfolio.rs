use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position sizing profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    /// 1% per trade
    #[default]
    Safe,
    /// 3% per trade
    Aggressive,
    /// x3 leverage
    SafeLeverage,
    /// x10 leverage
    AggressiveLeverage,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Safe => "safe",
            RiskProfile::Aggressive => "aggressive",
            RiskProfile::SafeLeverage => "safe_leverage",
            RiskProfile::AggressiveLeverage => "aggressive_leverage",
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(RiskProfile::Safe),
            "aggressive" => Ok(RiskProfile::Aggressive),
            "safe_leverage" => Ok(RiskProfile::SafeLeverage),
            "aggressive_leverage" => Ok(RiskProfile::AggressiveLeverage),
            other => Err(format!("unknown risk profile '{}'", other)),
        }
    }
}

/// Smallest fiat notional the exchange accepts
pub const MIN_NOTIONAL: f64 = 5.0;

/// Balances and position flags for one (pair, timeframe).
///
/// Owned by exactly one trading loop; never shared across timeframes or pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub fiat_amount: f64,
    pub crypto_amount: f64,
    pub pair: String,
    pub current_price: f64,
    pub trade_in_progress: bool,
    pub consecutive_losses: u32,
    pub risk_profile: RiskProfile,
    /// Fill price of the open position, used to realise P&L on exit
    pub entry_price: Option<f64>,
}

impl PortfolioState {
    pub fn new(pair: &str, fiat_amount: f64, crypto_amount: f64, current_price: f64) -> Self {
        Self {
            fiat_amount,
            crypto_amount,
            pair: pair.to_string(),
            current_price,
            trade_in_progress: false,
            consecutive_losses: 0,
            risk_profile: RiskProfile::default(),
            entry_price: None,
        }
    }

    pub fn with_risk_profile(mut self, risk_profile: RiskProfile) -> Self {
        self.risk_profile = risk_profile;
        self
    }

    pub fn total_value(&self) -> f64 {
        self.fiat_amount + self.crypto_amount * self.current_price
    }

    /// Minimum tradable crypto quantity at the current price
    pub fn min_tradable_quantity(&self) -> f64 {
        min_tradable_quantity(self.current_price)
    }

    /// Whether the held crypto is large enough to be sold
    pub fn has_sellable_position(&self) -> bool {
        self.crypto_amount > self.min_tradable_quantity()
    }
}

/// Crypto quantity worth `MIN_NOTIONAL` at `price`; infinite for a non-positive price
pub fn min_tradable_quantity(price: f64) -> f64 {
    if price > 0.0 {
        MIN_NOTIONAL / price
    } else {
        f64::INFINITY
    }
}

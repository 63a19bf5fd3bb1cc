use serde::{Deserialize, Serialize};
use std::fmt;

use super::portfolio::RiskProfile;
use super::regime::{MarketRegime, TimeFrame};

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type sent to an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::TakeProfit => "TAKE_PROFIT",
        };
        f.write_str(name)
    }
}

/// Reward-to-risk ratio of a long entry; 0 when nothing is at risk
pub fn risk_reward(entry: f64, stop_loss: f64, take_profit: f64, quantity: f64) -> f64 {
    let possible_gain = (take_profit - entry) * quantity;
    let possible_loss = (entry - stop_loss) * quantity;
    if possible_loss > 0.0 {
        possible_gain / possible_loss
    } else {
        0.0
    }
}

/// A trade proposal. Has no effect until executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub side: OrderSide,
    pub pair: String,
    pub entry_price: f64,
    pub quantity: f64,
    /// 0.0 when the setup closes a position
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    pub risk_profile: RiskProfile,
    pub timeframe: TimeFrame,
    pub regime: MarketRegime,
    pub confidence: f64,
}

impl TradeSetup {
    /// Long entry with protective levels; the R:R ratio is derived from them
    #[allow(clippy::too_many_arguments)]
    pub fn buy(
        pair: &str,
        entry_price: f64,
        quantity: f64,
        stop_loss: f64,
        take_profit: f64,
        risk_profile: RiskProfile,
        timeframe: TimeFrame,
        regime: MarketRegime,
        confidence: f64,
    ) -> Self {
        Self {
            side: OrderSide::Buy,
            pair: pair.to_string(),
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            risk_reward_ratio: risk_reward(entry_price, stop_loss, take_profit, quantity),
            risk_profile,
            timeframe,
            regime,
            confidence,
        }
    }

    /// Position exit without stop-loss / take-profit levels
    pub fn sell(
        pair: &str,
        price: f64,
        quantity: f64,
        risk_profile: RiskProfile,
        timeframe: TimeFrame,
        regime: MarketRegime,
        confidence: f64,
    ) -> Self {
        Self {
            side: OrderSide::Sell,
            pair: pair.to_string(),
            entry_price: price,
            quantity,
            stop_loss: 0.0,
            take_profit: 0.0,
            risk_reward_ratio: 0.0,
            risk_profile,
            timeframe,
            regime,
            confidence,
        }
    }

    /// Notional value of the proposal in fiat
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }
}

impl fmt::Display for TradeSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {} @ {:.2} ({} {})",
            self.side, self.quantity, self.pair, self.entry_price, self.regime, self.timeframe
        )
    }
}

/// Outcome of an executed (or simulated) order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub success: bool,
    pub side: OrderSide,
    pub pair: String,
    pub price: f64,
    pub quantity: f64,
    pub fiat_after: f64,
    pub crypto_after: f64,
    pub total_portfolio_value: f64,
    pub trade_in_progress: bool,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_reward_ratio: Option<f64>,
    pub order_id: Option<String>,
    /// Protective orders resting on the exchange after an entry
    pub stop_loss_order_id: Option<String>,
    pub take_profit_order_id: Option<String>,
    pub error: Option<String>,
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "Filled {} {:.6} {} @ {:.2} | portfolio {:.2}",
                self.side, self.quantity, self.pair, self.price, self.total_portfolio_value
            )
        } else {
            write!(
                f,
                "Failed {} {}: {}",
                self.side,
                self.pair,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

//! Risk Manager
//!
//! Position sizing, protective price levels and pre-trade validation.
//! Sizing de-risks automatically after a losing streak, and leveraged
//! stop-losses are clamped so they always trigger before liquidation.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use thiserror::Error;

use super::portfolio::{min_tradable_quantity, PortfolioState, MIN_NOTIONAL};
use super::trade::{risk_reward, OrderSide, TradeSetup};
use crate::strategy::params::{ProtectionConfig, RiskProfileConfig};

/// Losing trades in a row before sizing is reduced
pub const CONSECUTIVE_LOSS_THRESHOLD: u32 = 3;

/// Multiplier applied to risk once the threshold is reached
pub const RISK_REDUCTION_FACTOR: f64 = 0.5;

/// Required reward-to-risk for any leveraged trade
pub const MIN_LEVERAGED_RISK_REWARD: f64 = 1.5;

/// Distance kept between a stop-loss and the liquidation price
pub const LIQUIDATION_MARGIN: f64 = 0.05;

/// Default quantity precision in decimal places
pub const DEFAULT_TRUNCATE: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskViolation {
    #[error("Insufficient fiat for trade: {0:.2}")]
    InsufficientFiat(f64),

    #[error("Insufficient crypto for trade: {held:.6} < {required:.6}")]
    InsufficientCrypto { held: f64, required: f64 },

    #[error("R:R too low for leveraged trade: {0:.2}")]
    RiskRewardTooLow(f64),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),
}

/// Sizes and validates trades for one risk profile
#[derive(Debug, Clone)]
pub struct RiskManager {
    profile: RiskProfileConfig,
    protection: ProtectionConfig,
    truncate: u32,
}

impl RiskManager {
    pub fn new(profile: RiskProfileConfig, protection: ProtectionConfig) -> Self {
        Self {
            profile,
            protection,
            truncate: DEFAULT_TRUNCATE,
        }
    }

    /// Override quantity precision
    pub fn with_truncate(mut self, decimals: u32) -> Self {
        self.truncate = decimals;
        self
    }

    pub fn profile(&self) -> &RiskProfileConfig {
        &self.profile
    }

    pub fn protection(&self) -> &ProtectionConfig {
        &self.protection
    }

    pub fn is_leveraged(&self) -> bool {
        self.profile.max_leverage > 1.0
    }

    /// Risk fraction after consecutive-loss reduction
    pub fn effective_risk(&self, consecutive_losses: u32) -> f64 {
        let risk = self.profile.risk_per_trade;
        if consecutive_losses >= CONSECUTIVE_LOSS_THRESHOLD {
            let reduced = risk * RISK_REDUCTION_FACTOR;
            tracing::warn!(
                "Risk reduced to {:.2}% after {} consecutive losses",
                reduced * 100.0,
                consecutive_losses
            );
            reduced
        } else {
            risk
        }
    }

    /// Position size in crypto units, capped by `max_position_pct` and truncated
    pub fn compute_position_size(&self, portfolio: &PortfolioState, entry_price: f64) -> f64 {
        if entry_price <= 0.0 || !entry_price.is_finite() {
            return 0.0;
        }

        let risk = self.effective_risk(portfolio.consecutive_losses);
        let raw = portfolio.fiat_amount * risk * self.profile.max_leverage / entry_price;
        let cap = self.profile.max_position_pct * portfolio.total_value() / entry_price;

        truncate(raw.min(cap), self.truncate)
    }

    /// Stop-loss price, clamped away from liquidation when leveraged
    pub fn compute_stop_loss(&self, entry_price: f64, side: OrderSide) -> f64 {
        let sl_level = self.protection.sl_level;
        let stop = match side {
            OrderSide::Buy => entry_price * (1.0 - sl_level),
            OrderSide::Sell => entry_price * (1.0 + sl_level),
        };
        self.clamp_to_liquidation(stop, entry_price, side)
    }

    /// Pull `stop` to at least `LIQUIDATION_MARGIN` inside the liquidation price
    fn clamp_to_liquidation(&self, stop: f64, entry_price: f64, side: OrderSide) -> f64 {
        if !self.is_leveraged() {
            return stop;
        }

        let distance = 1.0 / self.profile.max_leverage;
        match side {
            OrderSide::Buy => {
                let liquidation = entry_price * (1.0 - distance);
                stop.max(liquidation * (1.0 + LIQUIDATION_MARGIN))
            }
            OrderSide::Sell => {
                let liquidation = entry_price * (1.0 + distance);
                stop.min(liquidation * (1.0 - LIQUIDATION_MARGIN))
            }
        }
    }

    pub fn compute_take_profit(&self, entry_price: f64, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => entry_price * (1.0 + self.protection.tp1_level),
            OrderSide::Sell => entry_price * (1.0 - self.protection.tp1_level),
        }
    }

    /// Check a setup against the risk rules
    pub fn check_trade(
        &self,
        setup: &TradeSetup,
        portfolio: &PortfolioState,
    ) -> Result<(), RiskViolation> {
        if !(setup.quantity > 0.0) {
            return Err(RiskViolation::InvalidQuantity(setup.quantity));
        }

        match setup.side {
            OrderSide::Buy => {
                if portfolio.fiat_amount < MIN_NOTIONAL {
                    return Err(RiskViolation::InsufficientFiat(portfolio.fiat_amount));
                }
            }
            OrderSide::Sell => {
                let required = min_tradable_quantity(setup.entry_price);
                if portfolio.crypto_amount < required {
                    return Err(RiskViolation::InsufficientCrypto {
                        held: portfolio.crypto_amount,
                        required,
                    });
                }
            }
        }

        if self.is_leveraged() && setup.risk_reward_ratio < MIN_LEVERAGED_RISK_REWARD {
            return Err(RiskViolation::RiskRewardTooLow(setup.risk_reward_ratio));
        }

        Ok(())
    }

    /// `check_trade` as a boolean; a rejected setup is logged and dropped
    pub fn validate_trade(&self, setup: &TradeSetup, portfolio: &PortfolioState) -> bool {
        match self.check_trade(setup, portfolio) {
            Ok(()) => true,
            Err(violation) => {
                tracing::warn!("Trade rejected ({}): {}", setup, violation);
                false
            }
        }
    }

    /// Size and protect a proposed trade, then validate it.
    ///
    /// Entries are capped at `compute_position_size`, so the losing-streak
    /// reduction and the portfolio share limit apply to every placed order.
    /// Under leverage the stop is moved inside the liquidation margin and the
    /// R:R ratio is recomputed from the adjusted levels. Exits keep their
    /// quantity. Returns `None` when the rules reject the trade.
    pub fn prepare_trade(&self, mut setup: TradeSetup, portfolio: &PortfolioState) -> Option<TradeSetup> {
        if setup.side == OrderSide::Buy {
            let max_quantity = self.compute_position_size(portfolio, setup.entry_price);
            if setup.quantity > max_quantity {
                tracing::debug!(
                    "Capping {} quantity {:.6} -> {:.6}",
                    setup.pair,
                    setup.quantity,
                    max_quantity
                );
            }
            setup.quantity = self.truncate_quantity(setup.quantity.min(max_quantity));

            let stop_loss = self.clamp_to_liquidation(setup.stop_loss, setup.entry_price, OrderSide::Buy);
            if stop_loss != setup.stop_loss {
                tracing::info!(
                    "Stop-loss for {} moved {:.2} -> {:.2} to stay clear of liquidation",
                    setup.pair,
                    setup.stop_loss,
                    stop_loss
                );
                setup.stop_loss = stop_loss;
            }
            setup.risk_reward_ratio =
                risk_reward(setup.entry_price, setup.stop_loss, setup.take_profit, setup.quantity);
        }

        self.validate_trade(&setup, portfolio).then_some(setup)
    }

    /// Quantity truncated at the configured precision
    pub fn truncate_quantity(&self, quantity: f64) -> f64 {
        truncate(quantity, self.truncate)
    }
}

/// Truncate toward zero at `decimals` places
pub fn truncate(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    Decimal::from_f64(value)
        .map(|d| d.trunc_with_scale(decimals))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

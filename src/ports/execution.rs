//! Execution port
//!
//! Order placement contract consumed by the live orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{OrderSide, OrderType};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("API request failed: {0}")]
    ApiError(String),
    #[error("Order rejected: {0}")]
    Rejected(String),
    #[error("Insufficient balance: need {required:.8} {coin}, have {available:.8}")]
    InsufficientBalance {
        coin: String,
        required: f64,
        available: f64,
    },
    #[error("Unknown order: {0}")]
    UnknownOrder(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// An order as sent to the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub order_type: OrderType,
    pub pair: String,
    pub quantity: f64,
    /// Limit price; `None` for market orders
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(side: OrderSide, pair: &str, quantity: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            pair: pair.to_string(),
            quantity,
            price: None,
        }
    }

    pub fn limit(side: OrderSide, pair: &str, quantity: f64, price: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            pair: pair.to_string(),
            quantity,
            price: Some(price),
        }
    }

    /// Resting sell that closes `quantity` once the price falls to `price`
    pub fn stop_loss(pair: &str, quantity: f64, price: f64) -> Self {
        Self {
            side: OrderSide::Sell,
            order_type: OrderType::StopLoss,
            pair: pair.to_string(),
            quantity,
            price: Some(price),
        }
    }

    /// Resting sell that closes `quantity` once the price rises to `price`
    pub fn take_profit(pair: &str, quantity: f64, price: f64) -> Self {
        Self {
            side: OrderSide::Sell,
            order_type: OrderType::TakeProfit,
            pair: pair.to_string(),
            quantity,
            price: Some(price),
        }
    }

    /// Stop-loss or take-profit order
    pub fn is_protective(&self) -> bool {
        matches!(self.order_type, OrderType::StopLoss | OrderType::TakeProfit)
    }
}

/// Exchange acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order_id: Option<String>,
    pub filled_price: f64,
    pub filled_quantity: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResponse, ExecutionError>;

    /// Returns true when the order existed and was cancelled
    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<bool, ExecutionError>;

    async fn get_balance(&self, coin: &str) -> Result<f64, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_request_builders() {
        let market = OrderRequest::market(OrderSide::Buy, "BTCUSDT", 0.5);
        assert_eq!(market.order_type, OrderType::Market);
        assert_eq!(market.price, None);

        let limit = OrderRequest::limit(OrderSide::Sell, "BTCUSDT", 0.5, 50000.0);
        assert_eq!(limit.order_type, OrderType::Limit);
        assert_eq!(limit.price, Some(50000.0));
        assert!(!limit.is_protective());

        let stop = OrderRequest::stop_loss("BTCUSDT", 0.5, 49000.0);
        assert_eq!((stop.side, stop.order_type), (OrderSide::Sell, OrderType::StopLoss));
        assert!(stop.is_protective());

        let take = OrderRequest::take_profit("BTCUSDT", 0.25, 55000.0);
        assert_eq!(take.order_type, OrderType::TakeProfit);
        assert_eq!((take.quantity, take.price), (0.25, Some(55000.0)));
    }
}

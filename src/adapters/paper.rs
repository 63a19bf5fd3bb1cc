//! Paper trading exchange
//!
//! Fills limit orders immediately at their price and keeps balances in
//! memory. Market orders fill at the last price marked for the pair.
//! Stop-loss and take-profit orders rest until `mark` crosses their level.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{OrderSide, OrderType};
use crate::ports::{ExchangeAdapter, ExecutionError, OrderRequest, OrderResponse};

/// A protective order waiting for its trigger price
#[derive(Debug, Clone)]
struct RestingOrder {
    id: String,
    request: OrderRequest,
    level: f64,
}

impl RestingOrder {
    fn is_triggered(&self, price: f64) -> bool {
        match (self.request.order_type, self.request.side) {
            (OrderType::StopLoss, OrderSide::Sell) | (OrderType::TakeProfit, OrderSide::Buy) => {
                price <= self.level
            }
            (OrderType::StopLoss, OrderSide::Buy) | (OrderType::TakeProfit, OrderSide::Sell) => {
                price >= self.level
            }
            _ => false,
        }
    }
}

/// In-memory exchange for one fiat/crypto pair
#[derive(Debug, Clone)]
pub struct PaperExchange {
    pair: String,
    fiat_symbol: String,
    crypto_symbol: String,
    balances: Arc<RwLock<HashMap<String, f64>>>,
    open_orders: Arc<RwLock<Vec<RestingOrder>>>,
    mark_price: Arc<RwLock<Option<f64>>>,
    next_id: Arc<AtomicU64>,
}

impl PaperExchange {
    pub fn new(fiat_symbol: &str, crypto_symbol: &str, fiat: f64, crypto: f64) -> Self {
        let mut balances = HashMap::new();
        balances.insert(fiat_symbol.to_string(), fiat);
        balances.insert(crypto_symbol.to_string(), crypto);

        Self {
            pair: format!("{}{}", crypto_symbol, fiat_symbol),
            fiat_symbol: fiat_symbol.to_string(),
            crypto_symbol: crypto_symbol.to_string(),
            balances: Arc::new(RwLock::new(balances)),
            open_orders: Arc::new(RwLock::new(Vec::new())),
            mark_price: Arc::new(RwLock::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Ids of protective orders still resting
    pub async fn open_orders(&self) -> Vec<String> {
        self.open_orders.read().await.iter().map(|o| o.id.clone()).collect()
    }

    /// Set the price market orders fill at and trigger resting orders.
    ///
    /// Returns the fills of the orders the new price crossed. Triggered
    /// sells are clamped to the crypto still held.
    pub async fn mark(&self, price: f64) -> Vec<OrderResponse> {
        *self.mark_price.write().await = Some(price);

        let triggered: Vec<RestingOrder> = {
            let mut open = self.open_orders.write().await;
            let (hit, keep): (Vec<RestingOrder>, Vec<RestingOrder>) =
                open.drain(..).partition(|o| o.is_triggered(price));
            *open = keep;
            hit
        };

        let mut fills = Vec::with_capacity(triggered.len());
        for order in triggered {
            let quantity = match order.request.side {
                OrderSide::Sell => order.request.quantity.min(self.balance(&self.crypto_symbol).await),
                OrderSide::Buy => order.request.quantity,
            };
            if quantity <= 0.0 {
                tracing::info!(
                    "[PAPER] {} {} triggered with nothing left to sell",
                    order.request.order_type,
                    order.id
                );
                continue;
            }
            match self.settle(order.request.side, quantity, order.level, &order.id).await {
                Ok(fill) => fills.push(fill),
                Err(e) => tracing::warn!("[PAPER] {} {} could not fill: {}", order.request.order_type, order.id, e),
            }
        }
        fills
    }

    fn fill_price(request: &OrderRequest, mark: Option<f64>) -> Result<f64, ExecutionError> {
        let price = request.price.or(mark).ok_or_else(|| {
            ExecutionError::InvalidParameters("no price to fill a market order at".to_string())
        })?;
        if !(price.is_finite() && price > 0.0) {
            return Err(ExecutionError::InvalidParameters(format!("invalid price {}", price)));
        }
        Ok(price)
    }

    fn next_order_id(&self) -> String {
        format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn balance(&self, coin: &str) -> f64 {
        self.balances.read().await.get(coin).copied().unwrap_or(0.0)
    }

    /// Move balances for a fill of `quantity` at `price`
    async fn settle(
        &self,
        side: OrderSide,
        quantity: f64,
        price: f64,
        order_id: &str,
    ) -> Result<OrderResponse, ExecutionError> {
        let notional = price * quantity;

        let mut balances = self.balances.write().await;
        let fiat = balances.get(&self.fiat_symbol).copied().unwrap_or(0.0);
        let crypto = balances.get(&self.crypto_symbol).copied().unwrap_or(0.0);

        let (fiat_after, crypto_after) = match side {
            OrderSide::Buy => {
                if notional > fiat {
                    return Err(ExecutionError::InsufficientBalance {
                        coin: self.fiat_symbol.clone(),
                        required: notional,
                        available: fiat,
                    });
                }
                (fiat - notional, crypto + quantity)
            }
            OrderSide::Sell => {
                if quantity > crypto {
                    return Err(ExecutionError::InsufficientBalance {
                        coin: self.crypto_symbol.clone(),
                        required: quantity,
                        available: crypto,
                    });
                }
                (fiat + notional, crypto - quantity)
            }
        };

        balances.insert(self.fiat_symbol.clone(), fiat_after);
        balances.insert(self.crypto_symbol.clone(), crypto_after);

        tracing::info!(
            "[PAPER] {} {:.8} {} @ {:.2} ({})",
            side,
            quantity,
            self.pair,
            price,
            order_id
        );

        Ok(OrderResponse {
            success: true,
            order_id: Some(order_id.to_string()),
            filled_price: price,
            filled_quantity: quantity,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResponse, ExecutionError> {
        if request.pair != self.pair {
            return Err(ExecutionError::InvalidParameters(format!(
                "paper exchange trades {}, not {}",
                self.pair, request.pair
            )));
        }
        if !(request.quantity.is_finite() && request.quantity > 0.0) {
            return Err(ExecutionError::InvalidParameters(format!("invalid quantity {}", request.quantity)));
        }

        if request.is_protective() {
            let level = request
                .price
                .filter(|p| p.is_finite() && *p > 0.0)
                .ok_or_else(|| {
                    ExecutionError::InvalidParameters(format!("{} needs a trigger price", request.order_type))
                })?;
            let id = self.next_order_id();
            tracing::info!(
                "[PAPER] {} {} {:.8} {} @ {:.2} resting ({})",
                request.order_type,
                request.side,
                request.quantity,
                self.pair,
                level,
                id
            );
            self.open_orders.write().await.push(RestingOrder {
                id: id.clone(),
                request,
                level,
            });
            return Ok(OrderResponse {
                success: true,
                order_id: Some(id),
                filled_price: level,
                filled_quantity: 0.0,
            });
        }

        let price = Self::fill_price(&request, *self.mark_price.read().await)?;
        let order_id = self.next_order_id();
        self.settle(request.side, request.quantity, price, &order_id).await
    }

    async fn cancel_order(&self, _pair: &str, order_id: &str) -> Result<bool, ExecutionError> {
        let mut open = self.open_orders.write().await;
        match open.iter().position(|o| o.id == order_id) {
            Some(index) => {
                open.remove(index);
                tracing::info!("[PAPER] Cancelled {}", order_id);
                Ok(true)
            }
            // Limit and market orders fill on placement
            None => Err(ExecutionError::UnknownOrder(order_id.to_string())),
        }
    }

    async fn get_balance(&self, coin: &str) -> Result<f64, ExecutionError> {
        Ok(self.balance(coin).await)
    }
}

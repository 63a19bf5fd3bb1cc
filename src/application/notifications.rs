//! Fire-and-forget notification delivery
//!
//! The trading loop pushes messages onto an unbounded channel; a spawned
//! worker drains it and calls the notifier. Delivery failures are logged by
//! the worker and never reach the decision cycle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{MarketRegime, TimeFrame, TradeResult, TradeSetup};
use crate::ports::Notifier;

#[derive(Debug, Clone)]
pub enum Notification {
    Trade {
        setup: TradeSetup,
        result: TradeResult,
    },
    RegimeChange {
        pair: String,
        timeframe: TimeFrame,
        previous: MarketRegime,
        current: MarketRegime,
        confidence: f64,
    },
}

/// Sending half of the notification channel
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationQueue {
    /// Spawn the delivery worker. It stops once every queue clone is dropped.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let outcome = match &notification {
                    Notification::Trade { setup, result } => notifier.notify_trade(setup, result).await,
                    Notification::RegimeChange {
                        pair,
                        timeframe,
                        previous,
                        current,
                        confidence,
                    } => {
                        notifier
                            .notify_regime_change(pair, *timeframe, *previous, *current, *confidence)
                            .await
                    }
                };
                if let Err(e) = outcome {
                    tracing::warn!("Notification delivery failed: {}", e);
                }
            }
            tracing::debug!("Notification worker stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue a trade alert; never blocks
    pub fn notify_trade(&self, setup: &TradeSetup, result: &TradeResult) {
        self.push(Notification::Trade {
            setup: setup.clone(),
            result: result.clone(),
        });
    }

    pub fn notify_regime_change(
        &self,
        pair: &str,
        timeframe: TimeFrame,
        previous: MarketRegime,
        current: MarketRegime,
        confidence: f64,
    ) {
        self.push(Notification::RegimeChange {
            pair: pair.to_string(),
            timeframe,
            previous,
            current,
            confidence,
        });
    }

    fn push(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification worker gone, message dropped");
        }
    }
}

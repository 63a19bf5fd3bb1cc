//! Relative Strength Index (Wilder smoothing)

use super::{ewm_series, finite};
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const OVERSOLD: f64 = 30.0;
pub const OVERBOUGHT: f64 = 70.0;

pub const RSI: &str = "rsi";

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self::new(14)
    }
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

/// RSI series; 100 wherever the average loss is zero
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut gains = vec![0.0; closes.len()];
    let mut losses = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains[i] = change;
        } else {
            losses[i] = -change;
        }
    }

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm_series(&gains, alpha, period);
    let avg_loss = ewm_series(&losses, alpha, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(gain, loss)| {
            if !gain.is_finite() || !loss.is_finite() {
                f64::NAN
            } else if *loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + gain / loss)
            }
        })
        .collect()
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let rsi = rsi_series(&frame.closes(), self.period);
        frame.set_column(RSI, rsi)
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let (Some(rsi), Some(prev_rsi)) = (finite(window.last(RSI)?), finite(window.back(RSI, 2)?))
        else {
            return Ok(IndicatorResult::undefined(self.name()));
        };

        let signal = if rsi <= OVERSOLD {
            Signal::Oversold
        } else if rsi >= OVERBOUGHT {
            Signal::Overbought
        } else if rsi > 50.0 && rsi > prev_rsi {
            Signal::Bullish
        } else if rsi < 50.0 && rsi < prev_rsi {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, rsi).with("prev_rsi", prev_rsi))
    }
}

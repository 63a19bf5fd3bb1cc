//! Stochastic oscillator (%K with a smoothed %D signal line)

use super::{finite, rolling_max, rolling_min, sma_series};
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const STOCH_K: &str = "stochastic";
pub const STOCH_D: &str = "stoch_signal";

#[derive(Debug, Clone)]
pub struct Stochastic {
    period: usize,
    smooth: usize,
}

impl Default for Stochastic {
    fn default() -> Self {
        Self::new(14, 3)
    }
}

impl Stochastic {
    pub fn new(period: usize, smooth: usize) -> Self {
        Self { period, smooth }
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        "stoch_rsi"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let highest = rolling_max(&frame.highs(), self.period);
        let lowest = rolling_min(&frame.lows(), self.period);

        let k: Vec<f64> = frame
            .bars()
            .iter()
            .zip(highest.iter().zip(&lowest))
            .map(|(bar, (hi, lo))| {
                let range = hi - lo;
                if range > 0.0 {
                    100.0 * (bar.close - lo) / range
                } else {
                    f64::NAN
                }
            })
            .collect();
        let d = sma_series(&k, self.smooth);

        frame.set_column(STOCH_K, k)?;
        frame.set_column(STOCH_D, d)
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let inputs = (
            finite(window.last(STOCH_K)?),
            finite(window.last(STOCH_D)?),
            finite(window.back(STOCH_K, 2)?),
            finite(window.back(STOCH_D, 2)?),
        );
        let (Some(k), Some(d), Some(prev_k), Some(prev_d)) = inputs else {
            return Ok(IndicatorResult::undefined(self.name()));
        };

        let signal = if k <= 20.0 || d <= 20.0 {
            Signal::Oversold
        } else if k >= 80.0 || d >= 80.0 {
            Signal::Overbought
        } else if k > d {
            Signal::Bullish
        } else if k < d {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, k)
            .with("signal_line", d)
            .with("prev_k", prev_k)
            .with("prev_d", prev_d))
    }
}

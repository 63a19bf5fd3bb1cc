//! Bollinger Bands
//!
//! Middle band is the SMA of closes, outer bands sit `k` population
//! standard deviations away.

use statrs::statistics::Statistics;

use super::sma_series;
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const UPPER: &str = "bol_high";
pub const LOWER: &str = "bol_low";
pub const MIDDLE: &str = "bol_medium";

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    num_std: f64,
}

impl Default for Bollinger {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

impl Bollinger {
    pub fn new(period: usize, num_std: f64) -> Self {
        Self { period, num_std }
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let closes = frame.closes();
        let middle = sma_series(&closes, self.period);

        let mut upper = vec![f64::NAN; closes.len()];
        let mut lower = vec![f64::NAN; closes.len()];
        for (i, mid) in middle.iter().enumerate() {
            if !mid.is_finite() {
                continue;
            }
            let std = closes[i + 1 - self.period..=i].iter().population_std_dev();
            upper[i] = mid + self.num_std * std;
            lower[i] = mid - self.num_std * std;
        }

        frame.set_column(UPPER, upper)?;
        frame.set_column(LOWER, lower)?;
        frame.set_column(MIDDLE, middle)
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let close = window.last_close();
        let upper = window.last(UPPER)?;
        let lower = window.last(LOWER)?;
        let middle = window.last(MIDDLE)?;

        if ![close, upper, lower, middle].iter().all(|v| v.is_finite()) {
            return Ok(IndicatorResult::undefined(self.name()));
        }

        let volatility_pct = if close != 0.0 {
            (upper - lower) / close * 100.0
        } else {
            0.0
        };

        let signal = if close > upper {
            Signal::Overbought
        } else if close < lower {
            Signal::Oversold
        } else if close > middle {
            Signal::Bullish
        } else {
            Signal::Bearish
        };

        Ok(IndicatorResult::new(self.name(), signal, close)
            .with("upper", upper)
            .with("lower", lower)
            .with("middle", middle)
            .with("volatility_pct", volatility_pct))
    }
}

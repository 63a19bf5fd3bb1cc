//! Exponential moving average stack
//!
//! Trend from the ordering of several EMAs: shortest above longest in
//! strict descending order is bullish, longest above shortest is bearish.

use super::ema_series;
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

#[derive(Debug, Clone)]
pub struct Ema {
    periods: Vec<usize>,
}

impl Default for Ema {
    fn default() -> Self {
        Self::new(vec![5, 10, 20, 50])
    }
}

impl Ema {
    /// Periods are expected shortest first
    pub fn new(periods: Vec<usize>) -> Self {
        Self { periods }
    }

    pub fn column_name(period: usize) -> String {
        format!("ema{}", period)
    }
}

/// Classify a stack of averages ordered shortest period first
pub(crate) fn stack_signal(values: &[f64]) -> Signal {
    match (values.first(), values.last()) {
        (Some(shortest), Some(longest)) => {
            if values.windows(2).all(|pair| pair[0] > pair[1]) {
                Signal::Bullish
            } else if longest > shortest {
                Signal::Bearish
            } else {
                Signal::Neutral
            }
        }
        _ => Signal::Undefined,
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let closes = frame.closes();
        for &period in &self.periods {
            frame.set_column(&Self::column_name(period), ema_series(&closes, period))?;
        }
        Ok(())
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let mut values = Vec::with_capacity(self.periods.len());
        for &period in &self.periods {
            let value = window.last(&Self::column_name(period))?;
            if !value.is_finite() {
                return Ok(IndicatorResult::undefined(self.name()));
            }
            values.push(value);
        }

        let signal = stack_signal(&values);
        let value = values.first().copied().unwrap_or(0.0);
        let result = IndicatorResult::new(self.name(), signal, value);
        Ok(self
            .periods
            .iter()
            .zip(values)
            .fold(result, |r, (period, v)| r.with(&Self::column_name(*period), v)))
    }
}

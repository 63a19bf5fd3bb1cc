//! Support and resistance from the previous `period` closes

use super::{finite, rolling_max, rolling_min};
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const SUPPORT: &str = "support";
pub const RESISTANCE: &str = "resistance";

#[derive(Debug, Clone)]
pub struct SupportResistance {
    period: usize,
}

impl Default for SupportResistance {
    fn default() -> Self {
        Self::new(20)
    }
}

impl SupportResistance {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

/// Shift a series one bar later so bar t only sees levels up to t-1
fn shifted(values: Vec<f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if !values.is_empty() {
        out.push(f64::NAN);
        out.extend_from_slice(&values[..values.len() - 1]);
    }
    out
}

impl Indicator for SupportResistance {
    fn name(&self) -> &str {
        "support_resistance"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let closes = frame.closes();
        frame.set_column(RESISTANCE, shifted(rolling_max(&closes, self.period)))?;
        frame.set_column(SUPPORT, shifted(rolling_min(&closes, self.period)))
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let inputs = (
            finite(window.last_close()),
            finite(window.last(SUPPORT)?),
            finite(window.last(RESISTANCE)?),
        );
        let (Some(price), Some(support), Some(resistance)) = inputs else {
            return Ok(IndicatorResult::undefined(self.name()));
        };

        let signal = if price > resistance {
            Signal::Bullish
        } else if price < support {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, price)
            .with(SUPPORT, support)
            .with(RESISTANCE, resistance))
    }
}

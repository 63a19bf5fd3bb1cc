//! Simple moving averages (golden / death cross)

use super::ema::stack_signal;
use super::sma_series;
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

#[derive(Debug, Clone)]
pub struct Sma {
    periods: Vec<usize>,
}

impl Default for Sma {
    fn default() -> Self {
        Self::new(vec![50, 200])
    }
}

impl Sma {
    pub fn new(periods: Vec<usize>) -> Self {
        Self { periods }
    }

    pub fn column_name(period: usize) -> String {
        format!("sma{}", period)
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let closes = frame.closes();
        for &period in &self.periods {
            frame.set_column(&Self::column_name(period), sma_series(&closes, period))?;
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
        let first = values.first().copied().unwrap_or(0.0);
        let mut result = IndicatorResult::new(self.name(), signal, first);
        for (period, value) in self.periods.iter().zip(values) {
            result = result.with(&Self::column_name(*period), value);
        }
        Ok(result)
    }
}

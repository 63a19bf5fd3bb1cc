//! MACD with crossover detection

use super::{ema_series, finite};
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const MACD: &str = "macd";
pub const MACD_SIGNAL: &str = "macd_signal";
pub const MACD_HISTOGRAM: &str = "macd_histo";

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Default for Macd {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self { fast, slow, signal }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let closes = frame.closes();
        let fast = ema_series(&closes, self.fast);
        let slow = ema_series(&closes, self.slow);

        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_series(&macd, self.signal);
        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

        frame.set_column(MACD, macd)?;
        frame.set_column(MACD_SIGNAL, signal)?;
        frame.set_column(MACD_HISTOGRAM, histogram)
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let inputs = (
            finite(window.last(MACD)?),
            finite(window.last(MACD_SIGNAL)?),
            finite(window.back(MACD, 1)?),
            finite(window.back(MACD_SIGNAL, 1)?),
        );
        let (Some(macd), Some(signal_line), Some(prev_macd), Some(prev_signal)) = inputs else {
            return Ok(IndicatorResult::undefined(self.name()));
        };
        let histogram = macd - signal_line;

        let bullish_cross = prev_macd < prev_signal && macd > signal_line;
        let bearish_cross = prev_macd > prev_signal && macd < signal_line;

        let signal = if macd > 0.0 && (bullish_cross || macd > signal_line) {
            Signal::Bullish
        } else if macd < 0.0 && (bearish_cross || macd < signal_line) {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, macd)
            .with("signal_line", signal_line)
            .with("histogram", histogram)
            .with("bullish_cross", bullish_cross)
            .with("bearish_cross", bearish_cross))
    }
}

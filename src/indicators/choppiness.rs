//! Choppiness Index
//!
//! `100 * log10(sum(TR, n) / (max(high, n) - min(low, n))) / log10(n)`.
//! High values mean a ranging market, low values a trending one.

use super::{rolling_max, rolling_min, rolling_sum};
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const RANGING_THRESHOLD: f64 = 61.8;
pub const TRENDING_THRESHOLD: f64 = 38.2;

pub const CHOP: &str = "chop";

#[derive(Debug, Clone)]
pub struct Choppiness {
    period: usize,
}

impl Default for Choppiness {
    fn default() -> Self {
        Self::new(14)
    }
}

impl Choppiness {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(2),
        }
    }
}

/// "ranging", "trending" or "transitioning"
pub fn chop_state(chop: f64) -> &'static str {
    if chop > RANGING_THRESHOLD {
        "ranging"
    } else if chop < TRENDING_THRESHOLD {
        "trending"
    } else {
        "transitioning"
    }
}

impl Indicator for Choppiness {
    fn name(&self) -> &str {
        "choppiness"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let bars = frame.bars();
        let tr: Vec<f64> = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| bar.true_range(i.checked_sub(1).map(|p| bars[p].close)))
            .collect();

        let tr_sum = rolling_sum(&tr, self.period);
        let high_max = rolling_max(&frame.highs(), self.period);
        let low_min = rolling_min(&frame.lows(), self.period);
        let log_n = (self.period as f64).log10();

        let chop = tr_sum
            .iter()
            .zip(high_max.iter().zip(&low_min))
            .map(|(sum, (hi, lo))| {
                let range = hi - lo;
                if range > 0.0 {
                    100.0 * (sum / range).log10() / log_n
                } else {
                    f64::NAN
                }
            })
            .collect();

        frame.set_column(CHOP, chop)
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let chop = window.last(CHOP)?;
        if !chop.is_finite() {
            return Ok(IndicatorResult::undefined(self.name()));
        }

        let state = chop_state(chop);
        // Trending says nothing about direction; other indicators decide it
        let signal = if state == "trending" {
            Signal::Bullish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, chop).with("state", state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures;

    fn analyze(bars: Vec<crate::ports::Ohlcv>) -> IndicatorResult {
        let chop = Choppiness::default();
        let mut frame = Frame::new(bars);
        chop.compute(&mut frame).unwrap();
        chop.analyze(&frame.full()).unwrap()
    }

    #[test]
    fn test_sideways_is_ranging() {
        let result = analyze(fixtures::sideways(40));
        assert!(result.value > RANGING_THRESHOLD, "chop {}", result.value);
        assert_eq!(result.text("state"), Some("ranging"));
        assert_eq!(result.signal, Signal::Neutral);
    }

    #[test]
    fn test_trend_is_trending() {
        let result = analyze(fixtures::uptrend(40));
        assert!(result.value < TRENDING_THRESHOLD, "chop {}", result.value);
        assert_eq!(result.text("state"), Some("trending"));
    }

    #[test]
    fn test_flat_range_is_undefined() {
        let bars = (0..20)
            .map(|i| crate::ports::Ohlcv::new(fixtures::timestamp(i), 5.0, 5.0, 5.0, 5.0, 1.0))
            .collect();
        assert_eq!(analyze(bars).signal, Signal::Undefined);
    }

    #[test]
    fn test_states() {
        assert_eq!(chop_state(70.0), "ranging");
        assert_eq!(chop_state(50.0), "transitioning");
        assert_eq!(chop_state(30.0), "trending");
    }
}

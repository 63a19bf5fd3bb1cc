//! Fibonacci retracement and extension levels of the window's close range

use std::collections::BTreeMap;

use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const RETRACEMENT_LEVELS: &str = "retracement_levels";
pub const EXTENSION_LEVELS: &str = "extension_levels";

/// Retracement keys and their fraction of the range below the high
const RETRACEMENTS: [(&str, f64); 6] = [
    ("0%", 0.0),
    ("23.6%", 0.236),
    ("38.2%", 0.382),
    ("50%", 0.5),
    ("61.8%", 0.618),
    ("100%", 1.0),
];

#[derive(Debug, Clone, Default)]
pub struct Fibonacci;

impl Fibonacci {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for Fibonacci {
    fn name(&self) -> &str {
        "fibonacci"
    }

    /// Levels depend on the whole window, so nothing is precomputed
    fn compute(&self, _frame: &mut Frame) -> Result<(), IndicatorError> {
        Ok(())
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let current = window.last_close();
        let (low, high) = window
            .closes()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c), hi.max(c)));

        if !(current.is_finite() && low.is_finite() && high.is_finite()) {
            return Ok(IndicatorResult::undefined(self.name()));
        }

        let diff = high - low;
        let retracements: BTreeMap<String, f64> = RETRACEMENTS
            .iter()
            .map(|(key, fraction)| (key.to_string(), high - diff * fraction))
            .collect();
        let extensions: BTreeMap<String, f64> = [
            ("161.8%".to_string(), high + diff * 0.618),
            ("261.8%".to_string(), high + diff * 1.618),
        ]
        .into_iter()
        .collect();

        let mid = high - diff * 0.5;
        let signal = if current > mid {
            Signal::Bullish
        } else if current < mid {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, current)
            .with(RETRACEMENT_LEVELS, retracements)
            .with(EXTENSION_LEVELS, extensions))
    }
}

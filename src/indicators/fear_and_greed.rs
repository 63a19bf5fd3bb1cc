//! Crypto Fear & Greed sentiment
//!
//! The index (0-100) comes from an external feed; the live loop fetches it
//! and registers a fresh `FearAndGreed` each cycle. Without a reading the
//! indicator reports `Signal::Undefined`.

use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

#[derive(Debug, Clone, Default)]
pub struct FearAndGreed {
    index: Option<f64>,
}

impl FearAndGreed {
    pub fn new() -> Self {
        Self { index: None }
    }

    pub fn with_index(index: f64) -> Self {
        Self { index: Some(index) }
    }

    pub fn index(&self) -> Option<f64> {
        self.index
    }
}

/// Fear is a buying opportunity, greed a time to take profits
pub fn classify(index: f64) -> (Signal, &'static str) {
    if index < 20.0 {
        (Signal::Bullish, "extreme_fear")
    } else if index < 40.0 {
        (Signal::Bullish, "fear")
    } else if index < 60.0 {
        (Signal::Neutral, "neutral")
    } else if index < 80.0 {
        (Signal::Bearish, "greed")
    } else {
        (Signal::Bearish, "extreme_greed")
    }
}

impl Indicator for FearAndGreed {
    fn name(&self) -> &str {
        "fear_and_greed"
    }

    fn compute(&self, _frame: &mut Frame) -> Result<(), IndicatorError> {
        Ok(())
    }

    fn analyze(&self, _window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        match self.index.filter(|v| v.is_finite()) {
            Some(index) => {
                let (signal, sentiment) = classify(index);
                Ok(IndicatorResult::new(self.name(), signal, index).with("sentiment", sentiment))
            }
            None => Ok(IndicatorResult::undefined(self.name())),
        }
    }
}

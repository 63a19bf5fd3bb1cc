//! Indicator Collaborators
//!
//! Concrete technical indicators behind the `Indicator` port, plus the
//! `IndicatorEngine` that runs a static registration list of them.
//!
//! Every indicator writes causal columns (NaN during warm-up) and reports
//! `Signal::Undefined` for a window whose inputs are not available yet.

pub mod adi;
pub mod adx;
pub mod bollinger;
pub mod choppiness;
pub mod ema;
pub mod fear_and_greed;
pub mod fibonacci;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod support_resistance;
pub mod volume;

pub use adi::AccumulationDistribution;
pub use adx::Adx;
pub use bollinger::Bollinger;
pub use choppiness::Choppiness;
pub use ema::Ema;
pub use fear_and_greed::FearAndGreed;
pub use fibonacci::Fibonacci;
pub use macd::Macd;
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::Stochastic;
pub use support_resistance::SupportResistance;
pub use volume::Volume;

use crate::domain::IndicatorResult;
use crate::ports::{Frame, Indicator, IndicatorError, Window};

/// Runs a registration list of indicators over a frame
pub struct IndicatorEngine {
    indicators: Vec<Box<dyn Indicator>>,
}

impl Default for IndicatorEngine {
    /// Every built-in indicator, including market sentiment
    fn default() -> Self {
        let mut engine = Self::fast();
        engine.register(Box::new(FearAndGreed::new()));
        engine
    }
}

impl IndicatorEngine {
    pub fn new(indicators: Vec<Box<dyn Indicator>>) -> Self {
        let mut engine = Self {
            indicators: Vec::with_capacity(indicators.len()),
        };
        for indicator in indicators {
            engine.register(indicator);
        }
        engine
    }

    /// Built-in indicators that need no external data
    pub fn fast() -> Self {
        Self::new(vec![
            Box::new(AccumulationDistribution::new()),
            Box::new(Adx::default()),
            Box::new(Bollinger::default()),
            Box::new(Choppiness::default()),
            Box::new(Ema::default()),
            Box::new(Fibonacci::new()),
            Box::new(Macd::default()),
            Box::new(Rsi::default()),
            Box::new(Sma::default()),
            Box::new(Stochastic::default()),
            Box::new(SupportResistance::default()),
            Box::new(Volume::default()),
        ])
    }

    /// Add an indicator; one with the same name is replaced in place
    pub fn register(&mut self, indicator: Box<dyn Indicator>) {
        tracing::debug!("Registered indicator: {}", indicator.name());
        match self
            .indicators
            .iter_mut()
            .find(|existing| existing.name() == indicator.name())
        {
            Some(slot) => *slot = indicator,
            None => self.indicators.push(indicator),
        }
    }

    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Indicator>> {
        let index = self.indicators.iter().position(|i| i.name() == name)?;
        Some(self.indicators.remove(index))
    }

    pub fn names(&self) -> Vec<&str> {
        self.indicators.iter().map(|i| i.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Compute every indicator's columns; failures are logged and skipped
    pub fn compute_all(&self, frame: &mut Frame) {
        for indicator in &self.indicators {
            if let Err(e) = indicator.compute(frame) {
                tracing::error!("Error computing indicator {}: {}", indicator.name(), e);
            }
        }
    }

    /// Analyze the window with every indicator, in registration order.
    /// An indicator that fails contributes nothing.
    pub fn analyze_all(&self, window: &Window<'_>) -> Vec<IndicatorResult> {
        self.indicators
            .iter()
            .filter_map(|indicator| match indicator.analyze(window) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::error!("Error analyzing indicator {}: {}", indicator.name(), e);
                    None
                }
            })
            .collect()
    }

    /// Analyze with a single indicator; `Ok(None)` when it is not registered
    pub fn analyze_by_name(
        &self,
        name: &str,
        window: &Window<'_>,
    ) -> Result<Option<IndicatorResult>, IndicatorError> {
        match self.indicators.iter().find(|i| i.name() == name) {
            Some(indicator) => indicator.analyze(window).map(Some),
            None => Ok(None),
        }
    }
}

/// Index of the first finite value
fn first_finite(values: &[f64]) -> Option<usize> {
    values.iter().position(|v| v.is_finite())
}

/// Simple moving average; NaN until `period` values are available and
/// wherever the window holds a NaN
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Recursive exponential average with smoothing `alpha`, seeded with the
/// first finite input and NaN until `min_periods` inputs have been seen.
pub fn ewm_series(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let Some(start) = first_finite(values) else {
        return out;
    };

    let mut avg = values[start];
    let mut seen = 0usize;
    for i in start..values.len() {
        let v = values[i];
        if v.is_finite() {
            if seen > 0 {
                avg = alpha * v + (1.0 - alpha) * avg;
            }
            seen += 1;
        }
        if seen >= min_periods.max(1) {
            out[i] = avg;
        }
    }
    out
}

/// EMA with span `period` (alpha = 2 / (period + 1))
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    ewm_series(values, 2.0 / (period as f64 + 1.0), period)
}

/// Rolling maximum over `period` values ending at each index
pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Rolling minimum over `period` values ending at each index
pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Rolling sum over `period` values ending at each index
pub fn rolling_sum(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |w| w.iter().sum())
}

fn rolling(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        out[i] = f(&values[i + 1 - period..=i]);
    }
    out
}

/// Reject a NaN reading so the caller can report `Signal::Undefined`
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Deterministic synthetic bar series shared by unit tests

    use chrono::{DateTime, Utc};

    use crate::ports::Ohlcv;

    pub fn timestamp(i: usize) -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000 + i as i64 * 86_400, 0).unwrap()
    }

    /// Bars with a +/-1 high/low envelope around each close
    pub fn bars_from_closes(closes: &[f64]) -> Vec<Ohlcv> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Ohlcv::new(timestamp(i), c, c + 1.0, c - 1.0, c, 1000.0 + (i % 7) as f64 * 100.0))
            .collect()
    }

    pub fn uptrend(n: usize) -> Vec<Ohlcv> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 + 0.2 * (i as f64).sin()).collect();
        bars_from_closes(&closes)
    }

    pub fn downtrend(n: usize) -> Vec<Ohlcv> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + n as f64 - i as f64 + 0.2 * (i as f64).sin())
            .collect();
        bars_from_closes(&closes)
    }

    /// Square-wave oscillation around 150
    pub fn sideways(n: usize) -> Vec<Ohlcv> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 150.0 + 3.0 * (i as f64 * std::f64::consts::FRAC_PI_2).sin())
            .collect();
        bars_from_closes(&closes)
    }
}

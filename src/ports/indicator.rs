//! Indicator port
//!
//! A `Frame` holds a bar series plus named indicator columns of the same
//! length. Indicators write their columns once with `compute`, then read
//! any prefix of the frame through a `Window` with `analyze`.
//!
//! Columns are causal: the value at bar t depends only on bars `0..=t`,
//! so analyzing `frame.window(t + 1)` sees exactly what a live run at
//! bar t would have seen.

use std::collections::BTreeMap;
use thiserror::Error;

use super::market_data::Ohlcv;
use crate::domain::IndicatorResult;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("Insufficient data for {indicator}: need {required} bars, have {available}")]
    InsufficientData {
        indicator: String,
        required: usize,
        available: usize,
    },

    #[error("Missing column '{0}' (indicator not computed)")]
    MissingColumn(String),

    #[error("Column '{name}' has {actual} values, frame has {expected} bars")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Indicator failed: {0}")]
    Failed(String),
}

/// Bars plus computed indicator columns
#[derive(Debug, Clone, Default)]
pub struct Frame {
    bars: Vec<Ohlcv>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl Frame {
    pub fn new(bars: Vec<Ohlcv>) -> Self {
        Self {
            bars,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Ohlcv] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Insert or replace a column; it must span every bar
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), IndicatorError> {
        if values.len() != self.bars.len() {
            return Err(IndicatorError::LengthMismatch {
                name: name.to_string(),
                expected: self.bars.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    /// View of the first `len` bars (clamped to the frame length)
    pub fn window(&self, len: usize) -> Window<'_> {
        Window {
            frame: self,
            len: len.min(self.bars.len()),
        }
    }

    /// View of every bar
    pub fn full(&self) -> Window<'_> {
        self.window(self.bars.len())
    }
}

/// Read-only prefix view of a frame
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    frame: &'a Frame,
    len: usize,
}

impl<'a> Window<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bars(&self) -> &'a [Ohlcv] {
        &self.frame.bars[..self.len]
    }

    pub fn last_bar(&self) -> Option<&'a Ohlcv> {
        self.bars().last()
    }

    /// Close of the latest bar, NaN on an empty window
    pub fn last_close(&self) -> f64 {
        self.last_bar().map(|b| b.close).unwrap_or(f64::NAN)
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + 'a {
        self.bars().iter().map(|b| b.close)
    }

    /// Prefix of a computed column
    pub fn column(&self, name: &str) -> Result<&'a [f64], IndicatorError> {
        self.frame
            .columns
            .get(name)
            .map(|v| &v[..self.len])
            .ok_or_else(|| IndicatorError::MissingColumn(name.to_string()))
    }

    /// Latest value of a column (may be NaN during warm-up)
    pub fn last(&self, name: &str) -> Result<f64, IndicatorError> {
        Ok(self.column(name)?.last().copied().unwrap_or(f64::NAN))
    }

    /// Value `back` bars before the latest one; NaN when out of range
    pub fn back(&self, name: &str, back: usize) -> Result<f64, IndicatorError> {
        let column = self.column(name)?;
        Ok(column
            .len()
            .checked_sub(back + 1)
            .map(|i| column[i])
            .unwrap_or(f64::NAN))
    }
}

/// A technical indicator collaborator.
///
/// `compute` must be idempotent and causal. `analyze` reports
/// `Signal::Undefined` when its inputs are NaN rather than failing.
pub trait Indicator: Send + Sync {
    /// Stable name used for registration and lookup (e.g. "rsi")
    fn name(&self) -> &str;

    /// Write this indicator's columns into the frame
    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError>;

    /// Classify the latest bar of the window
    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError>;
}

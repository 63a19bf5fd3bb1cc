use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classification an indicator (or the aggregated market) emits for one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
    Overbought,
    Oversold,
    /// Missing or NaN inputs - excluded from scoring
    Undefined,
}

impl Signal {
    /// Bullish and oversold both count as a vote for higher prices
    pub fn is_bullish(&self) -> bool {
        matches!(self, Signal::Bullish | Signal::Oversold)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, Signal::Bearish | Signal::Overbought)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Bullish => "bullish",
            Signal::Bearish => "bearish",
            Signal::Neutral => "neutral",
            Signal::Overbought => "overbought",
            Signal::Oversold => "oversold",
            Signal::Undefined => "undefined",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metadata entry attached to an indicator reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    Flag(bool),
    Text(String),
    /// Named price levels, e.g. Fibonacci retracements keyed by "38.2%"
    Levels(BTreeMap<String, f64>),
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Flag(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<BTreeMap<String, f64>> for MetadataValue {
    fn from(value: BTreeMap<String, f64>) -> Self {
        MetadataValue::Levels(value)
    }
}

/// Output of one indicator collaborator for the latest bar of a window.
///
/// Produced fresh every cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub name: String,
    pub signal: Signal,
    pub value: f64,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl IndicatorResult {
    pub fn new(name: impl Into<String>, signal: Signal, value: f64) -> Self {
        Self {
            name: name.into(),
            signal,
            value,
            metadata: BTreeMap::new(),
        }
    }

    /// Result for an indicator that could not classify the window
    pub fn undefined(name: impl Into<String>) -> Self {
        Self::new(name, Signal::Undefined, 0.0)
    }

    /// Builder-style metadata insertion
    pub fn with(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_bullish(&self) -> bool {
        self.signal.is_bullish()
    }

    pub fn is_bearish(&self) -> bool {
        self.signal.is_bearish()
    }

    /// Numeric metadata entry; NaN is reported as missing
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Number(v)) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.metadata.get(key) {
            Some(MetadataValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn levels(&self, key: &str) -> Option<&BTreeMap<String, f64>> {
        match self.metadata.get(key) {
            Some(MetadataValue::Levels(levels)) => Some(levels),
            _ => None,
        }
    }
}

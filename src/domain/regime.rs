use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::signal::{IndicatorResult, Signal};

/// Market regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    /// Strong uptrend (ADX > 25, +DI > -DI, bullish EMA stack)
    Bull,
    /// Strong downtrend (ADX > 25, -DI > +DI, bearish EMA stack)
    Bear,
    /// Sideways market (low ADX, high choppiness)
    Range,
    /// Insufficient data or transitioning
    Unknown,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 4] = [
        MarketRegime::Bull,
        MarketRegime::Bear,
        MarketRegime::Range,
        MarketRegime::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "bull",
            MarketRegime::Bear => "bear",
            MarketRegime::Range => "range",
            MarketRegime::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trading timeframes, from slowest to fastest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrame {
    Monthly,
    Weekly,
    Daily,
    /// 1h candles
    Intraday,
    /// 15m candles
    Scalping,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Monthly => "monthly",
            TimeFrame::Weekly => "weekly",
            TimeFrame::Daily => "daily",
            TimeFrame::Intraday => "intraday",
            TimeFrame::Scalping => "scalping",
        }
    }

    /// Vote weight in multi-timeframe regime detection (higher timeframes dominate)
    pub fn regime_weight(&self) -> f64 {
        match self {
            TimeFrame::Monthly => 3.0,
            TimeFrame::Weekly => 2.5,
            TimeFrame::Daily => 2.0,
            TimeFrame::Intraday => 1.0,
            TimeFrame::Scalping => 0.5,
        }
    }

    /// Kline interval understood by Binance
    pub fn binance_interval(&self) -> &'static str {
        match self {
            TimeFrame::Monthly => "1M",
            TimeFrame::Weekly => "1w",
            TimeFrame::Daily => "1d",
            TimeFrame::Intraday => "1h",
            TimeFrame::Scalping => "15m",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monthly" => Ok(TimeFrame::Monthly),
            "weekly" => Ok(TimeFrame::Weekly),
            "daily" => Ok(TimeFrame::Daily),
            "intraday" => Ok(TimeFrame::Intraday),
            "scalping" => Ok(TimeFrame::Scalping),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

/// Aggregated view of one evaluation cycle.
///
/// Built once per cycle by the decision engine and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketContext {
    pub regime: MarketRegime,
    /// Always within [0, 1]
    pub regime_confidence: f64,
    /// Bullish votes minus bearish votes of the scoring indicators
    pub trend_score: i32,
    pub signal: Signal,
    pub indicators: Vec<IndicatorResult>,
    pub timestamp: DateTime<Utc>,
}

impl MarketContext {
    /// First indicator reading with the given name
    pub fn indicator(&self, name: &str) -> Option<&IndicatorResult> {
        self.indicators.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_weights() {
        assert_eq!(TimeFrame::Monthly.regime_weight(), 3.0);
        assert_eq!(TimeFrame::Weekly.regime_weight(), 2.5);
        assert_eq!(TimeFrame::Daily.regime_weight(), 2.0);
        assert_eq!(TimeFrame::Intraday.regime_weight(), 1.0);
        assert_eq!(TimeFrame::Scalping.regime_weight(), 0.5);
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("Daily".parse::<TimeFrame>(), Ok(TimeFrame::Daily));
        assert_eq!("scalping".parse::<TimeFrame>(), Ok(TimeFrame::Scalping));
        assert!("hourly".parse::<TimeFrame>().is_err());
    }

    #[test]
    fn test_binance_intervals() {
        assert_eq!(TimeFrame::Monthly.binance_interval(), "1M");
        assert_eq!(TimeFrame::Scalping.binance_interval(), "15m");
    }

    #[test]
    fn test_context_indicator_lookup() {
        let context = MarketContext {
            regime: MarketRegime::Range,
            regime_confidence: 0.7,
            trend_score: 0,
            signal: Signal::Neutral,
            indicators: vec![
                IndicatorResult::new("rsi", Signal::Oversold, 25.0),
                IndicatorResult::new("bollinger", Signal::Bearish, 99.0),
            ],
            timestamp: Utc::now(),
        };

        assert_eq!(context.indicator("bollinger").unwrap().value, 99.0);
        assert!(context.indicator("macd").is_none());
    }
}

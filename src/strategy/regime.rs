//! Market Regime Detection
//!
//! Top-down classification of the market into BULL / BEAR / RANGE / UNKNOWN:
//! 1. ADX for trend strength
//! 2. +DI / -DI for trend direction
//! 3. Choppiness for ranging detection
//! 4. EMA alignment for confirmation
//!
//! Multi-timeframe detection is a weighted vote where higher timeframes
//! dominate.

use std::collections::BTreeMap;

use crate::domain::{IndicatorResult, MarketRegime, Signal, TimeFrame};
use crate::indicators::adx::{STRONG_TREND, WEAK_TREND};
use crate::indicators::choppiness::RANGING_THRESHOLD;
use crate::indicators::{finite, Adx, Choppiness, Ema};
use crate::ports::{Frame, Indicator, IndicatorError, Ohlcv, Window};

/// ADX at which a strong trend reaches full confidence
const FULL_CONFIDENCE_ADX: f64 = 50.0;
/// Confidence ceiling for a moderate trend
const MODERATE_TREND_CAP: f64 = 0.6;
/// Confidence of a range read from the choppiness state alone
const CHOPPY_RANGE_CONFIDENCE: f64 = 0.4;

/// Classifies the market regime from trend strength, choppiness and EMA alignment
#[derive(Debug, Clone, Default)]
pub struct MarketRegimeDetector {
    adx: Adx,
    chop: Choppiness,
    ema: Ema,
}

/// Inputs of one classification
struct Readings {
    adx: f64,
    strong: bool,
    plus_di: f64,
    minus_di: f64,
    chop: f64,
    ranging: bool,
    ema: Signal,
}

impl MarketRegimeDetector {
    pub fn new(adx: Adx, chop: Choppiness, ema: Ema) -> Self {
        Self { adx, chop, ema }
    }

    /// Compute the detector's indicator columns once for the whole frame
    pub fn prepare(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        self.adx.compute(frame)?;
        self.chop.compute(frame)?;
        self.ema.compute(frame)
    }

    /// Regime and confidence for the latest bar of the window.
    ///
    /// Missing or NaN inputs yield `(Unknown, 0.0)`.
    pub fn detect(&self, window: &Window<'_>) -> (MarketRegime, f64) {
        match self.readings(window) {
            Ok(Some(readings)) => classify(&readings),
            Ok(None) => (MarketRegime::Unknown, 0.0),
            Err(e) => {
                tracing::debug!("Regime inputs unavailable: {}", e);
                (MarketRegime::Unknown, 0.0)
            }
        }
    }

    /// Prepare and classify a standalone bar series
    pub fn detect_bars(&self, bars: &[Ohlcv]) -> (MarketRegime, f64) {
        let mut frame = Frame::new(bars.to_vec());
        if let Err(e) = self.prepare(&mut frame) {
            tracing::warn!("Regime indicators failed: {}", e);
            return (MarketRegime::Unknown, 0.0);
        }
        self.detect(&frame.full())
    }

    /// Weighted vote across timeframes.
    ///
    /// Each timeframe adds `weight * confidence` to its regime; scores are
    /// normalised by the total weight and the highest one wins.
    pub fn detect_multi_timeframe(&self, bars_by_timeframe: &BTreeMap<TimeFrame, Vec<Ohlcv>>) -> (MarketRegime, f64) {
        let mut scores: BTreeMap<MarketRegime, f64> = MarketRegime::ALL.iter().map(|r| (*r, 0.0)).collect();
        let mut total_weight = 0.0;

        for (timeframe, bars) in bars_by_timeframe {
            let weight = timeframe.regime_weight();
            let (regime, confidence) = self.detect_bars(bars);
            tracing::debug!("{} regime: {} ({:.2})", timeframe, regime, confidence);
            *scores.entry(regime).or_insert(0.0) += weight * confidence;
            total_weight += weight;
        }

        if total_weight <= 0.0 {
            return (MarketRegime::Unknown, 0.0);
        }

        // First regime in declaration order wins a tie
        let mut best = (MarketRegime::Unknown, f64::NEG_INFINITY);
        for regime in MarketRegime::ALL {
            let score = scores.get(&regime).copied().unwrap_or(0.0) / total_weight;
            if score > best.1 {
                best = (regime, score);
            }
        }

        // No timeframe voted with any confidence
        if !(best.1 > 0.0) {
            tracing::info!("Multi-TF regime detection: no confident timeframe");
            return (MarketRegime::Unknown, 0.0);
        }

        tracing::info!(
            "Multi-TF regime detection: {} (confidence={:.2}) over {} timeframes",
            best.0,
            best.1,
            bars_by_timeframe.len()
        );
        (best.0, best.1.clamp(0.0, 1.0))
    }

    fn readings(&self, window: &Window<'_>) -> Result<Option<Readings>, IndicatorError> {
        let adx = self.adx.analyze(window)?;
        let chop = self.chop.analyze(window)?;
        let ema = self.ema.analyze(window)?;

        if [adx.signal, chop.signal, ema.signal].contains(&Signal::Undefined) {
            return Ok(None);
        }

        let numbers = (
            finite(adx.value),
            number(&adx, "plus_di"),
            number(&adx, "minus_di"),
            finite(chop.value),
        );
        let (Some(adx_value), Some(plus_di), Some(minus_di), Some(chop_value)) = numbers else {
            return Ok(None);
        };

        Ok(Some(Readings {
            adx: adx_value,
            strong: adx.text("strength") == Some("strong"),
            plus_di,
            minus_di,
            chop: chop_value,
            ranging: chop.text("state") == Some("ranging"),
            ema: ema.signal,
        }))
    }
}

fn number(result: &IndicatorResult, key: &str) -> Option<f64> {
    result.number(key).and_then(finite)
}

fn classify(r: &Readings) -> (MarketRegime, f64) {
    // Strong trend confirmed by the EMA stack
    if r.adx > STRONG_TREND && r.strong {
        let confidence = (r.adx / FULL_CONFIDENCE_ADX).min(1.0);
        if r.plus_di > r.minus_di && r.ema == Signal::Bullish {
            return (MarketRegime::Bull, confidence);
        }
        if r.minus_di > r.plus_di && r.ema == Signal::Bearish {
            return (MarketRegime::Bear, confidence);
        }
    }

    if r.adx < WEAK_TREND && r.chop > RANGING_THRESHOLD {
        return (MarketRegime::Range, (r.chop / 100.0).min(1.0));
    }

    // Moderate trend: direction from the dominant DI
    if r.adx > WEAK_TREND {
        let confidence = ((r.adx - WEAK_TREND) / 30.0).clamp(0.0, MODERATE_TREND_CAP);
        let regime = if r.plus_di > r.minus_di {
            MarketRegime::Bull
        } else {
            MarketRegime::Bear
        };
        return (regime, confidence);
    }

    if r.ranging {
        return (MarketRegime::Range, CHOPPY_RANGE_CONFIDENCE);
    }

    (MarketRegime::Unknown, 0.0)
}

//! ADX (Average Directional Index)
//!
//! Wilder's trend-strength indicator. ADX measures how strongly the market
//! trends (0-100) without direction; +DI / -DI give the direction.
//!
//! - ADX > 25: strong trend (direction from the larger DI)
//! - ADX < 20: weak or no trend
//! - otherwise: moderate trend

use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Ohlcv, Window};

pub const STRONG_TREND: f64 = 25.0;
pub const WEAK_TREND: f64 = 20.0;

/// Column names written by `Adx::compute`
pub const ADX: &str = "adx";
pub const PLUS_DI: &str = "adx_pos";
pub const MINUS_DI: &str = "adx_neg";

/// Trend strength qualifier carried in the result metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendStrength {
    Weak,
    Moderate,
    Strong,
}

impl TrendStrength {
    pub fn from_adx(adx: f64) -> Self {
        if adx > STRONG_TREND {
            Self::Strong
        } else if adx < WEAK_TREND {
            Self::Weak
        } else {
            Self::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
}

impl Default for Adx {
    fn default() -> Self {
        Self::new(14)
    }
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }

    /// Bars needed before ADX is valid
    pub fn warmup_periods(&self) -> usize {
        2 * self.period - 1
    }
}

/// Incremental Wilder smoothing state
#[derive(Debug)]
struct WilderState {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    bars_processed: usize,
    tr_sum: f64,
    plus_dm_sum: f64,
    minus_dm_sum: f64,
    smoothed_tr: f64,
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,
    dx_sum: f64,
    adx: f64,
}

/// Per-bar output; fields are NaN until their warm-up completes
struct AdxPoint {
    plus_di: f64,
    minus_di: f64,
    adx: f64,
}

impl WilderState {
    fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            bars_processed: 0,
            tr_sum: 0.0,
            plus_dm_sum: 0.0,
            minus_dm_sum: 0.0,
            smoothed_tr: 0.0,
            smoothed_plus_dm: 0.0,
            smoothed_minus_dm: 0.0,
            dx_sum: 0.0,
            adx: 0.0,
        }
    }

    fn update(&mut self, bar: &Ohlcv) -> AdxPoint {
        let n = self.period as f64;
        let tr = bar.true_range(self.prev.map(|(_, _, close)| close));
        let (plus_dm, minus_dm) = match self.prev {
            Some((prev_high, prev_low, _)) => {
                let up_move = bar.high - prev_high;
                let down_move = prev_low - bar.low;
                if up_move > down_move && up_move > 0.0 {
                    (up_move, 0.0)
                } else if down_move > up_move && down_move > 0.0 {
                    (0.0, down_move)
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };
        self.prev = Some((bar.high, bar.low, bar.close));
        self.bars_processed += 1;

        let undefined = AdxPoint {
            plus_di: f64::NAN,
            minus_di: f64::NAN,
            adx: f64::NAN,
        };

        // Phase 1: accumulate the first smoothed sums
        if self.bars_processed < self.period {
            self.tr_sum += tr;
            self.plus_dm_sum += plus_dm;
            self.minus_dm_sum += minus_dm;
            return undefined;
        }

        if self.bars_processed == self.period {
            self.smoothed_tr = self.tr_sum + tr;
            self.smoothed_plus_dm = self.plus_dm_sum + plus_dm;
            self.smoothed_minus_dm = self.minus_dm_sum + minus_dm;
        } else {
            // Phase 2: Smoothed = Previous - (Previous / n) + Current
            self.smoothed_tr = self.smoothed_tr - self.smoothed_tr / n + tr;
            self.smoothed_plus_dm = self.smoothed_plus_dm - self.smoothed_plus_dm / n + plus_dm;
            self.smoothed_minus_dm = self.smoothed_minus_dm - self.smoothed_minus_dm / n + minus_dm;
        }

        let (plus_di, minus_di) = if self.smoothed_tr > 0.0 {
            (
                self.smoothed_plus_dm / self.smoothed_tr * 100.0,
                self.smoothed_minus_dm / self.smoothed_tr * 100.0,
            )
        } else {
            (0.0, 0.0)
        };
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            (plus_di - minus_di).abs() / di_sum * 100.0
        } else {
            0.0
        };

        let first_adx_bar = 2 * self.period - 1;
        let adx = if self.bars_processed < first_adx_bar {
            self.dx_sum += dx;
            f64::NAN
        } else if self.bars_processed == first_adx_bar {
            // Phase 3: first ADX is the mean of n DX values
            self.adx = (self.dx_sum + dx) / n;
            self.adx
        } else {
            // ADX = (Previous_ADX * (n-1) + Current_DX) / n
            self.adx = (self.adx * (n - 1.0) + dx) / n;
            self.adx
        };

        AdxPoint {
            plus_di,
            minus_di,
            adx,
        }
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        "adx"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let mut state = WilderState::new(self.period);
        let len = frame.len();
        let (mut adx, mut plus, mut minus) =
            (Vec::with_capacity(len), Vec::with_capacity(len), Vec::with_capacity(len));

        for bar in frame.bars() {
            let point = state.update(bar);
            adx.push(point.adx);
            plus.push(point.plus_di);
            minus.push(point.minus_di);
        }

        frame.set_column(ADX, adx)?;
        frame.set_column(PLUS_DI, plus)?;
        frame.set_column(MINUS_DI, minus)
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let adx = window.last(ADX)?;
        let plus_di = window.last(PLUS_DI)?;
        let minus_di = window.last(MINUS_DI)?;

        if !(adx.is_finite() && plus_di.is_finite() && minus_di.is_finite()) {
            return Ok(IndicatorResult::undefined(self.name()));
        }

        let strength = TrendStrength::from_adx(adx);
        let signal = match strength {
            TrendStrength::Weak => Signal::Neutral,
            _ if plus_di > minus_di => Signal::Bullish,
            _ => Signal::Bearish,
        };

        Ok(IndicatorResult::new(self.name(), signal, adx)
            .with("plus_di", plus_di)
            .with("minus_di", minus_di)
            .with("strength", strength.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures;

    fn analyze(bars: Vec<Ohlcv>) -> IndicatorResult {
        let adx = Adx::default();
        let mut frame = Frame::new(bars);
        adx.compute(&mut frame).unwrap();
        adx.analyze(&frame.full()).unwrap()
    }

    #[test]
    fn test_warmup_is_nan() {
        let adx = Adx::default();
        let mut frame = Frame::new(fixtures::uptrend(40));
        adx.compute(&mut frame).unwrap();

        let column = frame.column(ADX).unwrap();
        assert!(column[..adx.warmup_periods() - 1].iter().all(|v| v.is_nan()));
        assert!(column[adx.warmup_periods() - 1].is_finite());
        // DI lines become valid after one period
        assert!(frame.column(PLUS_DI).unwrap()[12].is_nan());
        assert!(frame.column(PLUS_DI).unwrap()[13].is_finite());
    }

    #[test]
    fn test_uptrend_is_strong_bullish() {
        let result = analyze(fixtures::uptrend(80));
        assert_eq!(result.signal, Signal::Bullish);
        assert!(result.value > 25.0);
        assert_eq!(result.text("strength"), Some("strong"));
        assert!(result.number("plus_di").unwrap() > result.number("minus_di").unwrap());
    }

    #[test]
    fn test_downtrend_is_strong_bearish() {
        let result = analyze(fixtures::downtrend(80));
        assert_eq!(result.signal, Signal::Bearish);
        assert_eq!(result.text("strength"), Some("strong"));
    }

    #[test]
    fn test_sideways_is_weak() {
        let result = analyze(fixtures::sideways(80));
        assert!(result.value < 20.0, "adx {}", result.value);
        assert_eq!(result.signal, Signal::Neutral);
        assert_eq!(result.text("strength"), Some("weak"));
    }

    #[test]
    fn test_short_series_undefined() {
        let result = analyze(fixtures::uptrend(10));
        assert_eq!(result.signal, Signal::Undefined);
    }

    #[test]
    fn test_causal_prefix() {
        let adx = Adx::default();
        let bars = fixtures::uptrend(60);

        let mut full = Frame::new(bars.clone());
        adx.compute(&mut full).unwrap();
        let mut prefix = Frame::new(bars[..45].to_vec());
        adx.compute(&mut prefix).unwrap();

        let a = full.window(45).last(ADX).unwrap();
        let b = prefix.full().last(ADX).unwrap();
        assert_eq!(a, b);
    }
}

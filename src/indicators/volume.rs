//! Volume against its moving averages, with whale-activity detection

use super::sma_series;
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const VOLUME_SHORT_MA: &str = "volume_short_ma";
pub const VOLUME_LONG_MA: &str = "volume_long_ma";

/// Volume above this multiple of the long average counts as a whale
const WHALE_MULTIPLE: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct Volume {
    short: usize,
    long: usize,
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(5, 14)
    }
}

impl Volume {
    pub fn new(short: usize, long: usize) -> Self {
        Self { short, long }
    }
}

impl Indicator for Volume {
    fn name(&self) -> &str {
        "volume"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let volumes = frame.volumes();
        frame.set_column(VOLUME_SHORT_MA, sma_series(&volumes, self.short))?;
        frame.set_column(VOLUME_LONG_MA, sma_series(&volumes, self.long))
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let long_ma = window.last(VOLUME_LONG_MA)?;
        let bars = window.bars();
        let (Some(current), Some(previous)) = (bars.last(), bars.len().checked_sub(2).map(|i| &bars[i]))
        else {
            return Ok(IndicatorResult::undefined(self.name()));
        };
        if !long_ma.is_finite() {
            return Ok(IndicatorResult::undefined(self.name()));
        }

        let volume = current.volume;
        let signal = if volume > long_ma {
            Signal::Bullish
        } else if volume < long_ma {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, volume)
            .with("long_ma", long_ma)
            .with("volume_change", volume - previous.volume)
            .with("whale_activity", volume > WHALE_MULTIPLE * long_ma))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures;
    use crate::ports::Ohlcv;

    fn bars_with_volumes(volumes: &[f64]) -> Vec<Ohlcv> {
        volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| Ohlcv::new(fixtures::timestamp(i), 100.0, 101.0, 99.0, 100.0, v))
            .collect()
    }

    fn analyze(volumes: &[f64]) -> IndicatorResult {
        let indicator = Volume::default();
        let mut frame = Frame::new(bars_with_volumes(volumes));
        indicator.compute(&mut frame).unwrap();
        indicator.analyze(&frame.full()).unwrap()
    }

    #[test]
    fn test_whale_spike() {
        let mut volumes = vec![100.0; 20];
        volumes.push(1000.0);
        let result = analyze(&volumes);
        assert_eq!(result.signal, Signal::Bullish);
        assert_eq!(result.flag("whale_activity"), Some(true));
        assert_eq!(result.number("volume_change"), Some(900.0));
    }

    #[test]
    fn test_quiet_bar_bearish() {
        let mut volumes = vec![100.0; 20];
        volumes.push(50.0);
        let result = analyze(&volumes);
        assert_eq!(result.signal, Signal::Bearish);
        assert_eq!(result.flag("whale_activity"), Some(false));
    }

    #[test]
    fn test_short_history_undefined() {
        assert_eq!(analyze(&[100.0; 5]).signal, Signal::Undefined);
    }
}

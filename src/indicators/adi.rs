//! Accumulation / Distribution Index

use super::finite;
use crate::domain::{IndicatorResult, Signal};
use crate::ports::{Frame, Indicator, IndicatorError, Window};

pub const ADI: &str = "adi";

#[derive(Debug, Clone, Default)]
pub struct AccumulationDistribution;

impl AccumulationDistribution {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for AccumulationDistribution {
    fn name(&self) -> &str {
        "adi"
    }

    fn compute(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let mut total = 0.0;
        let adi = frame
            .bars()
            .iter()
            .map(|bar| {
                let range = bar.high - bar.low;
                // Close location value; a zero-range bar moves nothing
                let clv = if range > 0.0 {
                    ((bar.close - bar.low) - (bar.high - bar.close)) / range
                } else {
                    0.0
                };
                total += clv * bar.volume;
                total
            })
            .collect();

        frame.set_column(ADI, adi)
    }

    fn analyze(&self, window: &Window<'_>) -> Result<IndicatorResult, IndicatorError> {
        let (Some(adi), Some(prev_adi)) = (finite(window.last(ADI)?), finite(window.back(ADI, 1)?))
        else {
            return Ok(IndicatorResult::undefined(self.name()));
        };

        let diff = adi - prev_adi;
        let strength = if diff.abs() >= 0.1 { "strong" } else { "weak" };
        let signal = if diff > 0.0 {
            Signal::Bullish
        } else if diff < 0.0 {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        Ok(IndicatorResult::new(self.name(), signal, adi)
            .with("prev_adi", prev_adi)
            .with("strength", strength))
    }
}

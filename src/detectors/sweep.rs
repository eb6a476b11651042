//! Liquidity sweep detector
//!
//! A sweep is a failed breakout: the latest candle wicks through the extreme
//! of the preceding `lookback` candles and then closes back against the move.

use std::collections::HashMap;

use super::helpers::{highest_high, lowest_low, trailing_window};
use crate::params::{get_period, ParamMeta, Parameterized};
use crate::{OHLCVExt, Period, Result, StructureDetector, StructureEvent, OHLCV};

impl_with_defaults!(LiquiditySweepDetector);

static SWEEP_PARAMS: &[ParamMeta] = &[ParamMeta::period(
    "lookback",
    5.0,
    (1.0, 50.0, 1.0),
    "Candles before the latest whose extremes define the swept liquidity",
)];

/// SWEEP_HIGH / SWEEP_LOW on the latest candle
#[derive(Debug, Clone, Copy)]
pub struct LiquiditySweepDetector {
    pub lookback: Period,
}

impl Default for LiquiditySweepDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(5),
        }
    }
}

impl LiquiditySweepDetector {
    pub fn new(lookback: Period) -> Self {
        Self { lookback }
    }
}

impl StructureDetector for LiquiditySweepDetector {
    fn min_bars(&self) -> usize {
        self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> StructureEvent {
        if bars.len() < self.min_bars() {
            return StructureEvent::None;
        }
        let index = bars.len() - 1;
        let last = &bars[index];
        let Some(window) = trailing_window(bars, self.lookback.get(), 1) else {
            return StructureEvent::None;
        };
        let (Some(prior_high), Some(prior_low)) = (highest_high(window), lowest_low(window)) else {
            return StructureEvent::None;
        };

        if last.high() > prior_high && last.is_bearish() {
            StructureEvent::SweepHigh(index)
        } else if last.low() < prior_low && last.is_bullish() {
            StructureEvent::SweepLow(index)
        } else {
            StructureEvent::None
        }
    }
}

impl Parameterized for LiquiditySweepDetector {
    fn param_meta() -> &'static [ParamMeta] {
        SWEEP_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, SWEEP_PARAMS, "lookback", 5)?,
        })
    }

    fn component_id() -> &'static str {
        "LIQUIDITY_SWEEP"
    }
}

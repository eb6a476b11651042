//! Break-of-structure detector

use std::collections::HashMap;

use super::helpers::{highest_high, lowest_low, trailing_window};
use crate::params::{get_period, ParamMeta, Parameterized};
use crate::{Period, Result, StructureDetector, StructureEvent, OHLCV};

impl_with_defaults!(StructureBreakDetector);

static BOS_PARAMS: &[ParamMeta] = &[ParamMeta::period(
    "lookback",
    10.0,
    (1.0, 100.0, 1.0),
    "Candles before the latest whose extremes define the swing range",
)];

/// BOS_UP / BOS_DOWN when the latest close clears the swing range.
///
/// The swing range is the high/low of the `lookback` candles before the
/// latest. At least `lookback + 2` candles are required.
#[derive(Debug, Clone, Copy)]
pub struct StructureBreakDetector {
    pub lookback: Period,
}

impl Default for StructureBreakDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(10),
        }
    }
}

impl StructureBreakDetector {
    pub fn new(lookback: Period) -> Self {
        Self { lookback }
    }
}

impl StructureDetector for StructureBreakDetector {
    fn min_bars(&self) -> usize {
        self.lookback.get() + 2
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> StructureEvent {
        if bars.len() < self.min_bars() {
            return StructureEvent::None;
        }
        let index = bars.len() - 1;
        let close = bars[index].close();
        let Some(window) = trailing_window(bars, self.lookback.get(), 1) else {
            return StructureEvent::None;
        };
        let (Some(swing_high), Some(swing_low)) = (highest_high(window), lowest_low(window)) else {
            return StructureEvent::None;
        };

        if close > swing_high {
            StructureEvent::BosUp(index)
        } else if close < swing_low {
            StructureEvent::BosDown(index)
        } else {
            StructureEvent::None
        }
    }
}

impl Parameterized for StructureBreakDetector {
    fn param_meta() -> &'static [ParamMeta] {
        BOS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, BOS_PARAMS, "lookback", 10)?,
        })
    }

    fn component_id() -> &'static str {
        "BREAK_OF_STRUCTURE"
    }
}

//! Higher-timeframe bias classifier

use std::collections::HashMap;

use super::helpers::{mean_close, trailing_window};
use crate::params::{get_period, ParamMeta, Parameterized};
use crate::{Bias, Period, Result, OHLCV};

impl_with_defaults!(BiasClassifier);

static BIAS_PARAMS: &[ParamMeta] = &[ParamMeta::period(
    "window",
    20.0,
    (2.0, 200.0, 1.0),
    "Number of trailing closes averaged for the bias mean",
)];

/// Labels a series BULLISH when the latest close is above the mean close of
/// the trailing `window` candles, BEARISH otherwise.
#[derive(Debug, Clone, Copy)]
pub struct BiasClassifier {
    pub window: Period,
}

impl Default for BiasClassifier {
    fn default() -> Self {
        Self {
            window: Period::new_const(20),
        }
    }
}

impl BiasClassifier {
    pub fn new(window: Period) -> Self {
        Self { window }
    }

    /// Minimum series length for a known bias
    #[inline]
    pub fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    pub fn classify<T: OHLCV>(&self, bars: &[T]) -> Bias {
        if bars.len() < self.min_bars() {
            return Bias::Unknown;
        }
        let (Some(window), Some(last)) = (trailing_window(bars, self.window.get(), 0), bars.last())
        else {
            return Bias::Unknown;
        };
        let Some(mean) = mean_close(window) else {
            return Bias::Unknown;
        };

        if last.close() > mean {
            Bias::Bullish
        } else {
            Bias::Bearish
        }
    }
}

impl Parameterized for BiasClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        BIAS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            window: get_period(params, BIAS_PARAMS, "window", 20)?,
        })
    }

    fn component_id() -> &'static str {
        "BIAS"
    }
}

//! Trade signals and the synthesizer that prices them

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detectors::helpers::{highest_high, lowest_low, trailing_window};
use crate::params::{get_multiple, get_period, ParamMeta, Parameterized};
use crate::{Bias, EngineError, OrderBlock, OrderBlockKind, Period, Result, StructureEvent, OHLCV};

// ============================================================
// SIGNAL
// ============================================================

/// Trade direction of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// +1 for long, -1 for short
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory trade idea with entry, three targets and a stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Side,
    pub bias: Bias,
    pub entry: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub sl: f64,
    /// Structure events behind the signal, in detection order
    pub confluences: Vec<StructureEvent>,
    /// Engine clock reading when the signal was produced
    pub produced_at: Duration,
}

impl Signal {
    pub fn targets(&self) -> [f64; 3] {
        [self.tp1, self.tp2, self.tp3]
    }

    /// `sl < entry < tp1 < tp2 < tp3` for longs, mirrored for shorts
    pub fn levels_are_ordered(&self) -> bool {
        let s = self.direction.sign();
        let ladder = [self.sl, self.entry, self.tp1, self.tp2, self.tp3];
        ladder.windows(2).all(|w| (w[1] - w[0]) * s > 0.0)
    }

    pub fn with_confluences(mut self, confluences: Vec<StructureEvent>) -> Self {
        self.confluences = confluences;
        self
    }

    pub fn at(mut self, produced_at: Duration) -> Self {
        self.produced_at = produced_at;
        self
    }
}

/// Alert text
impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Signal for {} ({}, bias {})", self.symbol, self.direction, self.bias)?;
        writeln!(f, "Entry: {}", self.entry)?;
        writeln!(f, "TP1: {}", self.tp1)?;
        writeln!(f, "TP2: {}", self.tp2)?;
        writeln!(f, "TP3: {}", self.tp3)?;
        write!(f, "SL: {}", self.sl)?;
        if !self.confluences.is_empty() {
            write!(f, "\nConfluences:")?;
            for event in &self.confluences {
                write!(f, "\n- {}", event.describe())?;
            }
        }
        Ok(())
    }
}

// ============================================================
// SYNTHESIZER
// ============================================================

static SYNTH_PARAMS: &[ParamMeta] = &[
    ParamMeta::period(
        "sl_lookback",
        10.0,
        (1.0, 100.0, 1.0),
        "Candles before the latest scanned for the protective stop",
    ),
    ParamMeta::multiple("tp1_multiple", 2.0, (0.25, 20.0, 0.25), "First target in units of risk"),
    ParamMeta::multiple("tp2_multiple", 3.0, (0.25, 20.0, 0.25), "Second target in units of risk"),
    ParamMeta::multiple("tp3_multiple", 4.0, (0.25, 20.0, 0.25), "Third target in units of risk"),
];

/// Turns an order block agreeing with the bias into priced levels.
///
/// Entry is the order-block price; the stop is the extreme of the trailing
/// `sl_lookback` candles before the latest; targets sit at `risk_multiples`
/// units of risk beyond the entry.
#[derive(Debug, Clone, Copy)]
pub struct SignalSynthesizer {
    pub risk_multiples: [f64; 3],
    pub sl_lookback: Period,
}

impl Default for SignalSynthesizer {
    fn default() -> Self {
        Self {
            risk_multiples: [2.0, 3.0, 4.0],
            sl_lookback: Period::new_const(10),
        }
    }
}

impl SignalSynthesizer {
    pub fn new(risk_multiples: [f64; 3], sl_lookback: Period) -> Result<Self> {
        let synth = Self {
            risk_multiples,
            sl_lookback,
        };
        synth.validate_config()?;
        Ok(synth)
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn validate_config(&self) -> Result<()> {
        let [m1, m2, m3] = self.risk_multiples;
        if !(m1 > 0.0 && m1.is_finite() && m3.is_finite()) {
            return Err(EngineError::InvalidConfig(
                "risk multiples must be positive and finite".into(),
            ));
        }
        if !(m1 < m2 && m2 < m3) {
            return Err(EngineError::InvalidConfig(format!(
                "risk multiples must be strictly increasing, got {m1}, {m2}, {m3}"
            )));
        }
        Ok(())
    }

    /// Minimum series length for a stop to be found
    #[inline]
    pub fn min_bars(&self) -> usize {
        self.sl_lookback.get() + 1
    }

    /// `None` when the block is NONE, disagrees with `bias`, the series is too
    /// short for the stop window, or the stop is not beyond the entry.
    pub fn synthesize<T: OHLCV>(
        &self,
        symbol: &str,
        bias: Bias,
        order_block: &OrderBlock,
        bars: &[T],
    ) -> Option<Signal> {
        if !order_block.kind.agrees_with(bias) {
            return None;
        }
        let window = trailing_window(bars, self.sl_lookback.get(), 1)?;

        let (direction, sl) = match order_block.kind {
            OrderBlockKind::Bullish => (Side::Long, lowest_low(window)?),
            OrderBlockKind::Bearish => (Side::Short, highest_high(window)?),
            OrderBlockKind::None => return None,
        };

        let entry = order_block.price;
        let risk = (entry - sl).abs();
        let [m1, m2, m3] = self.risk_multiples;
        let s = direction.sign();

        let signal = Signal {
            symbol: symbol.to_string(),
            direction,
            bias,
            entry,
            tp1: entry + s * risk * m1,
            tp2: entry + s * risk * m2,
            tp3: entry + s * risk * m3,
            sl,
            confluences: Vec::new(),
            produced_at: Duration::ZERO,
        };

        // Zero risk, or a stop on the wrong side of entry
        signal.levels_are_ordered().then_some(signal)
    }
}

impl Parameterized for SignalSynthesizer {
    fn param_meta() -> &'static [ParamMeta] {
        SYNTH_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let risk_multiples = [
            get_multiple(params, SYNTH_PARAMS, "tp1_multiple", 2.0)?,
            get_multiple(params, SYNTH_PARAMS, "tp2_multiple", 3.0)?,
            get_multiple(params, SYNTH_PARAMS, "tp3_multiple", 4.0)?,
        ];
        let sl_lookback = get_period(params, SYNTH_PARAMS, "sl_lookback", 10)?;
        Self::new(risk_multiples, sl_lookback)
    }

    fn component_id() -> &'static str {
        "SIGNAL_SYNTHESIZER"
    }
}

// ============================================================
// TESTS
// ============================================================

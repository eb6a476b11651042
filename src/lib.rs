//! # MTFSIG - Multi-Timeframe Structure Signals
//!
//! Market-structure signal engine: higher-timeframe bias, liquidity sweeps,
//! breaks of structure and order blocks, combined into advisory trade signals
//! with entry, three targets and a stop.
//!
//! ## Quick Start
//!
//! ```rust
//! use mtfsig::prelude::*;
//!
//! let config = EngineConfig::for_symbols(["BTC/USDT"]);
//! let pipeline = Pipeline::from_config(&config).unwrap();
//!
//! // Candles for the bias, confirmation and entry timeframes
//! let bars: Vec<Candle> = vec![];
//! let verdict = pipeline.evaluate("BTC/USDT", &bars, Some(&bars[..]), &bars);
//! assert!(verdict.is_err());
//! ```

pub mod config;
pub mod dedup;
pub mod detectors;
pub mod engine;
pub mod params;
pub mod signal;
pub mod source;
pub mod store;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::{EngineConfig, TimeframeSet},
        // Dedup
        dedup::{signature, DedupCache, DedupEntry},
        // Detectors
        detectors::*,
        // Engine
        engine::{CycleReport, DeliveryStatus, Outcome, Pipeline, Rejection, SignalEngine, Stage, Suppression},
        // Parameters
        params::{get_multiple, get_period, ParamMeta, ParamType, Parameterized},
        // Signals
        signal::{Side, Signal, SignalSynthesizer},
        // Collaborators
        source::{
            AlertSink, CandleSource, Clock, DeliveryError, FetchError, JsonFileSource, LogSink,
            ManualClock, MonotonicClock,
        },
        store::CandleStore,
        // Types
        Bias,
        Candle,
        EngineError,
        OrderBlock,
        OrderBlockKind,
        Period,
        Result,
        StructureDetector,
        StructureEvent,
        Timeframe,
        OHLCVExt,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine and its components
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Malformed {symbol} {timeframe} series at index {index}: {reason}")]
    MalformedSeries {
        symbol: String,
        timeframe: Timeframe,
        index: usize,
        reason: &'static str,
    },

    #[error(transparent)]
    Fetch(#[from] source::FetchError),

    #[error(transparent)]
    Delivery(#[from] source::DeliveryError),

    #[error("Config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Config parse: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Lookback length in bars (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(EngineError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (**self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Check price consistency, returning the reason on failure
    fn validate(&self) -> std::result::Result<(), &'static str> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err("NaN in OHLCV");
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err("Infinite value in OHLCV");
        }
        if self.high() < self.low() {
            return Err("high < low");
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

// ============================================================
// CANDLE
// ============================================================

/// One OHLCV interval as delivered by a candle source
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    /// Interval open time, milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// TIMEFRAME
// ============================================================

/// Candle interval tag. Only used as a key, never interpreted arithmetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 11] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H12,
        Timeframe::D1,
    ];

    /// Exchange-style tag, e.g. `"15m"`
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim();
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == tag)
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown timeframe '{tag}'")))
    }
}

// ============================================================
// CLASSIFIER OUTPUTS
// ============================================================

/// Directional lean of a candle series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bullish,
    Bearish,
    /// Not enough data or no directional edge
    #[default]
    Unknown,
}

impl Bias {
    #[inline]
    pub fn is_known(self) -> bool {
        !matches!(self, Bias::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bias::Bullish => "BULLISH",
            Bias::Bearish => "BEARISH",
            Bias::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural event with the index of the candle that triggered it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StructureEvent {
    SweepHigh(usize),
    SweepLow(usize),
    BosUp(usize),
    BosDown(usize),
    #[default]
    None,
}

impl StructureEvent {
    #[inline]
    pub fn is_none(self) -> bool {
        matches!(self, StructureEvent::None)
    }

    /// Index of the triggering candle
    pub fn index(self) -> Option<usize> {
        match self {
            StructureEvent::SweepHigh(i)
            | StructureEvent::SweepLow(i)
            | StructureEvent::BosUp(i)
            | StructureEvent::BosDown(i) => Some(i),
            StructureEvent::None => None,
        }
    }

    /// Stable label, e.g. `"SWEEP_LOW"`
    pub fn label(self) -> &'static str {
        match self {
            StructureEvent::SweepHigh(_) => "SWEEP_HIGH",
            StructureEvent::SweepLow(_) => "SWEEP_LOW",
            StructureEvent::BosUp(_) => "BOS_UP",
            StructureEvent::BosDown(_) => "BOS_DOWN",
            StructureEvent::None => "NONE",
        }
    }

    /// Confluence line used in alert text
    pub fn describe(self) -> &'static str {
        match self {
            StructureEvent::SweepHigh(_) => "Liquidity sweep of highs, possible short",
            StructureEvent::SweepLow(_) => "Liquidity sweep of lows, possible long",
            StructureEvent::BosUp(_) => "Break of structure up, bullish continuation",
            StructureEvent::BosDown(_) => "Break of structure down, bearish continuation",
            StructureEvent::None => "No structure",
        }
    }
}

impl std::fmt::Display for StructureEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index() {
            Some(i) => write!(f, "{}@{}", self.label(), i),
            None => f.write_str(self.label()),
        }
    }
}

/// Direction of a located order block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderBlockKind {
    #[serde(rename = "BULLISH_OB")]
    Bullish,
    #[serde(rename = "BEARISH_OB")]
    Bearish,
    #[default]
    None,
}

impl OrderBlockKind {
    /// Bias an order block of this kind must be traded with
    pub fn required_bias(self) -> Option<Bias> {
        match self {
            OrderBlockKind::Bullish => Some(Bias::Bullish),
            OrderBlockKind::Bearish => Some(Bias::Bearish),
            OrderBlockKind::None => None,
        }
    }

    #[inline]
    pub fn agrees_with(self, bias: Bias) -> bool {
        self.required_bias() == Some(bias)
    }
}

/// Anticipated reaction zone derived from a sweep and a break
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrderBlock {
    pub kind: OrderBlockKind,
    pub price: f64,
    pub source_index: usize,
}

impl OrderBlock {
    pub const NONE: OrderBlock = OrderBlock {
        kind: OrderBlockKind::None,
        price: 0.0,
        source_index: 0,
    };

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self.kind, OrderBlockKind::None)
    }
}

// ============================================================
// DETECTOR TRAIT
// ============================================================

/// Detector that inspects the trailing edge of a series for one structural event
pub trait StructureDetector: Send + Sync {
    /// Minimum series length for a non-NONE result
    fn min_bars(&self) -> usize;

    fn detect<T: OHLCV>(&self, bars: &[T]) -> StructureEvent;
}

// ============================================================
// TESTS
// ============================================================

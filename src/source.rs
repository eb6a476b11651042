//! Collaborators at the engine boundary: candle sources, alert sinks, clocks

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::signal::Signal;
use crate::{Candle, Timeframe};

// ============================================================
// ERRORS
// ============================================================

/// Candle fetch failure for one (symbol, timeframe)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fetch {symbol} {timeframe} failed: {cause}")]
pub struct FetchError {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub cause: String,
}

impl FetchError {
    pub fn new(symbol: &str, timeframe: Timeframe, cause: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            cause: cause.into(),
        }
    }
}

/// Alert delivery failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("deliver {symbol} alert failed: {cause}")]
pub struct DeliveryError {
    pub symbol: String,
    pub cause: String,
}

impl DeliveryError {
    pub fn new(symbol: &str, cause: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            cause: cause.into(),
        }
    }
}

// ============================================================
// TRAITS
// ============================================================

/// Supplies ordered candles, oldest first
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError>;
}

/// Receives each emitted signal exactly once
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError>;
}

/// Monotonic time for cooldown comparisons
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

// ============================================================
// CLOCKS
// ============================================================

/// Elapsed time since construction, from `std::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.millis.store(to.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

// ============================================================
// JSON FILE SOURCE
// ============================================================

/// Reads exchange-style OHLCV dumps: `<dir>/<SYMBOL>_<tf>.json` holding
/// `[[timestamp_ms, open, high, low, close, volume], ...]`, oldest first.
/// `/` in symbols becomes `-` in the file name.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", symbol.replace('/', "-"), timeframe))
    }

    /// Parse rows, keeping the newest `limit`
    pub fn parse_rows(
        symbol: &str,
        timeframe: Timeframe,
        raw: &[u8],
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let rows: Vec<Vec<f64>> = serde_json::from_slice(raw)
            .map_err(|e| FetchError::new(symbol, timeframe, format!("invalid json: {e}")))?;

        let mut candles = rows
            .iter()
            .enumerate()
            .map(|(i, row)| match row.as_slice() {
                [ts, o, h, l, c, v, ..] => Ok(Candle::new(*ts as i64, *o, *h, *l, *c, *v)),
                _ => Err(FetchError::new(
                    symbol,
                    timeframe,
                    format!("row {i} has {} fields, expected 6", row.len()),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for JsonFileSource {
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let path = self.path_for(symbol, timeframe);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::new(symbol, timeframe, format!("{}: {e}", path.display())))?;
        Self::parse_rows(symbol, timeframe, &raw, limit)
    }
}

// ============================================================
// LOG SINK
// ============================================================

/// Writes the alert text through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError> {
        tracing::info!(
            symbol = %signal.symbol,
            direction = %signal.direction,
            entry = signal.entry,
            "\n{signal}"
        );
        Ok(())
    }
}

//! Bounded candle series per (symbol, timeframe)

use std::collections::HashMap;

use crate::{Candle, EngineError, OHLCVExt, Result, Timeframe};

/// Most recent candles per (symbol, timeframe).
///
/// Every stored series is strictly increasing by timestamp and holds at most
/// `retention` candles. A rejected update leaves the previous series in place.
#[derive(Debug, Clone)]
pub struct CandleStore {
    retention: usize,
    series: HashMap<(String, Timeframe), Vec<Candle>>,
}

impl CandleStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            series: HashMap::new(),
        }
    }

    #[inline]
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Number of stored series
    #[inline]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Replace the series with freshly fetched candles, keeping the newest
    /// `retention` of them. Returns the stored length.
    pub fn update(&mut self, symbol: &str, timeframe: Timeframe, mut candles: Vec<Candle>) -> Result<usize> {
        Self::check_series(symbol, timeframe, &candles)?;

        if candles.len() > self.retention {
            let excess = candles.len() - self.retention;
            candles.drain(..excess);
        }

        let len = candles.len();
        self.series.insert((symbol.to_string(), timeframe), candles);
        Ok(len)
    }

    pub fn get(&self, symbol: &str, timeframe: Timeframe) -> Option<&[Candle]> {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .map(Vec::as_slice)
    }

    fn check_series(symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> Result<()> {
        let malformed = |index: usize, reason: &'static str| EngineError::MalformedSeries {
            symbol: symbol.to_string(),
            timeframe,
            index,
            reason,
        };

        for (i, candle) in candles.iter().enumerate() {
            candle.validate().map_err(|reason| malformed(i, reason))?;
        }
        for (i, pair) in candles.windows(2).enumerate() {
            if pair[1].timestamp == pair[0].timestamp {
                return Err(malformed(i + 1, "duplicate timestamp"));
            }
            if pair[1].timestamp < pair[0].timestamp {
                return Err(malformed(i + 1, "timestamps not increasing"));
            }
        }
        Ok(())
    }
}

//! Engine configuration, loaded from TOML
//!
//! ```toml
//! symbols = ["BTC/USDT", "ETH/USDT"]
//! cooldown_seconds = 600
//! risk_multiples = [2.0, 3.0, 4.0]
//!
//! [timeframes]
//! bias = "4h"
//! confirm = "1h"
//! entry = "15m"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::Pipeline;
use crate::{EngineError, Period, Result, Timeframe};

/// Timeframes consulted for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeSet {
    /// Higher timeframe that sets the bias
    pub bias: Timeframe,
    /// Timeframe that must agree with the bias
    pub confirm: Timeframe,
    /// Timeframe scanned for sweeps, breaks and order blocks
    pub entry: Timeframe,
}

impl Default for TimeframeSet {
    fn default() -> Self {
        Self {
            bias: Timeframe::H4,
            confirm: Timeframe::H1,
            entry: Timeframe::M15,
        }
    }
}

/// Full engine configuration. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluated in this order every cycle
    pub symbols: Vec<String>,
    pub timeframes: TimeframeSet,
    pub cooldown_seconds: u64,
    pub risk_multiples: [f64; 3],
    pub bias_window: Period,
    pub sweep_lookback: Period,
    pub bos_lookback: Period,
    pub sl_lookback: Period,
    pub cycle_interval_seconds: u64,
    pub fetch_timeout_seconds: u64,
    /// Candles kept (and requested) per series
    pub retention: usize,
    /// Require the confirm timeframe to agree with the bias timeframe
    pub require_confirmation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframes: TimeframeSet::default(),
            cooldown_seconds: 600,
            risk_multiples: [2.0, 3.0, 4.0],
            bias_window: Period::new_const(20),
            sweep_lookback: Period::new_const(5),
            bos_lookback: Period::new_const(10),
            sl_lookback: Period::new_const(10),
            cycle_interval_seconds: 120,
            fetch_timeout_seconds: 10,
            retention: 200,
            require_confirmation: true,
        }
    }
}

impl EngineConfig {
    /// Defaults with the given symbol list
    pub fn for_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load and validate config from a TOML file path.
    pub fn from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// Longest series any classifier needs for a non-trivial answer
    pub fn required_bars(&self) -> usize {
        [
            self.bias_window.get() + 1,
            self.sweep_lookback.get() + 1,
            self.bos_lookback.get() + 2,
            self.sl_lookback.get() + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Distinct timeframes fetched per symbol, bias first
    pub fn fetch_timeframes(&self) -> Vec<Timeframe> {
        let tfs = &self.timeframes;
        let mut out = vec![tfs.bias];
        if self.require_confirmation {
            out.push(tfs.confirm);
        }
        out.push(tfs.entry);

        let mut seen = HashSet::new();
        out.retain(|tf| seen.insert(*tf));
        out
    }

    /// Startup validation. Any error here is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(EngineError::InvalidConfig("symbols must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(EngineError::InvalidConfig("blank symbol".into()));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(EngineError::InvalidConfig(format!("duplicate symbol '{symbol}'")));
            }
        }

        let positive = [
            ("cooldown_seconds", self.cooldown_seconds),
            ("cycle_interval_seconds", self.cycle_interval_seconds),
            ("fetch_timeout_seconds", self.fetch_timeout_seconds),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(EngineError::InvalidConfig(format!("{name} must be > 0")));
            }
        }

        // Lookback ranges and risk multiples are checked by the components
        Pipeline::from_config(self)?;

        if self.retention < self.required_bars() {
            return Err(EngineError::InvalidConfig(format!(
                "retention {} is below the {} candles the classifiers need",
                self.retention,
                self.required_bars()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::for_symbols(["BTC/USDT"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.cooldown(), Duration::from_secs(600));
        assert_eq!(config.cycle_interval(), Duration::from_secs(120));
        assert_eq!(config.risk_multiples, [2.0, 3.0, 4.0]);
        assert_eq!(config.required_bars(), 21);
    }

    #[test]
    fn test_from_toml_str() {
        let config = EngineConfig::from_toml_str(
            r#"
            symbols = ["BTC/USDT", "ETH/USDT"]
            cooldown_seconds = 300
            sweep_lookback = 3
            require_confirmation = false

            [timeframes]
            bias = "1d"
            confirm = "4h"
            entry = "5m"
            "#,
        )
        .unwrap();

        assert_eq!(config.symbols, vec!["BTC/USDT", "ETH/USDT"]);
        assert_eq!(config.cooldown_seconds, 300);
        assert_eq!(config.sweep_lookback.get(), 3);
        assert_eq!(config.bos_lookback.get(), 10);
        assert_eq!(config.timeframes.entry, Timeframe::M5);
        assert_eq!(config.fetch_timeframes(), vec![Timeframe::D1, Timeframe::M5]);
    }

    #[test]
    fn test_rejects_empty_symbols() {
        let err = EngineConfig::default().validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_duplicate_symbols() {
        assert!(EngineConfig::for_symbols(["BTC/USDT", "BTC/USDT"]).validate().is_err());
    }

    #[test]
    fn test_rejects_zero_cooldown() {
        let config = EngineConfig {
            cooldown_seconds: 0,
            ..EngineConfig::for_symbols(["BTC/USDT"])
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_lookback_at_parse() {
        let err = EngineConfig::from_toml_str("symbols = [\"BTC/USDT\"]\nbos_lookback = 0").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn test_rejects_non_increasing_multiples() {
        let config = EngineConfig {
            risk_multiples: [3.0, 2.0, 4.0],
            ..EngineConfig::for_symbols(["BTC/USDT"])
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_window() {
        let config = EngineConfig {
            bias_window: Period::new_const(500),
            retention: 1000,
            ..EngineConfig::for_symbols(["BTC/USDT"])
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            EngineError::OutOfRange { field: "window", .. }
        ));
    }

    #[test]
    fn test_rejects_short_retention() {
        let config = EngineConfig {
            retention: 15,
            ..EngineConfig::for_symbols(["BTC/USDT"])
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_timeframes_fetched_once() {
        let config = EngineConfig {
            timeframes: TimeframeSet {
                bias: Timeframe::H1,
                confirm: Timeframe::H1,
                entry: Timeframe::M15,
            },
            ..EngineConfig::for_symbols(["BTC/USDT"])
        };
        assert_eq!(config.fetch_timeframes(), vec![Timeframe::H1, Timeframe::M15]);
    }
}

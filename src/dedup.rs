//! Cooldown cache that keeps identical signals from being re-sent

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::signal::{Side, Signal};

/// Identity of a signal for cooldown purposes: direction plus entry rounded to
/// six decimals, so recomputations of the same block compare equal.
///
/// Whole prices keep their decimal point, e.g. `LONG_98.0`.
pub fn signature(direction: Side, entry: f64) -> String {
    let rounded = (entry * 1e6).round() / 1e6;
    format!("{direction}_{rounded:?}")
}

impl Signal {
    pub fn signature(&self) -> String {
        signature(self.direction, self.entry)
    }
}

/// Last signal sent for a symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub symbol: String,
    pub signature: String,
    pub last_sent_at: Duration,
}

/// One entry per symbol, overwritten on every emitted signal.
///
/// A single mutex guards the map so concurrent evaluations serialize the
/// check-and-record of a symbol's entry.
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DedupEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False iff the symbol's last signal has this signature and is still
    /// inside the cooldown.
    pub fn should_emit(&self, symbol: &str, signature: &str, now: Duration, cooldown: Duration) -> bool {
        Self::allows(self.lock().get(symbol), signature, now, cooldown)
    }

    pub fn record(&self, symbol: &str, signature: &str, now: Duration) {
        self.lock().insert(
            symbol.to_string(),
            DedupEntry {
                symbol: symbol.to_string(),
                signature: signature.to_string(),
                last_sent_at: now,
            },
        );
    }

    /// `should_emit` followed by `record` under one lock. Returns whether the
    /// caller may emit.
    pub fn try_claim(&self, symbol: &str, signature: &str, now: Duration, cooldown: Duration) -> bool {
        let mut entries = self.lock();
        if !Self::allows(entries.get(symbol), signature, now, cooldown) {
            return false;
        }
        entries.insert(
            symbol.to_string(),
            DedupEntry {
                symbol: symbol.to_string(),
                signature: signature.to_string(),
                last_sent_at: now,
            },
        );
        true
    }

    pub fn get(&self, symbol: &str) -> Option<DedupEntry> {
        self.lock().get(symbol).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn allows(entry: Option<&DedupEntry>, signature: &str, now: Duration, cooldown: Duration) -> bool {
        match entry {
            Some(prev) if prev.signature == signature => {
                now.saturating_sub(prev.last_sent_at) >= cooldown
            }
            _ => true,
        }
    }
}

//! Engine cycle tests against scripted collaborators.
//!
//! Time is paused so fetch timeouts and the cycle pause run instantly.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mtfsig::prelude::*;
use tokio_util::sync::CancellationToken;

// ============================================================
// FIXTURES
// ============================================================

fn trend(n: usize, start: f64, step: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let c = start + step * i as f64;
            Candle::new(i as i64 * 60_000, c, c + 0.5, c - 0.5, c, 10.0)
        })
        .collect()
}

/// Sweep of the lows and a break up on the last candle: long at 98, stop 95
fn long_entry() -> Vec<Candle> {
    let mut bars: Vec<Candle> = (0..10)
        .map(|i| Candle::new(i * 60_000, 97.0, 100.0, 95.0, 98.0, 10.0))
        .collect();
    bars.push(Candle::new(600_000, 98.5, 99.5, 98.0, 99.0, 10.0));
    bars.push(Candle::new(660_000, 96.0, 106.0, 94.0, 105.0, 10.0));
    bars
}

#[derive(Clone)]
enum Scripted {
    Candles(Vec<Candle>),
    Fail(String),
    Slow(Duration, Vec<Candle>),
}

#[derive(Default)]
struct ScriptedSource {
    series: Mutex<HashMap<(String, Timeframe), Scripted>>,
    calls: Mutex<Vec<(String, Timeframe, usize)>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl ScriptedSource {
    fn set(&self, symbol: &str, timeframe: Timeframe, script: Scripted) {
        self.series
            .lock()
            .unwrap()
            .insert((symbol.to_string(), timeframe), script);
    }

    /// Bullish bias and confirmation plus the long entry setup
    fn with_long_setup(symbols: &[&str]) -> Self {
        let source = Self::default();
        for symbol in symbols {
            source.set(symbol, Timeframe::H4, Scripted::Candles(trend(25, 100.0, 1.0)));
            source.set(symbol, Timeframe::H1, Scripted::Candles(trend(25, 100.0, 1.0)));
            source.set(symbol, Timeframe::M15, Scripted::Candles(long_entry()));
        }
        source
    }

    fn calls(&self) -> Vec<(String, Timeframe, usize)> {
        self.calls.lock().unwrap().clone()
    }

    fn fetched(&self, symbol: &str) -> bool {
        self.calls().iter().any(|(s, _, _)| s == symbol)
    }
}

#[async_trait]
impl CandleSource for ScriptedSource {
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> std::result::Result<Vec<Candle>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), timeframe, limit));

        if let Some((target, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if target == symbol {
                token.cancel();
            }
        }

        let script = self
            .series
            .lock()
            .unwrap()
            .get(&(symbol.to_string(), timeframe))
            .cloned();
        match script {
            Some(Scripted::Candles(candles)) => Ok(candles),
            Some(Scripted::Fail(cause)) => Err(FetchError::new(symbol, timeframe, cause)),
            Some(Scripted::Slow(delay, candles)) => {
                tokio::time::sleep(delay).await;
                Ok(candles)
            }
            None => Err(FetchError::new(symbol, timeframe, "no such series")),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<Signal>>,
    attempts: Mutex<usize>,
    fail: bool,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn delivered(&self) -> Vec<Signal> {
        self.delivered.lock().unwrap().clone()
    }

    fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(&self, signal: &Signal) -> std::result::Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        if self.fail {
            return Err(DeliveryError::new(&signal.symbol, "webhook returned 502"));
        }
        self.delivered.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

type TestEngine = SignalEngine<ScriptedSource, RecordingSink, ManualClock>;

fn engine(config: EngineConfig, source: ScriptedSource, sink: RecordingSink) -> TestEngine {
    SignalEngine::with_clock(config, source, sink, ManualClock::new()).unwrap()
}

fn suppression<'a>(report: &'a CycleReport, symbol: &str) -> &'a Suppression {
    report
        .get(symbol)
        .and_then(Outcome::suppression)
        .unwrap_or_else(|| panic!("{symbol} was not suppressed"))
}

// ============================================================
// SINGLE CYCLE
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_emits_and_delivers_long() {
    let config = EngineConfig::for_symbols(["BTC/USDT"]);
    let mut engine = engine(config, ScriptedSource::with_long_setup(&["BTC/USDT"]), RecordingSink::default());
    engine.clock().set(Duration::from_secs(42));

    let report = engine.run_cycle().await;
    assert_eq!(report.emitted_count(), 1);

    let delivered = engine.sink().delivered();
    assert_eq!(delivered.len(), 1);
    let signal = &delivered[0];
    assert_eq!(signal.symbol, "BTC/USDT");
    assert_eq!(signal.direction, Side::Long);
    assert_eq!(signal.bias, Bias::Bullish);
    assert_eq!(signal.entry, 98.0);
    assert_eq!(signal.sl, 95.0);
    assert_eq!(signal.targets(), [104.0, 107.0, 110.0]);
    assert_eq!(signal.produced_at, Duration::from_secs(42));
    assert_eq!(
        signal.confluences,
        vec![StructureEvent::SweepLow(11), StructureEvent::BosUp(11)]
    );

    // Every fetch asks for the retention size
    let calls = engine.source().calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, _, limit)| *limit == 200));
    assert_eq!(engine.store().get("BTC/USDT", Timeframe::M15).map(<[Candle]>::len), Some(12));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_then_reemit() {
    let config = EngineConfig::for_symbols(["BTC/USDT"]);
    let mut engine = engine(config, ScriptedSource::with_long_setup(&["BTC/USDT"]), RecordingSink::default());

    assert_eq!(engine.run_cycle().await.emitted_count(), 1);

    engine.clock().advance(Duration::from_secs(100));
    let report = engine.run_cycle().await;
    let reason = suppression(&report, "BTC/USDT");
    assert_eq!(reason.stage(), Stage::DedupGate);
    assert!(matches!(reason, Suppression::Cooldown { signature } if signature == "LONG_98.0"));

    engine.clock().advance(Duration::from_secs(600));
    assert_eq!(engine.run_cycle().await.emitted_count(), 1);
    assert_eq!(engine.sink().delivered().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_still_starts_cooldown() {
    let config = EngineConfig::for_symbols(["BTC/USDT"]);
    let mut engine = engine(config, ScriptedSource::with_long_setup(&["BTC/USDT"]), RecordingSink::failing());

    let report = engine.run_cycle().await;
    match report.get("BTC/USDT") {
        Some(Outcome::Emitted { delivery, .. }) => {
            assert_eq!(delivery, &DeliveryStatus::Failed("webhook returned 502".into()));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(engine.dedup().get("BTC/USDT").is_some());

    // No retry inside the cooldown
    let report = engine.run_cycle().await;
    assert!(matches!(suppression(&report, "BTC/USDT"), Suppression::Cooldown { .. }));
    assert_eq!(engine.sink().attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_skips_only_that_symbol() {
    let source = ScriptedSource::with_long_setup(&["BTC/USDT", "ETH/USDT"]);
    source.set("BTC/USDT", Timeframe::M15, Scripted::Fail("rate limited".into()));

    let config = EngineConfig::for_symbols(["BTC/USDT", "ETH/USDT"]);
    let mut engine = engine(config, source, RecordingSink::default());
    let report = engine.run_cycle().await;

    assert_eq!(
        suppression(&report, "BTC/USDT"),
        &Suppression::FetchFailed {
            timeframe: Timeframe::M15,
            cause: "rate limited".into()
        }
    );
    assert!(report.get("ETH/USDT").is_some_and(Outcome::is_emitted));
    assert_eq!(engine.sink().delivered()[0].symbol, "ETH/USDT");
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_times_out() {
    let source = ScriptedSource::with_long_setup(&["BTC/USDT", "ETH/USDT"]);
    source.set(
        "BTC/USDT",
        Timeframe::H4,
        Scripted::Slow(Duration::from_secs(30), trend(25, 100.0, 1.0)),
    );

    let config = EngineConfig::for_symbols(["BTC/USDT", "ETH/USDT"]);
    let mut engine = engine(config, source, RecordingSink::default());
    let report = engine.run_cycle().await;

    match suppression(&report, "BTC/USDT") {
        Suppression::FetchFailed { timeframe, cause } => {
            assert_eq!(*timeframe, Timeframe::H4);
            assert!(cause.contains("timed out"));
        }
        other => panic!("unexpected suppression {other:?}"),
    }
    assert_eq!(report.emitted_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bias_disagreement_suppresses() {
    let source = ScriptedSource::with_long_setup(&["BTC/USDT"]);
    source.set("BTC/USDT", Timeframe::H1, Scripted::Candles(trend(25, 200.0, -1.0)));

    let mut engine = engine(EngineConfig::for_symbols(["BTC/USDT"]), source, RecordingSink::default());
    let report = engine.run_cycle().await;

    let reason = suppression(&report, "BTC/USDT");
    assert_eq!(reason.stage(), Stage::BiasCheck);
    assert_eq!(
        reason,
        &Suppression::Rejected(Rejection::BiasDisagreement {
            bias: Bias::Bullish,
            confirm: Bias::Bearish
        })
    );
    assert!(engine.sink().delivered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_off_skips_confirm_fetch() {
    let source = ScriptedSource::with_long_setup(&["BTC/USDT"]);
    source.set("BTC/USDT", Timeframe::H1, Scripted::Fail("must not be fetched".into()));

    let config = EngineConfig {
        require_confirmation: false,
        ..EngineConfig::for_symbols(["BTC/USDT"])
    };
    let mut engine = engine(config, source, RecordingSink::default());

    assert_eq!(engine.run_cycle().await.emitted_count(), 1);
    assert!(engine
        .source()
        .calls()
        .iter()
        .all(|(_, tf, _)| *tf != Timeframe::H1));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_series_keeps_previous() {
    let mut engine = engine(
        EngineConfig::for_symbols(["BTC/USDT"]),
        ScriptedSource::with_long_setup(&["BTC/USDT"]),
        RecordingSink::default(),
    );
    assert_eq!(engine.run_cycle().await.emitted_count(), 1);

    let mut broken = long_entry();
    broken[5].timestamp = broken[4].timestamp;
    engine
        .source()
        .set("BTC/USDT", Timeframe::M15, Scripted::Candles(broken));

    // The stored series is reused, so the same signal hits the cooldown
    let report = engine.run_cycle().await;
    assert!(matches!(suppression(&report, "BTC/USDT"), Suppression::Cooldown { .. }));
    assert_eq!(engine.store().get("BTC/USDT", Timeframe::M15), Some(&long_entry()[..]));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_series_without_history_is_no_data() {
    let source = ScriptedSource::with_long_setup(&["BTC/USDT"]);
    let mut entry = long_entry();
    entry[3].high = entry[3].low - 1.0;
    source.set("BTC/USDT", Timeframe::M15, Scripted::Candles(entry));

    let mut engine = engine(EngineConfig::for_symbols(["BTC/USDT"]), source, RecordingSink::default());
    let report = engine.run_cycle().await;
    assert_eq!(
        suppression(&report, "BTC/USDT"),
        &Suppression::NoData {
            timeframe: Timeframe::M15
        }
    );
}

// ============================================================
// CYCLE LOOP
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_run_repeats_until_cancelled() {
    let mut engine = engine(
        EngineConfig::for_symbols(["BTC/USDT"]),
        ScriptedSource::with_long_setup(&["BTC/USDT"]),
        RecordingSink::default(),
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(250)).await;
        trigger.cancel();
    });

    // Cycles start at 0s, 120s and 240s
    let cycles = engine.run(&shutdown).await;
    assert_eq!(cycles, 3);
    assert_eq!(engine.source().calls().len(), 9);
    // The manual clock never moved, so only the first cycle delivered
    assert_eq!(engine.sink().delivered().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_finishes_current_symbol_only() {
    let symbols = ["BTC/USDT", "ETH/USDT", "SOL/USDT"];
    let source = ScriptedSource::with_long_setup(&symbols);
    let shutdown = CancellationToken::new();
    *source.cancel_on.lock().unwrap() = Some(("ETH/USDT".into(), shutdown.clone()));

    let mut engine = engine(EngineConfig::for_symbols(symbols), source, RecordingSink::default());
    let cycles = engine.run(&shutdown).await;

    assert_eq!(cycles, 1);
    let delivered: Vec<String> = engine.sink().delivered().into_iter().map(|s| s.symbol).collect();
    assert_eq!(delivered, vec!["BTC/USDT", "ETH/USDT"]);
    assert!(!engine.source().fetched("SOL/USDT"));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_runs_nothing() {
    let mut engine = engine(
        EngineConfig::for_symbols(["BTC/USDT"]),
        ScriptedSource::with_long_setup(&["BTC/USDT"]),
        RecordingSink::default(),
    );
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    assert_eq!(engine.run(&shutdown).await, 0);
    assert!(engine.source().calls().is_empty());
}

// ============================================================
// PARALLEL SCAN
// ============================================================

#[test]
fn test_scan_parallel_from_ingested_series() {
    let symbols = ["BTC/USDT", "ETH/USDT", "SOL/USDT", "XRP/USDT"];
    let mut engine = engine(EngineConfig::for_symbols(symbols), ScriptedSource::default(), RecordingSink::default());

    for symbol in &symbols[..3] {
        engine.ingest(symbol, Timeframe::H4, trend(25, 100.0, 1.0)).unwrap();
        engine.ingest(symbol, Timeframe::H1, trend(25, 100.0, 1.0)).unwrap();
        engine.ingest(symbol, Timeframe::M15, long_entry()).unwrap();
    }

    let report = engine.scan_parallel();
    assert_eq!(report.emitted_count(), 3);
    assert_eq!(
        report.outcomes.iter().map(|(s, _)| s.as_str()).collect::<Vec<_>>(),
        symbols.to_vec()
    );
    assert_eq!(
        suppression(&report, "XRP/USDT"),
        &Suppression::NoData {
            timeframe: Timeframe::H4
        }
    );
    assert!(report
        .outcomes
        .iter()
        .filter_map(|(_, o)| match o {
            Outcome::Emitted { delivery, .. } => Some(delivery),
            Outcome::Suppressed(_) => None,
        })
        .all(|d| *d == DeliveryStatus::NotAttempted));

    // The scan claimed the cooldown slots
    assert_eq!(engine.scan_parallel().emitted_count(), 0);
    assert_eq!(engine.dedup().len(), 3);
}

#[test]
fn test_invalid_config_is_fatal() {
    let result = SignalEngine::with_clock(
        EngineConfig::default(),
        ScriptedSource::default(),
        RecordingSink::default(),
        ManualClock::new(),
    );
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

//! Signal engine: per-symbol pipeline, dedup gate and the cycle loop
//!
//! Each symbol moves through
//! `FETCHING -> BIAS_CHECK -> ENTRY_SCAN -> SYNTHESIS -> DEDUP_GATE`
//! and ends the cycle either emitted or suppressed. Only the dedup cache
//! carries state from one cycle to the next.

use std::collections::HashMap;
use std::fmt;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, TimeframeSet};
use crate::dedup::DedupCache;
use crate::detectors::{BiasClassifier, LiquiditySweepDetector, OrderBlockDetector, StructureBreakDetector};
use crate::params::Parameterized;
use crate::signal::{Signal, SignalSynthesizer};
use crate::source::{AlertSink, CandleSource, Clock, MonotonicClock};
use crate::store::CandleStore;
use crate::{Bias, Candle, OrderBlockKind, Result, StructureDetector, StructureEvent, Timeframe, OHLCV};

// ============================================================
// OUTCOMES
// ============================================================

/// Evaluation stage of one symbol within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetching,
    BiasCheck,
    EntryScan,
    Synthesis,
    DedupGate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetching => "FETCHING",
            Stage::BiasCheck => "BIAS_CHECK",
            Stage::EntryScan => "ENTRY_SCAN",
            Stage::Synthesis => "SYNTHESIS",
            Stage::DedupGate => "DEDUP_GATE",
        })
    }
}

/// Why the classifier pipeline produced no signal
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Bias could not be established on this timeframe
    InsufficientData { timeframe: Timeframe },
    BiasDisagreement { bias: Bias, confirm: Bias },
    NoConfluence {
        sweep: StructureEvent,
        bos: StructureEvent,
    },
    DirectionMismatch {
        bias: Bias,
        order_block: OrderBlockKind,
    },
    /// Stop window too short, or stop not beyond the entry
    DegenerateRisk,
}

impl Rejection {
    pub fn stage(&self) -> Stage {
        match self {
            Rejection::InsufficientData { .. } | Rejection::BiasDisagreement { .. } => Stage::BiasCheck,
            Rejection::NoConfluence { .. } => Stage::EntryScan,
            Rejection::DirectionMismatch { .. } | Rejection::DegenerateRisk => Stage::Synthesis,
        }
    }

    /// Component that turned the symbol away
    pub fn component(&self) -> &'static str {
        match self {
            Rejection::InsufficientData { .. } | Rejection::BiasDisagreement { .. } => {
                BiasClassifier::component_id()
            }
            Rejection::NoConfluence { sweep, .. } if sweep.is_none() => {
                LiquiditySweepDetector::component_id()
            }
            Rejection::NoConfluence { bos, .. } if bos.is_none() => StructureBreakDetector::component_id(),
            Rejection::NoConfluence { .. } => OrderBlockDetector::ID,
            Rejection::DirectionMismatch { .. } | Rejection::DegenerateRisk => {
                SignalSynthesizer::component_id()
            }
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InsufficientData { timeframe } => write!(f, "no bias on {timeframe}"),
            Rejection::BiasDisagreement { bias, confirm } => {
                write!(f, "bias {bias} not confirmed ({confirm})")
            }
            Rejection::NoConfluence { sweep, bos } => write!(f, "no confluence (sweep {sweep}, bos {bos})"),
            Rejection::DirectionMismatch { bias, order_block } => {
                write!(f, "{order_block:?} order block against {bias} bias")
            }
            Rejection::DegenerateRisk => f.write_str("no valid stop"),
        }
    }
}

/// Why a symbol ended its cycle without emitting
#[derive(Debug, Clone, PartialEq)]
pub enum Suppression {
    FetchFailed { timeframe: Timeframe, cause: String },
    /// Nothing usable stored for this timeframe
    NoData { timeframe: Timeframe },
    Rejected(Rejection),
    Cooldown { signature: String },
}

impl Suppression {
    pub fn stage(&self) -> Stage {
        match self {
            Suppression::FetchFailed { .. } | Suppression::NoData { .. } => Stage::Fetching,
            Suppression::Rejected(r) => r.stage(),
            Suppression::Cooldown { .. } => Stage::DedupGate,
        }
    }

    /// Rejecting component, for pipeline rejections only
    pub fn component(&self) -> Option<&'static str> {
        match self {
            Suppression::Rejected(r) => Some(r.component()),
            _ => None,
        }
    }
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suppression::FetchFailed { timeframe, cause } => write!(f, "{timeframe} fetch failed: {cause}"),
            Suppression::NoData { timeframe } => write!(f, "no {timeframe} data"),
            Suppression::Rejected(r) => r.fmt(f),
            Suppression::Cooldown { signature } => write!(f, "{signature} still cooling down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
    /// Scan mode, no sink involved
    NotAttempted,
}

/// Terminal result for one symbol in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Emitted {
        signal: Signal,
        delivery: DeliveryStatus,
    },
    Suppressed(Suppression),
}

impl Outcome {
    #[inline]
    pub fn is_emitted(&self) -> bool {
        matches!(self, Outcome::Emitted { .. })
    }

    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Outcome::Emitted { signal, .. } => Some(signal),
            Outcome::Suppressed(_) => None,
        }
    }

    pub fn suppression(&self) -> Option<&Suppression> {
        match self {
            Outcome::Suppressed(s) => Some(s),
            Outcome::Emitted { .. } => None,
        }
    }
}

/// Outcomes of one pass, in configured symbol order
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(String, Outcome)>,
}

impl CycleReport {
    pub fn get(&self, symbol: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, o)| o)
    }

    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.outcomes.iter().filter_map(|(_, o)| o.signal())
    }

    pub fn emitted_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_emitted()).count()
    }

    pub fn suppressed_count(&self) -> usize {
        self.outcomes.len() - self.emitted_count()
    }
}

// ============================================================
// PIPELINE
// ============================================================

/// The pure classifier chain, no I/O and no dedup
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub timeframes: TimeframeSet,
    pub require_confirmation: bool,
    pub bias: BiasClassifier,
    pub sweep: LiquiditySweepDetector,
    pub bos: StructureBreakDetector,
    pub order_block: OrderBlockDetector,
    pub synthesizer: SignalSynthesizer,
}

impl Pipeline {
    /// Build every component from the config, range-checking each parameter
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let bias = BiasClassifier::with_params(&HashMap::from([(
            "window",
            config.bias_window.get() as f64,
        )]))?;
        let sweep = LiquiditySweepDetector::with_params(&HashMap::from([(
            "lookback",
            config.sweep_lookback.get() as f64,
        )]))?;
        let bos = StructureBreakDetector::with_params(&HashMap::from([(
            "lookback",
            config.bos_lookback.get() as f64,
        )]))?;
        let [m1, m2, m3] = config.risk_multiples;
        let synthesizer = SignalSynthesizer::with_params(&HashMap::from([
            ("sl_lookback", config.sl_lookback.get() as f64),
            ("tp1_multiple", m1),
            ("tp2_multiple", m2),
            ("tp3_multiple", m3),
        ]))?;

        Ok(Self {
            timeframes: config.timeframes,
            require_confirmation: config.require_confirmation,
            bias,
            sweep,
            bos,
            order_block: OrderBlockDetector,
            synthesizer,
        })
    }

    /// Run bias check, entry scan and synthesis on already-fetched series.
    ///
    /// `confirm_bars` is ignored unless confirmation is required; when it is
    /// required and missing the confirm bias counts as UNKNOWN.
    pub fn evaluate<T: OHLCV>(
        &self,
        symbol: &str,
        bias_bars: &[T],
        confirm_bars: Option<&[T]>,
        entry_bars: &[T],
    ) -> std::result::Result<Signal, Rejection> {
        let bias = self.bias.classify(bias_bars);
        if !bias.is_known() {
            return Err(Rejection::InsufficientData {
                timeframe: self.timeframes.bias,
            });
        }
        if self.require_confirmation {
            let confirm = confirm_bars.map_or(Bias::Unknown, |bars| self.bias.classify(bars));
            if !confirm.is_known() {
                return Err(Rejection::InsufficientData {
                    timeframe: self.timeframes.confirm,
                });
            }
            if confirm != bias {
                return Err(Rejection::BiasDisagreement { bias, confirm });
            }
        }

        let sweep = self.sweep.detect(entry_bars);
        let bos = self.bos.detect(entry_bars);
        let block = self.order_block.detect(entry_bars, sweep, bos);
        if block.is_none() {
            return Err(Rejection::NoConfluence { sweep, bos });
        }

        if !block.kind.agrees_with(bias) {
            return Err(Rejection::DirectionMismatch {
                bias,
                order_block: block.kind,
            });
        }
        self.synthesizer
            .synthesize(symbol, bias, &block, entry_bars)
            .map(|signal| signal.with_confluences(vec![sweep, bos]))
            .ok_or(Rejection::DegenerateRisk)
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Owns the candle store and dedup cache and drives the cycle loop
pub struct SignalEngine<S, A, K = MonotonicClock> {
    config: EngineConfig,
    pipeline: Pipeline,
    store: CandleStore,
    dedup: DedupCache,
    source: S,
    sink: A,
    clock: K,
}

impl<S: CandleSource, A: AlertSink> SignalEngine<S, A, MonotonicClock> {
    pub fn new(config: EngineConfig, source: S, sink: A) -> Result<Self> {
        Self::with_clock(config, source, sink, MonotonicClock::new())
    }
}

impl<S: CandleSource, A: AlertSink, K: Clock> SignalEngine<S, A, K> {
    /// Validates the config; errors here are fatal at startup
    pub fn with_clock(config: EngineConfig, source: S, sink: A, clock: K) -> Result<Self> {
        config.validate()?;
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self {
            store: CandleStore::new(config.retention),
            dedup: DedupCache::new(),
            config,
            pipeline,
            source,
            sink,
            clock,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Put candles straight into the store, bypassing the source
    pub fn ingest(&mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Result<usize> {
        self.store.update(symbol, timeframe, candles)
    }

    // ===========================================
    // FETCHING
    // ===========================================

    /// Fetch every timeframe the symbol needs into the store.
    ///
    /// A failed or timed-out fetch skips the symbol. A malformed series is
    /// discarded and the previously stored one is used instead.
    pub async fn refresh(&mut self, symbol: &str) -> std::result::Result<(), Suppression> {
        let limit = self.config.retention;
        let timeout = self.config.fetch_timeout();

        for timeframe in self.config.fetch_timeframes() {
            let fetched = tokio::time::timeout(timeout, self.source.fetch(symbol, timeframe, limit)).await;
            let candles = match fetched {
                Ok(Ok(candles)) => candles,
                Ok(Err(e)) => {
                    warn!(symbol, %timeframe, cause = %e.cause, "candle fetch failed");
                    return Err(Suppression::FetchFailed {
                        timeframe,
                        cause: e.cause,
                    });
                }
                Err(_) => {
                    warn!(symbol, %timeframe, timeout_s = timeout.as_secs(), "candle fetch timed out");
                    return Err(Suppression::FetchFailed {
                        timeframe,
                        cause: format!("timed out after {}s", timeout.as_secs()),
                    });
                }
            };

            if let Err(e) = self.store.update(symbol, timeframe, candles) {
                warn!(symbol, %timeframe, error = %e, "discarding malformed series");
                if self.store.get(symbol, timeframe).is_none() {
                    return Err(Suppression::NoData { timeframe });
                }
            }
        }
        Ok(())
    }

    /// Fetch every configured symbol, returning the ones that failed
    pub async fn refresh_all(&mut self) -> Vec<(String, Suppression)> {
        let symbols = self.config.symbols.clone();
        let mut failed = Vec::new();
        for symbol in symbols {
            if let Err(s) = self.refresh(&symbol).await {
                failed.push((symbol, s));
            }
        }
        failed
    }

    // ===========================================
    // EVALUATION
    // ===========================================

    /// Run the pipeline on whatever the store holds for `symbol`
    pub fn evaluate_stored(&self, symbol: &str) -> std::result::Result<Signal, Suppression> {
        let tfs = self.config.timeframes;
        let series = |timeframe: Timeframe| {
            self.store
                .get(symbol, timeframe)
                .ok_or(Suppression::NoData { timeframe })
        };

        let bias_bars = series(tfs.bias)?;
        let confirm_bars = if self.config.require_confirmation {
            Some(series(tfs.confirm)?)
        } else {
            None
        };
        let entry_bars = series(tfs.entry)?;

        self.pipeline
            .evaluate(symbol, bias_bars, confirm_bars, entry_bars)
            .map(|signal| signal.at(self.clock.now()))
            .map_err(Suppression::Rejected)
    }

    /// Claim the cooldown slot for this signal
    fn gate(&self, signal: &Signal) -> std::result::Result<(), Suppression> {
        let signature = signal.signature();
        if self
            .dedup
            .try_claim(&signal.symbol, &signature, self.clock.now(), self.config.cooldown())
        {
            Ok(())
        } else {
            Err(Suppression::Cooldown { signature })
        }
    }

    fn evaluate_and_gate(&self, symbol: &str) -> std::result::Result<Signal, Suppression> {
        let signal = self.evaluate_stored(symbol)?;
        self.gate(&signal)?;
        Ok(signal)
    }

    /// One full pass for one symbol: fetch, classify, gate, deliver
    pub async fn evaluate_symbol(&mut self, symbol: &str) -> Outcome {
        if let Err(s) = self.refresh(symbol).await {
            return Outcome::Suppressed(s);
        }
        let signal = match self.evaluate_and_gate(symbol) {
            Ok(signal) => signal,
            Err(s) => return Outcome::Suppressed(s),
        };

        // The cooldown is already recorded; a failed delivery is not retried
        let delivery = match self.sink.deliver(&signal).await {
            Ok(()) => DeliveryStatus::Delivered,
            Err(e) => {
                error!(symbol, error = %e, "alert delivery failed");
                DeliveryStatus::Failed(e.cause)
            }
        };
        Outcome::Emitted { signal, delivery }
    }

    // ===========================================
    // CYCLE LOOP
    // ===========================================

    /// Evaluate every configured symbol once, in order
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_until(&CancellationToken::new()).await
    }

    async fn run_cycle_until(&mut self, shutdown: &CancellationToken) -> CycleReport {
        let symbols = self.config.symbols.clone();
        let mut report = CycleReport {
            outcomes: Vec::with_capacity(symbols.len()),
        };

        for symbol in symbols {
            if shutdown.is_cancelled() {
                break;
            }
            let outcome = self.evaluate_symbol(&symbol).await;
            log_outcome(&symbol, &outcome);
            report.outcomes.push((symbol, outcome));
        }

        info!(
            emitted = report.emitted_count(),
            suppressed = report.suppressed_count(),
            "cycle complete"
        );
        report
    }

    /// Repeat cycles until `shutdown` fires. Cancellation is honoured between
    /// symbols and during the pause, never in the middle of a symbol.
    /// Returns the number of cycles started.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> u64 {
        info!(
            symbols = ?self.config.symbols,
            bias_tf = %self.config.timeframes.bias,
            confirm_tf = %self.config.timeframes.confirm,
            entry_tf = %self.config.timeframes.entry,
            interval_s = self.config.cycle_interval_seconds,
            "signal engine started"
        );

        let mut cycles = 0;
        while !shutdown.is_cancelled() {
            self.run_cycle_until(shutdown).await;
            cycles += 1;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.cycle_interval()) => {}
            }
        }

        info!(cycles, "signal engine stopped");
        cycles
    }

    // ===========================================
    // PARALLEL SCAN
    // ===========================================

    /// Evaluate all symbols from the current store contents on the rayon
    /// pool. Signals pass the dedup gate but are not delivered.
    pub fn scan_parallel(&self) -> CycleReport {
        let outcomes: Vec<(String, Outcome)> = self
            .config
            .symbols
            .par_iter()
            .map(|symbol| {
                let outcome = match self.evaluate_and_gate(symbol) {
                    Ok(signal) => Outcome::Emitted {
                        signal,
                        delivery: DeliveryStatus::NotAttempted,
                    },
                    Err(s) => Outcome::Suppressed(s),
                };
                (symbol.clone(), outcome)
            })
            .collect();

        for (symbol, outcome) in &outcomes {
            log_outcome(symbol, outcome);
        }
        CycleReport { outcomes }
    }
}

fn log_outcome(symbol: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Emitted { signal, delivery } => info!(
            symbol,
            direction = %signal.direction,
            entry = signal.entry,
            tp1 = signal.tp1,
            sl = signal.sl,
            delivery = ?delivery,
            "signal emitted"
        ),
        Outcome::Suppressed(s) => debug!(
            symbol,
            stage = %s.stage(),
            component = s.component(),
            reason = %s,
            "signal suppressed"
        ),
    }
}

// ============================================================
// TESTS
// ============================================================

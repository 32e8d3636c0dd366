//! # wyckoff-phase - Accumulation Phase Detection
//!
//! Scans a higher-timeframe OHLCV series for the events of a Wyckoff
//! accumulation schematic (SC, AR, ST, Spring, Test, LPS, SOS), classifies the
//! series into phases A-E, reports the phase active at the last bar and
//! projects a simplified point-and-figure price target.
//!
//! ## Quick Start
//!
//! ```rust
//! use wyckoff_phase::prelude::*;
//! use chrono::{TimeZone, Utc};
//!
//! let bars: Vec<Bar> = (0..30)
//!     .map(|i| {
//!         let time = Utc.timestamp_opt(1_700_000_000 + i * 3600, 0).unwrap();
//!         let low = 100.0 - (i as f64 - 10.0).abs();
//!         Bar::new(time, low + 1.0, low + 3.0, low, low + 2.0).with_volume(1000.0)
//!     })
//!     .collect();
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! let report = engine.analyze(&bars);
//! assert!(report.error.is_none());
//! ```

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use tracing::warn;

pub mod detectors;
pub mod frame;
pub mod params;
pub mod phases;
pub mod pnf;
pub mod report;

pub mod prelude {
    pub use crate::{
        // Engine
        analyze_parallel,
        // Detection
        detectors::{detect_events, Detection, Event, EventKind, Finding, Findings},
        // Input
        frame::OhlcvFrame,
        // Parameters
        params::{ParamMeta, ParamType, WyckoffConfig},
        phases::{CurrentPhase, Phase, PhaseLabel},
        pnf::PnfTargets,
        report::Report,
        Bar,
        BarTime,
        EngineBuilder,
        // Errors
        EngineError,
        InstrumentReport,
        PhaseEngine,
        Result,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while configuring the engine or reading a series
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
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

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Missing timestamp at index {index}")]
    MissingTimestamp { index: usize },

    #[error("Ambiguous index: timezone-naive and timezone-aware timestamps are mixed")]
    MixedTimezones,

    #[error("Index not strictly increasing at {index}")]
    NonMonotonicIndex { index: usize },

    #[error("Missing required OHLCV columns: {0}")]
    MissingColumns(String),

    #[error("Column {column} has {got} rows, index has {expected}")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Non-finite {field} at bar {index}")]
    NonFinite { index: usize, field: &'static str },
}

// ============================================================
// TIMESTAMPS
// ============================================================

/// Bar timestamp as supplied by the caller.
///
/// Naive stamps are interpreted as UTC. A series may not mix naive and
/// timezone-aware stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum BarTime {
    Offset(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
    Utc(DateTime<Utc>),
}

impl BarTime {
    #[inline]
    pub fn is_naive(&self) -> bool {
        matches!(self, BarTime::Naive(_))
    }

    #[inline]
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            BarTime::Utc(t) => t,
            BarTime::Offset(t) => t.with_timezone(&Utc),
            BarTime::Naive(t) => t.and_utc(),
        }
    }
}

impl From<DateTime<Utc>> for BarTime {
    fn from(t: DateTime<Utc>) -> Self {
        BarTime::Utc(t)
    }
}

impl From<DateTime<FixedOffset>> for BarTime {
    fn from(t: DateTime<FixedOffset>) -> Self {
        BarTime::Offset(t)
    }
}

impl From<NaiveDateTime> for BarTime {
    fn from(t: NaiveDateTime) -> Self {
        BarTime::Naive(t)
    }
}

// ============================================================
// OHLCV TRAIT
// ============================================================

/// Core OHLCV data trait
///
/// The engine only reads bars; derived series (average volume) are computed
/// on separate buffers.
pub trait OHLCV {
    fn timestamp(&self) -> Option<BarTime>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    /// `None` when the bar carries no volume. A series where every bar
    /// returns `None` is analysed with a flat volume profile.
    fn volume(&self) -> Option<f64> {
        None
    }
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn timestamp(&self) -> Option<BarTime> {
        (**self).timestamp()
    }

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

    fn volume(&self) -> Option<f64> {
        (**self).volume()
    }
}

/// Plain bar record
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub time: BarTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Bar {
    pub fn new(time: impl Into<BarTime>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time: time.into(),
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

impl OHLCV for Bar {
    fn timestamp(&self) -> Option<BarTime> {
        Some(self.time)
    }

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

    fn volume(&self) -> Option<f64> {
        self.volume
    }
}

/// Resolve the UTC index of a series, rejecting missing, ambiguous and
/// non-increasing timestamps.
pub fn utc_index<T: OHLCV>(bars: &[T]) -> Result<Vec<DateTime<Utc>>> {
    let mut times: Vec<DateTime<Utc>> = Vec::with_capacity(bars.len());
    let mut naive = 0usize;

    for (index, bar) in bars.iter().enumerate() {
        let stamp = bar
            .timestamp()
            .ok_or(EngineError::MissingTimestamp { index })?;
        if stamp.is_naive() {
            naive += 1;
        }
        let time = stamp.to_utc();
        if let Some(prev) = times.last() {
            if time <= *prev {
                return Err(EngineError::NonMonotonicIndex { index });
            }
        }
        times.push(time);
    }

    if naive > 0 && naive < times.len() {
        return Err(EngineError::MixedTimezones);
    }
    if naive > 0 {
        warn!("input index is timezone-naive, assuming UTC");
    }

    Ok(times)
}

// ============================================================
// PHASE ENGINE
// ============================================================

/// Accumulation phase engine. Holds only its configuration, so one engine
/// can serve any number of concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct PhaseEngine {
    config: params::WyckoffConfig,
    timeframe: Option<String>,
}

impl PhaseEngine {
    pub fn new(config: params::WyckoffConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            timeframe: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &params::WyckoffConfig {
        &self.config
    }

    /// Timeframe label attached to log output, e.g. `"H4"`
    #[inline]
    pub fn timeframe(&self) -> Option<&str> {
        self.timeframe.as_deref()
    }

    /// Analyse a series. Never fails: input problems and detection faults
    /// are reported through [`report::Report::error`].
    pub fn analyze<T: OHLCV>(&self, bars: &[T]) -> report::Report {
        let span = tracing::info_span!("analysis", timeframe = self.timeframe());
        let _enter = span.enter();
        report::assemble(bars, &self.config)
    }

    /// Analyse a column table, reporting column problems in the report.
    pub fn analyze_frame(&self, frame: &frame::OhlcvFrame) -> report::Report {
        match frame.to_bars() {
            Ok(bars) => self.analyze(&bars),
            Err(err) => {
                warn!(error = %err, "rejecting input frame");
                report::Report::rejected(&err)
            }
        }
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PhaseEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: params::WyckoffConfig,
    timeframe: Option<String>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: params::WyckoffConfig) -> Self {
        self.config = config;
        self
    }

    /// Volume averaging window
    pub fn pivot_lookback(mut self, bars: usize) -> Self {
        self.config.pivot_lookback = bars;
        self
    }

    pub fn volume_surge(mut self, multiplier: f64) -> Self {
        self.config.min_volume_surge_multiplier = multiplier;
        self
    }

    /// Bars after a Spring/Test/ST to look for Test and LPS
    pub fn spring_test_lookback(mut self, bars: usize) -> Self {
        self.config.spring_test_lookback = bars;
        self
    }

    pub fn min_bars(mut self, bars: usize) -> Self {
        self.config.min_bars = bars;
        self
    }

    /// Restrict the SC/LowPoint1 search to the first `bars` bars
    pub fn climax_search_bars(mut self, bars: usize) -> Self {
        self.config.climax_search_bars = Some(bars);
        self
    }

    /// Restrict the AR search after the anchor, and the ST search after AR,
    /// to the next `bars` bars
    pub fn rally_search_bars(mut self, bars: usize) -> Self {
        self.config.rally_search_bars = Some(bars);
        self
    }

    /// Label log output with the series timeframe
    pub fn timeframe(mut self, label: impl Into<String>) -> Self {
        self.timeframe = Some(label.into());
        self
    }

    pub fn pnf(mut self, box_size: f64, reversal: usize) -> Self {
        self.config.pnf_box_size = box_size;
        self.config.pnf_reversal = reversal;
        self
    }

    pub fn pnf_count(mut self, count_base: f64, aggressive_multiplier: f64) -> Self {
        self.config.pnf_count_base = count_base;
        self.config.pnf_aggressive_multiplier = aggressive_multiplier;
        self
    }

    pub fn enable_pnf(mut self, enable: bool) -> Self {
        self.config.enable_pnf_projection = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PhaseEngine> {
        let mut engine = PhaseEngine::new(self.config)?;
        engine.timeframe = self.timeframe;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Report for a single instrument
#[derive(Debug, Clone)]
pub struct InstrumentReport {
    pub symbol: String,
    pub report: report::Report,
}

/// Parallel analysis of multiple instruments, results in input order
pub fn analyze_parallel<'a, T, I>(engine: &PhaseEngine, instruments: I) -> Vec<InstrumentReport>
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            let span = tracing::info_span!("instrument", symbol, timeframe = engine.timeframe());
            let _enter = span.enter();
            InstrumentReport {
                symbol: symbol.to_string(),
                report: engine.analyze(bars),
            }
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn hour(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i)
    }

    fn flat_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::new(hour(i as i64), 100.0, 101.0, 99.0, 100.5).with_volume(1000.0))
            .collect()
    }

    #[test]
    fn test_bar_time_conversion() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(BarTime::from(naive).to_utc(), hour(0));

        let offset = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 2, 0, 0)
            .unwrap();
        assert_eq!(BarTime::from(offset).to_utc(), hour(0));
        assert!(!BarTime::from(offset).is_naive());
    }

    #[test]
    fn test_utc_index_ok() {
        let bars = flat_bars(5);
        let index = utc_index(&bars).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index[4], hour(4));
    }

    #[test]
    fn test_utc_index_non_monotonic() {
        let mut bars = flat_bars(5);
        bars[3].time = hour(1).into();
        assert_eq!(
            utc_index(&bars),
            Err(EngineError::NonMonotonicIndex { index: 3 })
        );
    }

    #[test]
    fn test_utc_index_mixed_timezones() {
        let mut bars = flat_bars(3);
        bars[1].time = BarTime::Naive(hour(1).naive_utc());
        assert_eq!(utc_index(&bars), Err(EngineError::MixedTimezones));
    }

    #[test]
    fn test_utc_index_all_naive() {
        let bars: Vec<Bar> = flat_bars(3)
            .into_iter()
            .map(|mut b| {
                b.time = BarTime::Naive(b.time.to_utc().naive_utc());
                b
            })
            .collect();
        assert_eq!(utc_index(&bars).unwrap()[2], hour(2));
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().pivot_lookback(30).pnf(0.5, 3).build();
        assert!(engine.is_ok());
        assert_eq!(engine.unwrap().config().pivot_lookback, 30);
    }

    #[test]
    fn test_engine_builder_timeframe_and_rally_window() {
        let engine = EngineBuilder::new()
            .timeframe("H4")
            .rally_search_bars(15)
            .build()
            .unwrap();
        assert_eq!(engine.timeframe(), Some("H4"));
        assert_eq!(engine.config().rally_search_bars, Some(15));
        assert_eq!(EngineBuilder::new().build().unwrap().timeframe(), None);

        // the label only affects diagnostics
        let bars = flat_bars(25);
        let plain = EngineBuilder::new().rally_search_bars(15).build().unwrap();
        assert_eq!(engine.analyze(&bars), plain.analyze(&bars));
    }

    #[test]
    fn test_engine_builder_rejects_bad_config() {
        assert!(EngineBuilder::new().pivot_lookback(0).build().is_err());
        assert!(EngineBuilder::new().pnf(-1.0, 3).build().is_err());
    }

    #[test]
    fn test_empty_analyze() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars: Vec<Bar> = vec![];
        let report = engine.analyze(&bars);
        assert!(report.error.is_some());
        assert!(report.detected_events.is_empty());
    }

    #[test]
    fn test_analyze_through_references() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars = flat_bars(25);
        let refs: Vec<&Bar> = bars.iter().collect();
        assert_eq!(engine.analyze(&refs), engine.analyze(&bars));
    }

    #[test]
    fn test_parallel_analyze() {
        let engine = EngineBuilder::new().build().unwrap();

        let bars1 = flat_bars(30);
        let bars2 = flat_bars(5);

        let instruments: Vec<(&str, &[Bar])> = vec![("BTC", &bars1), ("ETH", &bars2)];

        let results = analyze_parallel(&engine, instruments);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].symbol, "BTC");
        assert!(results[0].report.error.is_none());
        assert!(results[1].report.error.is_some());
    }
}

//! Event detector
//!
//! Each step reads the [`Findings`] produced so far and either extends them
//! with one event, passes them through unchanged, or halts the chain. A fault
//! inside a step keeps everything found before it.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::helpers::{first_close_above, highest_high, lowest_low, lowest_low_below, window};
use super::volume::average_volume;
use crate::params::WyckoffConfig;
use crate::{EngineError, Result, OHLCV};

// ============================================================
// EVENT TYPES
// ============================================================

/// Kind of accumulation event. Ordered by position in the schematic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum EventKind {
    /// Selling Climax: the anchor low on climactic volume
    SC,
    /// The anchor low without a volume surge
    LowPoint1,
    /// Automatic Rally
    AR,
    /// Secondary Test
    ST,
    Spring,
    /// Test of the Spring
    Test,
    /// Last Point of Support
    LPS,
    /// Sign of Strength
    SOS,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SC => "SC",
            EventKind::LowPoint1 => "LowPoint1",
            EventKind::AR => "AR",
            EventKind::ST => "ST",
            EventKind::Spring => "Spring",
            EventKind::Test => "Test",
            EventKind::LPS => "LPS",
            EventKind::SOS => "SOS",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected event as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub price: f64,
    pub time: DateTime<Utc>,
    /// Bar volume, 0 when the series has none
    pub volume: f64,
}

/// An event together with the bar it was found on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Finding {
    pub index: usize,
    pub event: Event,
}

// ============================================================
// PRIORITY LISTS
// ============================================================

/// The anchor low
pub const ANCHOR: &[EventKind] = &[EventKind::SC, EventKind::LowPoint1];
/// Reference bar the LPS search starts after
pub const LPS_REFERENCE: &[EventKind] = &[EventKind::Test, EventKind::Spring, EventKind::ST];
/// Phase C reference the SOS search starts after
pub const PHASE_C_REFERENCE: &[EventKind] = &[EventKind::Test, EventKind::Spring, EventKind::LPS];
/// Base of the point-and-figure projection
pub const PNF_BASE: &[EventKind] = &[EventKind::LPS, EventKind::Spring, EventKind::ST];

// ============================================================
// FINDINGS
// ============================================================

/// Events found so far, at most one per kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    found: BTreeMap<EventKind, Finding>,
}

impl Findings {
    #[inline]
    pub fn get(&self, kind: EventKind) -> Option<&Finding> {
        self.found.get(&kind)
    }

    #[inline]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.found.contains_key(&kind)
    }

    /// Ordered-candidate resolver: the first kind in `priority` that was
    /// found, together with its kind. Every "X, else Y, else Z" fallback in
    /// the crate goes through here with one of the priority lists above.
    pub fn first_of(&self, priority: &[EventKind]) -> Option<(EventKind, &Finding)> {
        priority
            .iter()
            .find_map(|&kind| self.found.get(&kind).map(|f| (kind, f)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.found.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventKind, &Finding)> {
        self.found.iter().map(|(k, f)| (*k, f))
    }

    /// Events keyed by kind, without bar indices
    pub fn events(&self) -> BTreeMap<EventKind, Event> {
        self.found.iter().map(|(k, f)| (*k, f.event)).collect()
    }

    fn with(&self, kind: EventKind, finding: Finding) -> Self {
        let mut next = self.clone();
        next.found.insert(kind, finding);
        next
    }
}

impl FromIterator<(EventKind, Finding)> for Findings {
    fn from_iter<I: IntoIterator<Item = (EventKind, Finding)>>(iter: I) -> Self {
        Self {
            found: iter.into_iter().collect(),
        }
    }
}

// ============================================================
// DETECTOR
// ============================================================

/// Outcome of a detection pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub findings: Findings,
    /// Fault that stopped the pass early, if any
    pub fault: Option<EngineError>,
}

enum Gate {
    Continue(Findings),
    Halt,
}

struct Scan<'a, T> {
    bars: &'a [T],
    times: &'a [DateTime<Utc>],
    avg_volume: Vec<f64>,
    config: &'a WyckoffConfig,
}

impl<T: OHLCV> Scan<'_, T> {
    fn finding(&self, index: usize, price: f64) -> Finding {
        Finding {
            index,
            event: Event {
                price,
                time: self.times[index],
                volume: self.volume_at(index),
            },
        }
    }

    #[inline]
    fn volume_at(&self, index: usize) -> f64 {
        self.bars[index]
            .volume()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    #[inline]
    fn len(&self) -> usize {
        self.bars.len()
    }

    /// Bars after `gate` searched for AR or ST
    fn rally_range(&self, gate: usize) -> Range<usize> {
        match self.config.rally_search_bars {
            Some(bars) => window(gate + 1, bars, self.len()),
            None => gate + 1..self.len(),
        }
    }
}

type Step<T> = fn(&Scan<'_, T>, &Findings) -> Result<Gate>;

/// Run the detector over `bars`, whose UTC index is `times`.
///
/// An index of a different length than `bars` is reported as a fault with
/// no findings.
pub fn detect_events<T: OHLCV>(
    bars: &[T],
    times: &[DateTime<Utc>],
    config: &WyckoffConfig,
) -> Detection {
    if bars.len() != times.len() {
        return Detection {
            findings: Findings::default(),
            fault: Some(EngineError::ColumnLength {
                column: "time",
                expected: bars.len(),
                got: times.len(),
            }),
        };
    }

    let scan = Scan {
        bars,
        times,
        avg_volume: average_volume(bars, config.pivot_lookback, config.volume_min_periods()),
        config,
    };

    let steps: [Step<T>; 7] = [
        climax,
        automatic_rally,
        secondary_test,
        spring,
        test_of_spring,
        last_point_of_support,
        sign_of_strength,
    ];

    let mut findings = Findings::default();
    for step in steps {
        match step(&scan, &findings) {
            Ok(Gate::Continue(next)) => findings = next,
            Ok(Gate::Halt) => break,
            Err(fault) => {
                return Detection {
                    findings,
                    fault: Some(fault),
                }
            },
        }
    }

    Detection {
        findings,
        fault: None,
    }
}

fn climax<T: OHLCV>(scan: &Scan<'_, T>, found: &Findings) -> Result<Gate> {
    let limit = scan
        .config
        .climax_search_bars
        .map_or(scan.len(), |n| n.min(scan.len()));

    let Some((index, low)) = lowest_low(scan.bars, 0..limit)? else {
        return Ok(Gate::Halt);
    };

    let finding = scan.finding(index, low);
    let threshold = scan.config.min_volume_surge_multiplier * scan.avg_volume[index];
    let kind = if finding.event.volume >= threshold {
        EventKind::SC
    } else {
        EventKind::LowPoint1
    };
    debug!(%kind, index, price = low, volume = finding.event.volume, threshold, "anchor low");

    Ok(Gate::Continue(found.with(kind, finding)))
}

fn automatic_rally<T: OHLCV>(scan: &Scan<'_, T>, found: &Findings) -> Result<Gate> {
    let Some((_, anchor)) = found.first_of(ANCHOR) else {
        return Ok(Gate::Halt);
    };
    if scan.len() - anchor.index < 2 {
        return Ok(Gate::Halt);
    }

    match highest_high(scan.bars, scan.rally_range(anchor.index))? {
        Some((index, high)) => {
            debug!(index, price = high, "AR");
            Ok(Gate::Continue(found.with(EventKind::AR, scan.finding(index, high))))
        },
        None => Ok(Gate::Halt),
    }
}

fn secondary_test<T: OHLCV>(scan: &Scan<'_, T>, found: &Findings) -> Result<Gate> {
    let Some(ar) = found.get(EventKind::AR) else {
        return Ok(Gate::Halt);
    };
    if scan.len() - ar.index < 2 {
        return Ok(Gate::Halt);
    }

    match lowest_low(scan.bars, scan.rally_range(ar.index))? {
        Some((index, low)) => {
            debug!(index, price = low, "ST");
            Ok(Gate::Continue(found.with(EventKind::ST, scan.finding(index, low))))
        },
        None => Ok(Gate::Halt),
    }
}

fn spring<T: OHLCV>(scan: &Scan<'_, T>, found: &Findings) -> Result<Gate> {
    let (Some((_, anchor)), Some(st)) = (found.first_of(ANCHOR), found.get(EventKind::ST)) else {
        return Ok(Gate::Halt);
    };

    let support = anchor.event.price.min(st.event.price);
    let range = st.index + 1..scan.len();
    match lowest_low_below(scan.bars, range, support)? {
        Some((index, low)) => {
            debug!(index, price = low, support, "Spring");
            Ok(Gate::Continue(found.with(EventKind::Spring, scan.finding(index, low))))
        },
        None => Ok(Gate::Continue(found.clone())),
    }
}

fn test_of_spring<T: OHLCV>(scan: &Scan<'_, T>, found: &Findings) -> Result<Gate> {
    let Some(spring) = found.get(EventKind::Spring) else {
        return Ok(Gate::Continue(found.clone()));
    };

    let range = window(spring.index + 1, scan.config.spring_test_lookback, scan.len());
    match lowest_low(scan.bars, range)? {
        Some((index, low)) if low > spring.event.price => {
            debug!(index, price = low, "Test");
            Ok(Gate::Continue(found.with(EventKind::Test, scan.finding(index, low))))
        },
        _ => Ok(Gate::Continue(found.clone())),
    }
}

fn last_point_of_support<T: OHLCV>(scan: &Scan<'_, T>, found: &Findings) -> Result<Gate> {
    let Some((reference_kind, reference)) = found.first_of(LPS_REFERENCE) else {
        return Ok(Gate::Continue(found.clone()));
    };

    let lookback = scan.config.spring_test_lookback;
    // The whole window must be available
    if scan.len() - reference.index <= lookback {
        return Ok(Gate::Continue(found.clone()));
    }

    let range = window(reference.index + 1, lookback, scan.len());
    match lowest_low(scan.bars, range)? {
        Some((index, low)) if low > reference.event.price => {
            debug!(index, price = low, reference = %reference_kind, "LPS");
            Ok(Gate::Continue(found.with(EventKind::LPS, scan.finding(index, low))))
        },
        _ => Ok(Gate::Continue(found.clone())),
    }
}

fn sign_of_strength<T: OHLCV>(scan: &Scan<'_, T>, found: &Findings) -> Result<Gate> {
    let (Some(ar), Some((reference_kind, reference))) =
        (found.get(EventKind::AR), found.first_of(PHASE_C_REFERENCE))
    else {
        return Ok(Gate::Continue(found.clone()));
    };

    let resistance = ar.event.price;
    let range = reference.index + 1..scan.len();
    match first_close_above(scan.bars, range, resistance)? {
        Some((index, close)) => {
            debug!(index, price = close, resistance, reference = %reference_kind, "SOS");
            Ok(Gate::Continue(found.with(EventKind::SOS, scan.finding(index, close))))
        },
        None => Ok(Gate::Continue(found.clone())),
    }
}

// ============================================================
// TESTS
// ============================================================

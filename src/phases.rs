//! Phase classification
//!
//! Maps detected events onto the five accumulation phases:
//!
//! | Phase | Span | Meaning |
//! |---|---|---|
//! | A | anchor .. AR | stopping action |
//! | B | AR .. ST | building cause |
//! | C | end of B .. Test/Spring (or LPS) | the test |
//! | D | end of C .. SOS (or LPS) | markup within range |
//! | E | end of D .. open | markup trend |
//!
//! Each phase starts where the previous one ended.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::detectors::{EventKind, Findings, ANCHOR};
use crate::EngineError;

/// Phase label
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum PhaseLabel {
    A,
    B,
    C,
    D,
    E,
}

impl PhaseLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseLabel::A => "A",
            PhaseLabel::B => "B",
            PhaseLabel::C => "C",
            PhaseLabel::D => "D",
            PhaseLabel::E => "E",
        }
    }
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseLabel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(PhaseLabel::A),
            "B" => Ok(PhaseLabel::B),
            "C" => Ok(PhaseLabel::C),
            "D" => Ok(PhaseLabel::D),
            "E" => Ok(PhaseLabel::E),
            _ => Err(EngineError::InvalidValue("unknown phase label")),
        }
    }
}

/// A time-bounded phase. Only phase E is open-ended.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Phase {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub description: String,
}

impl Phase {
    fn closed(start: DateTime<Utc>, end: DateTime<Utc>, description: &str) -> Self {
        Self {
            start,
            end: Some(end),
            description: description.to_string(),
        }
    }

    /// True when `time` falls inside the phase, both bounds inclusive
    #[inline]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && self.end.map_or(true, |end| time <= end)
    }
}

/// Phase active at the last bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CurrentPhase {
    Known(PhaseLabel),
    Unknown,
}

impl CurrentPhase {
    #[inline]
    pub fn label(self) -> Option<PhaseLabel> {
        match self {
            CurrentPhase::Known(label) => Some(label),
            CurrentPhase::Unknown => None,
        }
    }
}

impl fmt::Display for CurrentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentPhase::Known(label) => f.write_str(label.as_str()),
            CurrentPhase::Unknown => f.write_str("Unknown"),
        }
    }
}

impl From<CurrentPhase> for String {
    fn from(phase: CurrentPhase) -> Self {
        phase.to_string()
    }
}

impl TryFrom<String> for CurrentPhase {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "Unknown" {
            return Ok(CurrentPhase::Unknown);
        }
        s.parse().map(CurrentPhase::Known)
    }
}

// ============================================================
// CLASSIFIER
// ============================================================

/// Classify phases from the detected events.
///
/// Without both an anchor low and an AR no phases are produced.
pub fn classify(found: &Findings) -> BTreeMap<PhaseLabel, Phase> {
    let mut phases = BTreeMap::new();

    let time_of = |kind: EventKind| found.get(kind).map(|f| f.event.time);

    let (Some((_, anchor)), Some(ar)) = (found.first_of(ANCHOR), time_of(EventKind::AR)) else {
        return phases;
    };
    phases.insert(PhaseLabel::A, Phase::closed(anchor.event.time, ar, "Stopping Action"));
    let mut last = ar;

    if let Some(st) = time_of(EventKind::ST).filter(|&st| st > last) {
        phases.insert(PhaseLabel::B, Phase::closed(last, st, "Building Cause"));
        last = st;
    }

    let lps = time_of(EventKind::LPS);
    let spring = time_of(EventKind::Spring).filter(|&spring| spring > last);
    let phase_c_end = if let Some(spring) = spring {
        let end = time_of(EventKind::Test)
            .filter(|&test| test > spring)
            .unwrap_or(spring);
        phases.insert(PhaseLabel::C, Phase::closed(last, end, "Test (Spring/Test)"));
        Some(end)
    } else if let Some(lps) = lps.filter(|&lps| lps > last) {
        phases.insert(PhaseLabel::C, Phase::closed(last, lps, "Test (LPS)"));
        Some(lps)
    } else {
        None
    };
    if let Some(end) = phase_c_end {
        last = end;
    }

    if let Some(sos) = time_of(EventKind::SOS).filter(|&sos| sos > last) {
        phases.insert(
            PhaseLabel::D,
            Phase::closed(last, sos, "Markup within Range / SOS"),
        );
        last = sos;
    } else if let Some(lps) = lps.filter(|&lps| lps > last) {
        phases.insert(
            PhaseLabel::D,
            Phase::closed(last, lps, "Markup within Range (LPS)"),
        );
        last = lps;
    }

    if phases.contains_key(&PhaseLabel::D) {
        phases.insert(
            PhaseLabel::E,
            Phase {
                start: last,
                end: None,
                description: "Markup Trend".to_string(),
            },
        );
    }

    phases
}

/// The last phase (by start) containing `last_bar`. Falls back to the
/// latest phase when none contains it, and to `Unknown` without phases.
pub fn current_phase(phases: &BTreeMap<PhaseLabel, Phase>, last_bar: DateTime<Utc>) -> CurrentPhase {
    let mut ordered: Vec<(&PhaseLabel, &Phase)> = phases.iter().collect();
    ordered.sort_by_key(|(label, phase)| (phase.start, **label));

    ordered
        .iter()
        .rev()
        .find(|(_, phase)| phase.contains(last_bar))
        .or_else(|| ordered.last())
        .map_or(CurrentPhase::Unknown, |(label, _)| CurrentPhase::Known(**label))
}

// ============================================================
// TESTS
// ============================================================

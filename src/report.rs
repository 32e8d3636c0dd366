//! Analysis report and the pipeline that assembles it

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::detectors::{detect_events, Event, EventKind};
use crate::params::WyckoffConfig;
use crate::phases::{classify, current_phase, CurrentPhase, Phase, PhaseLabel};
use crate::pnf::{project, PnfTargets};
use crate::{utc_index, EngineError, OHLCV};

/// Result of one analysis. Times serialize as RFC 3339 UTC strings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Report {
    pub detected_events: BTreeMap<EventKind, Event>,
    pub phase_classification: BTreeMap<PhaseLabel, Phase>,
    pub current_phase: CurrentPhase,
    pub pnf_targets: Option<PnfTargets>,
    pub error: Option<String>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            detected_events: BTreeMap::new(),
            phase_classification: BTreeMap::new(),
            current_phase: CurrentPhase::Unknown,
            pnf_targets: None,
            error: None,
        }
    }
}

impl Report {
    /// Empty report carrying an input error
    pub fn rejected(err: &EngineError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    #[inline]
    pub fn event(&self, kind: EventKind) -> Option<&Event> {
        self.detected_events.get(&kind)
    }

    #[inline]
    pub fn phase(&self, label: PhaseLabel) -> Option<&Phase> {
        self.phase_classification.get(&label)
    }
}

/// Validate the series, then run detection, classification and projection.
pub fn assemble<T: OHLCV>(bars: &[T], config: &WyckoffConfig) -> Report {
    info!(bars = bars.len(), "running accumulation phase detection");

    if bars.len() < config.min_bars {
        let err = EngineError::InsufficientData {
            need: config.min_bars,
            got: bars.len(),
        };
        warn!(error = %err, "rejecting input");
        return Report::rejected(&err);
    }

    let times = match utc_index(bars) {
        Ok(times) => times,
        Err(err) => {
            warn!(error = %err, "rejecting input");
            return Report::rejected(&err);
        },
    };

    let detection = detect_events(bars, &times, config);
    let error = detection.fault.as_ref().map(|fault| {
        error!(error = %fault, found = detection.findings.len(), "event detection stopped");
        format!("Event detection error: {fault}")
    });

    let phases = classify(&detection.findings);
    let current = match times.last() {
        Some(&last) => current_phase(&phases, last),
        None => CurrentPhase::Unknown,
    };

    let report = Report {
        detected_events: detection.findings.events(),
        phase_classification: phases,
        current_phase: current,
        pnf_targets: project(&detection.findings, config),
        error,
    };

    info!(current_phase = %report.current_phase, events = report.detected_events.len(), "analysis complete");
    report
}

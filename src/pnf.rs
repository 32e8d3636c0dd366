//! Point-and-figure price targets
//!
//! The horizontal count is the configured `pnf_count_base`, a placeholder
//! for a count read off a constructed PnF chart. Targets are
//! `base + count * box_size * reversal`, with the aggressive target scaling
//! the count by `pnf_aggressive_multiplier`.

use crate::detectors::{EventKind, Findings, PNF_BASE};
use crate::params::WyckoffConfig;

pub const CALCULATION_NOTE: &str = "Placeholder PnF count used. Requires real PnF chart analysis.";

/// Projected targets and the inputs they were derived from.
///
/// Prices are rounded to 2 decimals, so box size changes smaller than a
/// cent of projected distance leave the targets unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PnfTargets {
    pub target_conservative: Option<f64>,
    pub target_aggressive: Option<f64>,
    pub projection_base_price: Option<f64>,
    pub base_event: Option<EventKind>,
    pub pnf_count_base: f64,
    pub box_size: f64,
    pub reversal: usize,
    pub calculation_note: String,
}

/// Project targets from the LPS, else Spring, else ST.
///
/// Returns `None` when projection is disabled or none of those events was
/// found.
pub fn project(found: &Findings, config: &WyckoffConfig) -> Option<PnfTargets> {
    if !config.enable_pnf_projection {
        return None;
    }
    let (kind, base) = found.first_of(PNF_BASE)?;
    let base_price = base.event.price;

    let column = config.pnf_box_size * config.pnf_reversal as f64;
    let conservative = base_price + config.pnf_count_base * column;
    let aggressive =
        base_price + config.pnf_count_base * config.pnf_aggressive_multiplier * column;

    Some(PnfTargets {
        target_conservative: round2(conservative),
        target_aggressive: round2(aggressive),
        projection_base_price: round2(base_price),
        base_event: Some(kind),
        pnf_count_base: config.pnf_count_base,
        box_size: config.pnf_box_size,
        reversal: config.pnf_reversal,
        calculation_note: CALCULATION_NOTE.to_string(),
    })
}

#[inline]
fn round2(value: f64) -> Option<f64> {
    value.is_finite().then(|| (value * 100.0).round() / 100.0)
}

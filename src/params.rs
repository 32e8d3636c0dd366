//! Engine configuration and parameter metadata
//!
//! [`WyckoffConfig`] carries every tunable of the detector, classifier and
//! target projector. Each field has a [`ParamMeta`] entry, enabling:
//! - Validation of user supplied values
//! - Parameter sweeps via [`ParamMeta::generate_grid`]
//! - Construction from a loosely typed numeric map
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use wyckoff_phase::params::WyckoffConfig;
//!
//! let mut params = HashMap::new();
//! params.insert("pivot_lookback", 30.0);
//! params.insert("enable_pnf_projection", 0.0);
//!
//! let config = WyckoffConfig::with_params(&params).unwrap();
//! assert_eq!(config.pivot_lookback, 30);
//! assert!(!config.enable_pnf_projection);
//! assert_eq!(config.spring_test_lookback, 5);
//! ```

use std::collections::HashMap;

use crate::{EngineError, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Bar count (positive integer)
  Period,
  /// Positive real multiplier or price unit
  Factor,
  /// Boolean switch encoded as 0.0 / 1.0
  Flag,
  /// Optional bar count, 0.0 meaning "whole series"
  Window,
}

/// Metadata for a single engine parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name, identical to the config field and serde key
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for validation and sweeps: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn new(
    name: &'static str,
    param_type: ParamType,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(EngineError::InvalidValue("parameter cannot be NaN or infinite"));
    }
    let (min, max, _) = self.range;
    // Window 0 disables the restriction and sits outside the bar range
    if self.param_type == ParamType::Window && value == 0.0 {
      return Ok(());
    }
    if value < min || value > max {
      return Err(EngineError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period | ParamType::Window => {
        if value.fract() != 0.0 {
          return Err(EngineError::InvalidValue("bar counts must be whole numbers"));
        }
        Ok(())
      },
      ParamType::Flag => {
        if value != 0.0 && value != 1.0 {
          return Err(EngineError::InvalidValue("flags must be 0 or 1"));
        }
        Ok(())
      },
      ParamType::Factor => Ok(()),
    }
  }
}

const PARAMS: &[ParamMeta] = &[
  ParamMeta::new(
    "pivot_lookback",
    ParamType::Period,
    20.0,
    (2.0, 500.0, 1.0),
    "Rolling volume window used to judge climactic volume at the low",
  ),
  ParamMeta::new(
    "min_volume_surge_multiplier",
    ParamType::Factor,
    1.8,
    (0.0, 20.0, 0.1),
    "Volume at the low must reach this multiple of average volume to count as SC",
  ),
  ParamMeta::new(
    "spring_test_lookback",
    ParamType::Period,
    5.0,
    (1.0, 200.0, 1.0),
    "Bars after Spring/Test/ST searched for Test and LPS",
  ),
  ParamMeta::new(
    "enable_pnf_projection",
    ParamType::Flag,
    1.0,
    (0.0, 1.0, 1.0),
    "Attach point-and-figure targets to the report",
  ),
  ParamMeta::new(
    "pnf_box_size",
    ParamType::Factor,
    1.0,
    (1e-9, 1e9, 0.5),
    "Point-and-figure box size in price units",
  ),
  ParamMeta::new(
    "pnf_reversal",
    ParamType::Period,
    3.0,
    (1.0, 20.0, 1.0),
    "Point-and-figure reversal box count",
  ),
  ParamMeta::new(
    "pnf_count_base",
    ParamType::Factor,
    10.0,
    (0.0, 1000.0, 1.0),
    "Placeholder horizontal count standing in for a real PnF chart count",
  ),
  ParamMeta::new(
    "pnf_aggressive_multiplier",
    ParamType::Factor,
    1.5,
    (1.0, 10.0, 0.1),
    "Count multiplier for the aggressive target",
  ),
  ParamMeta::new(
    "min_bars",
    ParamType::Period,
    20.0,
    (2.0, 100_000.0, 1.0),
    "Minimum series length accepted by the engine",
  ),
  ParamMeta::new(
    "climax_search_bars",
    ParamType::Window,
    0.0,
    (2.0, 100_000.0, 1.0),
    "Restrict the SC/LowPoint1 search to the first N bars (0 = whole series)",
  ),
  ParamMeta::new(
    "rally_search_bars",
    ParamType::Window,
    0.0,
    (2.0, 100_000.0, 1.0),
    "Search AR and ST within N bars of their gating event (0 = rest of series)",
  ),
];

// ============================================================
// CONFIG
// ============================================================

/// Engine configuration. Missing keys deserialize to their defaults.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WyckoffConfig {
  pub pivot_lookback: usize,
  pub min_volume_surge_multiplier: f64,
  pub spring_test_lookback: usize,
  pub enable_pnf_projection: bool,
  pub pnf_box_size: f64,
  pub pnf_reversal: usize,
  /// Placeholder box count, not derived from a constructed PnF chart.
  pub pnf_count_base: f64,
  pub pnf_aggressive_multiplier: f64,
  pub min_bars: usize,
  pub climax_search_bars: Option<usize>,
  /// Bounds the AR search after the anchor and the ST search after AR.
  /// `None` searches the rest of the series.
  pub rally_search_bars: Option<usize>,
}

impl Default for WyckoffConfig {
  fn default() -> Self {
    Self {
      pivot_lookback: 20,
      min_volume_surge_multiplier: 1.8,
      spring_test_lookback: 5,
      enable_pnf_projection: true,
      pnf_box_size: 1.0,
      pnf_reversal: 3,
      pnf_count_base: 10.0,
      pnf_aggressive_multiplier: 1.5,
      min_bars: 20,
      climax_search_bars: None,
      rally_search_bars: None,
    }
  }
}

impl WyckoffConfig {
  /// Returns metadata for all configurable parameters
  pub fn param_meta() -> &'static [ParamMeta] {
    PARAMS
  }

  /// Creates a config from a numeric map. Missing parameters use their
  /// default values, unknown keys are rejected.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    if let Some(unknown) = params.keys().find(|k| meta(k).is_none()) {
      return Err(EngineError::InvalidConfig(format!("unknown parameter '{unknown}'")));
    }

    let climax_window = get_count(params, "climax_search_bars")?;
    let rally_window = get_count(params, "rally_search_bars")?;
    let config = Self {
      pivot_lookback: get_count(params, "pivot_lookback")?,
      min_volume_surge_multiplier: get_factor(params, "min_volume_surge_multiplier")?,
      spring_test_lookback: get_count(params, "spring_test_lookback")?,
      enable_pnf_projection: get_flag(params, "enable_pnf_projection")?,
      pnf_box_size: get_factor(params, "pnf_box_size")?,
      pnf_reversal: get_count(params, "pnf_reversal")?,
      pnf_count_base: get_factor(params, "pnf_count_base")?,
      pnf_aggressive_multiplier: get_factor(params, "pnf_aggressive_multiplier")?,
      min_bars: get_count(params, "min_bars")?,
      climax_search_bars: (climax_window > 0).then_some(climax_window),
      rally_search_bars: (rally_window > 0).then_some(rally_window),
    };
    config.validate()?;
    Ok(config)
  }

  /// Check every field against its [`ParamMeta`] range
  pub fn validate(&self) -> Result<()> {
    let values = [
      ("pivot_lookback", self.pivot_lookback as f64),
      ("min_volume_surge_multiplier", self.min_volume_surge_multiplier),
      ("spring_test_lookback", self.spring_test_lookback as f64),
      ("enable_pnf_projection", if self.enable_pnf_projection { 1.0 } else { 0.0 }),
      ("pnf_box_size", self.pnf_box_size),
      ("pnf_reversal", self.pnf_reversal as f64),
      ("pnf_count_base", self.pnf_count_base),
      ("pnf_aggressive_multiplier", self.pnf_aggressive_multiplier),
      ("min_bars", self.min_bars as f64),
      ("climax_search_bars", self.climax_search_bars.unwrap_or(0) as f64),
      ("rally_search_bars", self.rally_search_bars.unwrap_or(0) as f64),
    ];
    for (name, value) in values {
      if let Some(m) = meta(name) {
        m.validate(value)?;
      }
    }
    Ok(())
  }

  /// Minimum periods for the rolling volume average
  #[inline]
  pub fn volume_min_periods(&self) -> usize {
    (self.pivot_lookback / 2).max(1)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn meta(name: &str) -> Option<&'static ParamMeta> {
  PARAMS.iter().find(|m| m.name == name)
}

fn get_value(params: &HashMap<&str, f64>, key: &'static str) -> Result<f64> {
  let m = meta(key).ok_or(EngineError::InvalidValue("unknown parameter"))?;
  let value = params.get(key).copied().unwrap_or(m.default);
  m.validate(value)?;
  Ok(value)
}

fn get_count(params: &HashMap<&str, f64>, key: &'static str) -> Result<usize> {
  get_value(params, key).map(|v| v as usize)
}

fn get_factor(params: &HashMap<&str, f64>, key: &'static str) -> Result<f64> {
  get_value(params, key)
}

fn get_flag(params: &HashMap<&str, f64>, key: &'static str) -> Result<bool> {
  get_value(params, key).map(|v| v == 1.0)
}

// ============================================================
// TESTS
// ============================================================

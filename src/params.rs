//! Scan configuration and parameter metadata for pattern detectors
//!
//! Every tunable value the engine reads lives in [`ScanConfig`]. The
//! per-detector parameter groups also carry [`ParamMeta`] tables, enabling:
//! - Grid search optimization
//! - Parameter documentation
//! - Building detectors from loose `name -> value` maps
//!
//! # Example
//!
//! ```rust
//! use chartscan::params::{ParameterizedDetector, ScanConfig};
//! use chartscan::prelude::*;
//!
//! let config = ScanConfig::from_toml_str(
//!   r#"
//!   min_history_bars = 80
//!
//!   [detectors.double]
//!   price_tolerance = 0.015
//!   "#,
//! )
//! .unwrap();
//! assert_eq!(config.min_history_bars, 80);
//!
//! for param in DoubleTopDetector::param_meta() {
//!   println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{breakout::BreakoutPolicy, PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Unbounded positive multiple (e.g. shadow-to-body 2.0)
  Scalar,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "price_tolerance")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Create a new ParamMeta for a Scalar parameter
  pub const fn scalar(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Scalar, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    if step <= 0.0 {
      return vec![min];
    }
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio | ParamType::Scalar => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for detectors that support parameterization
///
/// Implementing this trait enables:
/// - Discovery of available parameters
/// - Creation of detectors with custom parameter values
/// - Grid search optimization
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a detector with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the pattern wire name
  fn pattern_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 1.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Helper to get a finite, positive scalar from params with default fallback
pub fn get_scalar(params: &HashMap<&str, f64>, key: &'static str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  positive(key, value)?;
  Ok(value)
}

fn positive(field: &'static str, value: f64) -> Result<()> {
  if !value.is_finite() || value <= 0.0 {
    return Err(PatternError::OutOfRange { field, value, min: f64::MIN_POSITIVE, max: f64::MAX });
  }
  Ok(())
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
  if !value.is_finite() || value < 0.0 {
    return Err(PatternError::OutOfRange { field, value, min: 0.0, max: f64::MAX });
  }
  Ok(())
}

fn at_least(field: &'static str, value: usize, min: usize) -> Result<()> {
  if value < min {
    return Err(PatternError::InvalidConfig(format!("{field} must be >= {min}, got {value}")));
  }
  Ok(())
}

// ============================================================
// PIVOTS
// ============================================================

/// Zigzag pivot extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
  /// Rolling true-range window
  pub atr_period: Period,
  /// Reversal threshold in ATRs at sensitivity 1.0
  pub atr_multiple: f64,
  /// Floor on the reversal threshold as a fraction of close
  pub min_move_pct: f64,
  /// Keep only the most recent pivots (0 keeps all)
  pub max_pivots: usize,
}

impl Default for PivotConfig {
  fn default() -> Self {
    Self { atr_period: Period::new_const(14), atr_multiple: 1.5, min_move_pct: 0.0, max_pivots: 24 }
  }
}

impl PivotConfig {
  pub fn validate(&self) -> Result<()> {
    positive("pivots.atr_multiple", self.atr_multiple)?;
    non_negative("pivots.min_move_pct", self.min_move_pct)
  }
}

// ============================================================
// DETECTOR PARAMETERS
// ============================================================

/// Converging-trendline triangles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleParams {
  /// Trailing pivots fitted
  pub window: usize,
  pub min_pivots: usize,
  /// Max relative drift of a line still called flat
  pub flat_tolerance: f64,
  /// Required narrowing of the channel across the window
  pub min_convergence: Ratio,
}

impl Default for TriangleParams {
  fn default() -> Self {
    Self { window: 6, min_pivots: 4, flat_tolerance: 0.01, min_convergence: Ratio::new_const(0.2) }
  }
}

static TRIANGLE_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("window", 6.0, (4.0, 10.0, 1.0), "Trailing pivots fitted"),
  ParamMeta::period("min_pivots", 4.0, (4.0, 8.0, 1.0), "Pivots required"),
  ParamMeta::scalar("flat_tolerance", 0.01, (0.002, 0.03, 0.002), "Drift of a flat line"),
  ParamMeta::ratio("min_convergence", 0.2, (0.1, 0.6, 0.05), "Required channel narrowing"),
];

impl TriangleParams {
  pub fn param_meta() -> &'static [ParamMeta] {
    TRIANGLE_PARAMS
  }

  pub fn from_map(params: &HashMap<&str, f64>) -> Result<Self> {
    let p = Self {
      window: get_period(params, "window", 6)?.get(),
      min_pivots: get_period(params, "min_pivots", 4)?.get(),
      flat_tolerance: get_scalar(params, "flat_tolerance", 0.01)?,
      min_convergence: get_ratio(params, "min_convergence", 0.2)?,
    };
    p.validate()?;
    Ok(p)
  }

  pub fn validate(&self) -> Result<()> {
    at_least("triangle.min_pivots", self.min_pivots, 4)?;
    at_least("triangle.window", self.window, self.min_pivots)?;
    positive("triangle.flat_tolerance", self.flat_tolerance)
  }
}

/// Rising and falling wedges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WedgeParams {
  pub window: usize,
  pub min_pivots: usize,
  /// Min relative drift of each line in the wedge direction
  pub min_slope: f64,
  pub min_convergence: Ratio,
}

impl Default for WedgeParams {
  fn default() -> Self {
    Self { window: 6, min_pivots: 4, min_slope: 0.01, min_convergence: Ratio::new_const(0.15) }
  }
}

static WEDGE_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("window", 6.0, (4.0, 10.0, 1.0), "Trailing pivots fitted"),
  ParamMeta::period("min_pivots", 4.0, (4.0, 8.0, 1.0), "Pivots required"),
  ParamMeta::scalar("min_slope", 0.01, (0.002, 0.05, 0.002), "Drift of each line"),
  ParamMeta::ratio("min_convergence", 0.15, (0.05, 0.6, 0.05), "Required channel narrowing"),
];

impl WedgeParams {
  pub fn param_meta() -> &'static [ParamMeta] {
    WEDGE_PARAMS
  }

  pub fn from_map(params: &HashMap<&str, f64>) -> Result<Self> {
    let p = Self {
      window: get_period(params, "window", 6)?.get(),
      min_pivots: get_period(params, "min_pivots", 4)?.get(),
      min_slope: get_scalar(params, "min_slope", 0.01)?,
      min_convergence: get_ratio(params, "min_convergence", 0.15)?,
    };
    p.validate()?;
    Ok(p)
  }

  pub fn validate(&self) -> Result<()> {
    at_least("wedge.min_pivots", self.min_pivots, 4)?;
    at_least("wedge.window", self.window, self.min_pivots)?;
    positive("wedge.min_slope", self.min_slope)
  }
}

/// Bull and bear flags: a pole followed by a counter-trend channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagParams {
  pub window: usize,
  /// Pole start plus at least four channel pivots
  pub min_pivots: usize,
  /// Minimum pole move as a fraction of its start price
  pub min_pole_pct: f64,
  /// Max channel retracement of the pole
  pub max_retracement: Ratio,
  /// Max drift of the channel in the pole direction
  pub flat_tolerance: f64,
  /// Max drift difference between channel lines
  pub parallel_tolerance: f64,
}

impl Default for FlagParams {
  fn default() -> Self {
    Self {
      window: 7,
      min_pivots: 5,
      min_pole_pct: 0.03,
      max_retracement: Ratio::new_const(0.5),
      flat_tolerance: 0.005,
      parallel_tolerance: 0.02,
    }
  }
}

static FLAG_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("window", 7.0, (5.0, 12.0, 1.0), "Trailing pivots searched"),
  ParamMeta::period("min_pivots", 5.0, (5.0, 8.0, 1.0), "Pivots required"),
  ParamMeta::scalar("min_pole_pct", 0.03, (0.01, 0.10, 0.01), "Minimum pole move"),
  ParamMeta::ratio("max_retracement", 0.5, (0.2, 0.8, 0.1), "Max retracement of the pole"),
  ParamMeta::scalar("flat_tolerance", 0.005, (0.001, 0.02, 0.001), "Drift toward the pole"),
  ParamMeta::scalar("parallel_tolerance", 0.02, (0.005, 0.05, 0.005), "Line drift difference"),
];

impl FlagParams {
  pub fn param_meta() -> &'static [ParamMeta] {
    FLAG_PARAMS
  }

  pub fn from_map(params: &HashMap<&str, f64>) -> Result<Self> {
    let p = Self {
      window: get_period(params, "window", 7)?.get(),
      min_pivots: get_period(params, "min_pivots", 5)?.get(),
      min_pole_pct: get_scalar(params, "min_pole_pct", 0.03)?,
      max_retracement: get_ratio(params, "max_retracement", 0.5)?,
      flat_tolerance: get_scalar(params, "flat_tolerance", 0.005)?,
      parallel_tolerance: get_scalar(params, "parallel_tolerance", 0.02)?,
    };
    p.validate()?;
    Ok(p)
  }

  pub fn validate(&self) -> Result<()> {
    at_least("flag.min_pivots", self.min_pivots, 5)?;
    at_least("flag.window", self.window, self.min_pivots)?;
    positive("flag.min_pole_pct", self.min_pole_pct)?;
    non_negative("flag.flat_tolerance", self.flat_tolerance)?;
    positive("flag.parallel_tolerance", self.parallel_tolerance)
  }
}

/// Double top and double bottom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleParams {
  /// Trailing pivots searched for the peak-trough-peak triple
  pub lookback_pivots: usize,
  /// Max relative difference between the two extremes
  pub price_tolerance: Ratio,
  /// Min depth of the middle pivot relative to the extremes
  pub min_retracement: Ratio,
  pub min_separation_bars: usize,
}

impl Default for DoubleParams {
  fn default() -> Self {
    Self {
      lookback_pivots: 4,
      price_tolerance: Ratio::new_const(0.02),
      min_retracement: Ratio::new_const(0.03),
      min_separation_bars: 3,
    }
  }
}

static DOUBLE_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("lookback_pivots", 4.0, (3.0, 8.0, 1.0), "Trailing pivots searched"),
  ParamMeta::ratio("price_tolerance", 0.02, (0.005, 0.05, 0.005), "Extreme price tolerance"),
  ParamMeta::ratio("min_retracement", 0.03, (0.01, 0.10, 0.01), "Min depth between extremes"),
  ParamMeta::period("min_separation_bars", 3.0, (1.0, 20.0, 1.0), "Bars between extremes"),
];

impl DoubleParams {
  pub fn param_meta() -> &'static [ParamMeta] {
    DOUBLE_PARAMS
  }

  pub fn from_map(params: &HashMap<&str, f64>) -> Result<Self> {
    let p = Self {
      lookback_pivots: get_period(params, "lookback_pivots", 4)?.get(),
      price_tolerance: get_ratio(params, "price_tolerance", 0.02)?,
      min_retracement: get_ratio(params, "min_retracement", 0.03)?,
      min_separation_bars: get_period(params, "min_separation_bars", 3)?.get(),
    };
    p.validate()?;
    Ok(p)
  }

  pub fn validate(&self) -> Result<()> {
    at_least("double.lookback_pivots", self.lookback_pivots, 3)?;
    at_least("double.min_separation_bars", self.min_separation_bars, 1)
  }
}

/// Head-and-shoulders and the inverse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadShouldersParams {
  pub lookback_pivots: usize,
  /// Head must exceed both shoulders by this fraction
  pub head_margin: Ratio,
  /// Max relative difference between shoulders
  pub shoulder_tolerance: Ratio,
  /// Min ratio of the shorter to the longer shoulder-to-head span
  pub min_time_symmetry: Ratio,
}

impl Default for HeadShouldersParams {
  fn default() -> Self {
    Self {
      lookback_pivots: 7,
      head_margin: Ratio::new_const(0.02),
      shoulder_tolerance: Ratio::new_const(0.03),
      min_time_symmetry: Ratio::new_const(0.5),
    }
  }
}

static HEAD_SHOULDERS_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("lookback_pivots", 7.0, (5.0, 10.0, 1.0), "Trailing pivots searched"),
  ParamMeta::ratio("head_margin", 0.02, (0.005, 0.06, 0.005), "Head excess over shoulders"),
  ParamMeta::ratio("shoulder_tolerance", 0.03, (0.01, 0.08, 0.01), "Shoulder price tolerance"),
  ParamMeta::ratio("min_time_symmetry", 0.5, (0.2, 0.9, 0.1), "Shoulder span symmetry"),
];

impl HeadShouldersParams {
  pub fn param_meta() -> &'static [ParamMeta] {
    HEAD_SHOULDERS_PARAMS
  }

  pub fn from_map(params: &HashMap<&str, f64>) -> Result<Self> {
    let p = Self {
      lookback_pivots: get_period(params, "lookback_pivots", 7)?.get(),
      head_margin: get_ratio(params, "head_margin", 0.02)?,
      shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.03)?,
      min_time_symmetry: get_ratio(params, "min_time_symmetry", 0.5)?,
    };
    p.validate()?;
    Ok(p)
  }

  pub fn validate(&self) -> Result<()> {
    at_least("head_shoulders.lookback_pivots", self.lookback_pivots, 5)
  }
}

/// Candle shape thresholds shared by the candle detectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleParams {
  /// Max body/range for a doji
  pub doji_body_ratio: Ratio,
  /// Max body/range for hammer and shooting star
  pub max_body_ratio: Ratio,
  /// Min long-shadow to body multiple
  pub min_shadow_body_ratio: f64,
  /// Max opposite-shadow/range
  pub max_opposite_shadow_ratio: Ratio,
  /// Min engulfing-body to engulfed-body multiple
  pub min_engulf_ratio: f64,
}

impl Default for CandleParams {
  fn default() -> Self {
    Self {
      doji_body_ratio: Ratio::new_const(0.1),
      max_body_ratio: Ratio::new_const(0.35),
      min_shadow_body_ratio: 2.0,
      max_opposite_shadow_ratio: Ratio::new_const(0.2),
      min_engulf_ratio: 1.0,
    }
  }
}

static CANDLE_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("doji_body_ratio", 0.1, (0.05, 0.2, 0.01), "Max doji body/range"),
  ParamMeta::ratio("max_body_ratio", 0.35, (0.2, 0.5, 0.05), "Max hammer body/range"),
  ParamMeta::scalar("min_shadow_body_ratio", 2.0, (1.5, 3.0, 0.5), "Long shadow vs body"),
  ParamMeta::ratio("max_opposite_shadow_ratio", 0.2, (0.05, 0.3, 0.05), "Max opposite shadow"),
  ParamMeta::scalar("min_engulf_ratio", 1.0, (1.0, 2.0, 0.1), "Engulfing body multiple"),
];

impl CandleParams {
  pub fn param_meta() -> &'static [ParamMeta] {
    CANDLE_PARAMS
  }

  pub fn from_map(params: &HashMap<&str, f64>) -> Result<Self> {
    let p = Self {
      doji_body_ratio: get_ratio(params, "doji_body_ratio", 0.1)?,
      max_body_ratio: get_ratio(params, "max_body_ratio", 0.35)?,
      min_shadow_body_ratio: get_scalar(params, "min_shadow_body_ratio", 2.0)?,
      max_opposite_shadow_ratio: get_ratio(params, "max_opposite_shadow_ratio", 0.2)?,
      min_engulf_ratio: get_scalar(params, "min_engulf_ratio", 1.0)?,
    };
    p.validate()?;
    Ok(p)
  }

  pub fn validate(&self) -> Result<()> {
    positive("candle.min_shadow_body_ratio", self.min_shadow_body_ratio)?;
    positive("candle.min_engulf_ratio", self.min_engulf_ratio)
  }
}

/// Parameter groups for every builtin detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
  pub triangle: TriangleParams,
  pub wedge: WedgeParams,
  pub flag: FlagParams,
  pub double: DoubleParams,
  pub head_shoulders: HeadShouldersParams,
  pub candle: CandleParams,
}

impl DetectorParams {
  pub fn validate(&self) -> Result<()> {
    self.triangle.validate()?;
    self.wedge.validate()?;
    self.flag.validate()?;
    self.double.validate()?;
    self.head_shoulders.validate()?;
    self.candle.validate()
  }
}

// ============================================================
// FILTER / BREAKOUT / SCORING
// ============================================================

/// Windows of the indicators available to filter clauses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
  /// Window used by a bare `SMA`
  pub sma_window: Period,
  /// EMA spans clauses may reference
  pub ema_spans: Vec<usize>,
  pub rsi_period: Period,
  /// Window used by a bare `VOL_SMA`
  pub volume_sma_window: Period,
}

impl Default for FilterConfig {
  fn default() -> Self {
    Self {
      sma_window: Period::new_const(30),
      ema_spans: vec![50, 200],
      rsi_period: Period::new_const(14),
      volume_sma_window: Period::new_const(20),
    }
  }
}

impl FilterConfig {
  pub fn validate(&self) -> Result<()> {
    if self.ema_spans.iter().any(|s| *s == 0) {
      return Err(PatternError::InvalidConfig("filter.ema_spans must be > 0".into()));
    }
    Ok(())
  }
}

/// Confirmed-breakout gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
  /// Reference window before the confirmation bars
  pub lookback: Period,
  /// Last volume must exceed this multiple of the reference mean
  pub volume_multiple: f64,
  pub policy: BreakoutPolicy,
}

impl Default for BreakoutConfig {
  fn default() -> Self {
    Self { lookback: Period::new_const(20), volume_multiple: 1.5, policy: BreakoutPolicy::default() }
  }
}

impl BreakoutConfig {
  pub fn validate(&self) -> Result<()> {
    non_negative("breakout.volume_multiple", self.volume_multiple)
  }
}

/// Weights of the default linear scoring model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
  pub breakout_weight: f64,
  /// breakout_pct at which the breakout bonus saturates
  pub breakout_scale: f64,
  pub symmetry_weight: f64,
  pub volume_weight: f64,
  /// volume_ratio excess over 1.0 at which the volume bonus saturates
  pub volume_scale: f64,
  pub recent_breakout_weight: f64,
  pub medium_cutoff: f64,
  pub high_cutoff: f64,
}

impl Default for ScoringWeights {
  fn default() -> Self {
    Self {
      breakout_weight: 0.10,
      breakout_scale: 0.02,
      symmetry_weight: 0.08,
      volume_weight: 0.07,
      volume_scale: 1.0,
      recent_breakout_weight: 0.05,
      medium_cutoff: 0.55,
      high_cutoff: 0.70,
    }
  }
}

impl ScoringWeights {
  /// Weights must be non-negative so scores never fall as evidence rises
  pub fn validate(&self) -> Result<()> {
    non_negative("scoring.breakout_weight", self.breakout_weight)?;
    non_negative("scoring.symmetry_weight", self.symmetry_weight)?;
    non_negative("scoring.volume_weight", self.volume_weight)?;
    non_negative("scoring.recent_breakout_weight", self.recent_breakout_weight)?;
    positive("scoring.breakout_scale", self.breakout_scale)?;
    positive("scoring.volume_scale", self.volume_scale)?;
    if !(0.0..=1.0).contains(&self.medium_cutoff)
      || !(0.0..=1.0).contains(&self.high_cutoff)
      || self.medium_cutoff > self.high_cutoff
    {
      return Err(PatternError::InvalidConfig(
        "scoring cutoffs must satisfy 0 <= medium_cutoff <= high_cutoff <= 1".into(),
      ));
    }
    Ok(())
  }
}

// ============================================================
// SCAN CONFIG
// ============================================================

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
  /// Symbols with fewer bars are skipped
  pub min_history_bars: usize,
  /// Sensitivity substituted on 1m/3m/5m when a request leaves it at 1.0
  pub short_tf_sensitivity: f64,
  pub pivots: PivotConfig,
  pub detectors: DetectorParams,
  pub filter: FilterConfig,
  pub breakout: BreakoutConfig,
  pub scoring: ScoringWeights,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      min_history_bars: 50,
      short_tf_sensitivity: 0.6,
      pivots: PivotConfig::default(),
      detectors: DetectorParams::default(),
      filter: FilterConfig::default(),
      breakout: BreakoutConfig::default(),
      scoring: ScoringWeights::default(),
    }
  }
}

impl ScanConfig {
  pub fn from_toml_str(s: &str) -> Result<Self> {
    let config: ScanConfig =
      toml::from_str(s).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_str(s: &str) -> Result<Self> {
    let config: ScanConfig =
      serde_json::from_str(s).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    positive("short_tf_sensitivity", self.short_tf_sensitivity)?;
    self.pivots.validate()?;
    self.detectors.validate()?;
    self.filter.validate()?;
    self.breakout.validate()?;
    self.scoring.validate()
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("test_ratio", 0.5, (0.3, 0.7, 0.1), "Test ratio parameter");

    assert_eq!(meta.name, "test_ratio");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, 0.5);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < f64::EPSILON);
    assert!((grid[1] - 0.5).abs() < f64::EPSILON);
    assert!((grid[2] - 0.7).abs() < f64::EPSILON);
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("test", 14.0, (10.0, 20.0, 2.0), "Test");

    assert!(meta.validate(14.0).is_ok());
    assert!(meta.validate(8.0).is_err());
    assert!(meta.validate(14.5).is_err());
  }

  #[test]
  fn test_get_helpers() {
    let mut params = HashMap::new();
    params.insert("key1", 0.8);
    params.insert("bars", 20.0);
    params.insert("neg", -1.0);

    assert!((get_ratio(&params, "key1", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "key2", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    assert_eq!(get_period(&params, "bars", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "missing", 14).unwrap().get(), 14);
    assert!(get_scalar(&params, "neg", 1.0).is_err());
  }

  #[test]
  fn test_defaults_validate() {
    assert!(ScanConfig::default().validate().is_ok());
    for meta in CandleParams::param_meta()
      .iter()
      .chain(TriangleParams::param_meta())
      .chain(FlagParams::param_meta())
      .chain(DoubleParams::param_meta())
      .chain(HeadShouldersParams::param_meta())
      .chain(WedgeParams::param_meta())
    {
      assert!(meta.validate(meta.default).is_ok(), "{} default out of range", meta.name);
    }
  }

  #[test]
  fn test_from_map_matches_defaults() {
    let empty = HashMap::new();
    assert_eq!(DoubleParams::from_map(&empty).unwrap(), DoubleParams::default());
    assert_eq!(FlagParams::from_map(&empty).unwrap(), FlagParams::default());
    assert_eq!(CandleParams::from_map(&empty).unwrap(), CandleParams::default());
  }

  #[test]
  fn test_toml_partial_override() {
    let config = ScanConfig::from_toml_str(
      r#"
      min_history_bars = 100

      [pivots]
      atr_multiple = 2.5

      [detectors.head_shoulders]
      head_margin = 0.04

      [breakout]
      policy = "up_only"
      "#,
    )
    .unwrap();
    assert_eq!(config.min_history_bars, 100);
    assert_eq!(config.pivots.atr_multiple, 2.5);
    assert_eq!(config.pivots.atr_period.get(), 14);
    assert!((config.detectors.head_shoulders.head_margin.get() - 0.04).abs() < f64::EPSILON);
    assert_eq!(config.breakout.policy, BreakoutPolicy::UpOnly);
    assert_eq!(config.scoring, ScoringWeights::default());
  }

  #[test]
  fn test_invalid_config_rejected() {
    assert!(ScanConfig::from_toml_str("[detectors.double]\nprice_tolerance = 1.5").is_err());
    assert!(ScanConfig::from_toml_str("[scoring]\nsymmetry_weight = -0.1").is_err());
    assert!(ScanConfig::from_json_str(r#"{"pivots": {"atr_period": 0}}"#).is_err());
    assert!(ScanConfig::from_json_str(r#"{"scoring": {"medium_cutoff": 0.9}}"#).is_err());
  }

  #[test]
  fn test_zero_double_separation_rejected() {
    let err = ScanConfig::from_toml_str("[detectors.double]\nmin_separation_bars = 0").unwrap_err();
    assert!(matches!(err, PatternError::InvalidConfig(ref msg) if msg.contains("min_separation_bars")));
    assert!(ScanConfig::from_toml_str("[detectors.double]\nmin_separation_bars = 1").is_ok());
  }
}

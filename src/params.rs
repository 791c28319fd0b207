//! Parameter metadata for formation matchers
//!
//! This module provides metadata about matcher parameters, enabling:
//! - Grid search optimization
//! - Parameter documentation
//! - Building matchers from loosely typed settings
//!
//! # Example
//!
//! ```rust
//! use yacfd::params::{ParamMeta, ParamType, ParameterizedMatcher};
//! use yacfd::prelude::*;
//!
//! // Get parameter metadata for a matcher
//! let params = DoubleBottomDetector::param_meta();
//! for param in params {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{breakout::BreakoutConfig, PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value in 0.0..=1.0 (tolerances, buffers)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Non-negative integer that may be zero (counts, optional limits)
  Count,
  /// Unbounded real value (slopes, multipliers)
  Value,
}

/// Metadata for a single matcher parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "trough_tolerance")
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

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  pub const fn value(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Value, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    if step <= 0.0 {
      values.push(min);
      return values;
    }
    let mut v = min;
    while v <= max + step * 1e-9 {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() {
      return Err(PatternError::InvalidValue("parameter cannot be NaN"));
    }
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio | ParamType::Value => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Count => {
        if value < 0.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Count must be a non-negative integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED MATCHER TRAIT
// ============================================================

/// Trait for matchers that support parameterization
///
/// Implementing this trait enables:
/// - Discovery of available parameters
/// - Creation of matchers with custom parameter values
/// - Grid search optimization
pub trait ParameterizedMatcher: Sized {
  /// Returns metadata for the formation-specific parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Formation-specific parameters followed by the shared breakout ones
  fn all_param_meta() -> Vec<&'static ParamMeta> {
    Self::param_meta().iter().chain(BREAKOUT_PARAMS.iter()).collect()
  }

  /// Creates a matcher with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the formation ID string
  fn formation_id_str() -> &'static str;
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
  if value.is_nan() || value < 1.0 {
    return Err(PatternError::InvalidValue("Period must be > 0"));
  }
  Period::new(value as usize)
}

/// Helper to get a non-negative integer from params with default fallback
pub fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<usize> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value.is_nan() || value < 0.0 {
    return Err(PatternError::InvalidValue("Count must be >= 0"));
  }
  if value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Count must be a whole number"));
  }
  Ok(value as usize)
}

/// Helper to get a finite real value from params with default fallback
pub fn get_value(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() {
    return Err(PatternError::InvalidValue("parameter must be finite"));
  }
  Ok(value)
}

// ============================================================
// SHARED BREAKOUT PARAMETERS
// ============================================================

/// Breakout parameters accepted by every matcher's `with_params`.
///
/// The volume multiplier default is the triangle/wedge one; double bottoms,
/// descending triangles and inverse head & shoulders default to 1.3.
pub static BREAKOUT_PARAMS: &[ParamMeta] = &[
  ParamMeta::period(
    "candles_to_check",
    15.0,
    (5.0, 30.0, 5.0),
    "Bars after the formation searched for a breakout",
  ),
  ParamMeta::ratio(
    "buffer_percent",
    0.001,
    (0.0, 0.01, 0.001),
    "Fraction of the boundary a close must clear",
  ),
  ParamMeta::period("volume_lookback", 30.0, (10.0, 50.0, 10.0), "Bars averaged for volume confirmation"),
  ParamMeta::value(
    "volume_multiplier",
    1.5,
    (1.0, 3.0, 0.1),
    "Breakout volume must exceed the average times this",
  ),
  ParamMeta::count(
    "max_candles_ago",
    0.0,
    (0.0, 10.0, 1.0),
    "Discard breakouts at least this many bars old (0 disables)",
  ),
];

/// Build a BreakoutConfig from params, defaulting to `defaults`.
///
/// `max_candles_ago` of 0 means no freshness filter.
pub fn breakout_from_params(
  params: &HashMap<&str, f64>,
  defaults: &BreakoutConfig,
) -> Result<BreakoutConfig> {
  let max_candles_ago =
    get_count(params, "max_candles_ago", defaults.max_candles_ago.unwrap_or(0))?;
  Ok(BreakoutConfig {
    candles_to_check: get_period(params, "candles_to_check", defaults.candles_to_check.get())?,
    buffer_percent: get_ratio(params, "buffer_percent", defaults.buffer_percent.get())?,
    volume_lookback: get_period(params, "volume_lookback", defaults.volume_lookback.get())?,
    volume_multiplier: get_value(params, "volume_multiplier", defaults.volume_multiplier)?,
    max_candles_ago: (max_candles_ago > 0).then_some(max_candles_ago),
  })
}

// ============================================================
// TESTS
// ============================================================

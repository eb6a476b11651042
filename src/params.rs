//! Parameter metadata for the structure classifiers
//!
//! This module describes the tunable parameters of each component, enabling:
//! - Grid search over window sizes and target multiples
//! - Range validation of configuration values
//! - Construction of components from loose key/value maps
//!
//! # Example
//!
//! ```rust
//! use mtfsig::params::{ParamMeta, ParamType, Parameterized};
//! use mtfsig::prelude::*;
//!
//! for param in StructureBreakDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{EngineError, Period, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Lookback length in bars (positive integer)
  Period,
  /// Risk multiple for a target level (positive real)
  Multiple,
}

/// Metadata for a single component parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "lookback")
  pub name: &'static str,
  /// Parameter type (Period or Multiple)
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Create a new ParamMeta for a Multiple parameter
  pub const fn multiple(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Multiple, default, range, description }
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
      return Err(EngineError::InvalidValue("parameter must be finite"));
    }
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(EngineError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(EngineError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Multiple => {
        if value <= 0.0 {
          return Err(EngineError::InvalidValue("Multiple must be > 0"));
        }
        Ok(())
      },
    }
  }
}

/// Look up a parameter by name
pub fn find_meta<'a>(metas: &'a [ParamMeta], name: &str) -> Option<&'a ParamMeta> {
  metas.iter().find(|m| m.name == name)
}

// ============================================================
// PARAMETERIZED COMPONENT TRAIT
// ============================================================

/// Trait for components that support parameterization
///
/// Implementing this trait enables:
/// - Discovery of available parameters
/// - Creation of components with custom parameter values
/// - Grid search optimization
pub trait Parameterized: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a component with parameters from a HashMap
  ///
  /// Missing parameters use their default values. Present values are checked
  /// against the metadata range.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the component identifier
  fn component_id() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn lookup(params: &HashMap<&str, f64>, metas: &[ParamMeta], key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if let Some(meta) = find_meta(metas, key) {
    meta.validate(value)?;
  }
  Ok(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(
  params: &HashMap<&str, f64>,
  metas: &[ParamMeta],
  key: &str,
  default: usize,
) -> Result<Period> {
  let value = lookup(params, metas, key, default as f64)?;
  Period::new(value as usize)
}

/// Helper to get a positive multiple from params with default fallback
pub fn get_multiple(
  params: &HashMap<&str, f64>,
  metas: &[ParamMeta],
  key: &str,
  default: f64,
) -> Result<f64> {
  let value = lookup(params, metas, key, default)?;
  if value <= 0.0 || !value.is_finite() {
    return Err(EngineError::InvalidValue("Multiple must be > 0"));
  }
  Ok(value)
}

// ============================================================
// TESTS
// ============================================================

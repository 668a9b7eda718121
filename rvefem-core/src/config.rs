//! Analysis configuration.
//!
//! All settings are plain serde structs with defaults, so a configuration
//! file only needs the fields that differ:
//!
//! ```json
//! { "penalty_ratio": 1e6, "solver": { "solver_type": "direct" } }
//! ```
//!
//! Supports and constraints are enforced with a penalty. Unless an absolute
//! `penalty` is given, it is `penalty_ratio` times the largest diagonal entry
//! of the assembled stiffness, so it follows the units and scale of the model.

use crate::assembly::AssemblyOptions;
use crate::error::{Error, Result};
use crate::solver::SolverConfig;
use serde::{Deserialize, Serialize};

/// Default ratio of the penalty to the largest diagonal stiffness entry.
pub const DEFAULT_PENALTY_RATIO: f64 = 1e8;

/// Settings for a linear static analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Absolute penalty for fixed DOFs and constraints. Overrides `penalty_ratio`.
    pub penalty: Option<f64>,
    /// Penalty relative to the largest diagonal entry of `K`.
    pub penalty_ratio: f64,
    pub solver: SolverConfig,
    pub assembly: AssemblyOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            penalty: None,
            penalty_ratio: DEFAULT_PENALTY_RATIO,
            solver: SolverConfig::default(),
            assembly: AssemblyOptions::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize configuration: {}", e)))
    }

    /// Penalty for a system whose largest diagonal stiffness is `max_diagonal`.
    pub fn penalty_for(&self, max_diagonal: f64) -> Result<f64> {
        resolve_penalty(self.penalty, self.penalty_ratio, max_diagonal)
    }

    /// Reject settings that cannot produce a meaningful solve.
    pub fn validate(&self) -> Result<()> {
        check_penalty(self.penalty, self.penalty_ratio)?;
        if !(self.solver.max_condition > 0.0) {
            return Err(Error::Config(format!(
                "max_condition must be positive, got {}",
                self.solver.max_condition
            )));
        }
        Ok(())
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}

pub(crate) fn check_penalty(penalty: Option<f64>, ratio: f64) -> Result<()> {
    match penalty {
        Some(p) => check_positive("penalty", p),
        None => check_positive("penalty_ratio", ratio),
    }
}

/// Absolute penalty, or `ratio` times the stiffness scale of the system.
pub(crate) fn resolve_penalty(penalty: Option<f64>, ratio: f64, max_diagonal: f64) -> Result<f64> {
    check_penalty(penalty, ratio)?;
    Ok(match penalty {
        Some(p) => p,
        // Without any stiffness the solver reports the singular DOFs
        None if max_diagonal > 0.0 => ratio * max_diagonal,
        None => ratio,
    })
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid configuration: {}", e)))
}

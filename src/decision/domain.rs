//! Domain types for cost-aware churn decisions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::{ChurnError, ChurnResult};

/// Business cost matrix for churn decisions. Immutable once loaded.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostConfig {
    /// Cost of missing a true churner.
    pub false_negative_cost: f64,
    /// Cost of targeting a customer who would have stayed.
    pub false_positive_cost: f64,
    /// Cost paid whenever we intervene on a true churner.
    pub intervention_cost: f64,
    /// Cost of a correct "no action"; only the threshold sweep uses it.
    #[serde(default)]
    pub true_negative_cost: f64,
    /// Advisory probability threshold. Authoritative only under [`DecisionPolicy::Threshold`].
    pub threshold: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            false_negative_cost: 5.0,
            false_positive_cost: 1.0,
            intervention_cost: 0.5,
            true_negative_cost: 0.0,
            threshold: 0.5,
        }
    }
}

impl CostConfig {
    /// Reject negative or non-finite costs and thresholds outside `[0, 1]`.
    pub fn validate(&self) -> ChurnResult<()> {
        let costs = [
            ("false_negative_cost", self.false_negative_cost),
            ("false_positive_cost", self.false_positive_cost),
            ("intervention_cost", self.intervention_cost),
            ("true_negative_cost", self.true_negative_cost),
        ];
        for (name, value) in costs {
            if !value.is_finite() || value < 0.0 {
                return Err(ChurnError::invalid(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        validate_probability("threshold", self.threshold)
    }
}

/// Reject NaN and values outside `[0, 1]`.
pub fn validate_probability(name: &str, p: f64) -> ChurnResult<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(ChurnError::invalid(format!(
            "{name} must lie in [0, 1], got {p}"
        )))
    }
}

/// Recommended action for a single customer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Intervene,
    Monitor,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Intervene => "intervene",
            Decision::Monitor => "monitor",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule turns a probability into a [`Decision`].
///
/// The active policy travels with every [`DecisionOutcome`] so callers always know
/// whether the EV comparison or the threshold decided.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Intervene when `ev_intervene >= ev_monitor`.
    #[default]
    ExpectedValue,
    /// Intervene when `p >= threshold`.
    Threshold,
}

impl DecisionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPolicy::ExpectedValue => "expected_value",
            DecisionPolicy::Threshold => "threshold",
        }
    }
}

impl FromStr for DecisionPolicy {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ev" | "expected_value" => Ok(DecisionPolicy::ExpectedValue),
            "threshold" => Ok(DecisionPolicy::Threshold),
            other => Err(ChurnError::config(format!(
                "unknown decision policy: {other}"
            ))),
        }
    }
}

/// Decision together with both expected values.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub ev_intervene: f64,
    pub ev_monitor: f64,
    pub policy: DecisionPolicy,
}

impl DecisionOutcome {
    /// EV of the action that was actually chosen.
    pub fn expected_value(&self) -> f64 {
        match self.decision {
            Decision::Intervene => self.ev_intervene,
            Decision::Monitor => self.ev_monitor,
        }
    }
}

/// Three-way action used when two intervention offers exist.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierAction {
    ExpensiveIntervention,
    CheapIntervention,
    NoAction,
}

/// Probability bounds for the tiered policy.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierBounds {
    pub low: f64,
    pub high: f64,
}

impl TierBounds {
    pub fn new(low: f64, high: f64) -> ChurnResult<Self> {
        validate_probability("low", low)?;
        validate_probability("high", high)?;
        if low > high {
            return Err(ChurnError::invalid(format!(
                "tier bounds out of order: low {low} > high {high}"
            )));
        }
        Ok(Self { low, high })
    }
}

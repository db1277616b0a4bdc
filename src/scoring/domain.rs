//! Domain definitions for scoring requests, model outputs and results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::decision::domain::{Decision, DecisionPolicy};

/// Upper bound on the explanation attached to a score.
pub const MAX_TOP_FEATURES: usize = 5;

/// Raw feature dictionary of one customer, as received from the caller.
pub type Features = Map<String, Value>;

/// Failure reported by the model collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ModelError(String);

impl ModelError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Signed contribution of one feature to the churn score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub contribution: f64,
}

impl FeatureContribution {
    pub fn new(name: impl Into<String>, contribution: f64) -> Self {
        Self {
            name: name.into(),
            contribution,
        }
    }
}

/// Ordered explanation, at most [`MAX_TOP_FEATURES`] entries long.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopFeatures(Vec<FeatureContribution>);

impl TopFeatures {
    /// Rank by absolute contribution (name breaks ties) and keep the head.
    /// Non-finite contributions are dropped.
    pub fn from_contributions(items: impl IntoIterator<Item = FeatureContribution>) -> Self {
        let mut items: Vec<FeatureContribution> = items
            .into_iter()
            .filter(|f| f.contribution.is_finite())
            .collect();
        items.sort_by(|a, b| {
            b.contribution
                .abs()
                .total_cmp(&a.contribution.abs())
                .then_with(|| a.name.cmp(&b.name))
        });
        items.truncate(MAX_TOP_FEATURES);
        Self(items)
    }

    /// Keep the given order, which is already a ranking.
    pub fn from_ranked(items: impl IntoIterator<Item = FeatureContribution>) -> Self {
        Self(items.into_iter().take(MAX_TOP_FEATURES).collect())
    }

    pub fn as_slice(&self) -> &[FeatureContribution] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|f| f.name.as_str())
    }
}

/// What the model returns for one customer.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelOutput {
    pub probability: f64,
    /// Per-request contributions when the model can explain itself.
    pub contributions: Option<Vec<FeatureContribution>>,
}

impl ModelOutput {
    pub fn probability(probability: f64) -> Self {
        Self {
            probability,
            contributions: None,
        }
    }

    pub fn with_contributions(mut self, contributions: Vec<FeatureContribution>) -> Self {
        self.contributions = Some(contributions);
        self
    }
}

/// Model inference boundary.
pub trait ChurnModel: Send + Sync {
    fn predict_proba(&self, features: &Features) -> Result<ModelOutput, ModelError>;
}

impl<F> ChurnModel for F
where
    F: Fn(&Features) -> Result<ModelOutput, ModelError> + Send + Sync,
{
    fn predict_proba(&self, features: &Features) -> Result<ModelOutput, ModelError> {
        self(features)
    }
}

/// Human-readable labels attached to each decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLabels {
    pub on_intervene: String,
    pub on_monitor: String,
}

impl ActionLabels {
    pub fn label(&self, decision: Decision) -> &str {
        match decision {
            Decision::Intervene => &self.on_intervene,
            Decision::Monitor => &self.on_monitor,
        }
    }
}

impl Default for ActionLabels {
    fn default() -> Self {
        Self {
            on_intervene: crate::common::config::DEFAULT_ACTION_ON_INTERVENE.to_string(),
            on_monitor: crate::common::config::DEFAULT_ACTION_ON_MONITOR.to_string(),
        }
    }
}

/// Scoring response for one customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "customerID")]
    pub customer_id: Option<String>,
    pub probability: f64,
    pub decision: Decision,
    pub ev_intervene: f64,
    pub ev_monitor: f64,
    /// EV of the chosen action.
    pub expected_value: f64,
    /// Same as `decision`; kept separate for UI clients.
    pub recommended_action: Decision,
    pub action: String,
    pub policy: DecisionPolicy,
    pub threshold: f64,
    pub top_features: TopFeatures,
}

//! Scoring orchestration: model inference, decision, explanation and metrics.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;
use crate::decision::domain::{CostConfig, DecisionPolicy};
use crate::decision::service::decide_with_policy;
use crate::metrics::aggregator::MetricsRecorder;
use crate::metrics::domain::MetricsSample;

use super::domain::{
    ActionLabels, ChurnModel, Features, ModelError, ScoreResult, TopFeatures,
};

pub const SCORE_PATH: &str = "/score";
pub const BATCH_PATH: &str = "/score/batch";

/// Feature key echoed back as `customer_id`.
const CUSTOMER_ID_KEY: &str = "customerID";

/// Composes the model with the decision engine.
///
/// Records exactly one metrics sample per call: one for [`ScoringService::score`] and one
/// for a whole [`ScoringService::score_batch`], whatever the per-item outcomes were.
pub struct ScoringService {
    model: Option<Arc<dyn ChurnModel>>,
    costs: CostConfig,
    policy: DecisionPolicy,
    actions: ActionLabels,
    fallback_features: TopFeatures,
    recorder: Arc<dyn MetricsRecorder>,
}

impl ScoringService {
    pub fn new(
        model: Option<Arc<dyn ChurnModel>>,
        costs: CostConfig,
        recorder: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            model,
            costs,
            policy: DecisionPolicy::default(),
            actions: ActionLabels::default(),
            fallback_features: TopFeatures::default(),
            recorder,
        }
    }

    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_actions(mut self, actions: ActionLabels) -> Self {
        self.actions = actions;
        self
    }

    /// Explanation used when the model returns no contributions.
    pub fn with_fallback_features(mut self, features: TopFeatures) -> Self {
        self.fallback_features = features;
        self
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn costs(&self) -> &CostConfig {
        &self.costs
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.policy
    }

    pub fn fallback_features(&self) -> &TopFeatures {
        &self.fallback_features
    }

    /// Score one customer.
    pub fn score(&self, features: &Features) -> ChurnResult<ScoreResult> {
        let start = Instant::now();
        let result = self.score_one(features);
        let status = match &result {
            Ok(_) => 200,
            Err(err) => err.http_status(),
        };
        self.record(SCORE_PATH, status, start);
        result
    }

    /// Score every item independently, keeping input order.
    ///
    /// Item failures are returned in place. The call itself fails only when no model is
    /// loaded, since then no item could ever succeed.
    pub fn score_batch(&self, items: &[Features]) -> ChurnResult<Vec<ChurnResult<ScoreResult>>> {
        let start = Instant::now();
        if self.model.is_none() {
            let err = ChurnError::from(ModelError::new("model not loaded"));
            self.record(BATCH_PATH, err.http_status(), start);
            return Err(err);
        }

        let results: Vec<ChurnResult<ScoreResult>> =
            items.iter().map(|f| self.score_one(f)).collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(
                event = "batch_items_failed",
                items = items.len(),
                failed,
            );
        }
        self.record(BATCH_PATH, 200, start);
        Ok(results)
    }

    fn score_one(&self, features: &Features) -> ChurnResult<ScoreResult> {
        if features.is_empty() {
            return Err(ChurnError::invalid("feature map is empty"));
        }
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ModelError::new("model not loaded"))?;

        let output = model.predict_proba(features).map_err(|err| {
            error!(event = "inference_failed", code = "inference_failed", error = %err);
            err
        })?;
        if !(0.0..=1.0).contains(&output.probability) {
            let err = ModelError::new(format!(
                "model returned probability outside [0, 1]: {}",
                output.probability
            ));
            error!(event = "inference_failed", code = "inference_failed", error = %err);
            return Err(err.into());
        }

        let outcome = decide_with_policy(output.probability, &self.costs, self.policy)?;
        let top_features = match output.contributions {
            Some(items) if !items.is_empty() => TopFeatures::from_contributions(items),
            _ => self.fallback_features.clone(),
        };

        debug!(
            event = "scored",
            probability = output.probability,
            decision = %outcome.decision,
            policy = outcome.policy.as_str(),
        );

        Ok(ScoreResult {
            customer_id: features
                .get(CUSTOMER_ID_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
            probability: output.probability,
            decision: outcome.decision,
            ev_intervene: outcome.ev_intervene,
            ev_monitor: outcome.ev_monitor,
            expected_value: outcome.expected_value(),
            recommended_action: outcome.decision,
            action: self.actions.label(outcome.decision).to_string(),
            policy: outcome.policy,
            threshold: self.costs.threshold,
            top_features,
        })
    }

    fn record(&self, path: &str, status: u16, start: Instant) {
        let dur_ms = time::elapsed_ms(start);
        self.recorder
            .record(MetricsSample::now("POST", path, status, dur_ms));
        debug!(event = "request_recorded", path, status, dur_ms);
    }
}

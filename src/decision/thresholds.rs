//! Offline threshold calibration over labelled validation scores.
//!
//! Produces the EV-vs-threshold curve used to pick the advisory threshold shipped in the
//! model metadata.

use serde::{Deserialize, Serialize};

use crate::common::error::{ChurnError, ChurnResult};

use super::domain::{validate_probability, CostConfig};

/// Confusion matrix at a single threshold.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tn: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub tp: u64,
}

impl ConfusionCounts {
    /// Negated total cost of the matrix; higher is better.
    pub fn expected_value(&self, costs: &CostConfig) -> f64 {
        let total = self.tp as f64 * costs.intervention_cost
            + self.fp as f64 * costs.false_positive_cost
            + self.fn_ as f64 * costs.false_negative_cost
            + self.tn as f64 * costs.true_negative_cost;
        -total
    }
}

/// One row of the threshold curve.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub expected_value: f64,
    pub counts: ConfusionCounts,
}

fn check_inputs(labels: &[bool], probs: &[f64]) -> ChurnResult<()> {
    if labels.len() != probs.len() {
        return Err(ChurnError::invalid(format!(
            "labels and probabilities differ in length: {} vs {}",
            labels.len(),
            probs.len()
        )));
    }
    probs
        .iter()
        .try_for_each(|&p| validate_probability("probability", p))
}

fn confusion(labels: &[bool], probs: &[f64], threshold: f64) -> ConfusionCounts {
    let mut counts = ConfusionCounts::default();
    for (&churned, &p) in labels.iter().zip(probs) {
        match (churned, p >= threshold) {
            (true, true) => counts.tp += 1,
            (true, false) => counts.fn_ += 1,
            (false, true) => counts.fp += 1,
            (false, false) => counts.tn += 1,
        }
    }
    counts
}

/// EV and confusion counts for `predicted = p >= threshold`.
pub fn expected_value_for_threshold(
    labels: &[bool],
    probs: &[f64],
    threshold: f64,
    costs: &CostConfig,
) -> ChurnResult<(f64, ConfusionCounts)> {
    check_inputs(labels, probs)?;
    validate_probability("threshold", threshold)?;
    costs.validate()?;
    let counts = confusion(labels, probs, threshold);
    Ok((counts.expected_value(costs), counts))
}

/// Finest grid a sweep will build.
pub const MAX_SWEEP_STEPS: u64 = 1_000_000;

/// Scan thresholds `0, step, 2*step, ...` up to and including 1.0.
pub fn sweep_thresholds(
    labels: &[bool],
    probs: &[f64],
    costs: &CostConfig,
    step: f64,
) -> ChurnResult<Vec<ThresholdPoint>> {
    check_inputs(labels, probs)?;
    costs.validate()?;
    if !(step > 0.0 && step <= 1.0) {
        return Err(ChurnError::invalid(format!(
            "step must lie in (0, 1], got {step}"
        )));
    }

    if 1.0 / step > MAX_SWEEP_STEPS as f64 {
        return Err(ChurnError::invalid(format!(
            "step {step} needs more than {MAX_SWEEP_STEPS} grid points"
        )));
    }

    // Integer stepping keeps the grid free of accumulated float drift.
    let mut steps = (1.0 / step).round() as u64;
    if (steps as f64) * step < 1.0 - 1e-9 {
        // Last step is short; the clamp below lands it on 1.0.
        steps += 1;
    }
    let mut curve = Vec::with_capacity(steps as usize + 1);
    for i in 0..=steps {
        let threshold = (i as f64 * step).min(1.0);
        let counts = confusion(labels, probs, threshold);
        curve.push(ThresholdPoint {
            threshold,
            expected_value: counts.expected_value(costs),
            counts,
        });
    }
    Ok(curve)
}

/// Pick the point with maximum EV. The lowest threshold wins ties.
pub fn choose_optimal_threshold(curve: &[ThresholdPoint]) -> ChurnResult<ThresholdPoint> {
    let mut best: Option<&ThresholdPoint> = None;
    for point in curve {
        match best {
            Some(b) if point.expected_value <= b.expected_value => {}
            _ => best = Some(point),
        }
    }
    best.copied()
        .ok_or_else(|| ChurnError::invalid("threshold curve is empty"))
}

//! Expected-value decision engine.
//!
//! Everything here is a pure function of its arguments and safe to call from any
//! number of threads.

use crate::common::error::ChurnResult;

use super::domain::{
    validate_probability, CostConfig, Decision, DecisionOutcome, DecisionPolicy, TierAction,
    TierBounds,
};

/// EV of intervening: a saved churner is worth the avoided miss minus the offer,
/// a wrongly targeted customer costs `false_positive_cost`.
pub fn ev_intervene(p: f64, costs: &CostConfig) -> f64 {
    p * (costs.false_negative_cost - costs.intervention_cost)
        + (1.0 - p) * (-costs.false_positive_cost)
}

/// EV of doing nothing: only a churner costs anything.
pub fn ev_monitor(p: f64, costs: &CostConfig) -> f64 {
    p * (-costs.false_negative_cost)
}

/// Decide under the expected-value policy.
///
/// Ties resolve to [`Decision::Intervene`] since a missed churner is the costlier error.
/// At `p == 0` no churner can be missed, so the result is always [`Decision::Monitor`].
pub fn decide(probability: f64, costs: &CostConfig) -> ChurnResult<DecisionOutcome> {
    decide_with_policy(probability, costs, DecisionPolicy::ExpectedValue)
}

/// Decide under an explicit policy. EV values are reported for both policies.
pub fn decide_with_policy(
    probability: f64,
    costs: &CostConfig,
    policy: DecisionPolicy,
) -> ChurnResult<DecisionOutcome> {
    validate_probability("probability", probability)?;
    costs.validate()?;

    let ev_intervene = ev_intervene(probability, costs);
    let ev_monitor = ev_monitor(probability, costs);

    let intervene = match policy {
        DecisionPolicy::ExpectedValue => probability > 0.0 && ev_intervene >= ev_monitor,
        DecisionPolicy::Threshold => probability >= costs.threshold,
    };

    Ok(DecisionOutcome {
        decision: if intervene {
            Decision::Intervene
        } else {
            Decision::Monitor
        },
        ev_intervene,
        ev_monitor,
        policy,
    })
}

/// Probability at which both actions have equal EV.
///
/// `ev_intervene - ev_monitor = p * (2*fn - intervention + fp) - fp`, which is linear in
/// `p`, so there is at most one crossover. `None` when the slope is not positive or the
/// crossover lies above 1; Intervene then never strictly beats Monitor inside `[0, 1]`.
pub fn crossover_probability(costs: &CostConfig) -> ChurnResult<Option<f64>> {
    costs.validate()?;
    let slope =
        2.0 * costs.false_negative_cost - costs.intervention_cost + costs.false_positive_cost;
    if slope <= 0.0 {
        return Ok(None);
    }
    let p = costs.false_positive_cost / slope;
    Ok((p <= 1.0).then_some(p))
}

/// Tiered policy: expensive offer above `high`, cheap offer above `low`, otherwise nothing.
pub fn decide_tiered(probability: f64, bounds: TierBounds) -> ChurnResult<TierAction> {
    validate_probability("probability", probability)?;
    Ok(if probability >= bounds.high {
        TierAction::ExpensiveIntervention
    } else if probability >= bounds.low {
        TierAction::CheapIntervention
    } else {
        TierAction::NoAction
    })
}

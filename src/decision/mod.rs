//! Cost-aware decision engine turning a churn probability into an action.

pub mod domain;
pub mod service;
pub mod thresholds;

pub use domain::{CostConfig, Decision, DecisionOutcome, DecisionPolicy, TierAction, TierBounds};
pub use service::{crossover_probability, decide, decide_tiered, decide_with_policy};

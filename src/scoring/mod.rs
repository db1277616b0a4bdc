//! Scoring orchestrator: model, decision engine and metrics in one call.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{
    ActionLabels, ChurnModel, FeatureContribution, Features, ModelError, ModelOutput,
    ScoreResult, TopFeatures, MAX_TOP_FEATURES,
};
pub use repo_fs::load_feature_importance;
pub use service::ScoringService;

//! Response payloads of the non-scoring operations.

use serde::{Deserialize, Serialize};

use crate::decision::domain::{CostConfig, DecisionPolicy};
use crate::reports::domain::ReportDescriptor;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"ok"` or `"model not loaded"`.
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub service_version: String,
    pub threshold: f64,
    pub has_top_features: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigView {
    pub service_version: String,
    pub threshold: f64,
    pub costs: CostConfig,
    pub policy: DecisionPolicy,
}

/// Latest report plus the URL a client should be redirected to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLink {
    pub report: ReportDescriptor,
    pub url: String,
}

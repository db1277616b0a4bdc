//! Runtime configuration loaded from the environment and the model metadata file.
//!
//! `AppCfg` is read once at process start. `ServiceMetadata` comes from the JSON file
//! written next to the model artefact and carries the cost matrix and action labels.
//!
//! TODO: Reload `ServiceMetadata` when the file changes instead of only at start.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::error::{ChurnError, ChurnResult};
use crate::decision::domain::{CostConfig, DecisionPolicy};

pub const DEFAULT_API_KEY: &str = "dev-key-change-me";
pub const DEFAULT_METRICS_CAPACITY: usize = 10_000;
pub const DEFAULT_ACTION_ON_INTERVENE: &str = "Send retention offer A";
pub const DEFAULT_ACTION_ON_MONITOR: &str = "Monitor; no immediate action";

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub data_root: PathBuf,
    pub metrics_csv: PathBuf,
    pub reports_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub featimp_path: PathBuf,
    pub api_key: String,
    pub app_version: String,
    pub metrics_capacity: usize,
    pub report_cache_ttl: Option<Duration>,
    pub log_level: String,
    pub decision_policy: DecisionPolicy,
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> ChurnResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> ChurnResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let path_or = |key: &str, default: PathBuf| get(key).map(PathBuf::from).unwrap_or(default);

        let data_root = path_or("CHURN_DATA_ROOT", PathBuf::from("./data"));

        let metrics_capacity = match get("CHURN_METRICS_CAPACITY") {
            Some(raw) => parse_positive(&raw, "CHURN_METRICS_CAPACITY")?,
            None => DEFAULT_METRICS_CAPACITY,
        };

        let report_cache_ttl = match get("CHURN_REPORT_CACHE_TTL_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    ChurnError::config(format!("CHURN_REPORT_CACHE_TTL_SECS: not a number: {raw}"))
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let decision_policy = match get("CHURN_DECISION_POLICY") {
            Some(raw) => raw.parse()?,
            None => DecisionPolicy::default(),
        };

        Ok(Self {
            metrics_csv: path_or(
                "CHURN_METRICS_CSV",
                data_root.join("monitoring").join("metrics.csv"),
            ),
            reports_dir: path_or(
                "CHURN_REPORTS_DIR",
                data_root.join("monitoring").join("reports"),
            ),
            metadata_path: path_or(
                "CHURN_METADATA_PATH",
                data_root.join("models").join("metadata.json"),
            ),
            featimp_path: path_or(
                "CHURN_FEATIMP_PATH",
                data_root.join("models").join("feature_importance_top.csv"),
            ),
            api_key: get("CHURN_API_KEY").unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
            app_version: get("CHURN_APP_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            log_level: get("CHURN_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            data_root,
            metrics_capacity,
            report_cache_ttl,
            decision_policy,
        })
    }
}

fn parse_positive(raw: &str, key: &str) -> ChurnResult<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ChurnError::config(format!(
            "{key}: expected a positive integer, got {raw}"
        ))),
    }
}

/// Cost entries as stored in the metadata file. Missing keys fall back to defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CostOverrides {
    pub false_negative: Option<f64>,
    pub false_positive: Option<f64>,
    pub true_positive_intervention: Option<f64>,
    pub true_negative: Option<f64>,
}

/// Model metadata shipped alongside the model artefact.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceMetadata {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub costs: CostOverrides,
    #[serde(default)]
    pub action_on_intervene: Option<String>,
    #[serde(default)]
    pub action_on_monitor: Option<String>,
}

impl ServiceMetadata {
    /// Read metadata from `path`. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> ChurnResult<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "metadata file not found, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|err| ChurnError::config(format!("{}: {err}", path.display())))
    }

    /// Build the validated cost configuration.
    pub fn cost_config(&self) -> ChurnResult<CostConfig> {
        let d = CostConfig::default();
        let cfg = CostConfig {
            false_negative_cost: self.costs.false_negative.unwrap_or(d.false_negative_cost),
            false_positive_cost: self.costs.false_positive.unwrap_or(d.false_positive_cost),
            intervention_cost: self
                .costs
                .true_positive_intervention
                .unwrap_or(d.intervention_cost),
            true_negative_cost: self.costs.true_negative.unwrap_or(d.true_negative_cost),
            threshold: self.threshold.unwrap_or(d.threshold),
        };
        cfg.validate().map_err(|err| match err {
            ChurnError::InvalidInput(msg) => ChurnError::config(format!("metadata: {msg}")),
            other => other,
        })?;
        Ok(cfg)
    }

    pub fn action_on_intervene(&self) -> &str {
        self.action_on_intervene
            .as_deref()
            .unwrap_or(DEFAULT_ACTION_ON_INTERVENE)
    }

    pub fn action_on_monitor(&self) -> &str {
        self.action_on_monitor
            .as_deref()
            .unwrap_or(DEFAULT_ACTION_ON_MONITOR)
    }
}

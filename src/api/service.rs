//! Transport-neutral operations behind the HTTP routes.
//!
//! Every operation records one metrics sample under its route. Scoring routes require a
//! bearer token; monitoring and introspection routes do not.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::common::config::{AppCfg, ServiceMetadata};
use crate::common::error::ChurnResult;
use crate::common::time;
use crate::metrics::aggregator::{MetricsAggregator, MetricsRecorder};
use crate::metrics::domain::{MetricsSample, MetricsSummary, RouteSummary, SummaryWindow};
use crate::reports::domain::{ReportDescriptor, ReportRegistry};
use crate::reports::repo_fs::FsReportRegistry;
use crate::scoring::domain::{ActionLabels, ChurnModel, Features, ScoreResult};
use crate::scoring::repo_fs::load_feature_importance;
use crate::scoring::service::{ScoringService, BATCH_PATH, SCORE_PATH};

use super::auth::BearerAuth;
use super::domain::{ConfigView, HealthStatus, ReportLink, VersionInfo};

pub const HEALTH_PATH: &str = "/health";
pub const VERSION_PATH: &str = "/version";
pub const CONFIG_PATH: &str = "/config";
pub const METRICS_PATH: &str = "/monitoring/metrics";
pub const METRICS_ROUTES_PATH: &str = "/monitoring/metrics/routes";
pub const REPORTS_PATH: &str = "/monitoring/reports";
pub const LATEST_REPORT_PATH: &str = "/monitoring/reports/latest";
pub const LATEST_REDIRECT_PATH: &str = "/monitoring/latest";

const REDIRECT_STATUS: u16 = 307;

pub struct ChurnApi {
    scoring: ScoringService,
    metrics: Arc<MetricsAggregator>,
    reports: Arc<dyn ReportRegistry>,
    auth: BearerAuth,
    version: String,
}

impl ChurnApi {
    pub fn new(
        scoring: ScoringService,
        metrics: Arc<MetricsAggregator>,
        reports: Arc<dyn ReportRegistry>,
        auth: BearerAuth,
        version: impl Into<String>,
    ) -> Self {
        Self {
            scoring,
            metrics,
            reports,
            auth,
            version: version.into(),
        }
    }

    /// Wire the production stack from configuration. `model` is `None` when no artefact
    /// could be loaded; the service still starts and reports it through [`Self::health`].
    pub fn from_cfg(cfg: &AppCfg, model: Option<Arc<dyn ChurnModel>>) -> ChurnResult<Self> {
        let meta = ServiceMetadata::load(&cfg.metadata_path)?;
        let costs = meta.cost_config()?;
        let metrics = Arc::new(MetricsAggregator::from_cfg(cfg)?);
        let fallback = load_feature_importance(&cfg.featimp_path)?;

        if model.is_none() {
            warn!(event = "model_missing", "scoring will fail until a model is loaded");
        }

        let scoring = ScoringService::new(model, costs, metrics.clone())
            .with_policy(cfg.decision_policy)
            .with_actions(ActionLabels {
                on_intervene: meta.action_on_intervene().to_string(),
                on_monitor: meta.action_on_monitor().to_string(),
            })
            .with_fallback_features(fallback);

        let version = meta.version.clone().unwrap_or_else(|| cfg.app_version.clone());
        info!(
            event = "api_ready",
            version = %version,
            policy = cfg.decision_policy.as_str(),
            threshold = costs.threshold,
            reports_dir = %cfg.reports_dir.display(),
        );

        Ok(Self::new(
            scoring,
            metrics,
            Arc::new(FsReportRegistry::from_cfg(cfg)),
            BearerAuth::new(cfg.api_key.clone()),
            version,
        ))
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    pub fn scoring(&self) -> &ScoringService {
        &self.scoring
    }

    /// Record a sample for `path` and pass the result through.
    fn observe<T>(
        &self,
        method: &str,
        path: &str,
        ok_status: u16,
        start: Instant,
        result: ChurnResult<T>,
    ) -> ChurnResult<T> {
        let status = match &result {
            Ok(_) => ok_status,
            Err(err) => {
                warn!(event = "request_failed", path, code = err.code().as_str(), error = %err);
                err.http_status()
            }
        };
        self.metrics.record(MetricsSample::now(
            method,
            path,
            status,
            time::elapsed_ms(start),
        ));
        result
    }

    pub fn authorize(&self, header: Option<&str>) -> ChurnResult<()> {
        self.auth.authorize(header)
    }

    pub fn health(&self) -> HealthStatus {
        let start = Instant::now();
        let model_loaded = self.scoring.model_loaded();
        let status = if model_loaded { "ok" } else { "model not loaded" };
        let out = HealthStatus {
            status: status.to_string(),
            model_loaded,
        };
        self.record_ok("GET", HEALTH_PATH, start);
        out
    }

    pub fn version(&self) -> VersionInfo {
        let start = Instant::now();
        let out = VersionInfo {
            service_version: self.version.clone(),
            threshold: self.scoring.costs().threshold,
            has_top_features: !self.scoring.fallback_features().is_empty(),
        };
        self.record_ok("GET", VERSION_PATH, start);
        out
    }

    pub fn config(&self) -> ConfigView {
        let start = Instant::now();
        let costs = *self.scoring.costs();
        let out = ConfigView {
            service_version: self.version.clone(),
            threshold: costs.threshold,
            costs,
            policy: self.scoring.policy(),
        };
        self.record_ok("GET", CONFIG_PATH, start);
        out
    }

    fn record_ok(&self, method: &str, path: &str, start: Instant) {
        self.metrics.record(MetricsSample::now(
            method,
            path,
            200,
            time::elapsed_ms(start),
        ));
    }

    /// Score one customer. The scoring service records the sample on success and on
    /// scoring failure; only a rejected token is recorded here.
    pub fn score(&self, auth_header: Option<&str>, features: &Features) -> ChurnResult<ScoreResult> {
        let start = Instant::now();
        if let Err(err) = self.auth.authorize(auth_header) {
            return self.observe("POST", SCORE_PATH, 200, start, Err(err));
        }
        self.scoring.score(features)
    }

    pub fn score_batch(
        &self,
        auth_header: Option<&str>,
        items: &[Features],
    ) -> ChurnResult<Vec<ChurnResult<ScoreResult>>> {
        let start = Instant::now();
        if let Err(err) = self.auth.authorize(auth_header) {
            return self.observe("POST", BATCH_PATH, 200, start, Err(err));
        }
        self.scoring.score_batch(items)
    }

    pub fn metrics_summary(&self, window: SummaryWindow) -> MetricsSummary {
        let start = Instant::now();
        let out = self.metrics.summary(window);
        self.record_ok("GET", METRICS_PATH, start);
        out
    }

    pub fn metrics_by_path(&self, window: SummaryWindow) -> Vec<RouteSummary> {
        let start = Instant::now();
        let out = self.metrics.summary_by_path(window);
        self.record_ok("GET", METRICS_ROUTES_PATH, start);
        out
    }

    pub fn list_reports(&self) -> ChurnResult<Vec<ReportDescriptor>> {
        let start = Instant::now();
        let result = self.reports.list();
        self.observe("GET", REPORTS_PATH, 200, start, result)
    }

    pub fn latest_report(&self) -> ChurnResult<ReportLink> {
        let start = Instant::now();
        let result = self.reports.latest().map(|report| ReportLink {
            url: self.reports.relative_url(&report),
            report,
        });
        self.observe("GET", LATEST_REPORT_PATH, 200, start, result)
    }

    /// URL to redirect to for the newest report.
    pub fn latest_report_path(&self) -> ChurnResult<String> {
        let start = Instant::now();
        let result = self
            .reports
            .latest()
            .map(|report| self.reports.relative_url(&report));
        self.observe("GET", LATEST_REDIRECT_PATH, REDIRECT_STATUS, start, result)
    }

    /// Filesystem path of the report with `id`, for serving its content.
    pub fn report_path(&self, id: &str) -> ChurnResult<PathBuf> {
        let start = Instant::now();
        let result = self.reports.resolve_path(id);
        let route = format!("{REPORTS_PATH}/{id}");
        self.observe("GET", &route, 200, start, result)
    }

    /// Block until queued CSV rows are written.
    pub fn flush(&self) {
        self.metrics.flush();
    }
}

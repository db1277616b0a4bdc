use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use churnwatch::common::config::AppCfg;
use churnwatch::decision::domain::{Decision, DecisionPolicy};
use churnwatch::metrics::SummaryWindow;
use churnwatch::scoring::{ChurnModel, Features, ModelError, ModelOutput};
use churnwatch::{ChurnApi, ChurnError};
use serde_json::{json, Value};

const TOKEN: &str = "Bearer test-key";

fn cfg_for(root: &Path, extra: &[(&str, &str)]) -> AppCfg {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("CHURN_DATA_ROOT".into(), root.display().to_string());
    vars.insert("CHURN_API_KEY".into(), "test-key".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    AppCfg::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn echo_model() -> Arc<dyn ChurnModel> {
    Arc::new(|f: &Features| match f.get("p").and_then(Value::as_f64) {
        Some(p) => Ok(ModelOutput::probability(p)),
        None => Err(ModelError::new("missing feature p")),
    })
}

fn features(value: Value) -> Features {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

#[test]
fn scoring_requires_a_valid_token_and_records_401() {
    let dir = tempfile::tempdir().unwrap();
    let api = ChurnApi::from_cfg(&cfg_for(dir.path(), &[]), Some(echo_model())).unwrap();
    let item = features(json!({"p": 0.7}));

    for header in [None, Some("Bearer wrong"), Some("test-key")] {
        let err = api.score(header, &item).unwrap_err();
        assert!(matches!(err, ChurnError::Unauthorized(_)));
    }
    assert!(matches!(
        api.score_batch(None, &[item.clone()]),
        Err(ChurnError::Unauthorized(_))
    ));
    assert!(api.score(Some(TOKEN), &item).is_ok());

    let summary = api.metrics_summary(SummaryWindow::All);
    assert_eq!(summary.total_count, 5);
    assert_eq!(summary.error_count, 4);
}

#[test]
fn metadata_and_importance_files_shape_the_response() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    fs::create_dir_all(&models).unwrap();
    fs::write(
        models.join("metadata.json"),
        r#"{"version": "2024.06", "threshold": 0.4,
            "costs": {"false_negative": 10.0, "false_positive": 2.0, "true_positive_intervention": 1.0},
            "action_on_intervene": "Call the customer"}"#,
    )
    .unwrap();
    fs::write(
        models.join("feature_importance_top.csv"),
        "feature,importance\ntenure,0.4\nContract,0.3\n",
    )
    .unwrap();

    let api = ChurnApi::from_cfg(&cfg_for(dir.path(), &[]), Some(echo_model())).unwrap();

    let version = api.version();
    assert_eq!(version.service_version, "2024.06");
    assert_eq!(version.threshold, 0.4);
    assert!(version.has_top_features);

    let config = api.config();
    assert_eq!(config.costs.false_negative_cost, 10.0);
    assert_eq!(config.policy, DecisionPolicy::ExpectedValue);

    let res = api.score(Some(TOKEN), &features(json!({"p": 0.5}))).unwrap();
    assert_eq!(res.decision, Decision::Intervene);
    assert_eq!(res.action, "Call the customer");
    assert_eq!(res.threshold, 0.4);
    let names: Vec<&str> = res.top_features.names().collect();
    assert_eq!(names, vec!["tenure", "Contract"]);
}

#[test]
fn health_reports_a_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    let api = ChurnApi::from_cfg(&cfg_for(dir.path(), &[]), None).unwrap();
    let health = api.health();
    assert!(!health.model_loaded);
    assert_eq!(health.status, "model not loaded");

    let err = api
        .score(Some(TOKEN), &features(json!({"p": 0.5})))
        .unwrap_err();
    assert_eq!(err.http_status(), 500);
}

#[test]
fn batch_isolates_failing_items() {
    let dir = tempfile::tempdir().unwrap();
    let api = ChurnApi::from_cfg(&cfg_for(dir.path(), &[]), Some(echo_model())).unwrap();
    let items = vec![
        features(json!({"customerID": "0001", "p": 0.9})),
        features(json!({"customerID": "0002", "tenure": 4})),
        features(json!({"customerID": "0003", "p": 0.05})),
    ];

    let results = api.score_batch(Some(TOKEN), &items).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().decision, Decision::Intervene);
    assert!(matches!(results[1], Err(ChurnError::InferenceFailed(_))));
    let third = results[2].as_ref().unwrap();
    assert_eq!(third.customer_id.as_deref(), Some("0003"));

    let routes = api.metrics_by_path(SummaryWindow::All);
    let batch = routes.iter().find(|r| r.path == "/score/batch").unwrap();
    assert_eq!(batch.count, 1);
    assert_eq!(batch.errors, 0);
}

#[test]
fn concurrent_scoring_loses_no_samples() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(
        ChurnApi::from_cfg(&cfg_for(dir.path(), &[]), Some(echo_model())).unwrap(),
    );

    let handles: Vec<_> = (0..120)
        .map(|i| {
            let api = api.clone();
            thread::spawn(move || {
                let p = f64::from(i % 100) / 100.0;
                api.score(Some(TOKEN), &features(json!({"p": p}))).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let summary = api.metrics_summary(SummaryWindow::All);
    assert_eq!(summary.total_count, 120);
    assert_eq!(summary.error_count, 0);
    assert!(summary.p95_latency_ms.is_some());

    api.flush();
    assert_eq!(api.metrics().write_failures(), 0);
    let csv = fs::read_to_string(dir.path().join("monitoring").join("metrics.csv")).unwrap();
    // Header plus one row per request; the summary call itself is recorded too.
    assert_eq!(csv.lines().count(), 1 + 121);
}

#[test]
fn metrics_history_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_for(dir.path(), &[]);
    {
        let api = ChurnApi::from_cfg(&cfg, Some(echo_model())).unwrap();
        api.score(Some(TOKEN), &features(json!({"p": 0.2}))).unwrap();
        api.score(Some(TOKEN), &features(json!({"q": 1}))).unwrap_err();
    }

    let api = ChurnApi::from_cfg(&cfg, Some(echo_model())).unwrap();
    let summary = api.metrics_summary(SummaryWindow::All);
    assert_eq!(summary.total_count, 2);
    assert_eq!(summary.error_count, 1);
}

#[test]
fn latest_report_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let api = ChurnApi::from_cfg(&cfg_for(dir.path(), &[]), None).unwrap();
    assert!(matches!(
        api.latest_report_path(),
        Err(ChurnError::NotFound(_))
    ));

    let reports = dir.path().join("monitoring").join("reports");
    fs::create_dir_all(&reports).unwrap();
    fs::write(reports.join("20240301_080000-drift.html"), "<html/>").unwrap();

    assert_eq!(
        api.latest_report_path().unwrap(),
        "/monitoring/reports/20240301_080000-drift.html"
    );
    let link = api.latest_report().unwrap();
    assert_eq!(link.report.id, "20240301_080000-drift");
    assert_eq!(api.list_reports().unwrap().len(), 1);
    assert_eq!(
        api.report_path("20240301_080000-drift").unwrap(),
        reports.join("20240301_080000-drift.html")
    );

    let routes = api.metrics_by_path(SummaryWindow::All);
    let redirect = routes.iter().find(|r| r.path == "/monitoring/latest").unwrap();
    assert_eq!(redirect.count, 2);
    assert_eq!(redirect.errors, 1);
}

#[test]
fn unreadable_report_storage_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("reports-file");
    fs::write(&not_a_dir, "x").unwrap();
    let cfg = cfg_for(
        dir.path(),
        &[("CHURN_REPORTS_DIR", not_a_dir.to_str().unwrap())],
    );
    let api = ChurnApi::from_cfg(&cfg, None).unwrap();
    let err = api.list_reports().unwrap_err();
    assert!(matches!(err, ChurnError::RegistryUnavailable { .. }));
    assert_eq!(err.http_status(), 500);
}

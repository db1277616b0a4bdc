//! Drift-report descriptors and the registry contract.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::ChurnResult;

/// Whether an artifact is a single file or a folder of assets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    File,
    Directory,
}

/// One drift-report artifact found on disk at scan time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDescriptor {
    /// File stem (or folder name), e.g. `20240101_120000-drift`.
    pub id: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    pub kind: ReportKind,
}

/// Read access to drift reports. The filesystem stays authoritative; implementations
/// may cache, but never return a path that no longer exists.
pub trait ReportRegistry: Send + Sync {
    /// All reports, newest first.
    fn list(&self) -> ChurnResult<Vec<ReportDescriptor>>;

    /// Newest report, or `NotFound` when there is none.
    fn latest(&self) -> ChurnResult<ReportDescriptor>;

    /// Path of the report with `id`, or `NotFound`.
    fn resolve_path(&self, id: &str) -> ChurnResult<PathBuf>;

    /// Where a redirect to the newest report should point.
    fn redirect_target(&self) -> ChurnResult<PathBuf> {
        self.latest().map(|r| r.path)
    }

    /// URL the transport serves `report` under.
    fn relative_url(&self, report: &ReportDescriptor) -> String;

    /// Drop any cached scan so the next call reads the directory again.
    fn invalidate(&self);
}

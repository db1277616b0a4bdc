//! Filesystem-backed drift report registry.
//!
//! Scans a single directory. Each matching file or sub-folder is one report, ordered by
//! modification time. An optional TTL cache sits in front of the scan; lookups that hand
//! out a path check it still exists and rescan when it does not.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;

use super::domain::{ReportDescriptor, ReportKind, ReportRegistry};

pub const DEFAULT_EXTENSION: &str = "html";
pub const DEFAULT_PREFERRED_SUFFIX: &str = "-drift";
pub const DEFAULT_MOUNT: &str = "/monitoring/reports";

/// Scan and cache settings.
#[derive(Clone, Debug)]
pub struct RegistryOptions {
    /// Extension (without dot) a report file must carry. Compared case-insensitively.
    pub extension: String,
    /// When any artifact id ends with this suffix, only such artifacts are listed.
    pub preferred_suffix: Option<String>,
    /// Reuse a scan for this long. `None` rescans on every call.
    pub cache_ttl: Option<Duration>,
    /// URL prefix the transport serves the directory under.
    pub mount: String,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            preferred_suffix: Some(DEFAULT_PREFERRED_SUFFIX.to_string()),
            cache_ttl: None,
            mount: DEFAULT_MOUNT.to_string(),
        }
    }
}

struct CachedScan {
    taken_at: Instant,
    reports: Vec<ReportDescriptor>,
}

pub struct FsReportRegistry {
    root: PathBuf,
    opts: RegistryOptions,
    cache: Mutex<Option<CachedScan>>,
}

impl FsReportRegistry {
    pub fn new(root: impl Into<PathBuf>, opts: RegistryOptions) -> Self {
        Self {
            root: root.into(),
            opts,
            cache: Mutex::new(None),
        }
    }

    pub fn from_cfg(cfg: &AppCfg) -> Self {
        Self::new(
            &cfg.reports_dir,
            RegistryOptions {
                cache_ttl: cfg.report_cache_ttl,
                ..RegistryOptions::default()
            },
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cached(&self) -> Option<Vec<ReportDescriptor>> {
        let ttl = self.opts.cache_ttl?;
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|c| c.taken_at.elapsed() < ttl)
            .map(|c| c.reports.clone())
    }

    fn scan(&self) -> ChurnResult<Vec<ReportDescriptor>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ChurnError::registry_unavailable(&self.root, err)),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| ChurnError::registry_unavailable(&self.root, err))?;
            if let Some(report) = self.describe(&entry.path()) {
                reports.push(report);
            }
        }

        if let Some(suffix) = self.opts.preferred_suffix.as_deref() {
            if reports.iter().any(|r| r.id.ends_with(suffix)) {
                reports.retain(|r| r.id.ends_with(suffix));
            }
        }

        reports.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.path.cmp(&a.path))
        });
        debug!(event = "reports_scanned", root = %self.root.display(), count = reports.len());
        Ok(reports)
    }

    /// Descriptor for `path`, or `None` when it is not a report or vanished mid-scan.
    fn describe(&self, path: &Path) -> Option<ReportDescriptor> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            return None;
        }
        let meta = fs::metadata(path).ok()?;

        let (id, kind) = if meta.is_file() {
            let ext = path.extension()?.to_string_lossy();
            if !ext.eq_ignore_ascii_case(&self.opts.extension) {
                return None;
            }
            (path.file_stem()?.to_string_lossy().into_owned(), ReportKind::File)
        } else if meta.is_dir() {
            (file_name.clone(), ReportKind::Directory)
        } else {
            return None;
        };

        let stamp = meta.modified().or_else(|_| meta.created()).ok()?;
        Some(ReportDescriptor {
            id,
            file_name,
            created_at: time::from_system(stamp),
            path: path.to_path_buf(),
            kind,
        })
    }

    /// Delete all but the newest `keep` reports. Per-report failures are logged and skipped.
    // TODO: Drive retention from a CHURN_REPORTS_KEEP setting instead of leaving it to callers.
    pub fn prune(&self, keep: usize) -> ChurnResult<usize> {
        self.invalidate();
        let reports = self.scan()?;
        let mut deleted = 0;
        for report in reports.iter().skip(keep) {
            let res = match report.kind {
                ReportKind::File => fs::remove_file(&report.path),
                ReportKind::Directory => fs::remove_dir_all(&report.path),
            };
            match res {
                Ok(()) => deleted += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(
                    event = "report_prune_failed",
                    path = %report.path.display(),
                    error = %err,
                ),
            }
        }
        self.invalidate();
        info!(event = "reports_pruned", root = %self.root.display(), deleted, keep);
        Ok(deleted)
    }
}

impl ReportRegistry for FsReportRegistry {
    fn list(&self) -> ChurnResult<Vec<ReportDescriptor>> {
        if let Some(reports) = self.cached() {
            return Ok(reports);
        }
        let reports = self.scan()?;
        if self.opts.cache_ttl.is_some() {
            *self.cache.lock() = Some(CachedScan {
                taken_at: Instant::now(),
                reports: reports.clone(),
            });
        }
        Ok(reports)
    }

    fn latest(&self) -> ChurnResult<ReportDescriptor> {
        // Second pass covers a stale cache entry or a file deleted right after the scan.
        for _ in 0..2 {
            match self.list()?.into_iter().next() {
                None => break,
                Some(report) if report.path.exists() => return Ok(report),
                Some(report) => {
                    debug!(event = "report_vanished", path = %report.path.display());
                    self.invalidate();
                }
            }
        }
        Err(ChurnError::not_found(format!(
            "no reports in {}",
            self.root.display()
        )))
    }

    fn resolve_path(&self, id: &str) -> ChurnResult<PathBuf> {
        for _ in 0..2 {
            match self.list()?.into_iter().find(|r| r.id == id) {
                None => break,
                Some(report) if report.path.exists() => return Ok(report.path),
                Some(_) => self.invalidate(),
            }
        }
        Err(ChurnError::not_found(format!("report {id}")))
    }

    fn relative_url(&self, report: &ReportDescriptor) -> String {
        format!(
            "{}/{}",
            self.opts.mount.trim_end_matches('/'),
            report.file_name
        )
    }

    fn invalidate(&self) {
        *self.cache.lock() = None;
    }
}

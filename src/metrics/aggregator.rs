//! In-memory request metrics with a best-effort durable CSV log.
//!
//! The ring buffer is the only shared mutable state on the request path. Its lock is
//! held for a single push/pop plus the channel send to the writer; the CSV append
//! itself happens on the writer thread.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;

use super::domain::{
    p95, MetricsSample, MetricsSummary, RouteSummary, SummaryWindow, CSV_HEADER,
};
use super::writer::CsvWriter;

/// Sink for request outcomes. Injected into the services that produce samples.
pub trait MetricsRecorder: Send + Sync {
    fn record(&self, sample: MetricsSample);
}

/// Bounded FIFO of recent samples plus the durable CSV sink.
pub struct MetricsAggregator {
    capacity: usize,
    buffer: Mutex<VecDeque<MetricsSample>>,
    recorded: AtomicU64,
    sink: Option<CsvWriter>,
}

impl MetricsAggregator {
    /// Aggregator without a durable log.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffer: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            recorded: AtomicU64::new(0),
            sink: None,
        }
    }

    /// Aggregator appending every sample to `csv_path` on a background thread.
    pub fn with_csv(capacity: usize, csv_path: impl Into<PathBuf>) -> ChurnResult<Self> {
        let sink = CsvWriter::spawn(csv_path)?;
        Ok(Self {
            sink: Some(sink),
            ..Self::in_memory(capacity)
        })
    }

    /// Production wiring: CSV sink at `cfg.metrics_csv`, warmed with its recent history.
    pub fn from_cfg(cfg: &AppCfg) -> ChurnResult<Self> {
        let agg = Self::with_csv(cfg.metrics_capacity, &cfg.metrics_csv)?;
        let loaded = agg.load_history(&cfg.metrics_csv)?;
        info!(
            event = "metrics_history_loaded",
            path = %cfg.metrics_csv.display(),
            rows = loaded,
        );
        Ok(agg)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples recorded since start, including evicted ones. History rows are not counted.
    pub fn recorded_total(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Durable-write failures swallowed so far.
    pub fn write_failures(&self) -> u64 {
        self.sink.as_ref().map(CsvWriter::failures).unwrap_or(0)
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(CsvWriter::path)
    }

    /// Wait for queued CSV rows to be attempted.
    pub fn flush(&self) {
        if let Some(sink) = &self.sink {
            sink.flush();
        }
    }

    /// Parse the tail of an existing CSV log into the buffer.
    ///
    /// A missing file is an empty history; malformed rows are skipped.
    pub fn load_history(&self, path: &Path) -> ChurnResult<usize> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(ChurnError::Io(err)),
        };

        let mut tail: VecDeque<MetricsSample> = VecDeque::with_capacity(self.capacity);
        let mut skipped = 0usize;
        for (lineno, raw) in BufReader::new(file).split(b'\n').enumerate() {
            let line = match String::from_utf8(raw?) {
                Ok(line) => line,
                Err(err) => {
                    skipped += 1;
                    warn!(
                        event = "metrics_history_row_skipped",
                        line = lineno + 1,
                        error = %err,
                    );
                    continue;
                }
            };
            if line.trim().is_empty() || (lineno == 0 && line.trim() == CSV_HEADER) {
                continue;
            }
            match MetricsSample::from_csv_line(&line) {
                Ok(sample) => {
                    if tail.len() == self.capacity {
                        tail.pop_front();
                    }
                    tail.push_back(sample);
                }
                Err(err) => {
                    skipped += 1;
                    warn!(
                        event = "metrics_history_row_skipped",
                        line = lineno + 1,
                        error = %err,
                    );
                }
            }
        }

        let loaded = tail.len();
        let mut buf = self.buffer.lock();
        // History is older than anything recorded since start, so it goes in front.
        let live: Vec<MetricsSample> = buf.drain(..).collect();
        buf.extend(tail);
        for sample in live {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(sample);
        }
        drop(buf);

        if skipped > 0 {
            warn!(event = "metrics_history_partial", skipped);
        }
        Ok(loaded)
    }

    /// Copy the samples the window selects. The lock is held only for the copy.
    fn snapshot(&self, window: SummaryWindow) -> Vec<MetricsSample> {
        let buf = self.buffer.lock();
        match window {
            SummaryWindow::All => buf.iter().cloned().collect(),
            SummaryWindow::LastN(n) => {
                let skip = buf.len().saturating_sub(n);
                buf.iter().skip(skip).cloned().collect()
            }
            SummaryWindow::Since(d) => {
                // A span too large to represent covers everything.
                let cutoff = ChronoDuration::from_std(d)
                    .ok()
                    .and_then(|span| time::now_utc().checked_sub_signed(span));
                buf.iter()
                    .filter(|s| cutoff.map_or(true, |c| s.timestamp >= c))
                    .cloned()
                    .collect()
            }
        }
    }

    /// Count, error count and p95 latency over the window.
    pub fn summary(&self, window: SummaryWindow) -> MetricsSummary {
        let samples = self.snapshot(window);
        let error_count = samples.iter().filter(|s| s.is_error()).count() as u64;
        let mut latencies: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        MetricsSummary {
            total_count: samples.len() as u64,
            error_count,
            p95_latency_ms: p95(&mut latencies),
        }
    }

    /// Per-path summaries, busiest path first, then by path.
    pub fn summary_by_path(&self, window: SummaryWindow) -> Vec<RouteSummary> {
        let mut groups: BTreeMap<String, (u64, Vec<f64>)> = BTreeMap::new();
        for sample in self.snapshot(window) {
            let entry = groups.entry(sample.path).or_default();
            if sample.status >= 400 {
                entry.0 += 1;
            }
            entry.1.push(sample.duration_ms);
        }

        let mut out: Vec<RouteSummary> = groups
            .into_iter()
            .map(|(path, (errors, mut latencies))| RouteSummary {
                path,
                count: latencies.len() as u64,
                errors,
                p95_latency_ms: p95(&mut latencies),
            })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));
        out
    }
}

impl MetricsRecorder for MetricsAggregator {
    fn record(&self, sample: MetricsSample) {
        let line = self.sink.as_ref().map(|_| sample.to_csv_line());
        let mut buf = self.buffer.lock();
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(sample);
        // Queued under the lock so CSV rows keep buffer order. Only a channel send.
        if let (Some(sink), Some(line)) = (&self.sink, line) {
            sink.submit(line);
        }
        drop(buf);
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn sample(path: &str, status: u16, ms: f64) -> MetricsSample {
        MetricsSample::now("POST", path, status, ms)
    }

    #[test]
    fn empty_summary_has_no_p95() {
        let agg = MetricsAggregator::in_memory(8);
        let summary = agg.summary(SummaryWindow::All);
        assert_eq!(summary, MetricsSummary::default());
        assert!(summary.p95_latency_ms.is_none());
    }

    #[test]
    fn p95_over_ten_samples() {
        let agg = MetricsAggregator::in_memory(100);
        for i in 1..=10 {
            agg.record(sample("/score", 200, (i * 10) as f64));
        }
        let summary = agg.summary(SummaryWindow::All);
        assert_eq!(summary.total_count, 10);
        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.p95_latency_ms, Some(100.0));
    }

    #[test]
    fn oldest_sample_is_evicted_first() {
        let agg = MetricsAggregator::in_memory(3);
        agg.record(sample("/score", 200, 1000.0));
        for ms in [1.0, 2.0, 3.0] {
            agg.record(sample("/score", 200, ms));
        }
        let summary = agg.summary(SummaryWindow::All);
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.p95_latency_ms, Some(3.0));
        assert_eq!(agg.recorded_total(), 4);
    }

    #[test]
    fn windows_select_recent_samples() {
        let agg = MetricsAggregator::in_memory(10);
        agg.record(sample("/score", 500, 90.0));
        agg.record(sample("/score", 200, 10.0));
        agg.record(sample("/score", 200, 20.0));

        let last_two = agg.summary(SummaryWindow::LastN(2));
        assert_eq!(last_two.total_count, 2);
        assert_eq!(last_two.error_count, 0);
        assert_eq!(last_two.p95_latency_ms, Some(20.0));

        let everything = agg.summary(SummaryWindow::LastN(50));
        assert_eq!(everything.total_count, 3);
        assert_eq!(everything.error_count, 1);

        let recent = agg.summary(SummaryWindow::Since(Duration::from_secs(60)));
        assert_eq!(recent.total_count, 3);
    }

    #[test]
    fn client_errors_count_as_errors() {
        let agg = MetricsAggregator::in_memory(10);
        agg.record(sample("/score", 401, 1.0));
        agg.record(sample("/score", 404, 1.0));
        agg.record(sample("/score", 200, 1.0));
        let summary = agg.summary(SummaryWindow::All);
        assert_eq!(summary.error_count, 2);
        assert!(summary.error_count <= summary.total_count);
    }

    #[test]
    fn route_summaries_are_sorted_by_traffic() {
        let agg = MetricsAggregator::in_memory(10);
        agg.record(sample("/health", 200, 1.0));
        agg.record(sample("/score", 200, 5.0));
        agg.record(sample("/score", 500, 7.0));
        agg.record(sample("/config", 200, 2.0));

        let routes = agg.summary_by_path(SummaryWindow::All);
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/score", "/config", "/health"]);
        assert_eq!(routes[0].count, 2);
        assert_eq!(routes[0].errors, 1);
        assert_eq!(routes[0].p95_latency_ms, Some(7.0));
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let agg = Arc::new(MetricsAggregator::in_memory(1_000));
        let handles: Vec<_> = (0..128)
            .map(|i| {
                let agg = agg.clone();
                thread::spawn(move || agg.record(sample("/score", 200, i as f64)))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let summary = agg.summary(SummaryWindow::All);
        assert_eq!(summary.total_count, 128);
        assert_eq!(agg.recorded_total(), 128);
        // Nearest rank of 0..=127: ceil(0.95 * 128) - 1 = 121.
        assert_eq!(summary.p95_latency_ms, Some(121.0));
    }

    #[test]
    fn csv_sink_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        let agg = MetricsAggregator::with_csv(10, &path).unwrap();
        agg.record(sample("/score", 200, 12.5));
        agg.record(sample("/score/batch", 500, 40.0));
        agg.flush();
        assert_eq!(agg.write_failures(), 0);
        drop(agg);

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with(CSV_HEADER));
        assert_eq!(body.lines().count(), 3);

        let reloaded = MetricsAggregator::in_memory(10);
        assert_eq!(reloaded.load_history(&path).unwrap(), 2);
        let summary = reloaded.summary(SummaryWindow::All);
        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.p95_latency_ms, Some(40.0));
        assert_eq!(reloaded.recorded_total(), 0);
    }

    #[test]
    fn history_keeps_only_the_tail_and_skips_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let mut body = format!("{CSV_HEADER}\n");
        for i in 0..5 {
            body.push_str(&sample("/score", 200, i as f64).to_csv_line());
            body.push('\n');
        }
        body.push_str("garbage line\n");
        fs::write(&path, body).unwrap();

        let agg = MetricsAggregator::in_memory(3);
        assert_eq!(agg.load_history(&path).unwrap(), 3);
        let summary = agg.summary(SummaryWindow::All);
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.p95_latency_ms, Some(4.0));
    }

    #[test]
    fn non_utf8_history_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let mut body = format!("{CSV_HEADER}\n").into_bytes();
        body.extend_from_slice(sample("/score", 200, 1.0).to_csv_line().as_bytes());
        body.extend_from_slice(b"\n2024-01-01T00:00:00.000Z,POST,/\xff,200,1.000\n");
        body.extend_from_slice(sample("/score", 500, 2.0).to_csv_line().as_bytes());
        body.push(b'\n');
        fs::write(&path, body).unwrap();

        let agg = MetricsAggregator::in_memory(10);
        assert_eq!(agg.load_history(&path).unwrap(), 2);
        let summary = agg.summary(SummaryWindow::All);
        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.error_count, 1);
    }

    #[test]
    fn since_window_drops_old_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let mut old = sample("/score", 500, 80.0);
        old.timestamp = time::now_utc() - ChronoDuration::hours(2);
        fs::write(&path, format!("{CSV_HEADER}\n{}\n", old.to_csv_line())).unwrap();

        let agg = MetricsAggregator::in_memory(10);
        assert_eq!(agg.load_history(&path).unwrap(), 1);
        agg.record(sample("/score", 200, 5.0));

        let recent = agg.summary(SummaryWindow::Since(Duration::from_secs(60)));
        assert_eq!(recent.total_count, 1);
        assert_eq!(recent.error_count, 0);
        assert_eq!(recent.p95_latency_ms, Some(5.0));

        // Too large for chrono: covers everything.
        let forever = agg.summary(SummaryWindow::Since(Duration::MAX));
        assert_eq!(forever.total_count, 2);
        assert_eq!(forever.error_count, 1);
    }

    #[test]
    fn csv_rows_follow_buffer_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let agg = Arc::new(MetricsAggregator::with_csv(1_000, &path).unwrap());
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let agg = agg.clone();
                thread::spawn(move || agg.record(sample("/score", 200, i as f64)))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        agg.flush();

        let buffered: Vec<f64> = agg.buffer.lock().iter().map(|s| s.duration_ms).collect();
        let written: Vec<f64> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .skip(1)
            .map(|l| MetricsSample::from_csv_line(l).unwrap().duration_ms)
            .collect();
        assert_eq!(written, buffered);
    }

    #[test]
    fn missing_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let agg = MetricsAggregator::in_memory(3);
        assert_eq!(agg.load_history(&dir.path().join("absent.csv")).unwrap(), 0);
    }

    #[test]
    fn write_failures_never_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        fs::create_dir(&path).unwrap();

        let agg = MetricsAggregator::with_csv(10, &path).unwrap();
        agg.record(sample("/score", 200, 3.0));
        agg.flush();
        assert_eq!(agg.write_failures(), 1);
        assert_eq!(agg.summary(SummaryWindow::All).total_count, 1);
    }
}

//! Request metrics samples, summaries and the CSV row format.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;

/// Column order of the durable log.
pub const CSV_HEADER: &str = "timestamp,method,path,status,duration_ms";

/// One request outcome. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: f64,
}

impl MetricsSample {
    /// Sample stamped with the current time.
    pub fn now(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        duration_ms: f64,
    ) -> Self {
        Self {
            timestamp: time::now_utc(),
            method: method.into(),
            path: path.into(),
            status,
            duration_ms,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Encode as one CSV line (no trailing newline).
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{:.3}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            csv_field(&self.method),
            csv_field(&self.path),
            self.status,
            self.duration_ms
        )
    }

    /// Decode a line written by [`MetricsSample::to_csv_line`].
    pub fn from_csv_line(line: &str) -> ChurnResult<Self> {
        let fields = split_csv_line(line)?;
        let [ts, method, path, status, duration] = <[String; 5]>::try_from(fields)
            .map_err(|f| ChurnError::invalid(format!("expected 5 columns, got {}", f.len())))?;

        let timestamp = DateTime::parse_from_rfc3339(&ts)
            .map_err(|err| ChurnError::invalid(format!("bad timestamp {ts}: {err}")))?
            .with_timezone(&Utc);
        let status = status
            .parse()
            .map_err(|_| ChurnError::invalid(format!("bad status {status}")))?;
        let duration_ms: f64 = duration
            .parse()
            .map_err(|_| ChurnError::invalid(format!("bad duration {duration}")))?;
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(ChurnError::invalid(format!("bad duration {duration_ms}")));
        }

        Ok(Self {
            timestamp,
            method,
            path,
            status,
            duration_ms,
        })
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

pub(crate) fn split_csv_line(line: &str) -> ChurnResult<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    if in_quotes {
        return Err(ChurnError::invalid("unterminated quoted field"));
    }
    fields.push(current);
    Ok(fields)
}

/// Which slice of the in-memory buffer a summary covers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SummaryWindow {
    /// Everything currently buffered.
    #[default]
    All,
    /// The most recent `n` samples.
    LastN(usize),
    /// Samples stamped within the given duration of now.
    Since(Duration),
}

/// Health summary over a window of samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_count: u64,
    /// Samples with status >= 400. Never exceeds `total_count`.
    pub error_count: u64,
    /// `None` when the window is empty.
    pub p95_latency_ms: Option<f64>,
}

/// Summary for a single request path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub path: String,
    pub count: u64,
    pub errors: u64,
    pub p95_latency_ms: Option<f64>,
}

/// Nearest-rank percentile: sort ascending, take index `ceil(q * n) - 1` clamped to
/// `[0, n - 1]`. Sorts `values` in place.
pub fn percentile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let rank = (q * n as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    Some(values[idx])
}

pub fn p95(values: &mut [f64]) -> Option<f64> {
    percentile(values, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_of_ten_steps_is_the_last() {
        let mut v: Vec<f64> = (1..=10).map(|i| (i * 10) as f64).collect();
        // ceil(0.95 * 10) - 1 = 9
        assert_eq!(p95(&mut v), Some(100.0));
    }

    #[test]
    fn p95_picks_nearest_rank() {
        let mut v: Vec<f64> = (1..=100).rev().map(f64::from).collect();
        assert_eq!(p95(&mut v), Some(95.0));
        let mut single = vec![7.5];
        assert_eq!(p95(&mut single), Some(7.5));
        assert_eq!(p95(&mut []), None);
    }

    #[test]
    fn csv_line_quotes_awkward_paths() {
        let sample = MetricsSample::now("GET", "/monitoring/reports/a,\"b\".html", 200, 1.25);
        let line = sample.to_csv_line();
        assert!(line.contains("\"/monitoring/reports/a,\"\"b\"\".html\""));
        let back = MetricsSample::from_csv_line(&line).unwrap();
        assert_eq!(back.path, sample.path);
        assert_eq!(back.status, 200);
        assert_eq!(back.duration_ms, 1.25);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(MetricsSample::from_csv_line("2024-01-01T00:00:00Z,GET,/x,200").is_err());
        assert!(MetricsSample::from_csv_line("yesterday,GET,/x,200,1.0").is_err());
        assert!(MetricsSample::from_csv_line("2024-01-01T00:00:00Z,GET,/x,ok,1.0").is_err());
        assert!(MetricsSample::from_csv_line("2024-01-01T00:00:00Z,GET,\"/x,200,1.0").is_err());
    }

    #[test]
    fn errors_start_at_400() {
        assert!(!MetricsSample::now("GET", "/", 399, 1.0).is_error());
        assert!(MetricsSample::now("GET", "/", 400, 1.0).is_error());
        assert!(MetricsSample::now("GET", "/", 503, 1.0).is_error());
    }
}

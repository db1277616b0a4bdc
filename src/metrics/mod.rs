//! Request metrics: bounded in-memory window, summaries and the durable CSV log.

pub mod aggregator;
pub mod domain;
pub mod writer;

pub use aggregator::{MetricsAggregator, MetricsRecorder};
pub use domain::{MetricsSample, MetricsSummary, RouteSummary, SummaryWindow};

//! Cost-aware churn decisions with request metrics and drift-report monitoring.
#![forbid(unsafe_code)]

pub mod api;
pub mod common;
pub mod decision;
pub mod metrics;
pub mod reports;
pub mod scoring;

pub use api::ChurnApi;
pub use common::{ChurnError, ChurnResult, ErrorCode};

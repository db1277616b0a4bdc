//! Entry points a transport layer calls: scoring, monitoring and introspection.

pub mod auth;
pub mod domain;
pub mod service;

pub use auth::BearerAuth;
pub use domain::{ConfigView, HealthStatus, ReportLink, VersionInfo};
pub use service::ChurnApi;

//! Drift report discovery over a directory of generated artifacts.

pub mod domain;
pub mod repo_fs;

pub use domain::{ReportDescriptor, ReportKind, ReportRegistry};
pub use repo_fs::{FsReportRegistry, RegistryOptions};

//! Error handling primitives shared across the core.
//!
//! Every failure maps to a stable [`ErrorCode`] so transport adapters can turn an
//! error into a status without re-deriving the classification.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::scoring::domain::ModelError;

/// Stable error codes exposed to transport adapters and logs.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Decision inputs or request payload failed validation.
    InvalidInput = 1,
    /// The model collaborator failed to produce a probability.
    InferenceFailed = 2,
    /// Report storage could not be read.
    RegistryUnavailable = 3,
    /// Nothing to return: empty registry or unknown id.
    NotFound = 4,
    /// Bearer token missing or mismatched.
    Unauthorized = 5,
    /// Startup configuration could not be loaded.
    Config = 6,
    /// Catch-all for unexpected IO and bugs.
    Internal = 7,
}

impl ErrorCode {
    /// HTTP-equivalent status for the code.
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::Ok => 200,
            ErrorCode::InvalidInput => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::NotFound => 404,
            ErrorCode::InferenceFailed
            | ErrorCode::RegistryUnavailable
            | ErrorCode::Config
            | ErrorCode::Internal => 500,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::InferenceFailed => "inference_failed",
            ErrorCode::RegistryUnavailable => "registry_unavailable",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Config => "config",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum ChurnError {
    /// Malformed or out-of-range input (user error).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Model inference failed; carries the collaborator's cause.
    #[error("inference failed: {0}")]
    InferenceFailed(#[from] ModelError),

    /// The report directory exists but cannot be read.
    #[error("report storage unavailable at {}: {source}", path.display())]
    RegistryUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Readable but empty registry, or an unknown report id.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias used throughout the crate.
pub type ChurnResult<T> = Result<T, ChurnError>;

impl ChurnError {
    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn registry_unavailable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::RegistryUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Machine parsable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChurnError::InvalidInput(_) => ErrorCode::InvalidInput,
            ChurnError::InferenceFailed(_) => ErrorCode::InferenceFailed,
            ChurnError::RegistryUnavailable { .. } => ErrorCode::RegistryUnavailable,
            ChurnError::NotFound(_) => ErrorCode::NotFound,
            ChurnError::Unauthorized(_) => ErrorCode::Unauthorized,
            ChurnError::Config(_) => ErrorCode::Config,
            ChurnError::Io(_) => ErrorCode::Internal,
        }
    }

    /// HTTP-equivalent status, shorthand for `self.code().http_status()`.
    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::InvalidInput as u32, 1);
        assert_eq!(ErrorCode::InferenceFailed as u32, 2);
        assert_eq!(ErrorCode::RegistryUnavailable as u32, 3);
        assert_eq!(ErrorCode::NotFound as u32, 4);
        assert_eq!(ErrorCode::Unauthorized as u32, 5);
        assert_eq!(ErrorCode::Config as u32, 6);
        assert_eq!(ErrorCode::Internal as u32, 7);
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ChurnError::invalid("p").http_status(), 400);
        assert_eq!(ChurnError::not_found("report").http_status(), 404);
        assert_eq!(
            ChurnError::InferenceFailed(ModelError::new("boom")).http_status(),
            500
        );
        let unavailable = ChurnError::registry_unavailable(
            "/nope",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(unavailable.code(), ErrorCode::RegistryUnavailable);
        assert_eq!(unavailable.http_status(), 500);
        assert_eq!(ChurnError::Unauthorized("missing token").http_status(), 401);
    }

    #[test]
    fn not_found_is_distinct_from_unavailable() {
        let empty = ChurnError::not_found("no reports");
        assert_ne!(empty.code(), ErrorCode::RegistryUnavailable);
    }
}

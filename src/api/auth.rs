//! Static shared-secret bearer check.

use crate::common::error::{ChurnError, ChurnResult};

const BEARER_SCHEME: &str = "bearer";

/// Compares `Authorization: Bearer <token>` headers against the configured key.
/// An empty configured key rejects everything.
#[derive(Clone)]
pub struct BearerAuth {
    expected: Vec<u8>,
}

impl BearerAuth {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            expected: api_key.into().into_bytes(),
        }
    }

    /// Check the raw `Authorization` header value.
    pub fn authorize(&self, header: Option<&str>) -> ChurnResult<()> {
        let token = header
            .and_then(parse_bearer)
            .ok_or(ChurnError::Unauthorized("missing bearer token"))?;
        if self.expected.is_empty() || !constant_time_eq(token.as_bytes(), &self.expected) {
            return Err(ChurnError::Unauthorized("invalid api key"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// No early exit on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

//! Request digest issued by `/_api/contextinfo`

use std::time::{SystemTime, UNIX_EPOCH};

use super::AuthError;
use crate::xml::Document;

const ROOT: &str = "d:GetContextWebInformation";
const VALUE: &str = "d:FormDigestValue";
const TIMEOUT: &str = "d:FormDigestTimeoutSeconds";

/// Anti-forgery digest with its issue time and lifetime.
///
/// Valid while `now < issued_at + timeout_secs`. It is never refreshed in
/// place; a stale digest means the handshake has to run again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDigest {
    value: String,
    issued_at: u64,
    timeout_secs: u64,
}

impl SecurityDigest {
    /// Stamp a new digest with the current time.
    pub fn new(value: impl Into<String>, timeout_secs: u64) -> Self {
        Self::issued_at(value, unix_now(), timeout_secs)
    }

    pub fn issued_at(value: impl Into<String>, issued_at: u64, timeout_secs: u64) -> Self {
        Self {
            value: value.into(),
            issued_at,
            timeout_secs,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at_secs(&self) -> u64 {
        self.issued_at
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Unix time at which the digest stops being valid.
    pub fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.timeout_secs)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Parse the XML body of a context-info response into a fresh digest.
pub fn parse_context_info(xml: &str) -> Result<SecurityDigest, AuthError> {
    let doc = Document::parse(xml).map_err(|e| AuthError::NoDigestReturned(e.to_string()))?;

    let info = doc
        .find_path(&[ROOT])
        .ok_or_else(|| AuthError::NoDigestReturned(format!("missing {}", ROOT)))?;

    let value = info
        .child(VALUE)
        .and_then(|el| el.text())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::NoDigestReturned(format!("missing {}", VALUE)))?;

    let raw_timeout = info
        .child(TIMEOUT)
        .and_then(|el| el.text())
        .ok_or_else(|| AuthError::DigestParseError(format!("missing {}", TIMEOUT)))?;

    let timeout: u64 = raw_timeout
        .trim()
        .parse()
        .map_err(|_| AuthError::DigestParseError(format!("{:?} is not a number", raw_timeout)))?;

    if timeout == 0 {
        return Err(AuthError::DigestParseError("timeout is zero".to_string()));
    }

    Ok(SecurityDigest::new(value, timeout))
}

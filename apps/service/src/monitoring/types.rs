use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A monitored endpoint, materialized once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Stable identifier, persisted and keyed by URL
    pub id: Uuid,

    /// Display name used in alerts
    pub name: String,

    pub url: String,

    /// HTTP method, `GET` unless configured
    pub method: String,

    /// Status code the endpoint must answer with
    pub expected_status: u16,

    /// Upper bound for one probe, including reading the body
    pub timeout_ms: u64,

    /// Extra request headers
    pub headers: BTreeMap<String, String>,

    /// Substring the response body must contain
    pub expect_body_contains: Option<String>,
}

impl Target {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_https(&self) -> bool {
        url::Url::parse(&self.url).map(|u| u.scheme() == "https").unwrap_or(false)
    }
}

/// Up/down verdict for one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
}

impl MonitorStatus {
    pub fn from_up(is_up: bool) -> Self {
        if is_up { MonitorStatus::Up } else { MonitorStatus::Down }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
        }
    }
}

/// Failure raised before a response was fully received
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Timeout after {0}ms")]
    Timeout(u64),
    #[error("{0}")]
    Connection(String),
}

impl ProbeError {
    /// Wrap a transport message, falling back to a generic one when it is empty
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            ProbeError::Connection("Connection failed".to_string())
        } else {
            ProbeError::Connection(message)
        }
    }
}

/// Reason a completed response was judged down
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckFailure {
    #[error("Expected status {expected}, got {actual}")]
    UnexpectedStatus { expected: u16, actual: u16 },
    #[error("Response body missing expected content")]
    MissingBodyContent,
}

/// A response that completed within the timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub body: String,
}

/// Raw result of one probe attempt, before the verdict is applied
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub latency_ms: u64,
    pub response: Result<ProbeResponse, ProbeError>,
}

/// Decide whether a completed response satisfies the target
///
/// The status code is compared first, the body constraint only when the
/// status already matches.
pub fn evaluate_response(target: &Target, response: &ProbeResponse) -> Result<(), CheckFailure> {
    if response.status_code != target.expected_status {
        return Err(CheckFailure::UnexpectedStatus {
            expected: target.expected_status,
            actual: response.status_code,
        });
    }

    match &target.expect_body_contains {
        Some(needle) if !response.body.contains(needle.as_str()) => {
            Err(CheckFailure::MissingBodyContent)
        }
        _ => Ok(()),
    }
}

/// Peer certificate details read during a TLS handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Whole days until expiry, negative once expired
    pub days_remaining: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub issuer: String,
    pub subject: String,
}

/// One immutable probe record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub target_id: Uuid,

    /// `None` when the request never completed
    pub status_code: Option<u16>,

    pub response_time_ms: u64,

    pub is_up: bool,

    pub error: Option<String>,

    /// `None` for plain HTTP targets or when inspection failed
    pub ssl_days_remaining: Option<i64>,

    pub checked_at: DateTime<Utc>,
}

impl Check {
    /// Build a check from a probe outcome and an optional certificate reading
    pub fn from_outcome(
        target: &Target,
        outcome: ProbeOutcome,
        certificate: Option<&CertificateInfo>,
    ) -> Self {
        let (status_code, is_up, error) = match outcome.response {
            Ok(response) => {
                let verdict = evaluate_response(target, &response);
                (Some(response.status_code), verdict.is_ok(), verdict.err().map(|e| e.to_string()))
            }
            Err(e) => (None, false, Some(e.to_string())),
        };

        Self {
            target_id: target.id,
            status_code,
            response_time_ms: outcome.latency_ms,
            is_up,
            error,
            ssl_days_remaining: certificate.map(|c| c.days_remaining),
            checked_at: Utc::now(),
        }
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus::from_up(self.is_up)
    }
}

/// A check annotated for the current tick, never persisted as such
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: Check,

    pub certificate: Option<CertificateInfo>,

    /// Verdict of the preceding check, `None` before the first one
    pub previous_status: Option<bool>,

    /// True when the verdict flipped relative to `previous_status`
    pub status_changed: bool,
}

#[cfg(test)]
pub(crate) fn test_target(url: &str) -> Target {
    Target {
        id: Uuid::new_v4(),
        name: "Example".to_string(),
        url: url.to_string(),
        method: "GET".to_string(),
        expected_status: 200,
        timeout_ms: 2_000,
        headers: BTreeMap::new(),
        expect_body_contains: None,
    }
}

//! Error taxonomy for remote job orchestration.

use std::time::Duration;

use thiserror::Error;

use crate::job::JobKind;

/// Number of body characters kept when an HTTP error is displayed.
const BODY_EXCERPT_CHARS: usize = 500;

/// Failure of a single transport call, before any retry decision is made.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The service answered with a non-2xx status.
    #[error("HTTP {code} on {url}: {}", excerpt(.body))]
    Http { code: u16, url: String, body: String },

    /// The request never produced a response (connect, TLS, timeout, reset).
    #[error("Network error on {url}: {cause}")]
    Network { url: String, cause: String },

    /// The request could not be assembled locally.
    #[error("Failed to encode request for {url}: {cause}")]
    Encoding { url: String, cause: String },
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Http { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network { .. })
    }

    pub fn body(&self) -> &str {
        match self {
            TransportError::Http { body, .. } => body,
            _ => "",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    /// Bad local input: missing file, wrong archive signature, malformed value.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{operation}: giving up after {attempts} attempts, last error: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: TransportError,
    },

    #[error("{operation} failed: {source}")]
    PermanentRemote {
        operation: String,
        #[source]
        source: TransportError,
    },

    #[error("{kind} job {job_id} ended with status {status}{}", render_details(.details))]
    RemoteJobFailed {
        kind: JobKind,
        job_id: String,
        status: String,
        details: Vec<String>,
    },

    #[error(
        "Timed out waiting for {kind} job {job_id} after {}s (last status: {last_status}); the job may still be running, re-run once it settles",
        .waited.as_secs()
    )]
    Timeout {
        kind: JobKind,
        job_id: String,
        waited: Duration,
        last_status: String,
    },

    #[error("Could not download the package archive. Tried: {}", .candidates_tried.join("; "))]
    ArtifactNotFound { candidates_tried: Vec<String> },

    #[error("Unexpected response from {context}: {detail}")]
    InvalidResponse { context: String, detail: String },

    #[error(transparent)]
    Local(#[from] anyhow::Error),
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    format!("{}...", cut)
}

fn render_details(details: &[String]) -> String {
    if details.is_empty() {
        return String::new();
    }
    let mut out = String::from(":");
    for line in details {
        out.push_str("\n  - ");
        out.push_str(line);
    }
    out
}

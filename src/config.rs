//! Service endpoints and timing settings.

use std::time::Duration;

use crate::http::{RetryPolicy, TransientRule, inspection_not_ready, network_only, server_errors};
use crate::job::JobKind;

pub const DEFAULT_API_ROOT: &str = "/suite/deployment-management/v2";

/// Header carrying the pre-obtained API key.
pub const API_KEY_HEADER: &str = "appian-api-key";

/// Seconds between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Seconds an export may take before it is abandoned.
pub const DEFAULT_EXPORT_MAX_WAIT_SECS: u64 = 900;

/// Seconds an import or inspection may take before it is abandoned.
pub const DEFAULT_PROMOTE_MAX_WAIT_SECS: u64 = 1800;

/// Retries for import submissions and polls.
pub const DEFAULT_IMPORT_RETRIES: u32 = 3;

/// Seconds between import retries.
pub const DEFAULT_IMPORT_RETRY_DELAY_SECS: u64 = 10;

/// Consecutive not-ready polls tolerated for an inspection.
pub const DEFAULT_INSPECTION_RETRIES: u32 = 5;

/// Network failures tolerated per export poll.
const EXPORT_POLL_RETRIES: u32 = 3;

/// Where the remote service lives and how to build its URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub api_root: String,
}

impl ServiceConfig {
    pub fn new(base_url: &str) -> Self {
        Self::with_api_root(base_url, DEFAULT_API_ROOT)
    }

    pub fn with_api_root(base_url: &str, api_root: &str) -> Self {
        let root = api_root.trim_matches('/');
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_root: if root.is_empty() {
                String::new()
            } else {
                format!("/{}", root)
            },
        }
    }

    pub fn api_url(&self) -> String {
        format!("{}{}", self.base_url, self.api_root)
    }

    pub fn deployments_url(&self) -> String {
        format!("{}/deployments", self.api_url())
    }

    pub fn deployment_url(&self, id: &str) -> String {
        format!("{}/deployments/{}", self.api_url(), id)
    }

    pub fn deployment_log_url(&self, id: &str) -> String {
        format!("{}/deployments/{}/log", self.api_url(), id)
    }

    pub fn inspections_url(&self) -> String {
        format!("{}/inspections", self.api_url())
    }

    pub fn inspection_url(&self, id: &str) -> String {
        format!("{}/inspections/{}", self.api_url(), id)
    }

    /// Submission endpoint for a job kind.
    pub fn submit_url(&self, kind: JobKind) -> String {
        match kind {
            JobKind::Export | JobKind::Import => self.deployments_url(),
            JobKind::Inspect => self.inspections_url(),
        }
    }

    /// Default status endpoint when the submission did not return one.
    pub fn status_url(&self, kind: JobKind, id: &str) -> String {
        match kind {
            JobKind::Export | JobKind::Import => self.deployment_url(id),
            JobKind::Inspect => self.inspection_url(id),
        }
    }

    /// Resolve a URL the service returned, which may be relative to the base URL.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }
}

/// Poll cadence and total wait budget for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollConfig {
    pub fn from_secs(interval: u64, max_wait: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval),
            max_wait: Duration::from_secs(max_wait),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryConfig {
    pub fn policy(&self, rule: TransientRule) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.delay, rule)
    }
}

/// Everything an operation needs to know about timing, per job kind.
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    pub poll: PollConfig,
    /// Policy for the submission POST.
    pub submit_retry: RetryPolicy,
    /// Policy for each status poll.
    pub poll_retry: RetryPolicy,
}

impl JobSettings {
    /// Export submissions are not retried; polls retry network failures only.
    pub fn export(poll: PollConfig) -> Self {
        Self {
            poll,
            submit_retry: RetryPolicy::never(),
            poll_retry: RetryPolicy::new(EXPORT_POLL_RETRIES, poll.interval, network_only),
        }
    }

    /// Import submissions and polls treat any 5xx as transient. A 404 while
    /// polling an import stays permanent.
    pub fn import(poll: PollConfig, retry: RetryConfig) -> Self {
        Self {
            poll,
            submit_retry: retry.policy(server_errors),
            poll_retry: retry.policy(server_errors),
        }
    }

    /// Inspection polls tolerate the not-yet-indexed 404 and the not-ready 500,
    /// waiting one poll interval between attempts.
    pub fn inspect(poll: PollConfig, max_retries: u32) -> Self {
        Self {
            poll,
            submit_retry: RetryPolicy::never(),
            poll_retry: RetryPolicy::new(max_retries, poll.interval, inspection_not_ready),
        }
    }
}
